//! Integration tests for mu-shelf
//!
//! Fixtures are built in memory: small ZIP containers with stored and
//! DEFLATE entries, written into temporary directories.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mu_shelf::{
    natural_cmp, normalize_xhtml, open_document, open_document_with_options, open_epub_reader,
    sequence_images, ExtractionTool, OpenOptions, OpenOptionsBuilder, ShelfError, ToolArg,
};

// -- fixtures -----------------------------------------------------------------

struct Entry<'a> {
    name: &'a str,
    data: &'a [u8],
    deflate: bool,
}

fn stored<'a>(name: &'a str, data: &'a [u8]) -> Entry<'a> {
    Entry {
        name,
        data,
        deflate: false,
    }
}

fn deflated<'a>(name: &'a str, data: &'a [u8]) -> Entry<'a> {
    Entry {
        name,
        data,
        deflate: true,
    }
}

fn zip_bytes(entries: &[Entry<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();

    for entry in entries {
        let crc = crc32fast::hash(entry.data);
        let (method, payload): (u16, Vec<u8>) = if entry.deflate {
            (8, miniz_oxide::deflate::compress_to_vec(entry.data, 6))
        } else {
            (0, entry.data.to_vec())
        };
        let offset = out.len() as u32;
        let name = entry.name.as_bytes();

        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&method.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&payload);

        central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&method.to_le_bytes());
        central.extend_from_slice(&0u32.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        central.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&[0u8; 12]); // extra, comment, disk, attrs
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name);
    }

    let cd_offset = out.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}

fn scratch_in(dir: &Path) -> OpenOptions {
    OpenOptionsBuilder::new().scratch_root(dir).build()
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

const CONTAINER: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const SAMPLE_OPF: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Sample</dc:title>
    <dc:creator>Jo Writer</dc:creator>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ch1" href="part1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="part2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#;

const SAMPLE_NAV: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Navigation</title></head>
<body><nav epub:type="toc"><ol><li><a href="part1.xhtml">Intro</a></li></ol></nav></body>
</html>"#;

const PART1: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Part 1</title></head>
<body><h1>Beginning</h1><p>Hello <b>World</b>, said the <em>reader</em>.</p></body></html>"#;

const PART2: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Part 2</title></head>
<body><p>The end.</p></body></html>"#;

fn sample_epub() -> Vec<u8> {
    zip_bytes(&[
        stored("mimetype", b"application/epub+zip"),
        deflated("META-INF/container.xml", CONTAINER),
        deflated("OEBPS/content.opf", SAMPLE_OPF),
        deflated("OEBPS/nav.xhtml", SAMPLE_NAV),
        deflated("OEBPS/part1.xhtml", PART1),
        stored("OEBPS/part2.xhtml", PART2),
    ])
}

// -- image sequencing -----------------------------------------------------------

#[test]
fn test_sequencer_keeps_every_image_extension_in_mixed_case() {
    let names = [
        "img10.png", "img2.PNG", "img2a.Jpg", "x.jpeg", "y.WEBP", "z.bmp", "notes.txt", "thumb.gif",
    ];
    let ordered = sequence_images(names.iter().map(PathBuf::from));
    assert_eq!(
        file_names(&ordered),
        vec!["img2.PNG", "img2a.Jpg", "img10.png", "x.jpeg", "y.WEBP", "z.bmp"]
    );
    assert_eq!(natural_cmp("img2.png", "img10.png"), std::cmp::Ordering::Less);
}

// -- CBZ --------------------------------------------------------------------------

#[test]
fn test_cbz_natural_order_not_archive_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "Volume 1.CBZ",
        &zip_bytes(&[stored("b1.jpg", b"b"), deflated("a2.png", b"a")]),
    );

    let doc = open_document_with_options(&path, &scratch_in(dir.path())).unwrap();
    assert_eq!(doc.title(), "Volume 1");
    assert_eq!(file_names(doc.image_paths()), vec!["a2.png", "b1.jpg"]);
    assert!(doc.chapters().is_empty());
    assert_eq!(doc.full_text(), "");
    for page in doc.image_paths() {
        assert!(page.is_file());
    }
}

#[test]
fn test_cbz_without_images_fails_with_empty_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "empty.cbz",
        &zip_bytes(&[stored("ComicInfo.xml", b"<ComicInfo/>")]),
    );

    let err = open_document_with_options(&path, &scratch_in(dir.path())).unwrap_err();
    assert!(matches!(err, ShelfError::EmptyContent(_)));
    assert_eq!(err.to_string(), "Empty content: No images found in CBZ");
}

#[test]
fn test_cbz_reopen_reuses_scratch_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "again.cbz", &zip_bytes(&[stored("p1.png", b"1")]));
    let options = scratch_in(dir.path());

    let first = open_document_with_options(&path, &options).unwrap();
    let second = open_document_with_options(&path, &options).unwrap();
    assert_eq!(first.image_paths(), second.image_paths());
}

// -- CBR --------------------------------------------------------------------------

#[test]
fn test_cbr_without_tools_fails_the_same_way_twice() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "issue.cbr", b"Rar!\x1a\x07\x01\x00not-really-rar");
    let options = OpenOptionsBuilder::new()
        .scratch_root(dir.path())
        .tool_timeout(Duration::from_secs(1))
        .extraction_tools(vec![
            ExtractionTool::new("mu-shelf-absent-one", vec![ToolArg::Archive]),
            ExtractionTool::new("mu-shelf-absent-two", vec![ToolArg::OutDir]),
        ])
        .build();

    let first = open_document_with_options(&path, &options).unwrap_err();
    let second = open_document_with_options(&path, &options).unwrap_err();
    assert_eq!(first, second);
    let ShelfError::Extraction(message) = first else {
        panic!("expected an extraction failure");
    };
    assert!(message.contains("install mu-shelf-absent-one or mu-shelf-absent-two"));
}

// -- EPUB -------------------------------------------------------------------------

#[test]
fn test_epub_titles_and_full_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "sample.epub", &sample_epub());

    let doc = open_document_with_options(&path, &scratch_in(dir.path())).unwrap();
    assert_eq!(doc.title(), "Sample");
    assert_eq!(doc.chapter_titles(), vec!["Intro", "part2"]);

    let texts = doc.chapter_texts();
    assert_eq!(texts[0], "Beginning\nHello **World** , said the *reader* .");
    assert_eq!(texts[1], "The end.");
    assert_eq!(doc.full_text(), format!("{}\n\n{}", texts[0], texts[1]));
    assert!(doc.image_paths().is_empty());
    assert_eq!(doc.metadata().authors, vec!["Jo Writer"]);
}

#[test]
fn test_epub_from_reader_matches_file_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "sample.epub", &sample_epub());
    let options = OpenOptions {
        extract_cover: false,
        ..scratch_in(dir.path())
    };

    let from_file = open_document_with_options(&path, &options).unwrap();
    let from_reader = open_epub_reader(Cursor::new(sample_epub()), "sample", &options).unwrap();
    assert_eq!(from_file, from_reader);
}

#[test]
fn test_epub_missing_container_is_open_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "broken.epub",
        &zip_bytes(&[
            deflated("OEBPS/content.opf", SAMPLE_OPF),
            deflated("OEBPS/part1.xhtml", PART1),
        ]),
    );

    let err = open_document(&path).unwrap_err();
    assert_eq!(err, ShelfError::Open("missing container descriptor".into()));
}

#[test]
fn test_epub_ncx_titles_when_no_nav_document() {
    let opf = br#"<package version="2.0" xmlns="http://www.idpf.org/2007/opf">
  <metadata><dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">Old Style</dc:title></metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="ch1" href="part1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx"><itemref idref="ch1"/></spine>
</package>"#;
    let ncx = br#"<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/"><navMap>
  <navPoint id="n1" playOrder="1"><navLabel><text>First Part</text></navLabel>
  <content src="part1.xhtml#start"/></navPoint>
</navMap></ncx>"#;
    let data = zip_bytes(&[
        stored("META-INF/container.xml", CONTAINER),
        stored("OEBPS/content.opf", opf),
        deflated("OEBPS/toc.ncx", ncx),
        deflated("OEBPS/part1.xhtml", PART1),
    ]);

    let doc = open_epub_reader(Cursor::new(data), "old", &OpenOptions::default()).unwrap();
    assert_eq!(doc.title(), "Old Style");
    assert_eq!(doc.chapter_titles(), vec!["First Part"]);
    assert_eq!(doc.toc().len(), 1);
    assert_eq!(doc.toc()[0].chapter_index, Some(0));
}

#[test]
fn test_epub_malformed_nav_degrades_to_file_titles() {
    let nav = b"<html><body><nav epub:type=\"toc\"><ol><li><a href=\"part2.xhtml\"";
    let data = zip_bytes(&[
        stored("META-INF/container.xml", CONTAINER),
        stored("OEBPS/content.opf", SAMPLE_OPF),
        stored("OEBPS/nav.xhtml", nav),
        stored("OEBPS/part1.xhtml", PART1),
        stored("OEBPS/part2.xhtml", PART2),
    ]);

    let doc = open_epub_reader(Cursor::new(data), "x", &OpenOptions::default()).unwrap();
    assert_eq!(doc.chapter_titles(), vec!["part1", "part2"]);
}

// -- dispatch and normalizer ------------------------------------------------------

#[test]
fn test_unknown_extension() {
    let err = open_document("/nowhere/book.pdf").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unsupported format: No provider for extension: pdf"
    );
}

#[test]
fn test_normalizer_is_idempotent_on_real_document() {
    let once = normalize_xhtml(PART1, "part1.xhtml").unwrap();
    let twice = normalize_xhtml(PART1, "part1.xhtml").unwrap();
    assert_eq!(once, twice);
    assert!(!once.contains("Part 1"));
}

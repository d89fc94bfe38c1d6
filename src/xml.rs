//! Shared helpers for the quick-xml pull parsers.
//!
//! Container descriptors, package documents, navigation documents and
//! content documents are all read as flat event streams. These helpers keep
//! name matching namespace-tolerant and resolve entity references that
//! quick-xml reports as separate events.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesRef, BytesStart, BytesText};
use quick_xml::reader::Reader;

/// Reader over a byte slice with the settings every parser here shares.
///
/// Text is not trimmed (entity references split text events, and trimming
/// each piece would glue words together). End-name checks are relaxed so
/// mismatched tags degrade instead of aborting.
pub(crate) fn lenient_reader(content: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(strip_bom(content));
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.expand_empty_elements = false;
    reader
}

/// Drop a UTF-8 byte order mark.
pub(crate) fn strip_bom(content: &[u8]) -> &[u8] {
    content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content)
}

/// Element name without its namespace prefix, ASCII-lowercased.
pub(crate) fn local_name(qname: &[u8]) -> String {
    let local = match qname.iter().rposition(|&b| b == b':') {
        Some(idx) => &qname[idx + 1..],
        None => qname,
    };
    String::from_utf8_lossy(local).to_ascii_lowercase()
}

/// Attribute value by exact qualified key, entity-unescaped.
pub(crate) fn attribute(e: &BytesStart, reader: &Reader<&[u8]>, key: &str) -> Option<String> {
    attribute_where(e, reader, |k| k == key)
}

/// Attribute value by local key, ignoring any namespace prefix
/// (`epub:type` and `type` both match `"type"`).
pub(crate) fn attribute_local(
    e: &BytesStart,
    reader: &Reader<&[u8]>,
    key: &str,
) -> Option<String> {
    attribute_where(e, reader, |k| {
        k == key || k.rsplit_once(':').is_some_and(|(_, local)| local == key)
    })
}

fn attribute_where(
    e: &BytesStart,
    reader: &Reader<&[u8]>,
    matches: impl Fn(&str) -> bool,
) -> Option<String> {
    for attr in e.attributes().flatten() {
        let key = reader.decoder().decode(attr.key.as_ref()).ok()?;
        if matches(&key) {
            let raw = reader.decoder().decode(&attr.value).ok()?;
            return Some(unescape_lossy(&raw).into_owned());
        }
    }
    None
}

/// Text event content, `None` when the bytes are not valid in the
/// document encoding.
pub(crate) fn text(e: &BytesText) -> Option<String> {
    e.decode().ok().map(|t| unescape_lossy(&t).into_owned())
}

/// Resolve an entity or character reference event.
///
/// Numeric references and every HTML5 named entity resolve; anything else
/// is kept literally as `&name;`.
pub(crate) fn entity(e: &BytesRef) -> String {
    let Ok(name) = e.decode() else {
        return String::new();
    };
    let literal = format!("&{};", name);
    match unescape_with(&literal, resolve_html5_entity) {
        Ok(resolved) => resolved.into_owned(),
        Err(_) => literal,
    }
}

fn unescape_lossy(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    unescape_with(raw, resolve_html5_entity).unwrap_or(Cow::Borrowed(raw))
}

/// Decode a markup document to UTF-8.
///
/// The encoding comes from a byte order mark, then from the byte pattern
/// of an unmarked UTF-16 `<?xml`, then from the declaration's `encoding`
/// label, and is UTF-8 otherwise. `None` when the bytes are malformed in
/// that encoding.
pub(crate) fn decode_markup(content: &[u8]) -> Option<Cow<'_, str>> {
    let (encoding, body) = match Encoding::for_bom(content) {
        Some((encoding, bom_len)) => (encoding, &content[bom_len..]),
        None => (sniff_encoding(content), content),
    };
    encoding.decode_without_bom_handling_and_without_replacement(body)
}

/// [`decode_markup`], falling back to lossy UTF-8 for package and
/// navigation documents that are read on a best-effort basis.
pub(crate) fn decode_markup_lossy(content: &[u8]) -> Cow<'_, str> {
    decode_markup(content).unwrap_or_else(|| String::from_utf8_lossy(content))
}

fn sniff_encoding(content: &[u8]) -> &'static Encoding {
    match content {
        [0x3C, 0x00, 0x3F, 0x00, ..] => return UTF_16LE,
        [0x00, 0x3C, 0x00, 0x3F, ..] => return UTF_16BE,
        _ => {}
    }
    declared_encoding(content)
        // A declaration readable as ASCII cannot be UTF-16.
        .filter(|encoding| *encoding != UTF_16LE && *encoding != UTF_16BE)
        .unwrap_or(UTF_8)
}

/// Encoding named by `<?xml ... encoding="..."?>`, when recognized.
fn declared_encoding(content: &[u8]) -> Option<&'static Encoding> {
    let decl = content.strip_prefix(b"<?xml")?;
    let end = decl.windows(2).position(|w| w == b"?>")?;
    let decl = &decl[..end];
    let at = decl.windows(8).position(|w| w == b"encoding")?;
    let rest = decl[at + 8..].trim_ascii_start().strip_prefix(b"=")?;
    let (&quote, rest) = rest.trim_ascii_start().split_first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let close = rest.iter().position(|&b| b == quote)?;
    Encoding::for_label(&rest[..close])
}

/// Collapse whitespace runs to single spaces and trim both ends.
///
/// Non-breaking spaces count as whitespace; soft hyphens are dropped.
pub(crate) fn simplify_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_space = true;
    for ch in text.chars() {
        if ch == '\u{ad}' {
            continue;
        }
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    if result.ends_with(' ') {
        result.pop();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::events::Event;

    #[test]
    fn test_local_name_strips_prefix() {
        assert_eq!(local_name(b"dc:title"), "title");
        assert_eq!(local_name(b"Title"), "title");
        assert_eq!(local_name(b"opf:meta"), "meta");
    }

    #[test]
    fn test_strip_bom() {
        assert_eq!(strip_bom(b"\xEF\xBB\xBF<a/>"), b"<a/>");
        assert_eq!(strip_bom(b"<a/>"), b"<a/>");
    }

    #[test]
    fn test_attribute_lookup_exact_and_local() {
        let xml = br#"<nav epub:type="toc" href="a&amp;b.xhtml"/>"#;
        let mut reader = lenient_reader(xml);
        let mut buf = Vec::new();
        let Ok(Event::Empty(e)) = reader.read_event_into(&mut buf) else {
            panic!("expected empty element");
        };
        assert_eq!(attribute(&e, &reader, "type"), None);
        assert_eq!(attribute_local(&e, &reader, "type").as_deref(), Some("toc"));
        assert_eq!(attribute(&e, &reader, "href").as_deref(), Some("a&b.xhtml"));
    }

    #[test]
    fn test_entities_resolve() {
        let xml = b"<p>&amp;&#8212;&nbsp;&ntilde;&euro;&unknown;</p>";
        let mut reader = lenient_reader(xml);
        let mut buf = Vec::new();
        let mut out = String::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::GeneralRef(e)) => out.push_str(&entity(&e)),
                Ok(Event::Text(e)) => out.push_str(&text(&e).unwrap()),
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("{e:?}"),
            }
            buf.clear();
        }
        assert_eq!(out, "&\u{2014}\u{a0}\u{f1}\u{20ac}&unknown;");
    }

    fn utf16le(text: &str, bom: bool) -> Vec<u8> {
        let mut bytes = if bom { vec![0xFF, 0xFE] } else { Vec::new() };
        bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        bytes
    }

    #[test]
    fn test_decode_markup_utf8_and_bom() {
        assert_eq!(decode_markup(b"<p>caf\xc3\xa9</p>").as_deref(), Some("<p>café</p>"));
        assert_eq!(decode_markup(b"\xEF\xBB\xBF<p/>").as_deref(), Some("<p/>"));
        assert_eq!(decode_markup(b"<p>\xff\xfe</p>"), None);
    }

    #[test]
    fn test_decode_markup_utf16() {
        let doc = "<?xml version=\"1.0\" encoding=\"UTF-16\"?><p>Hi \u{e9}</p>";
        let with_bom = utf16le(doc, true);
        assert_eq!(decode_markup(&with_bom).as_deref(), Some(doc));
        let without_bom = utf16le(doc, false);
        assert_eq!(decode_markup(&without_bom).as_deref(), Some(doc));

        let mut big_endian = vec![0xFE, 0xFF];
        big_endian.extend("<p>x</p>".encode_utf16().flat_map(u16::to_be_bytes));
        assert_eq!(decode_markup(&big_endian).as_deref(), Some("<p>x</p>"));
    }

    #[test]
    fn test_decode_markup_declared_single_byte() {
        let latin = b"<?xml version='1.0' encoding = 'ISO-8859-1'?><p>caf\xe9</p>";
        assert_eq!(
            decode_markup(latin).as_deref(),
            Some("<?xml version='1.0' encoding = 'ISO-8859-1'?><p>caf\u{e9}</p>")
        );
        // UTF-16 named in an ASCII declaration falls back to UTF-8.
        let mislabeled = b"<?xml version=\"1.0\" encoding=\"utf-16\"?><p>ok</p>";
        assert_eq!(
            decode_markup(mislabeled).as_deref(),
            Some("<?xml version=\"1.0\" encoding=\"utf-16\"?><p>ok</p>")
        );
    }

    #[test]
    fn test_simplify_whitespace() {
        assert_eq!(simplify_whitespace("  Part\n\t One \u{a0} "), "Part One");
        assert_eq!(simplify_whitespace("hy\u{ad}phen"), "hyphen");
        assert_eq!(simplify_whitespace("   "), "");
    }
}

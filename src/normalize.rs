//! XHTML content documents to plain text.
//!
//! A single pass over quick-xml events, no tree. Paragraph-like elements
//! become line breaks, `em`/`i` become `*...*`, `strong`/`b` become `**`,
//! and non-content subtrees (`head`, `style`, `script`, ...) are dropped.
//!
//! ```rust
//! use mu_shelf::normalize_xhtml;
//!
//! let text = normalize_xhtml(b"<p>Hello <b>World</b></p>", "ch1.xhtml").unwrap();
//! assert_eq!(text, "Hello **World**");
//! ```

use quick_xml::events::Event;

use crate::error::ShelfError;
use crate::xml::{
    decode_markup, entity, lenient_reader, local_name, simplify_whitespace, text,
};

/// Elements whose whole subtree is excluded from the output.
const EXCLUDED_ELEMENTS: &[&str] = &["style", "script", "head", "metadata", "title"];

/// Elements that force a line break on open and on close.
const BLOCK_ELEMENTS: &[&str] = &["br", "p", "div", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6"];

const EMPHASIS_MARKER: &str = "*";
const BOLD_MARKER: &str = "**";

/// Streaming text builder driven by element and character events.
///
/// Character data is buffered until the next tag so that a word split by
/// entity or CDATA events is trimmed and joined as one run. Opening markers
/// are held back until the text they decorate arrives, which keeps the
/// separating space outside the marker (`Hello **World**`).
#[derive(Debug, Default)]
pub struct TextNormalizer {
    out: String,
    run: String,
    open_markers: String,
    skip_depth: usize,
    emphasis_open: bool,
}

impl TextNormalizer {
    /// Create an empty normalizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// An element opened. `name` is the lowercase local name.
    pub fn start(&mut self, name: &str) {
        self.flush_run();
        if EXCLUDED_ELEMENTS.contains(&name) {
            self.skip_depth += 1;
            return;
        }
        if self.skip_depth > 0 {
            return;
        }
        match name {
            "em" | "i" => {
                self.open_markers.push_str(EMPHASIS_MARKER);
                self.emphasis_open = true;
            }
            "strong" | "b" => self.open_markers.push_str(BOLD_MARKER),
            _ if BLOCK_ELEMENTS.contains(&name) => self.line_break(),
            _ => {}
        }
    }

    /// An element closed. `name` is the lowercase local name.
    pub fn end(&mut self, name: &str) {
        self.flush_run();
        if EXCLUDED_ELEMENTS.contains(&name) {
            self.skip_depth = self.skip_depth.saturating_sub(1);
            return;
        }
        if self.skip_depth > 0 {
            return;
        }
        match name {
            "em" | "i" => {
                if self.emphasis_open {
                    self.emit_marker(EMPHASIS_MARKER);
                    self.emphasis_open = false;
                }
            }
            "strong" | "b" => self.emit_marker(BOLD_MARKER),
            _ if BLOCK_ELEMENTS.contains(&name) => self.line_break(),
            _ => {}
        }
    }

    /// A self-closing element. Only breaks matter; empty inline spans and
    /// excluded elements contribute nothing.
    pub fn empty(&mut self, name: &str) {
        self.flush_run();
        if self.skip_depth == 0 && BLOCK_ELEMENTS.contains(&name) {
            self.line_break();
        }
    }

    /// Character data, already entity-resolved.
    pub fn text(&mut self, chunk: &str) {
        if self.skip_depth == 0 {
            self.run.push_str(chunk);
        }
    }

    /// Finish and return the trimmed text.
    pub fn finish(mut self) -> String {
        self.flush_run();
        self.out.trim().to_string()
    }

    fn flush_run(&mut self) {
        if self.run.is_empty() {
            return;
        }
        let run = std::mem::take(&mut self.run);
        let cleaned = simplify_whitespace(&run);
        if cleaned.is_empty() {
            return;
        }
        if self.out.chars().next_back().is_some_and(|c| !c.is_whitespace()) {
            self.out.push(' ');
        }
        self.out.push_str(&self.open_markers);
        self.open_markers.clear();
        self.out.push_str(&cleaned);
    }

    fn emit_marker(&mut self, marker: &str) {
        // A span that never received text still emits its opener first.
        self.out.push_str(&self.open_markers);
        self.open_markers.clear();
        self.out.push_str(marker);
    }

    fn line_break(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }
}

/// Normalize one XHTML content document to plain text.
///
/// The document is decoded in its own encoding (byte order mark, then XML
/// declaration, then UTF-8). Fails with [`ShelfError::ChapterNotUtf8`] when
/// the bytes are malformed in that encoding. Malformed markup never fails:
/// text is collected up to the first unrecoverable XML error.
pub fn normalize_xhtml(content: &[u8], href: &str) -> Result<String, ShelfError> {
    let Some(decoded) = decode_markup(content) else {
        return Err(ShelfError::ChapterNotUtf8 {
            href: href.to_string(),
        });
    };

    let mut reader = lenient_reader(decoded.as_bytes());
    let mut buf = Vec::new();
    let mut normalizer = TextNormalizer::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => normalizer.start(&local_name(e.name().as_ref())),
            Ok(Event::End(e)) => normalizer.end(&local_name(e.name().as_ref())),
            Ok(Event::Empty(e)) => normalizer.empty(&local_name(e.name().as_ref())),
            Ok(Event::Text(e)) => {
                if let Some(t) = text(&e) {
                    normalizer.text(&t);
                }
            }
            Ok(Event::CData(e)) => normalizer.text(&String::from_utf8_lossy(&e)),
            Ok(Event::GeneralRef(e)) => normalizer.text(&entity(&e)),
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!(
                    "[TEXT] {} parse stopped at byte {}: {}",
                    href,
                    reader.buffer_position(),
                    e
                );
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(normalizer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(xhtml: &str) -> String {
        normalize_xhtml(xhtml.as_bytes(), "test.xhtml").unwrap()
    }

    #[test]
    fn test_bold_spacing() {
        assert_eq!(norm("<p>Hello <b>World</b></p>"), "Hello **World**");
    }

    #[test]
    fn test_adjacent_emphasis_never_dangles() {
        let text = norm("<p><em>x</em><em>y</em></p>");
        assert_eq!(text, "*x* *y*");
        assert_eq!(text.matches('*').count() % 2, 0);
    }

    #[test]
    fn test_unbalanced_emphasis_close_is_ignored() {
        assert_eq!(norm("<p>a</em> b</p>"), "a b");
        assert_eq!(norm("<p><i>a</i></i>b</p>"), "*a* b");
    }

    #[test]
    fn test_bold_markers_on_open_and_close() {
        assert_eq!(norm("<p><strong>A</strong> and <b>B</b></p>"), "**A** and **B**");
        // A stray close still emits a marker.
        assert_eq!(norm("<p>x</b></p>"), "x**");
    }

    #[test]
    fn test_block_breaks_collapse() {
        let xhtml = "<body><h1>Title</h1><div><p>One</p><p>Two<br/>Three</p></div>\
                     <ul><li>a</li><li>b</li></ul></body>";
        assert_eq!(norm(xhtml), "Title\nOne\nTwo\nThree\na\nb");
        assert!(!norm(xhtml).contains("\n\n"));
    }

    #[test]
    fn test_excluded_subtrees() {
        let xhtml = r#"<html><head><title>Skip me</title><style>p { color: red }</style></head>
<body><script>var x = 1;</script><p>Keep<script><script>nested</script>still</script> this</p>
<metadata>meta</metadata></body></html>"#;
        assert_eq!(norm(xhtml), "Keep this");
    }

    #[test]
    fn test_entities_and_nbsp_do_not_split_words() {
        assert_eq!(norm("<p>caf&eacute; cr&#232;me&nbsp;br&#xFB;l&eacute;e</p>"), "café crème brûlée");
        assert_eq!(norm("<p>AT&amp;T</p>"), "AT&T");
        assert_eq!(norm("<p>soft\u{ad}hyphen</p>"), "softhyphen");
    }

    #[test]
    fn test_whitespace_collapses_and_inline_joins() {
        let xhtml = "<p>  Several\n   spaces\there</p><p><span>glued</span><span>words</span></p>";
        assert_eq!(norm(xhtml), "Several spaces here\nglued words");
    }

    #[test]
    fn test_cdata_is_text() {
        assert_eq!(norm("<p><![CDATA[a < b]]></p>"), "a < b");
    }

    #[test]
    fn test_malformed_yields_prefix() {
        assert_eq!(norm("<p>first</p><p>second<p <<<"), "first\nsecond");
    }

    #[test]
    fn test_bom_and_declaration() {
        let xhtml = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
                     <!DOCTYPE html>\n<html><body><p>Body</p></body></html>";
        assert_eq!(norm(xhtml), "Body");
    }

    #[test]
    fn test_idempotent() {
        let xhtml = "<html><body><h2>Ch</h2><p>One <em>two</em> <b>three</b></p></body></html>";
        assert_eq!(norm(xhtml), norm(xhtml));
    }

    #[test]
    fn test_invalid_utf8_fails_with_href() {
        let err = normalize_xhtml(b"<p>\xff\xfe</p>", "OEBPS/bad.xhtml").unwrap_err();
        assert_eq!(
            err,
            ShelfError::ChapterNotUtf8 {
                href: "OEBPS/bad.xhtml".into()
            }
        );
    }

    #[test]
    fn test_html_named_entities() {
        assert_eq!(
            norm("<p>Espa&ntilde;ol, caf&eacute; &aacute; &euro;5 &hearts;</p>"),
            "Español, café á €5 \u{2665}"
        );
        assert_eq!(norm("<p>&bogus;</p>"), "&bogus;");
    }

    #[test]
    fn test_utf16_chapter_is_decoded() {
        let doc = "<?xml version=\"1.0\" encoding=\"UTF-16\"?><html><body><p>Hi <em>there</em></p></body></html>";
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(doc.encode_utf16().flat_map(u16::to_le_bytes));
        assert_eq!(normalize_xhtml(&bytes, "c.xhtml").unwrap(), "Hi *there*");
    }

    #[test]
    fn test_declared_latin1_chapter_is_decoded() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"iso-8859-1\"?><p>na\xefve</p>";
        assert_eq!(normalize_xhtml(bytes, "c.xhtml").unwrap(), "na\u{ef}ve");
    }

    #[test]
    fn test_empty_inline_spans() {
        // Self-closing spans carry no text and write nothing.
        assert_eq!(norm("<p>a<em/>b<b/>c</p>"), "a b c");
        // An opened and closed span still writes its marker pair.
        assert_eq!(norm("<p>a <em></em> b</p>"), "a** b");
    }

    #[test]
    fn test_driving_normalizer_directly() {
        let mut n = TextNormalizer::new();
        n.start("p");
        n.text("  lead ");
        n.start("em");
        n.end("em");
        n.text("tail");
        n.end("p");
        assert_eq!(n.finish(), "lead** tail");
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(norm(""), "");
        assert_eq!(norm("<html><head><title>t</title></head><body/></html>"), "");
    }
}

//! Package spine: the reading order over manifest items.

use quick_xml::events::Event;

use crate::xml::{attribute, decode_markup_lossy, lenient_reader, local_name};

/// A single item in the spine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpineItem {
    /// Manifest item this spine entry references
    pub idref: String,
    /// Whether this item is part of the linear reading order
    pub linear: bool,
}

/// Ordered spine entries of a package
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Spine {
    items: Vec<SpineItem>,
}

impl Spine {
    /// Create spine from a list of idrefs, all linear
    pub fn from_idrefs<I, S>(idrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: idrefs
                .into_iter()
                .map(|idref| SpineItem {
                    idref: idref.into(),
                    linear: true,
                })
                .collect(),
        }
    }

    /// Spine entries in reading order
    pub fn items(&self) -> &[SpineItem] {
        &self.items
    }

    /// Only the entries not marked `linear="no"`
    pub fn linear_items(&self) -> impl Iterator<Item = &SpineItem> {
        self.items.iter().filter(|item| item.linear)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the spine has no entries
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Parse the spine out of the package document.
///
/// `itemref` elements without an `idref` are skipped. Parsing stops at the
/// first XML error, keeping the entries read so far.
pub fn parse_spine(content: &[u8]) -> Spine {
    let content = decode_markup_lossy(content);
    let mut reader = lenient_reader(content.as_bytes());
    let mut buf = Vec::new();
    let mut spine = Spine::default();
    let mut in_spine = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "spine" {
                    in_spine = true;
                } else if in_spine && name == "itemref" {
                    let idref = attribute(&e, &reader, "idref")
                        .map(|v| v.trim().to_string())
                        .filter(|v| !v.is_empty());
                    if let Some(idref) = idref {
                        let linear = attribute(&e, &reader, "linear")
                            .is_none_or(|v| !v.trim().eq_ignore_ascii_case("no"));
                        spine.items.push(SpineItem { idref, linear });
                    }
                }
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()) == "spine" {
                    in_spine = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("[EPUB] Spine parse stopped: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    spine
}

//! Image page sequencing.
//!
//! Archive order is arbitrary, so pages are filtered to known image
//! extensions and put in natural order: case-insensitive, with digit runs
//! compared by value so `page2` comes before `page10`.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;

/// Extensions accepted as comic pages (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

/// Whether `path` has one of the [`IMAGE_EXTENSIONS`].
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Keep image paths and sort them in natural order.
///
/// An empty result means no candidate was an image.
pub fn sequence_images<I, P>(candidates: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut images: Vec<PathBuf> = candidates
        .into_iter()
        .map(Into::into)
        .filter(|p| is_image_file(p))
        .collect();
    images.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
    images
}

/// Natural-order string comparison.
///
/// Digit runs compare by numeric value, everything else by lowercase
/// character. Strings that tie (`page01` vs `page1`, `A` vs `a`) fall back
/// to a lowercase then a raw comparison so the order is total.
///
/// Characters compare by code point after Unicode lowercasing, not by a
/// locale collation: accented letters sort after every unaccented one
/// (`écran` after `zebra`). Page names are almost always ASCII, so no
/// collation tables are carried.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        let (l, r) = match (left.peek(), right.peek()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&l), Some(&r)) => (l, r),
        };

        let ord = if l.is_ascii_digit() && r.is_ascii_digit() {
            let lnum = take_digits(&mut left);
            let rnum = take_digits(&mut right);
            cmp_digit_runs(&lnum, &rnum)
        } else {
            left.next();
            right.next();
            l.to_lowercase().cmp(r.to_lowercase())
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

/// Compare two ASCII digit runs by value without parsing (no overflow).
fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

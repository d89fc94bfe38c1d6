//! Archive-path arithmetic for hrefs found inside EPUB documents.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

/// Directory part of an archive path (`""` at the root).
pub(crate) fn dir_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Split `path#fragment`.
pub(crate) fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    }
}

/// Collapse `.`, `..` and empty segments.
pub(crate) fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

/// Join an href onto a base directory.
///
/// A leading `/` makes the href archive-root-relative; otherwise it is
/// joined as `dir + "/" + href`. The result is normalized.
pub(crate) fn join_href(base_dir: &str, href: &str) -> String {
    if let Some(rooted) = href.strip_prefix('/') {
        return normalize_path(rooted);
    }
    if base_dir.is_empty() {
        normalize_path(href)
    } else {
        normalize_path(&format!("{}/{}", base_dir, href))
    }
}

/// Resolve an href found in the document at `current_file`, keeping any
/// fragment.
///
/// Returns `None` for fragment-only references, empty hrefs and external
/// URLs.
pub(crate) fn resolve_href(current_file: &str, href: &str) -> Option<String> {
    let href = href.trim();
    let (path, fragment) = split_fragment(href);
    if path.is_empty() || path.contains("://") || path.starts_with("mailto:") {
        return None;
    }
    let resolved = join_href(dir_of(current_file), path);
    if resolved.is_empty() {
        return None;
    }
    Some(match fragment {
        Some(fragment) if !fragment.is_empty() => format!("{}#{}", resolved, fragment),
        _ => resolved,
    })
}

/// Percent-decode an href path (`%20` and friends), lossily for invalid UTF-8.
pub(crate) fn percent_decode(path: &str) -> Cow<'_, str> {
    if !path.contains('%') {
        return Cow::Borrowed(path);
    }
    percent_decode_str(path).decode_utf8_lossy()
}

/// File name without directory or final extension.
pub(crate) fn file_stem(path: &str) -> &str {
    let (path, _) = split_fragment(path);
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

//! Scratch directories for extracted archive content.
//!
//! Each source path maps to one directory under the temp root, named from a
//! SHA-1 of the canonicalized path. Re-opening a file reuses the directory
//! and re-populates it. Directories are never removed here.
//!
//! Two concurrent opens of the same path write into the same directory
//! without coordination. The worst outcome is a transient missing file
//! while the second extraction rewrites it.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::ShelfError;

/// What a scratch directory holds; part of its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScratchKind {
    /// Pages extracted from a CBZ or CBR.
    Comic,
    /// Resources pulled out of an EPUB (cover image).
    Epub,
}

impl ScratchKind {
    fn prefix(self) -> &'static str {
        match self {
            ScratchKind::Comic => "comic",
            ScratchKind::Epub => "epub",
        }
    }
}

/// Deterministic scratch directory for `source`.
///
/// `root` overrides the platform temp directory. The directory is not
/// created.
pub fn scratch_dir_for(source: &Path, kind: ScratchKind, root: Option<&Path>) -> PathBuf {
    let canonical = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
    let digest = sha1_smol::Sha1::from(canonical.to_string_lossy().as_bytes()).hexdigest();
    let base = root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
    base.join(format!("mu_shelf_{}_{}", kind.prefix(), digest))
}

/// Resolve and create the scratch directory for `source`.
pub fn prepare_scratch_dir(
    source: &Path,
    kind: ScratchKind,
    root: Option<&Path>,
) -> Result<PathBuf, ShelfError> {
    let dir = scratch_dir_for(source, kind, root);
    fs::create_dir_all(&dir).map_err(|e| {
        ShelfError::Io(format!(
            "cannot create scratch directory {}: {}",
            dir.display(),
            e
        ))
    })?;
    log::debug!("[SCRATCH] Using {}", dir.display());
    Ok(dir)
}

/// Keep only normal components of an archive entry name.
///
/// Parent references, roots and drive prefixes are dropped so an entry can
/// never land outside the scratch directory. Returns `None` when nothing
/// usable is left.
pub fn sanitize_entry_path(name: &str) -> Option<PathBuf> {
    let mut sanitized = PathBuf::new();
    for part in name.split(['/', '\\']) {
        for component in Path::new(part).components() {
            if let Component::Normal(segment) = component {
                sanitized.push(segment);
            }
        }
    }
    if sanitized.as_os_str().is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

//! Relocation of a relative path subtree between two roots.
//!
//! Used to move built artifacts from a parent package's destination tree
//! into a sub-package's tree. A destination that does not exist is a
//! plain rename; two directories merge recursively; anything else is an
//! overlap between packages claiming the same installed path, which must
//! fail rather than silently lose files.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Relocate `rel` from under `src_root` to the same relative location
/// under `dest_root`.
pub fn submove(rel: &Path, dest_root: &Path, src_root: &Path) -> Result<()> {
    if rel.is_absolute() {
        bail!("path '{}' must not be absolute", rel.display());
    }

    let fsrc = src_root.join(rel);
    let fdest = dest_root.join(rel);

    if let Some(parent) = fdest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating destination directory '{}'", parent.display()))?;
    }

    if fdest.symlink_metadata().is_err() {
        fs::rename(&fsrc, &fdest).with_context(|| {
            format!("moving '{}' -> '{}'", fsrc.display(), fdest.display())
        })?;
        return Ok(());
    }

    if fsrc.is_dir() && fdest.is_dir() {
        // merge the directories child by child
        let mut names = Vec::new();
        for entry in fs::read_dir(&fsrc)
            .with_context(|| format!("reading source directory '{}'", fsrc.display()))?
        {
            let entry = entry
                .with_context(|| format!("iterating source directory '{}'", fsrc.display()))?;
            names.push(entry.file_name());
        }
        names.sort();
        for name in names {
            submove(Path::new(&name), &fdest, &fsrc)?;
        }
        fs::remove_dir(&fsrc).with_context(|| {
            format!("removing emptied source directory '{}'", fsrc.display())
        })?;
        return Ok(());
    }

    bail!("'{}' and '{}' overlap", fsrc.display(), fdest.display());
}

//! Installation helpers available to phase functions.
//!
//! Everything below writes into the package's destination tree. Paths
//! are always relative; an absolute path is a template authoring bug
//! and fails immediately rather than escaping the managed destdir.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

use crate::glob;
use crate::template::{PackageUnit, Template};

impl Template {
    fn check_relative(&self, path: &str) -> Result<()> {
        if Path::new(path).is_absolute() {
            return Err(self.fail(&format!("path '{}' must not be absolute", path)));
        }
        Ok(())
    }

    /// Create one or more directories under the destdir.
    pub fn install_dir<S: AsRef<str>>(&self, dirs: &[S]) -> Result<()> {
        for dn in dirs {
            let dn = dn.as_ref();
            self.check_relative(dn)?;
            let dirp = self.paths.destdir.join(dn);
            self.log(&format!("creating path: {}", dirp.display()));
            fs::create_dir_all(&dirp)
                .with_context(|| format!("creating directory '{}'", dirp.display()))?;
        }
        Ok(())
    }

    /// Copy named files from the working source into `usr/bin` (0755).
    pub fn install_bin<S: AsRef<str>>(&self, bins: &[S]) -> Result<()> {
        self.install_dir(&["usr/bin"])?;
        let dpath = self.paths.destdir.join("usr/bin");
        for bn in bins {
            let bn = bn.as_ref();
            self.check_relative(bn)?;
            let spath = self.paths.abs_wrksrc.join(bn);
            self.log(&format!(
                "copying (755): {} -> {}",
                spath.display(),
                dpath.display()
            ));
            let fname = spath
                .file_name()
                .ok_or_else(|| self.fail(&format!("invalid file name '{}'", bn)))?;
            let target = dpath.join(fname);
            fs::copy(&spath, &target).with_context(|| {
                format!("copying '{}' -> '{}'", spath.display(), target.display())
            })?;
            fs::set_permissions(&target, fs::Permissions::from_mode(0o755))
                .with_context(|| format!("setting mode on '{}'", target.display()))?;
        }
        Ok(())
    }

    /// Copy manual pages into the section directory named by each file's
    /// numeric extension (`foo.1` lands in `usr/share/man/man1`, 0644).
    pub fn install_man<S: AsRef<str>>(&self, pages: &[S]) -> Result<()> {
        self.install_dir(&["usr/share/man"])?;
        let manbase = self.paths.destdir.join("usr/share/man");
        for mn in pages {
            let mn = mn.as_ref();
            self.check_relative(mn)?;
            let absmn = self.paths.abs_wrksrc.join(mn);
            let mnf = absmn
                .file_name()
                .and_then(|f| f.to_str())
                .map(str::to_string)
                .ok_or_else(|| self.fail(&format!("invalid file name '{}'", mn)))?;
            let Some(ext) = absmn.extension().and_then(|e| e.to_str()) else {
                return Err(self.fail(&format!("manpage '{}' has no section", mnf)));
            };
            let section: u32 = ext.parse().map_err(|_| {
                self.fail(&format!("manpage '{}' has an invalid section", mnf))
            })?;
            let mandir = manbase.join(format!("man{section}"));
            fs::create_dir_all(&mandir)
                .with_context(|| format!("creating directory '{}'", mandir.display()))?;
            self.log(&format!(
                "copying (644): {} -> {}",
                absmn.display(),
                mandir.display()
            ));
            let target = mandir.join(&mnf);
            fs::copy(&absmn, &target).with_context(|| {
                format!("copying '{}' -> '{}'", absmn.display(), target.display())
            })?;
            fs::set_permissions(&target, fs::Permissions::from_mode(0o644))
                .with_context(|| format!("setting mode on '{}'", target.display()))?;
        }
        Ok(())
    }

    /// Create a symlink at a relative destination pointing at `src`.
    pub fn install_link(&self, src: &str, dest: &str) -> Result<()> {
        self.check_relative(dest)?;
        let dest = self.paths.destdir.join(dest);
        self.log(&format!("symlinking: {} -> {}", src, dest.display()));
        std::os::unix::fs::symlink(src, &dest)
            .with_context(|| format!("creating symlink '{}'", dest.display()))?;
        Ok(())
    }

    /// Recursively copy a subtree from the working source into the
    /// destdir. With `symlinks` set, links are preserved as links;
    /// otherwise their targets are copied.
    pub fn install_files(&self, path: &str, dest: &str, symlinks: bool) -> Result<()> {
        self.check_relative(dest)?;
        self.check_relative(path)?;

        let src = self.paths.abs_wrksrc.join(path);
        let base = src
            .file_name()
            .ok_or_else(|| self.fail(&format!("invalid file name '{}'", path)))?
            .to_os_string();
        let dest = self.paths.destdir.join(dest).join(base);
        copy_tree(&src, &dest, symlinks)
    }

    /// Remove a single file under the destdir (or an explicit root).
    pub fn unlink(&self, file: &str, root: Option<&Path>) -> Result<()> {
        self.check_relative(file)?;
        let remp = root.unwrap_or(&self.paths.destdir).join(file);
        self.log(&format!("removing: {}", remp.display()));
        fs::remove_file(&remp).with_context(|| format!("removing '{}'", remp.display()))?;
        Ok(())
    }

    /// Remove a directory subtree under the destdir (or an explicit
    /// root). The path must be a directory.
    pub fn rmtree(&self, path: &str, root: Option<&Path>) -> Result<()> {
        self.check_relative(path)?;
        let path = root.unwrap_or(&self.paths.destdir).join(path);
        if !path.is_dir() {
            return Err(self.fail(&format!("path '{}' must be a directory", path.display())));
        }
        self.log(&format!("removing: {}", path.display()));
        remove_tree(&path)
    }

    /// Lazily yield paths under the destdir (or an explicit root) whose
    /// trailing components match `pattern`, relative to that root.
    pub fn find(
        &self,
        pattern: &str,
        files: bool,
        root: Option<&Path>,
    ) -> impl Iterator<Item = PathBuf> {
        let rootp = root.unwrap_or(&self.paths.destdir).to_path_buf();
        glob::find_under(&rootp, pattern, files)
    }
}

fn copy_tree(src: &Path, dst: &Path, symlinks: bool) -> Result<()> {
    if !src.is_dir() {
        bail!("'{}' is not a directory", src.display());
    }
    fs::create_dir_all(dst)
        .with_context(|| format!("creating directory '{}'", dst.display()))?;

    for entry in
        fs::read_dir(src).with_context(|| format!("reading directory '{}'", src.display()))?
    {
        let entry = entry.with_context(|| format!("iterating '{}'", src.display()))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_symlink() && symlinks {
            let target = fs::read_link(&src_path)
                .with_context(|| format!("reading link '{}'", src_path.display()))?;
            std::os::unix::fs::symlink(&target, &dst_path)
                .with_context(|| format!("creating symlink '{}'", dst_path.display()))?;
        } else if src_path.is_dir() {
            copy_tree(&src_path, &dst_path, symlinks)?;
        } else {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!("copying '{}' -> '{}'", src_path.display(), dst_path.display())
            })?;
        }
    }
    Ok(())
}

/// Remove a subtree, retrying once after making read-only entries
/// writable (source trees often ship read-only files).
fn remove_tree(path: &Path) -> Result<()> {
    if fs::remove_dir_all(path).is_ok() {
        return Ok(());
    }
    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if let Ok(metadata) = entry.metadata() {
            let mut perms = metadata.permissions();
            let mode = perms.mode();
            perms.set_mode(mode | if metadata.is_dir() { 0o700 } else { 0o600 });
            let _ = fs::set_permissions(entry.path(), perms);
        }
    }
    fs::remove_dir_all(path).with_context(|| format!("removing '{}'", path.display()))
}

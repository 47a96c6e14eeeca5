//! Filesystem locations for a build and the per-package derived path set.
//!
//! `BuildRoots` names the host-side template tree and master build root
//! plus the fixed aliases those directories are mounted at inside the
//! chroot. `PackagePaths` is derived from the roots and the validated
//! package identity exactly once during resolution and never recomputed;
//! every path a phase touches comes from this snapshot.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BuildRoots {
    /// Host-side tree of package template directories.
    pub templates: PathBuf,
    /// Host-side isolated build root.
    pub masterdir: PathBuf,
    /// Where the template tree is mounted inside the chroot.
    pub chroot_templates: PathBuf,
    /// Where the build directory lives inside the chroot.
    pub chroot_builddir: PathBuf,
    /// Where the destination root lives inside the chroot.
    pub chroot_destdir: PathBuf,
}

impl BuildRoots {
    pub fn new(templates: impl Into<PathBuf>, masterdir: impl Into<PathBuf>) -> Self {
        Self {
            templates: templates.into(),
            masterdir: masterdir.into(),
            chroot_templates: PathBuf::from("/srcpkgs"),
            chroot_builddir: PathBuf::from("/builddir"),
            chroot_destdir: PathBuf::from("/destdir"),
        }
    }

    pub fn builddir(&self) -> PathBuf {
        self.masterdir.join("builddir")
    }

    pub fn destdir_base(&self) -> PathBuf {
        self.masterdir.join("destdir")
    }
}

/// Derived path set for one package. Fixed for the template's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagePaths {
    pub files_dir: PathBuf,
    pub chroot_files_dir: PathBuf,
    pub patches_dir: PathBuf,
    pub builddir: PathBuf,
    pub chroot_builddir: PathBuf,
    pub destdir_base: PathBuf,
    pub chroot_destdir_base: PathBuf,
    pub destdir: PathBuf,
    pub chroot_destdir: PathBuf,
    pub abs_wrksrc: PathBuf,
    pub abs_build_wrksrc: PathBuf,
    pub chroot_wrksrc: PathBuf,
    pub chroot_build_wrksrc: PathBuf,
    pub statedir: PathBuf,
    pub chroot_statedir: PathBuf,
    pub wrapperdir: PathBuf,
}

impl PackagePaths {
    pub fn derive(
        roots: &BuildRoots,
        pkgname: &str,
        version: &str,
        wrksrc: &str,
        build_wrksrc: &str,
    ) -> Self {
        let builddir = roots.builddir();
        let destdir_base = roots.destdir_base();
        let versioned = format!("{pkgname}-{version}");
        let statename = format!(".xbps-{pkgname}");

        let abs_wrksrc = builddir.join(wrksrc);
        let chroot_wrksrc = roots.chroot_builddir.join(wrksrc);
        let statedir = builddir.join(&statename);

        Self {
            files_dir: roots.templates.join(pkgname).join("files"),
            chroot_files_dir: roots.chroot_templates.join(pkgname).join("files"),
            patches_dir: roots.templates.join(pkgname).join("patches"),
            chroot_builddir: roots.chroot_builddir.clone(),
            chroot_destdir_base: roots.chroot_destdir.clone(),
            destdir: destdir_base.join(&versioned),
            chroot_destdir: roots.chroot_destdir.join(&versioned),
            abs_build_wrksrc: join_opt(&abs_wrksrc, build_wrksrc),
            chroot_build_wrksrc: join_opt(&chroot_wrksrc, build_wrksrc),
            chroot_statedir: roots.chroot_builddir.join(&statename),
            wrapperdir: statedir.join("wrappers"),
            builddir,
            destdir_base,
            abs_wrksrc,
            chroot_wrksrc,
            statedir,
        }
    }
}

fn join_opt(base: &Path, sub: &str) -> PathBuf {
    if sub.is_empty() {
        base.to_path_buf()
    } else {
        base.join(sub)
    }
}

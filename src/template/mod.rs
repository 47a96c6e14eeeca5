//! The buildable unit model: templates and their sub-packages.
//!
//! A [`Template`] is the fully-resolved root build unit for one source
//! package; [`Subpackage`]s are named partitions of its installed output
//! with their own destination trees. Both share the identity-prefixed
//! logging and failure surface of [`PackageUnit`].

pub mod install;
pub mod phases;
pub mod resolve;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Result};

use crate::context::BuildContext;
use crate::glob;
use crate::hooks::Phase;
use crate::logger::Logger;
use crate::paths::PackagePaths;
use crate::relocate;
use crate::sandbox::CommandRequest;

pub type InitFn = Box<dyn Fn(&mut Template) -> Result<()>>;
pub type PhaseFn = Rc<dyn Fn(&mut Template, &BuildContext) -> Result<()>>;
pub type SubpkgInstallFn = Rc<dyn Fn(&mut Subpackage) -> Result<()>>;
pub type SubpkgFactory = Box<dyn Fn(&mut Subpackage) -> SubpkgInstallFn>;

/// Identity, logging and failure signaling shared by every buildable unit.
pub trait PackageUnit {
    fn pkgname(&self) -> Option<&str>;
    fn pkgver(&self) -> Option<&str>;
    fn logger(&self) -> &Logger;

    /// Versioned identifier if known, else the bare name, else a generic
    /// fallback for units that failed before naming themselves.
    fn display_name(&self) -> String {
        if let Some(v) = self.pkgver() {
            v.to_string()
        } else if let Some(n) = self.pkgname() {
            n.to_string()
        } else {
            "srcpkg-builder".to_string()
        }
    }

    fn log(&self, msg: &str) {
        self.logger().out(&format!("{}: {}", self.display_name(), msg));
    }

    fn log_warn(&self, msg: &str) {
        self.logger()
            .warn(&format!("{}: {}", self.display_name(), msg));
    }

    fn log_red(&self, msg: &str) {
        self.logger()
            .out_red(&format!("{}: {}", self.display_name(), msg));
    }

    /// Emit the highlighted error line and return the failure, so the
    /// last captured line always names the failing package and reason.
    fn fail(&self, msg: &str) -> anyhow::Error {
        self.log_red(msg);
        anyhow!("{}: {}", self.display_name(), msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    Pending,
    Running,
    Complete,
}

/// The root buildable unit for one source package.
pub struct Template {
    pub pkgname: String,
    pub version: String,
    pub revision: u32,
    pub short_desc: String,
    pub homepage: String,
    pub license: String,
    /// `name-version_revision`, derived once validation passes.
    pub pkgver: String,

    pub archs: Option<String>,
    pub hostmakedepends: Vec<String>,
    pub makedepends: Vec<String>,
    pub depends: Vec<String>,
    pub maintainer: Option<String>,
    pub wrksrc: String,
    pub build_wrksrc: String,
    pub create_wrksrc: bool,
    pub patch_args: Option<Vec<String>>,
    pub configure_args: Vec<String>,
    pub make_build_args: Vec<String>,
    pub make_install_args: Vec<String>,
    pub make_build_target: String,
    pub make_install_target: String,
    pub distfiles: Vec<String>,
    pub checksum: Vec<String>,
    pub skip_extraction: Vec<String>,
    pub broken: Option<String>,
    pub repository: Option<String>,
    pub tags: Vec<String>,
    pub changelog: Option<String>,
    pub cflags: Vec<String>,
    pub cxxflags: Vec<String>,
    pub ldflags: Vec<String>,
    pub tools: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub build_style: Option<String>,
    pub source_date_epoch: Option<i64>,
    pub triplet: Option<String>,

    pub paths: PackagePaths,
    pub subpkg_list: Vec<Subpackage>,

    pub(crate) phase_funcs: BTreeMap<String, PhaseFn>,
    pub(crate) phase_state: BTreeMap<Phase, PhaseState>,
    pub(crate) logger: Logger,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("pkgname", &self.pkgname)
            .field("version", &self.version)
            .field("revision", &self.revision)
            .field("pkgver", &self.pkgver)
            .field("build_style", &self.build_style)
            .field("phase_funcs", &self.phase_funcs.keys().collect::<Vec<_>>())
            .field("phase_state", &self.phase_state)
            .finish_non_exhaustive()
    }
}

impl Template {
    pub fn new() -> Self {
        Self {
            pkgname: String::new(),
            version: String::new(),
            revision: 0,
            short_desc: String::new(),
            homepage: String::new(),
            license: String::new(),
            pkgver: String::new(),
            archs: None,
            hostmakedepends: Vec::new(),
            makedepends: Vec::new(),
            depends: Vec::new(),
            maintainer: None,
            wrksrc: String::new(),
            build_wrksrc: String::new(),
            create_wrksrc: false,
            patch_args: None,
            configure_args: Vec::new(),
            make_build_args: Vec::new(),
            make_install_args: Vec::new(),
            make_build_target: String::new(),
            make_install_target: "install".to_string(),
            distfiles: Vec::new(),
            checksum: Vec::new(),
            skip_extraction: Vec::new(),
            broken: None,
            repository: None,
            tags: Vec::new(),
            changelog: None,
            cflags: Vec::new(),
            cxxflags: Vec::new(),
            ldflags: Vec::new(),
            tools: BTreeMap::new(),
            env: BTreeMap::new(),
            build_style: None,
            source_date_epoch: None,
            triplet: None,
            paths: PackagePaths::default(),
            subpkg_list: Vec::new(),
            phase_funcs: BTreeMap::new(),
            phase_state: BTreeMap::new(),
            logger: Logger::new(),
        }
    }

    /// Install or replace the function for an exact stage name.
    pub fn set_phase_fn(&mut self, stage: &str, func: PhaseFn) {
        self.phase_funcs.insert(stage.to_string(), func);
    }

    pub fn phase_fn(&self, stage: &str) -> Option<PhaseFn> {
        self.phase_funcs.get(stage).cloned()
    }

    pub fn has_phase_fn(&self, stage: &str) -> bool {
        self.phase_funcs.contains_key(stage)
    }

    /// Run an external command inside the working source directory (or
    /// its build subdirectory when `build` is set), with the computed
    /// flag, target and tool environment merged in.
    pub fn do_cmd(
        &self,
        ctx: &BuildContext,
        cmd: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        build: bool,
    ) -> Result<()> {
        let mut cenv = env.clone();
        cenv.insert("CFLAGS".to_string(), self.cflags.join(" "));
        cenv.insert("CXXFLAGS".to_string(), self.cxxflags.join(" "));
        cenv.insert("LDFLAGS".to_string(), self.ldflags.join(" "));
        cenv.insert("XBPS_TARGET_MACHINE".to_string(), ctx.target.clone());
        cenv.insert("XBPS_MACHINE".to_string(), ctx.host.clone());
        if let Some(triplet) = &self.triplet {
            cenv.insert("XBPS_TRIPLET".to_string(), triplet.clone());
        }
        if let Some(epoch) = self.source_date_epoch {
            cenv.insert("SOURCE_DATE_EPOCH".to_string(), epoch.to_string());
        }
        for (name, value) in &self.tools {
            cenv.insert(name.clone(), value.clone());
        }
        for (name, value) in &self.env {
            cenv.insert(name.clone(), value.clone());
        }

        let request = CommandRequest {
            cwd: if build {
                self.paths.abs_build_wrksrc.clone()
            } else {
                self.paths.abs_wrksrc.clone()
            },
            chroot_cwd: if build {
                self.paths.chroot_build_wrksrc.clone()
            } else {
                self.paths.chroot_wrksrc.clone()
            },
            command: cmd.to_string(),
            args: args.to_vec(),
            env: cenv,
        };
        ctx.sandbox.enter(&request, &self.logger)
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageUnit for Template {
    fn pkgname(&self) -> Option<&str> {
        if self.pkgname.is_empty() {
            None
        } else {
            Some(&self.pkgname)
        }
    }

    fn pkgver(&self) -> Option<&str> {
        if self.pkgver.is_empty() {
            None
        } else {
            Some(&self.pkgver)
        }
    }

    fn logger(&self) -> &Logger {
        &self.logger
    }
}

/// A named partition of a template's installed output.
///
/// Shareable optional fields are snapshots copied from the parent at
/// link time, before profile flag merging; sub-packages partition
/// artifacts and carry no compiler flags of their own.
pub struct Subpackage {
    pub pkgname: String,
    pub version: String,
    pub revision: u32,
    pub pkgver: String,
    pub short_desc: String,
    pub depends: Vec<String>,
    pub repository: Option<String>,
    pub tags: Vec<String>,

    /// Own destination tree, distinct from the parent's.
    pub destdir: PathBuf,
    pub chroot_destdir: PathBuf,
    /// Shared with the parent: logs and working state land in one place.
    pub statedir: PathBuf,

    pub parent_pkgname: String,
    pub parent_destdir: PathBuf,

    pub(crate) install: Option<SubpkgInstallFn>,
    pub(crate) logger: Logger,
}

impl Subpackage {
    pub(crate) fn link(parent: &Template, name: &str) -> Self {
        let versioned = format!("{}-{}", name, parent.version);
        Self {
            pkgname: name.to_string(),
            version: parent.version.clone(),
            revision: parent.revision,
            pkgver: format!("{}-{}_{}", name, parent.version, parent.revision),
            short_desc: parent.short_desc.clone(),
            depends: parent.depends.clone(),
            repository: parent.repository.clone(),
            tags: parent.tags.clone(),
            destdir: parent.paths.destdir_base.join(&versioned),
            chroot_destdir: parent.paths.chroot_destdir_base.join(&versioned),
            statedir: parent.paths.statedir.clone(),
            parent_pkgname: parent.pkgname.clone(),
            parent_destdir: parent.paths.destdir.clone(),
            install: None,
            logger: Logger::new(),
        }
    }

    /// Claim installed paths from the parent's destination tree.
    ///
    /// Each pattern is glob-expanded against the parent destdir; matching
    /// nothing is an authoring error. Matches are relocated into this
    /// sub-package's destdir preserving their relative paths.
    pub fn take<S: AsRef<str>>(&self, patterns: &[S]) -> Result<()> {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if Path::new(pattern).is_absolute() {
                return Err(self.fail(&format!("path '{}' must not be absolute", pattern)));
            }
            let matches = glob::expand(&self.parent_destdir, pattern);
            if matches.is_empty() {
                return Err(self.fail(&format!("path '{}' did not match anything", pattern)));
            }
            for rel in matches {
                self.log(&format!(
                    "moving: {} -> {}",
                    self.parent_destdir.join(&rel).display(),
                    self.destdir.display()
                ));
                relocate::submove(&rel, &self.destdir, &self.parent_destdir)?;
            }
        }
        Ok(())
    }
}

impl PackageUnit for Subpackage {
    fn pkgname(&self) -> Option<&str> {
        if self.pkgname.is_empty() {
            None
        } else {
            Some(&self.pkgname)
        }
    }

    fn pkgver(&self) -> Option<&str> {
        if self.pkgver.is_empty() {
            None
        } else {
            Some(&self.pkgver)
        }
    }

    fn logger(&self) -> &Logger {
        &self.logger
    }
}

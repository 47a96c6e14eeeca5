//! The raw declarative module a template is resolved from.
//!
//! The data surface is an allow-listed record deserialized from TOML;
//! keys outside the schema are silently ignored so template files may
//! carry documentation-only or build-style-specific fields. The
//! non-data surface (init callable, per-phase overrides, sub-package
//! factories) is attached programmatically after loading.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::context::BuildContext;
use crate::hooks::Phase;
use crate::template::{InitFn, PhaseFn, Subpackage, SubpkgFactory, SubpkgInstallFn, Template};

#[derive(Deserialize)]
#[serde(default)]
pub struct RawModule {
    // mandatory fields
    pub pkgname: Option<String>,
    pub version: Option<String>,
    pub revision: Option<u32>,
    pub short_desc: Option<String>,
    pub homepage: Option<String>,
    pub license: Option<String>,

    // optional fields
    pub archs: Option<String>,
    pub hostmakedepends: Vec<String>,
    pub makedepends: Vec<String>,
    pub depends: Vec<String>,
    pub maintainer: Option<String>,
    pub wrksrc: Option<String>,
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
    #[serde(rename = "CFLAGS")]
    pub cflags: Vec<String>,
    #[serde(rename = "CXXFLAGS")]
    pub cxxflags: Vec<String>,
    #[serde(rename = "LDFLAGS")]
    pub ldflags: Vec<String>,
    pub tools: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub build_style: Option<String>,
    pub source_date_epoch: Option<i64>,

    // non-data surface, attached after deserialization
    #[serde(skip)]
    pub init: Option<InitFn>,
    #[serde(skip)]
    pub phase_overrides: Vec<(String, PhaseFn)>,
    #[serde(skip)]
    pub subpackages: Vec<(String, SubpkgFactory)>,
}

impl Default for RawModule {
    fn default() -> Self {
        Self {
            pkgname: None,
            version: None,
            revision: None,
            short_desc: None,
            homepage: None,
            license: None,
            archs: None,
            hostmakedepends: Vec::new(),
            makedepends: Vec::new(),
            depends: Vec::new(),
            maintainer: None,
            wrksrc: None,
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
            init: None,
            phase_overrides: Vec::new(),
            subpackages: Vec::new(),
        }
    }
}

impl RawModule {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("parsing template module")
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let input = fs::read_to_string(path)
            .with_context(|| format!("reading template module '{}'", path.display()))?;
        toml::from_str(&input)
            .with_context(|| format!("parsing template module '{}'", path.display()))
    }

    /// Attach the init callable, run after build-style injection so it
    /// can override style defaults.
    pub fn on_init(&mut self, f: impl Fn(&mut Template) -> Result<()> + 'static) {
        self.init = Some(Box::new(f));
    }

    /// Attach an explicit phase override, e.g. `"do_install"`. Overrides
    /// exist for every phase except pkg, whose work belongs to the
    /// sub-package installers.
    pub fn set_phase(
        &mut self,
        stage: &str,
        f: impl Fn(&mut Template, &BuildContext) -> Result<()> + 'static,
    ) -> Result<()> {
        let valid = stage
            .split_once('_')
            .and_then(|(step, phase)| {
                if !matches!(step, "pre" | "do" | "post") {
                    return None;
                }
                Phase::from_name(phase).filter(|p| *p != Phase::Pkg)
            })
            .is_some();
        if !valid {
            bail!("unknown phase function '{}'", stage);
        }
        self.phase_overrides.push((stage.to_string(), Rc::new(f)));
        Ok(())
    }

    /// Register a sub-package. The factory runs at link time and returns
    /// the installer invoked during the packaging pass.
    pub fn subpackage(
        &mut self,
        name: &str,
        factory: impl Fn(&mut Subpackage) -> SubpkgInstallFn + 'static,
    ) {
        self.subpackages.push((name.to_string(), Box::new(factory)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml() {
        let m = RawModule::from_toml_str(
            r#"
            pkgname = "foo"
            version = "1.2"
            revision = 1
            short_desc = "Test package"
            homepage = "https://example.org"
            license = "MIT"
            "#,
        )
        .unwrap();

        assert_eq!(m.pkgname.as_deref(), Some("foo"));
        assert_eq!(m.revision, Some(1));
        assert_eq!(m.make_install_target, "install");
        assert!(m.hostmakedepends.is_empty());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let m = RawModule::from_toml_str(
            r#"
            pkgname = "foo"
            notes = "documentation-only field"
            some_style_knob = 42
            "#,
        )
        .unwrap();
        assert_eq!(m.pkgname.as_deref(), Some("foo"));
    }

    #[test]
    fn test_flag_and_tool_fields() {
        let m = RawModule::from_toml_str(
            r#"
            pkgname = "foo"
            CFLAGS = ["-fno-plt"]
            LDFLAGS = ["-Wl,-z,now"]

            [tools]
            CC = "clang"
            "#,
        )
        .unwrap();
        assert_eq!(m.cflags, ["-fno-plt"]);
        assert_eq!(m.ldflags, ["-Wl,-z,now"]);
        assert_eq!(m.tools.get("CC").map(String::as_str), Some("clang"));
    }

    #[test]
    fn test_set_phase_validates_stage_name() {
        let mut m = RawModule::default();
        m.set_phase("do_install", |_, _| Ok(())).unwrap();
        m.set_phase("pre_check", |_, _| Ok(())).unwrap();

        assert!(m.set_phase("do_pkg", |_, _| Ok(())).is_err());
        assert!(m.set_phase("mid_build", |_, _| Ok(())).is_err());
        assert!(m.set_phase("do_deploy", |_, _| Ok(())).is_err());
        assert_eq!(m.phase_overrides.len(), 2);
    }
}

//! Turning a raw declarative module into a ready-to-build template.
//!
//! Resolution either completes fully or fails with an identity-prefixed
//! error; a partially-resolved template is never handed out. The step
//! order matters: build-style injection runs before the module's init
//! callable, which runs before explicit per-phase overrides, so each
//! later layer can override the one below it.

use std::collections::BTreeSet;
use std::fs;

use anyhow::{Context, Result};

use crate::context::BuildContext;
use crate::glob::glob_match;
use crate::module::RawModule;
use crate::paths::PackagePaths;
use crate::template::{PackageUnit, Subpackage, Template};

/// Default tool names filled in when neither the package nor the profile
/// chose one.
const DEFAULT_TOOLS: &[(&str, &str)] = &[
    ("CC", "cc"),
    ("CXX", "c++"),
    ("CPP", "cpp"),
    ("LD", "ld"),
    ("AR", "ar"),
    ("AS", "as"),
    ("RANLIB", "ranlib"),
    ("STRIP", "strip"),
    ("OBJDUMP", "objdump"),
    ("OBJCOPY", "objcopy"),
    ("NM", "nm"),
    ("READELF", "readelf"),
    ("PKG_CONFIG", "pkg-config"),
];

/// Resolve a raw module into a fully-populated template.
pub fn from_module(mut module: RawModule, ctx: &BuildContext) -> Result<Template> {
    let mut pkg = Template::new();

    // mandatory fields
    pkg.pkgname = module.pkgname.take().unwrap_or_default();
    pkg.version = module.version.take().unwrap_or_default();
    pkg.revision = module.revision.unwrap_or(0);
    pkg.short_desc = module.short_desc.take().unwrap_or_default();
    pkg.homepage = module.homepage.take().unwrap_or_default();
    pkg.license = module.license.take().unwrap_or_default();

    ensure_fields(&pkg)?;
    validate_version(&pkg)?;

    pkg.pkgver = format!("{}-{}_{}", pkg.pkgname, pkg.version, pkg.revision);

    // recognized optional fields
    pkg.archs = module.archs.take();
    pkg.hostmakedepends = module.hostmakedepends;
    pkg.makedepends = module.makedepends;
    pkg.depends = module.depends;
    pkg.maintainer = module.maintainer.take();
    pkg.wrksrc = module.wrksrc.take().unwrap_or_default();
    pkg.build_wrksrc = module.build_wrksrc;
    pkg.create_wrksrc = module.create_wrksrc;
    pkg.patch_args = module.patch_args.take();
    pkg.configure_args = module.configure_args;
    pkg.make_build_args = module.make_build_args;
    pkg.make_install_args = module.make_install_args;
    pkg.make_build_target = module.make_build_target;
    pkg.make_install_target = module.make_install_target;
    pkg.distfiles = module.distfiles;
    pkg.checksum = module.checksum;
    pkg.skip_extraction = module.skip_extraction;
    pkg.broken = module.broken.take();
    pkg.repository = module.repository.take();
    pkg.tags = module.tags;
    pkg.changelog = module.changelog.take();
    pkg.cflags = module.cflags;
    pkg.cxxflags = module.cxxflags;
    pkg.ldflags = module.ldflags;
    pkg.tools = module.tools;
    pkg.env = module.env;
    pkg.build_style = module.build_style.take();
    pkg.source_date_epoch = module.source_date_epoch;

    if pkg.wrksrc.is_empty() {
        pkg.wrksrc = format!("{}-{}", pkg.pkgname, pkg.version);
    }

    validate_arch(&pkg, &ctx.target)?;

    // build style injection, then init, then explicit overrides
    if let Some(style_name) = pkg.build_style.clone() {
        let style = match ctx.styles.lookup(&style_name) {
            Ok(style) => style,
            Err(err) => return Err(pkg.fail(&err.to_string())),
        };
        style.apply(&mut pkg)?;
    }

    if let Some(init) = module.init.take() {
        init(&mut pkg)?;
    }

    for (stage, func) in module.phase_overrides.drain(..) {
        pkg.set_phase_fn(&stage, func);
    }

    pkg.paths = PackagePaths::derive(
        &ctx.roots,
        &pkg.pkgname,
        &pkg.version,
        &pkg.wrksrc,
        &pkg.build_wrksrc,
    );

    // anything the phases shell out to can locate the state directory
    pkg.env.insert(
        "XBPS_STATEDIR".to_string(),
        pkg.paths.chroot_statedir.to_string_lossy().into_owned(),
    );

    // link sub-packages and fill in their fields
    let mut seen = BTreeSet::new();
    for (name, factory) in module.subpackages.drain(..) {
        if !seen.insert(name.clone()) {
            return Err(pkg.fail(&format!("subpackage '{}' already exists", name)));
        }
        let mut sp = Subpackage::link(&pkg, &name);
        let install = factory(&mut sp);
        sp.install = Some(install);
        pkg.subpkg_list.push(sp);
    }

    if let Some(reason) = pkg.broken.clone() {
        pkg.log_red("cannot be built, it's currently broken");
        let msg = if reason.trim().is_empty() {
            "marked as broken".to_string()
        } else {
            reason
        };
        return Err(pkg.fail(&msg));
    }

    // architecture profile: triplet plus flag defaults
    let profile = if ctx.bootstrapping {
        ctx.profiles.bootstrap()
    } else {
        match ctx.profiles.lookup(&ctx.target) {
            Ok(profile) => profile,
            Err(err) => return Err(pkg.fail(&err.to_string())),
        }
    };

    if ctx.bootstrapping {
        pkg.triplet = None;
    } else {
        match &profile.triplet {
            Some(triplet) => pkg.triplet = Some(triplet.clone()),
            None => return Err(pkg.fail("no target triplet defined")),
        }
    }

    // profile flags go in front so package flags supplement, not override
    prepend(&mut pkg.cflags, &profile.target_cflags);
    prepend(&mut pkg.cxxflags, &profile.target_cxxflags);
    prepend(&mut pkg.ldflags, &profile.target_ldflags);
    prepend(&mut pkg.cflags, &profile.cflags);
    prepend(&mut pkg.cxxflags, &profile.cxxflags);
    prepend(&mut pkg.ldflags, &profile.ldflags);

    fs::create_dir_all(&pkg.paths.statedir).with_context(|| {
        format!("creating state directory '{}'", pkg.paths.statedir.display())
    })?;
    fs::create_dir_all(&pkg.paths.wrapperdir).with_context(|| {
        format!(
            "creating wrapper directory '{}'",
            pkg.paths.wrapperdir.display()
        )
    })?;

    pkg.cflags.insert(0, "-O2".to_string());
    pkg.cxxflags.insert(0, "-O2".to_string());

    for (name, value) in DEFAULT_TOOLS {
        pkg.tools
            .entry(name.to_string())
            .or_insert_with(|| value.to_string());
    }

    Ok(pkg)
}

fn ensure_fields(pkg: &Template) -> Result<()> {
    let checks = [
        ("pkgname", pkg.pkgname.is_empty()),
        ("version", pkg.version.is_empty()),
        ("revision", pkg.revision == 0),
        ("short_desc", pkg.short_desc.is_empty()),
        ("homepage", pkg.homepage.is_empty()),
        ("license", pkg.license.is_empty()),
    ];
    for (field, missing) in checks {
        if missing {
            return Err(pkg.fail(&format!("missing field: {}", field)));
        }
    }
    Ok(())
}

fn validate_version(pkg: &Template) -> Result<()> {
    if pkg.version.contains('-') {
        return Err(pkg.fail("version contains invalid character: -"));
    }
    if pkg.version.contains('_') {
        return Err(pkg.fail("version contains invalid character: _"));
    }
    if !pkg.version.chars().any(|c| c.is_ascii_digit()) {
        return Err(pkg.fail("version must contain a digit"));
    }
    Ok(())
}

fn validate_arch(pkg: &Template, target: &str) -> Result<()> {
    let Some(archs) = &pkg.archs else {
        return Ok(());
    };
    if !arch_matches(target, archs) {
        return Err(pkg.fail(&format!("this package cannot be built for {}", target)));
    }
    Ok(())
}

/// Evaluate a space-separated arch pattern list against a build target.
///
/// Tokens are scanned in order. A matching positive pattern accepts. A
/// negative (`~`) pattern the target does NOT match also accepts, short-
/// circuiting the scan; a negative pattern the target matches neither
/// accepts nor rejects on its own. No token accepting means rejection,
/// so a matching negative always wins regardless of token order.
pub(crate) fn arch_matches(target: &str, patterns: &str) -> bool {
    for token in patterns.split_whitespace() {
        let (negated, pattern) = match token.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        if glob_match(pattern, target) {
            if !negated {
                return true;
            }
        } else if negated {
            return true;
        }
    }
    false
}

fn prepend(dst: &mut Vec<String>, src: &[String]) {
    let mut merged = src.to_vec();
    merged.append(dst);
    *dst = merged;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::BuildRoots;
    use crate::profile::ArchProfile;
    use crate::style::BuildStyle;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn test_ctx(temp: &TempDir) -> BuildContext {
        let roots = BuildRoots::new(temp.path().join("srcpkgs"), temp.path().join("masterdir"));
        let mut ctx = BuildContext::new(roots, "x86_64", "x86_64");
        ctx.profiles
            .register(
                "x86_64",
                ArchProfile {
                    triplet: Some("x86_64-unknown-linux-gnu".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        ctx
    }

    fn minimal_module() -> RawModule {
        RawModule::from_toml_str(
            r#"
            pkgname = "foo"
            version = "1.2"
            revision = 1
            short_desc = "x"
            homepage = "h"
            license = "MIT"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_minimal_module_resolves() {
        let temp = TempDir::new().unwrap();
        let ctx = test_ctx(&temp);

        let pkg = from_module(minimal_module(), &ctx).unwrap();
        assert_eq!(pkg.pkgver, "foo-1.2_1");
        assert_eq!(pkg.wrksrc, "foo-1.2");
        assert!(pkg.paths.destdir.ends_with("foo-1.2"));
        assert_eq!(pkg.triplet.as_deref(), Some("x86_64-unknown-linux-gnu"));
        assert!(pkg.paths.statedir.is_dir());
        assert!(pkg.paths.wrapperdir.is_dir());
        assert_eq!(
            pkg.env.get("XBPS_STATEDIR").map(String::as_str),
            Some("/builddir/.xbps-foo")
        );
    }

    #[test]
    fn test_missing_mandatory_field() {
        let temp = TempDir::new().unwrap();
        let ctx = test_ctx(&temp);

        let mut module = minimal_module();
        module.license = None;
        let err = from_module(module, &ctx).unwrap_err();
        assert!(err.to_string().contains("missing field: license"));

        let mut module = minimal_module();
        module.revision = Some(0);
        let err = from_module(module, &ctx).unwrap_err();
        assert!(err.to_string().contains("missing field: revision"));
    }

    #[test]
    fn test_version_validation() {
        let temp = TempDir::new().unwrap();
        let ctx = test_ctx(&temp);

        for (version, needle) in [
            ("1.2-r1", "invalid character: -"),
            ("1.2_1", "invalid character: _"),
            ("beta", "must contain a digit"),
        ] {
            let mut module = minimal_module();
            module.version = Some(version.to_string());
            let err = from_module(module, &ctx).unwrap_err();
            assert!(
                err.to_string().contains(needle),
                "version {:?}: got {}",
                version,
                err
            );
        }

        let mut module = minimal_module();
        module.version = Some("20240101".to_string());
        assert!(from_module(module, &ctx).is_ok());
    }

    #[test]
    fn test_arch_negation_wins_in_both_orders() {
        assert!(!arch_matches("x86_64-musl", "x86_64 ~x86_64-musl"));
        assert!(!arch_matches("x86_64-musl", "~x86_64-musl x86_64"));
        // the same patterns accept a plain glibc target
        assert!(arch_matches("x86_64", "x86_64 ~x86_64-musl"));
        assert!(arch_matches("x86_64", "~x86_64-musl x86_64"));
    }

    #[test]
    fn test_arch_globs() {
        assert!(arch_matches("aarch64-musl", "*-musl"));
        assert!(!arch_matches("aarch64", "*-musl"));
        assert!(!arch_matches("aarch64", ""));
    }

    #[test]
    fn test_arch_mismatch_fails_resolution() {
        let temp = TempDir::new().unwrap();
        let ctx = test_ctx(&temp);

        let mut module = minimal_module();
        module.archs = Some("aarch64".to_string());
        let err = from_module(module, &ctx).unwrap_err();
        assert!(err.to_string().contains("cannot be built for x86_64"));
    }

    #[test]
    fn test_unknown_build_style() {
        let temp = TempDir::new().unwrap();
        let ctx = test_ctx(&temp);

        let mut module = minimal_module();
        module.build_style = Some("gnu_configure".to_string());
        let err = from_module(module, &ctx).unwrap_err();
        assert!(err.to_string().contains("unknown build style"));
    }

    struct MakeStyle;

    impl BuildStyle for MakeStyle {
        fn apply(&self, pkg: &mut Template) -> Result<()> {
            pkg.set_phase_fn("do_build", Rc::new(|_, _| Ok(())));
            pkg.make_build_args.push("V=1".to_string());
            Ok(())
        }
    }

    #[test]
    fn test_style_then_init_then_overrides() {
        let temp = TempDir::new().unwrap();
        let mut ctx = test_ctx(&temp);
        ctx.styles.register("make", Box::new(MakeStyle)).unwrap();

        let mut module = minimal_module();
        module.build_style = Some("make".to_string());
        module.on_init(|pkg| {
            // init sees style defaults and may amend them
            assert!(pkg.has_phase_fn("do_build"));
            pkg.make_build_args.push("-s".to_string());
            Ok(())
        });
        module.set_phase("do_build", |_, _| Ok(())).unwrap();

        let pkg = from_module(module, &ctx).unwrap();
        assert_eq!(pkg.make_build_args, ["V=1", "-s"]);
        assert!(pkg.has_phase_fn("do_build"));
    }

    #[test]
    fn test_duplicate_subpackage_fails() {
        let temp = TempDir::new().unwrap();
        let ctx = test_ctx(&temp);

        let mut module = minimal_module();
        module.subpackage("foo-devel", |_| Rc::new(|_| Ok(())));
        module.subpackage("foo-devel", |_| Rc::new(|_| Ok(())));

        let err = from_module(module, &ctx).unwrap_err();
        assert!(err.to_string().contains("subpackage 'foo-devel' already exists"));
    }

    #[test]
    fn test_subpackage_linking() {
        let temp = TempDir::new().unwrap();
        let ctx = test_ctx(&temp);

        let mut module = minimal_module();
        module.depends = vec!["libbar".to_string()];
        module.subpackage("foo-devel", |sp| {
            sp.short_desc = "x - development files".to_string();
            Rc::new(|_| Ok(()))
        });
        module.subpackage("foo-doc", |_| Rc::new(|_| Ok(())));

        let pkg = from_module(module, &ctx).unwrap();
        assert_eq!(pkg.subpkg_list.len(), 2);

        let devel = &pkg.subpkg_list[0];
        assert_eq!(devel.pkgver, "foo-devel-1.2_1");
        assert_eq!(devel.short_desc, "x - development files");
        assert_eq!(devel.depends, ["libbar"]);
        assert!(devel.destdir.ends_with("foo-devel-1.2"));
        assert_eq!(devel.statedir, pkg.paths.statedir);
        assert_eq!(devel.parent_destdir, pkg.paths.destdir);

        // short_desc defaults to the parent's
        assert_eq!(pkg.subpkg_list[1].short_desc, "x");
    }

    #[test]
    fn test_broken_package() {
        let temp = TempDir::new().unwrap();
        let ctx = test_ctx(&temp);

        let mut module = minimal_module();
        module.broken = Some("fails to link against musl".to_string());
        let err = from_module(module, &ctx).unwrap_err();
        assert!(err.to_string().contains("fails to link against musl"));

        let mut module = minimal_module();
        module.broken = Some(String::new());
        let err = from_module(module, &ctx).unwrap_err();
        assert!(err.to_string().contains("marked as broken"));
    }

    #[test]
    fn test_missing_profile_and_triplet() {
        let temp = TempDir::new().unwrap();
        let roots = BuildRoots::new(temp.path().join("srcpkgs"), temp.path().join("masterdir"));
        let ctx = BuildContext::new(roots, "riscv64", "x86_64");

        let err = from_module(minimal_module(), &ctx).unwrap_err();
        assert!(err.to_string().contains("unknown build profile"));

        let temp = TempDir::new().unwrap();
        let roots = BuildRoots::new(temp.path().join("srcpkgs"), temp.path().join("masterdir"));
        let mut ctx = BuildContext::new(roots, "riscv64", "x86_64");
        ctx.profiles
            .register("riscv64", ArchProfile::default())
            .unwrap();
        let err = from_module(minimal_module(), &ctx).unwrap_err();
        assert!(err.to_string().contains("no target triplet defined"));
    }

    #[test]
    fn test_bootstrap_skips_triplet() {
        let temp = TempDir::new().unwrap();
        let mut ctx = test_ctx(&temp);
        ctx.bootstrapping = true;

        let pkg = from_module(minimal_module(), &ctx).unwrap();
        assert!(pkg.triplet.is_none());
    }

    #[test]
    fn test_flag_merge_order() {
        let temp = TempDir::new().unwrap();
        let roots = BuildRoots::new(temp.path().join("srcpkgs"), temp.path().join("masterdir"));
        let mut ctx = BuildContext::new(roots, "x86_64", "x86_64");
        ctx.profiles
            .register(
                "x86_64",
                ArchProfile {
                    triplet: Some("x86_64-unknown-linux-gnu".into()),
                    target_cflags: vec!["-mtune=generic".into()],
                    cflags: vec!["-pipe".into()],
                    target_ldflags: vec!["-Wl,--as-needed".into()],
                    ..Default::default()
                },
            )
            .unwrap();

        let mut module = minimal_module();
        module.cflags = vec!["-fno-plt".to_string()];
        module.ldflags = vec!["-Wl,-z,now".to_string()];

        let pkg = from_module(module, &ctx).unwrap();
        assert_eq!(pkg.cflags, ["-O2", "-pipe", "-mtune=generic", "-fno-plt"]);
        assert_eq!(pkg.cxxflags, ["-O2"]);
        assert_eq!(pkg.ldflags, ["-Wl,--as-needed", "-Wl,-z,now"]);
    }

    #[test]
    fn test_default_tools_respect_overrides() {
        let temp = TempDir::new().unwrap();
        let ctx = test_ctx(&temp);

        let mut module = minimal_module();
        module.tools.insert("CC".to_string(), "clang".to_string());

        let pkg = from_module(module, &ctx).unwrap();
        assert_eq!(pkg.tools.get("CC").map(String::as_str), Some("clang"));
        assert_eq!(pkg.tools.get("CXX").map(String::as_str), Some("c++"));
        assert_eq!(pkg.tools.get("RANLIB").map(String::as_str), Some("ranlib"));
        assert_eq!(
            pkg.tools.get("PKG_CONFIG").map(String::as_str),
            Some("pkg-config")
        );
        assert_eq!(pkg.tools.len(), 13);
    }

    #[test]
    fn test_resolution_is_reproducible() {
        let temp = TempDir::new().unwrap();
        let ctx = test_ctx(&temp);

        let a = from_module(minimal_module(), &ctx).unwrap();
        let b = from_module(minimal_module(), &ctx).unwrap();
        assert_eq!(a.paths, b.paths);
        assert_eq!(a.tools, b.tools);
        assert_eq!(a.cflags, b.cflags);
    }
}

//! Architecture profiles: per-target toolchain defaults.
//!
//! A profile supplies the target triplet and default compiler/linker flag
//! sequences, both target-prefixed and host-level. Profiles are registered
//! per build target; a dedicated bootstrap profile (no triplet) is used
//! while bootstrapping.

use std::collections::BTreeMap;

use anyhow::{bail, Result};

#[derive(Debug, Clone, Default)]
pub struct ArchProfile {
    pub triplet: Option<String>,
    pub target_cflags: Vec<String>,
    pub target_cxxflags: Vec<String>,
    pub target_ldflags: Vec<String>,
    pub cflags: Vec<String>,
    pub cxxflags: Vec<String>,
    pub ldflags: Vec<String>,
}

pub struct ProfileRegistry {
    profiles: BTreeMap<String, ArchProfile>,
    bootstrap: ArchProfile,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self {
            profiles: BTreeMap::new(),
            bootstrap: ArchProfile::default(),
        }
    }

    pub fn register(&mut self, target: &str, profile: ArchProfile) -> Result<()> {
        if self.profiles.contains_key(target) {
            bail!("build profile '{}' is already registered", target);
        }
        self.profiles.insert(target.to_string(), profile);
        Ok(())
    }

    pub fn set_bootstrap(&mut self, profile: ArchProfile) {
        self.bootstrap = profile;
    }

    pub fn lookup(&self, target: &str) -> Result<&ArchProfile> {
        match self.profiles.get(target) {
            Some(profile) => Ok(profile),
            None => bail!("unknown build profile '{}'", target),
        }
    }

    pub fn bootstrap(&self) -> &ArchProfile {
        &self.bootstrap
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_unknown_profile() {
        let registry = ProfileRegistry::new();
        let err = registry.lookup("riscv64-musl").unwrap_err();
        assert!(err.to_string().contains("unknown build profile"));
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ProfileRegistry::new();
        registry
            .register(
                "x86_64",
                ArchProfile {
                    triplet: Some("x86_64-unknown-linux-gnu".into()),
                    target_cflags: vec!["-fstack-protector-strong".into()],
                    ..Default::default()
                },
            )
            .unwrap();

        let profile = registry.lookup("x86_64").unwrap();
        assert_eq!(
            profile.triplet.as_deref(),
            Some("x86_64-unknown-linux-gnu")
        );

        let err = registry
            .register("x86_64", ArchProfile::default())
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_bootstrap_profile_has_no_triplet_by_default() {
        let registry = ProfileRegistry::new();
        assert!(registry.bootstrap().triplet.is_none());
    }
}

//! Build-style plugins resolved by name.
//!
//! A build style injects standard phase implementations and default
//! arguments into an in-progress template (for example a
//! configure/make/install convention). Styles are registered under a name
//! at startup and looked up during template resolution; looking up a name
//! nobody registered is a structured error, not a missing-module panic.

use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::template::Template;

pub trait BuildStyle {
    /// Mutate the template in place: set phase functions, default args.
    fn apply(&self, pkg: &mut Template) -> Result<()>;
}

impl std::fmt::Debug for dyn BuildStyle + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BuildStyle")
    }
}

#[derive(Default)]
pub struct StyleRegistry {
    styles: BTreeMap<String, Box<dyn BuildStyle>>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, style: Box<dyn BuildStyle>) -> Result<()> {
        if self.styles.contains_key(name) {
            bail!("build style '{}' is already registered", name);
        }
        self.styles.insert(name.to_string(), style);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn BuildStyle> {
        match self.styles.get(name) {
            Some(style) => Ok(style.as_ref()),
            None => bail!("unknown build style '{}'", name),
        }
    }
}

//! Build phases, stage identifiers and the process-wide hook registry.
//!
//! A phase is one of fetch/extract/patch/configure/build/check/install/pkg;
//! each runs as a pre/do/post triad. Hooks attach to exact stage names
//! (`"pre_fetch"` through `"post_pkg"`); the check phase carries no hooks.
//! The registry is populated once at startup, sealed, and read-only for
//! the rest of the process.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{bail, Result};

use crate::context::BuildContext;
use crate::template::Template;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Fetch,
    Extract,
    Patch,
    Configure,
    Build,
    Check,
    Install,
    Pkg,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Fetch,
        Phase::Extract,
        Phase::Patch,
        Phase::Configure,
        Phase::Build,
        Phase::Check,
        Phase::Install,
        Phase::Pkg,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Fetch => "fetch",
            Phase::Extract => "extract",
            Phase::Patch => "patch",
            Phase::Configure => "configure",
            Phase::Build => "build",
            Phase::Check => "check",
            Phase::Install => "install",
            Phase::Pkg => "pkg",
        }
    }

    pub fn from_name(name: &str) -> Option<Phase> {
        Phase::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Hooks exist for every phase except check.
    pub fn hookable(self) -> bool {
        !matches!(self, Phase::Check)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Pre,
    Do,
    Post,
}

impl Step {
    pub const ALL: [Step; 3] = [Step::Pre, Step::Do, Step::Post];

    pub fn name(self) -> &'static str {
        match self {
            Step::Pre => "pre",
            Step::Do => "do",
            Step::Post => "post",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The exact stage identifier hooks and overrides are keyed by.
pub fn stage_name(step: Step, phase: Phase) -> String {
    format!("{}_{}", step.name(), phase.name())
}

pub type HookFn = Box<dyn Fn(&mut Template, &BuildContext) -> Result<()>>;

pub struct Hook {
    pub name: String,
    pub func: HookFn,
}

/// Ordered hook lists per stage identifier.
pub struct HookRegistry {
    stages: BTreeMap<String, Vec<Hook>>,
    sealed: bool,
}

impl HookRegistry {
    pub fn new() -> Self {
        let mut stages = BTreeMap::new();
        for phase in Phase::ALL {
            if !phase.hookable() {
                continue;
            }
            for step in Step::ALL {
                stages.insert(stage_name(step, phase), Vec::new());
            }
        }
        Self {
            stages,
            sealed: false,
        }
    }

    /// Register a hook under an exact stage name, in invocation order.
    pub fn register(&mut self, stage: &str, name: &str, func: HookFn) -> Result<()> {
        if self.sealed {
            bail!("hook registry is sealed; hooks are registered once at startup");
        }
        let Some(list) = self.stages.get_mut(stage) else {
            bail!("unknown build stage '{}'", stage);
        };
        list.push(Hook {
            name: name.to_string(),
            func,
        });
        Ok(())
    }

    /// Freeze the registry. Further registration is an error.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn for_stage(&self, stage: &str) -> &[Hook] {
        self.stages.get(stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

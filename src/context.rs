//! The build context: everything process-wide, owned and explicit.
//!
//! One context is constructed at startup and passed by reference to the
//! resolution engine and phase runner. The hook registry and job count
//! are populated once and read-only afterwards; there is no ambient
//! global state anywhere in the crate.

use std::fs::{self, File, OpenOptions};

use anyhow::{Context as _, Result};
use fs2::FileExt;

use crate::hooks::HookRegistry;
use crate::paths::BuildRoots;
use crate::profile::ProfileRegistry;
use crate::sandbox::{HostSandbox, Sandbox};
use crate::style::StyleRegistry;

const LOCK_FILENAME: &str = ".srcpkg-builder.lock";

pub struct BuildContext {
    pub roots: BuildRoots,
    /// Build target machine identifier (e.g. `x86_64-musl`).
    pub target: String,
    /// Host machine identifier.
    pub host: String,
    /// Parallel job count handed to build commands. Set once at startup.
    pub jobs: usize,
    /// Whether this process is bootstrapping the initial toolchain.
    pub bootstrapping: bool,
    pub hooks: HookRegistry,
    pub styles: StyleRegistry,
    pub profiles: ProfileRegistry,
    pub sandbox: Box<dyn Sandbox>,
    lock: Option<BuildRootLock>,
}

impl BuildContext {
    pub fn new(roots: BuildRoots, target: &str, host: &str) -> Self {
        Self {
            roots,
            target: target.to_string(),
            host: host.to_string(),
            jobs: 1,
            bootstrapping: false,
            hooks: HookRegistry::new(),
            styles: StyleRegistry::new(),
            profiles: ProfileRegistry::new(),
            sandbox: Box::new(HostSandbox),
            lock: None,
        }
    }

    /// Take exclusive ownership of the build root for the lifetime of
    /// this context. Exactly one orchestrator may drive a build root at
    /// a time; a second process fails here instead of corrupting the
    /// destdir trees.
    pub fn lock_build_root(&mut self) -> Result<()> {
        if self.lock.is_some() {
            return Ok(());
        }
        fs::create_dir_all(&self.roots.masterdir).with_context(|| {
            format!("creating build root '{}'", self.roots.masterdir.display())
        })?;
        let lock_path = self.roots.masterdir.join(LOCK_FILENAME);

        // Do not unlink "stale" lock files. Unlinking a still-locked file
        // can let a second process create a new lock file at the same path
        // and acquire a separate exclusive lock, defeating mutual exclusion.
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("creating lock file '{}'", lock_path.display()))?;

        if lock_file.try_lock_exclusive().is_err() {
            drop(lock_file);
            anyhow::bail!(
                "build root is locked by another process: {}",
                lock_path.display()
            );
        }

        self.lock = Some(BuildRootLock { _file: lock_file });
        Ok(())
    }

    pub fn holds_build_root_lock(&self) -> bool {
        self.lock.is_some()
    }
}

struct BuildRootLock {
    _file: File,
}

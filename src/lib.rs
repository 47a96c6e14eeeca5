//! Template resolution and phase execution for source package builds.
//!
//! This crate turns declarative package templates into fully-resolved
//! build plans and drives them through the fixed phase sequence
//! (fetch, extract, patch, configure, build, check, install, pkg)
//! inside an isolated build root. It provides:
//!
//! - **Template resolution** - validation, derived identifiers and paths,
//!   sub-package linking, build-style and profile merging
//! - **Phase execution** - pre/do/post stages with hooks and per-stage
//!   log capture
//! - **Installation helpers** - destdir-rooted install/remove/find
//!   operations and sub-package `take` partitioning
//! - **Explicit build context** - roots, registries, job count and the
//!   sandbox seam, with no ambient global state
//!
//! # Architecture
//!
//! ```text
//! RawModule (TOML + callables)
//!     │  from_module()           BuildContext
//!     ▼                              │
//! Template ──── run_phase() ─────────┤
//!     │             │                ├── HookRegistry (21 stages)
//!     │             │                ├── StyleRegistry (by name)
//!     │             │                ├── ProfileRegistry (per target)
//!     │             │                └── Sandbox (host or chroot)
//!     │             └── CaptureScope per invocation
//!     └── Subpackage::take() ── relocate::submove()
//! ```
//!
//! The actual build-style recipes, the chroot backend, fetch/checksum
//! services and dependency tooling are external collaborators; this
//! crate only defines the seams they plug into.

pub mod capture;
pub mod context;
pub mod glob;
pub mod hooks;
pub mod logger;
pub mod module;
pub mod paths;
pub mod preflight;
pub mod profile;
pub mod relocate;
pub mod sandbox;
pub mod state;
pub mod style;
pub mod template;

pub use context::BuildContext;
pub use hooks::{HookRegistry, Phase, Step};
pub use module::RawModule;
pub use paths::{BuildRoots, PackagePaths};
pub use profile::{ArchProfile, ProfileRegistry};
pub use sandbox::{CommandRequest, HostSandbox, Sandbox};
pub use style::{BuildStyle, StyleRegistry};
pub use template::resolve::from_module;
pub use template::{PackageUnit, Subpackage, Template};

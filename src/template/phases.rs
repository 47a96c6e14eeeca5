//! Phase execution: the pre/do/post triad with hooks and captured logs.
//!
//! Stage order within one phase is fixed: pre-hooks, the package's own
//! `pre_` function, the mandatory `do_` function, do-hooks, the `post_`
//! function, and finally the post-hooks (which the caller may defer).
//! Every invocation runs under its own capture scope so each stage and
//! each hook leaves a separate log file in the state directory.

use anyhow::Result;

use crate::capture::CaptureScope;
use crate::context::BuildContext;
use crate::hooks::Phase;
use crate::state;
use crate::template::{PackageUnit, PhaseState, Subpackage, Template};

impl Template {
    pub fn phase_state(&self, phase: Phase) -> PhaseState {
        self.phase_state
            .get(&phase)
            .copied()
            .unwrap_or(PhaseState::Pending)
    }

    /// Drive one phase through its three stages.
    ///
    /// `optional` permits a missing `do_` function; `skip_post` defers
    /// the post-hook pass to a later point in the outer workflow. Phases
    /// are not re-entrant.
    pub fn run_phase(
        &mut self,
        ctx: &BuildContext,
        phase: Phase,
        optional: bool,
        skip_post: bool,
    ) -> Result<()> {
        let name = phase.name();
        match self.phase_state(phase) {
            PhaseState::Pending => {}
            PhaseState::Running => {
                return Err(self.fail(&format!("phase '{}' is already running", name)));
            }
            PhaseState::Complete => {
                return Err(self.fail(&format!("phase '{}' already completed", name)));
            }
        }
        self.phase_state.insert(phase, PhaseState::Running);
        let started = state::now_utc()?;

        let pre = format!("pre_{name}");
        let do_ = format!("do_{name}");
        let post = format!("post_{name}");

        self.call_hooks(ctx, &pre)?;
        self.run_func(ctx, &pre)?;

        if !self.run_func(ctx, &do_)? && !optional {
            return Err(self.fail(&format!("cannot find do_{}", name)));
        }
        self.call_hooks(ctx, &do_)?;

        self.run_func(ctx, &post)?;
        if !skip_post {
            self.call_hooks(ctx, &post)?;
        }

        self.phase_state.insert(phase, PhaseState::Complete);
        state::write_phase_record(&self.paths.statedir, name, &started)?;
        Ok(())
    }

    /// Invoke every hook registered for an exact stage name, each under
    /// its own capture scope, in registration order.
    fn call_hooks(&mut self, ctx: &BuildContext, stage: &str) -> Result<()> {
        for hook in ctx.hooks.for_stage(stage) {
            self.log(&format!("running {} hook: {}...", stage, hook.name));
            let logf = self
                .paths
                .statedir
                .join(format!("{}__{}_{}.log", self.pkgname, stage, hook.name));
            let _capture = CaptureScope::redirect(&self.logger, &logf)?;
            (hook.func)(self, ctx)?;
        }
        Ok(())
    }

    /// Run the package's own function for a stage, if any. Returns
    /// whether a function existed.
    fn run_func(&mut self, ctx: &BuildContext, stage: &str) -> Result<bool> {
        let Some(func) = self.phase_fn(stage) else {
            return Ok(false);
        };
        self.log(&format!("running {}...", stage));
        let logf = self
            .paths
            .statedir
            .join(format!("{}__{}.log", self.pkgname, stage));
        let _capture = CaptureScope::redirect(&self.logger, &logf)?;
        func(self, ctx)?;
        Ok(true)
    }

    /// Run every sub-package installer, in declaration order. This is
    /// the packaging pass that partitions the installed tree.
    pub fn run_subpackage_installs(&mut self) -> Result<()> {
        for sp in &mut self.subpkg_list {
            sp.run_install()?;
        }
        Ok(())
    }
}

impl Subpackage {
    /// Run the factory-produced installer under its own capture scope.
    pub fn run_install(&mut self) -> Result<()> {
        let Some(func) = self.install.clone() else {
            return Ok(());
        };
        self.log("running pkg_install...");
        let logf = self
            .statedir
            .join(format!("{}__pkg_install.log", self.pkgname));
        let _capture = CaptureScope::redirect(&self.logger, &logf)?;
        func(self)
    }
}

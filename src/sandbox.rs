//! Command execution behind a sandbox seam.
//!
//! The orchestrator never runs build commands directly; it hands a
//! [`CommandRequest`] to whatever [`Sandbox`] the build context carries.
//! [`HostSandbox`] runs the command on the host with stdout and stderr
//! teed through the package logger; a chroot backend plugs in behind the
//! same trait and would use the chroot-side working directory instead.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};

use crate::logger::Logger;

/// One fully-described command invocation.
pub struct CommandRequest {
    /// Working directory as seen from the host.
    pub cwd: PathBuf,
    /// The same directory as seen from inside the chroot.
    pub chroot_cwd: PathBuf,
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

pub trait Sandbox {
    /// Run the command to completion, writing all of its output through
    /// `logger`. A non-zero exit is an error; no retries.
    fn enter(&self, request: &CommandRequest, logger: &Logger) -> Result<()>;
}

/// Direct host execution. Output drain threads are joined before this
/// returns, so the log file is complete when the invocation ends.
pub struct HostSandbox;

impl Sandbox for HostSandbox {
    fn enter(&self, request: &CommandRequest, logger: &Logger) -> Result<()> {
        let mut cmd = Command::new(&request.command);
        cmd.args(&request.args)
            .envs(&request.env)
            .current_dir(&request.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "failed to execute '{}'; is it installed?",
                request.command
            )
        })?;

        let stdout = child
            .stdout
            .take()
            .context("failed to capture child stdout")?;
        let stderr = child
            .stderr
            .take()
            .context("failed to capture child stderr")?;
        let out_drain = drain(stdout, logger.clone());
        let err_drain = drain(stderr, logger.clone());

        let status = child
            .wait()
            .with_context(|| format!("waiting for '{}'", request.command))?;
        let _ = out_drain.join();
        let _ = err_drain.join();

        if !status.success() {
            bail!(
                "command '{}' failed with exit code {}",
                request.command,
                status.code().unwrap_or(-1)
            );
        }
        Ok(())
    }
}

fn drain(stream: impl Read + Send + 'static, logger: Logger) -> JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines().map_while(Result::ok) {
            logger.out(&line);
        }
    })
}

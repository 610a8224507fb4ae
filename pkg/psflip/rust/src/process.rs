// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::relay::SignalTarget;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tokio::sync::watch;

/// How to launch a worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerSpec {
    pub command: Vec<String>,
    /// Appended to the supervisor's own environment.
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
}

/// The supervised child process. Exits exactly once; never restarted.
pub struct Worker {
    name: String,
    pid: u32,
    exited: watch::Receiver<Option<ExitStatus>>,
}

impl Worker {
    /// Spawn the worker with inherited stdio. A reaper task records the exit
    /// status before any waiter can observe the exit.
    pub fn spawn(spec: &WorkerSpec) -> Result<Worker> {
        let (program, args) = spec
            .command
            .split_first()
            .context("worker command is empty")?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(ref dir) = spec.working_dir {
            cmd.current_dir(dir);
        }
        set_parent_death_signal(&mut cmd);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn: {program}"))?;
        let pid = child
            .id()
            .with_context(|| format!("{program} exited before its pid was read"))?;
        let name = Path::new(program)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(program)
            .to_string();

        let (tx, rx) = watch::channel(None);
        let label = format!("{name}[{pid}]");
        tokio::spawn(async move {
            let status = match child.wait().await {
                Ok(status) => status,
                Err(e) => {
                    warn!("[{label}] failed to wait for exit: {e}");
                    abnormal_status()
                }
            };
            info!("[{label}] exited with {status}");
            tx.send_replace(Some(status));
        });

        info!("[{name}[{pid}]] spawned (pid={pid}, cmd={program})");
        Ok(Worker {
            name,
            pid,
            exited: rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The recorded exit status, `None` while the worker runs.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.exited.borrow()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_status().is_some()
    }

    /// Wait for the worker to exit. Safe to call from several tasks and after
    /// the exit happened.
    pub async fn wait(&self) -> ExitStatus {
        let mut rx = self.exited.clone();
        let status = rx.wait_for(Option::is_some).await.map(|s| *s);
        match status {
            Ok(Some(status)) => status,
            // Reaper dropped without reporting, only happens on runtime teardown.
            _ => abnormal_status(),
        }
    }

    /// Deliver `sig` unless the worker already exited.
    pub fn signal(&self, sig: Signal) {
        if self.has_exited() {
            debug!("[{self}] already exited, dropping {sig}");
            return;
        }
        let Ok(raw) = i32::try_from(self.pid) else {
            return;
        };
        if let Err(e) = signal::kill(Pid::from_raw(raw), sig) {
            warn!("[{self}] failed to send {sig}: {e}");
        }
    }

    pub fn kill(&self) {
        self.signal(Signal::SIGKILL);
    }
}

impl SignalTarget for Worker {
    fn deliver(&self, sig: Signal) {
        self.signal(sig);
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.pid)
    }
}

/// Map a process status to a shell-style exit code: the exit status for a
/// normal exit, `128 + signo` when killed by a signal, `1` otherwise.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        code
    } else if let Some(sig) = status.signal() {
        128 + sig
    } else {
        1
    }
}

/// wait(2) encoding of `exit(1)`.
fn abnormal_status() -> ExitStatus {
    ExitStatus::from_raw(1 << 8)
}

/// Ask the kernel to SIGKILL the child if the supervisor dies first.
#[cfg(target_os = "linux")]
pub(crate) fn set_parent_death_signal(cmd: &mut Command) {
    // SAFETY: the closure runs between fork and exec and only calls prctl(2),
    // which is async-signal-safe and does not allocate.
    unsafe {
        cmd.pre_exec(|| {
            nix::sys::prctl::set_pdeathsig(Signal::SIGKILL).map_err(std::io::Error::from)
        });
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_parent_death_signal(_cmd: &mut Command) {}

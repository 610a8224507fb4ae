// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Stable main process for service managers: follows whichever supervisor
//! generation the PID file currently names.

use crate::pidfile::read_pid_file;
use crate::relay::SignalTarget;
use log::{debug, info};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Delivers signals to the PID currently stored in a PID file.
pub struct PidFileTarget {
    path: PathBuf,
}

impl PidFileTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SignalTarget for PidFileTarget {
    fn deliver(&self, sig: Signal) {
        let Some(pid) = read_pid_file(&self.path) else {
            debug!("no pid in {}, dropping {sig}", self.path.display());
            return;
        };
        if let Err(e) = kill(Pid::from_raw(pid), sig) {
            debug!("failed to send {sig} to {pid}: {e}");
        }
    }
}

/// A process we may not signal still exists.
pub fn pid_alive(pid: i32) -> bool {
    matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}

/// Poll until the PID file is gone, unreadable, or names a dead process.
/// With `reap`, orphans re-parented to us are collected on every poll so
/// they do not linger as zombies.
pub async fn wait_until_gone(path: &Path, interval: Duration, reap: bool) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if reap {
            reap_orphans();
        }
        match read_pid_file(path) {
            Some(pid) if pid_alive(pid) => continue,
            Some(pid) => info!("watched pid {pid} exited"),
            None => info!("no pid in {}", path.display()),
        }
        return;
    }
}

fn reap_orphans() {
    use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(status) => debug!("reaped {status:?}"),
        }
    }
}

/// Become the reaper of orphaned descendants, so a generation started by
/// the watched supervisor is re-parented to us. Returns whether it worked.
#[cfg(target_os = "linux")]
pub fn become_subreaper() -> bool {
    match nix::sys::prctl::set_child_subreaper(true) {
        Ok(()) => true,
        Err(e) => {
            debug!("cannot become a subreaper: {e}");
            false
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn become_subreaper() -> bool {
    false
}

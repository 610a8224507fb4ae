// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::process::{Worker, exit_code};
use log::{info, warn};
use nix::sys::signal::Signal;
use tokio::time::{Duration, timeout};

/// How a worker ended up stopped by [`terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The worker had already exited; nothing was sent.
    Skipped,
    /// The worker exited within the grace period with this code.
    Graceful(i32),
    /// The grace period elapsed and the worker was SIGKILLed.
    Forced,
}

impl Termination {
    /// A forced kill is never a clean exit, whatever the kernel reports.
    pub fn floor(self, code: i32) -> i32 {
        match self {
            Termination::Forced => code.max(1),
            _ => code,
        }
    }
}

/// Send `graceful` to the worker, wait up to `grace`, then SIGKILL and wait
/// for the exit. Does nothing if the worker already exited.
pub async fn terminate(worker: &Worker, graceful: Signal, grace: Duration) -> Termination {
    if worker.has_exited() {
        return Termination::Skipped;
    }

    info!("[{worker}] sending {graceful}");
    worker.signal(graceful);
    match timeout(grace, worker.wait()).await {
        Ok(status) => Termination::Graceful(exit_code(status)),
        Err(_) => {
            warn!(
                "[{worker}] did not exit in {}, sending SIGKILL",
                humantime::format_duration(grace)
            );
            worker.kill();
            let status = worker.wait().await;
            info!("[{worker}] killed ({status})");
            Termination::Forced
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::process::tests::make_spec;

    /// A shell that ignores SIGTERM; the delay lets the trap install first.
    async fn spawn_stubborn() -> Worker {
        let worker =
            Worker::spawn(&make_spec("/bin/sh", &["-c", "trap '' TERM; exec sleep 60"])).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        worker
    }

    #[tokio::test]
    async fn test_terminate_graceful() {
        let worker = Worker::spawn(&make_spec("/bin/sleep", &["60"])).unwrap();
        let outcome = terminate(&worker, Signal::SIGTERM, Duration::from_secs(5)).await;
        assert_eq!(outcome, Termination::Graceful(143));
        assert!(worker.has_exited());
    }

    #[tokio::test]
    async fn test_terminate_custom_graceful_signal() {
        let worker = Worker::spawn(&make_spec(
            "/bin/sh",
            &["-c", "trap 'exit 0' USR1; while :; do sleep 0.05; done"],
        ))
        .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let outcome = terminate(&worker, Signal::SIGUSR1, Duration::from_secs(5)).await;
        assert_eq!(outcome, Termination::Graceful(0));
    }

    #[tokio::test]
    async fn test_terminate_sigkill_on_timeout() {
        let worker = spawn_stubborn().await;
        let outcome = terminate(&worker, Signal::SIGTERM, Duration::from_millis(300)).await;
        assert_eq!(outcome, Termination::Forced);
        assert_eq!(worker.exit_status().map(exit_code), Some(137));
    }

    #[tokio::test]
    async fn test_terminate_zero_grace_forces_and_floors() {
        let worker = spawn_stubborn().await;
        let outcome = terminate(&worker, Signal::SIGTERM, Duration::ZERO).await;
        assert_eq!(outcome, Termination::Forced);
        assert_eq!(outcome.floor(0), 1);
        assert_eq!(outcome.floor(137), 137);
    }

    #[tokio::test]
    async fn test_terminate_already_exited_is_noop() {
        let worker = Worker::spawn(&make_spec("/bin/sh", &["-c", "exit 5"])).unwrap();
        let status = worker.wait().await;

        let outcome = terminate(&worker, Signal::SIGTERM, Duration::from_secs(1)).await;
        assert_eq!(outcome, Termination::Skipped);
        assert_eq!(outcome.floor(5), 5);
        assert_eq!(worker.exit_status(), Some(status));
    }

    #[test]
    fn test_floor_only_applies_to_forced() {
        assert_eq!(Termination::Graceful(0).floor(0), 0);
        assert_eq!(Termination::Skipped.floor(0), 0);
        assert_eq!(Termination::Forced.floor(0), 1);
    }
}

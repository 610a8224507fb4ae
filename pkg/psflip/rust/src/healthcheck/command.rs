// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use super::{Healthcheck, HealthcheckError, HealthcheckResult};
use crate::config::deserialize_duration;
use crate::process::set_parent_death_signal;
use log::debug;
use serde::Deserialize;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

/// Runs `cmd` every `interval` (starting `after` plus one interval in) until
/// it exits 0.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandCheck {
    pub cmd: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub after: Duration,
    #[serde(default = "default_interval", deserialize_with = "deserialize_duration")]
    pub interval: Duration,
}

impl Healthcheck for CommandCheck {
    fn healthy(&self, cancel: CancellationToken) -> oneshot::Receiver<HealthcheckResult> {
        let (tx, rx) = oneshot::channel();
        let check = self.clone();
        tokio::spawn(async move {
            let _ = tx.send(check.run(cancel).await);
        });
        rx
    }
}

impl CommandCheck {
    async fn run(self, cancel: CancellationToken) -> HealthcheckResult {
        tokio::select! {
            _ = cancel.cancelled() => return Err(HealthcheckError::Cancelled),
            _ = tokio::time::sleep(self.after) => {}
        }

        // Held by the running probe; a tick that cannot take it is dropped.
        let in_flight = Arc::new(Mutex::new(()));
        let (results_tx, mut results) = mpsc::channel(1);
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(HealthcheckError::Cancelled),
                _ = ticker.tick() => {
                    let Ok(permit) = in_flight.clone().try_lock_owned() else {
                        debug!("healthcheck command still running, skipping tick");
                        continue;
                    };
                    tokio::spawn(probe(self.cmd.clone(), permit, results_tx.clone(), cancel.clone()));
                }
                Some(outcome) = results.recv() => match outcome {
                    Ok(status) if status.success() => return Ok(()),
                    Ok(status) => debug!("healthcheck command {:?} exited with {status}", self.cmd),
                    Err(e) => debug!("healthcheck command {:?} failed to run: {e}", self.cmd),
                },
            }
        }
    }
}

async fn probe(
    cmd: Vec<String>,
    _permit: OwnedMutexGuard<()>,
    results: mpsc::Sender<io::Result<ExitStatus>>,
    cancel: CancellationToken,
) {
    let Some((program, args)) = cmd.split_first() else {
        return;
    };
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    set_parent_death_signal(&mut command);

    let outcome = tokio::select! {
        status = command.status() => status,
        _ = cancel.cancelled() => return,
    };
    let _ = results.send(outcome).await;
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Lifecycle of a single worker: start, healthcheck, ready, run, shutdown.

use crate::config::{Config, ConfigError};
use crate::env::Generation;
use crate::healthcheck::Healthcheck;
use crate::process::{Worker, WorkerSpec, exit_code};
use crate::relay::{SignalRelay, SignalTarget};
use crate::shutdown::terminate;
use crate::state::SupervisorState;
use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use nix::sys::signal::Signal;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Exit code reported before the supervisor settled on one.
pub const EXIT_CODE_UNKNOWN: i32 = -1;

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub worker: WorkerSpec,
    /// Reserved for the upgrader, never relayed to the worker.
    pub upgrade_signal: Signal,
    /// How long the worker may take to pass its healthcheck.
    pub health_timeout: Duration,
    pub shutdown_signal: Signal,
    pub shutdown_timeout: Duration,
}

impl SupervisorOptions {
    pub fn from_config(config: &Config, generation: Generation) -> Result<Self, ConfigError> {
        Ok(Self {
            worker: config.worker_spec(generation)?,
            upgrade_signal: config.upgrade.signal,
            health_timeout: config.upgrade.timeout,
            shutdown_signal: config.shutdown.signal,
            shutdown_timeout: config.shutdown.timeout,
        })
    }
}

/// State shared between the supervisor handle and its coordination task.
struct Shared {
    state: watch::Sender<SupervisorState>,
    ready: CancellationToken,
    exited: CancellationToken,
    exit_code: OnceLock<i32>,
    worker_pid: OnceLock<u32>,
}

impl Shared {
    fn transition(&self, next: SupervisorState) {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                debug!("supervisor: {current} -> {next}");
                *current = next;
                true
            } else {
                warn!("supervisor: ignoring invalid transition {current} -> {next}");
                false
            }
        });
    }
}

pub struct Supervisor {
    options: SupervisorOptions,
    healthcheck: Arc<dyn Healthcheck>,
    shared: Arc<Shared>,
}

impl Supervisor {
    pub fn new(options: SupervisorOptions, healthcheck: Arc<dyn Healthcheck>) -> Self {
        let (state, _) = watch::channel(SupervisorState::Starting);
        Self {
            options,
            healthcheck,
            shared: Arc::new(Shared {
                state,
                ready: CancellationToken::new(),
                exited: CancellationToken::new(),
                exit_code: OnceLock::new(),
                worker_pid: OnceLock::new(),
            }),
        }
    }

    /// Launch the worker and hand it over to a background task. A launch
    /// error is returned as is and leaves the supervisor in `Starting`.
    /// Cancelling `cancel` shuts the worker down.
    pub fn start(&self, cancel: CancellationToken) -> Result<()> {
        if self.shared.worker_pid.get().is_some() {
            bail!("supervisor already started");
        }

        // Subscribe before the spawn so no signal hits the default handler.
        let relay = SignalRelay::subscribe(Some(self.options.upgrade_signal))
            .context("subscribing to signals")?;
        let worker = Arc::new(Worker::spawn(&self.options.worker)?);
        let _ = self.shared.worker_pid.set(worker.pid());
        self.shared.transition(SupervisorState::HealthChecking);

        let relay_stop = CancellationToken::new();
        let target: Arc<dyn SignalTarget> = worker.clone();
        tokio::spawn(relay.run(target, relay_stop.clone()));

        let task = Supervision {
            options: self.options.clone(),
            healthcheck: self.healthcheck.clone(),
            shared: self.shared.clone(),
            worker,
        };
        tokio::spawn(async move {
            task.run(cancel).await;
            relay_stop.cancel();
        });
        Ok(())
    }

    /// Resolves once the worker passed its healthcheck. Never resolves if it
    /// did not.
    pub async fn ready(&self) {
        self.shared.ready.cancelled().await;
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.is_cancelled()
    }

    /// Resolves once the worker is gone and the exit code is final.
    pub async fn exited(&self) {
        self.shared.exited.cancelled().await;
    }

    /// The final exit code, [`EXIT_CODE_UNKNOWN`] until [`Supervisor::exited`]
    /// resolved.
    pub fn exit_code(&self) -> i32 {
        self.shared
            .exit_code
            .get()
            .copied()
            .unwrap_or(EXIT_CODE_UNKNOWN)
    }

    pub fn state(&self) -> SupervisorState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.shared.state.subscribe()
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.shared.worker_pid.get().copied()
    }
}

/// The coordination task owning the worker after launch.
struct Supervision {
    options: SupervisorOptions,
    healthcheck: Arc<dyn Healthcheck>,
    shared: Arc<Shared>,
    worker: Arc<Worker>,
}

impl Supervision {
    async fn run(self, cancel: CancellationToken) {
        let code = match self.settle(&cancel).await {
            Some(code) => code,
            None => self.serve(&cancel).await,
        };

        self.shared.transition(SupervisorState::ShuttingDown);
        let outcome = terminate(
            &self.worker,
            self.options.shutdown_signal,
            self.options.shutdown_timeout,
        )
        .await;
        let code = outcome.floor(code);

        let _ = self.shared.exit_code.set(code);
        self.shared.transition(SupervisorState::Exited(code));
        self.shared.exited.cancel();
        info!("[{}] supervisor exiting with {code}", self.worker);
    }

    /// Race the deadline, an early exit and the healthcheck. Returns the exit
    /// code to shut down with, or `None` once the worker is healthy.
    async fn settle(&self, cancel: &CancellationToken) -> Option<i32> {
        let worker = &self.worker;
        let timeout = self.options.health_timeout;
        let check_cancel = cancel.child_token();
        let result = self.healthcheck.healthy(check_cancel.clone());

        let code = tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                warn!(
                    "[{worker}] unhealthy, did not settle after {}",
                    humantime::format_duration(timeout)
                );
                Some(1)
            }
            status = worker.wait() => {
                let code = exit_code(status);
                warn!("[{worker}] unhealthy, process exited with {code}");
                Some(code.max(1))
            }
            health = result => match health {
                Ok(Ok(())) => None,
                Ok(Err(e)) => {
                    warn!("[{worker}] unhealthy, healthcheck failed: {e}");
                    Some(1)
                }
                Err(_) => {
                    warn!("[{worker}] unhealthy, healthcheck gave no result");
                    Some(1)
                }
            },
        };
        check_cancel.cancel();
        code
    }

    /// Publish readiness and wait for cancellation or the worker's exit.
    async fn serve(&self, cancel: &CancellationToken) -> i32 {
        let worker = &self.worker;
        self.shared.transition(SupervisorState::Ready);
        self.shared.ready.cancel();
        info!("[{worker}] healthy");

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[{worker}] shutting down, supervisor cancelled");
                0
            }
            status = worker.wait() => {
                let code = exit_code(status);
                info!("[{worker}] exited with {code}, exiting");
                code
            }
        }
    }
}

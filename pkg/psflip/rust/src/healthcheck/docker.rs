// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use super::{Healthcheck, HealthcheckError, HealthcheckResult};
use crate::config::deserialize_duration;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::InspectContainerOptions;
use bollard::{API_DEFAULT_VERSION, Docker};
use log::debug;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{OnceCell, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";
const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const DOCKER_TIMEOUT_SECS: u64 = 120;

fn default_socket() -> String {
    DEFAULT_SOCKET.to_string()
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

/// Waits until the Docker container reports itself healthy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DockerCheck {
    pub container: String,
    #[serde(default = "default_socket")]
    pub socket: String,
    #[serde(default = "default_interval", deserialize_with = "deserialize_duration")]
    pub interval: Duration,
}

/// What the status source reports about a container. Either field is `None`
/// when the source does not know (no state yet, no healthcheck defined).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStatus {
    pub state: Option<String>,
    pub health: Option<String>,
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn inspect(&self, container: &str) -> Result<ContainerStatus>;
}

/// Docker Engine API over a unix socket or TCP. Connects on first use so a
/// daemon that is not up yet counts as a transient error.
pub struct DockerStatus {
    socket: String,
    docker: OnceCell<Docker>,
}

impl DockerStatus {
    pub fn new(socket: &str) -> Self {
        Self {
            socket: socket.to_string(),
            docker: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Docker> {
        self.docker
            .get_or_try_init(|| async {
                let socket = self.socket.as_str();
                if socket.starts_with("unix://") || socket.starts_with('/') {
                    Docker::connect_with_unix(socket, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)
                } else {
                    Docker::connect_with_http(socket, DOCKER_TIMEOUT_SECS, API_DEFAULT_VERSION)
                }
                .with_context(|| format!("connecting to docker at {socket}"))
            })
            .await
    }
}

#[async_trait]
impl StatusSource for DockerStatus {
    async fn inspect(&self, container: &str) -> Result<ContainerStatus> {
        let info = self
            .client()
            .await?
            .inspect_container(container, None::<InspectContainerOptions>)
            .await?;
        let state = info.state.as_ref();
        Ok(ContainerStatus {
            state: state
                .and_then(|s| s.status.as_ref())
                .map(|s| s.to_string()),
            health: state
                .and_then(|s| s.health.as_ref())
                .and_then(|h| h.status.as_ref())
                .map(|s| s.to_string()),
        })
    }
}

impl Healthcheck for DockerCheck {
    fn healthy(&self, cancel: CancellationToken) -> oneshot::Receiver<HealthcheckResult> {
        let (tx, rx) = oneshot::channel();
        let check = self.clone();
        tokio::spawn(async move {
            let source = DockerStatus::new(&check.socket);
            let _ = tx.send(poll(&source, &check.container, check.interval, cancel).await);
        });
        rx
    }
}

/// Query `source` every `interval` until the container is healthy or gone.
/// Query errors and unknown fields are retried on the next tick.
pub async fn poll<S: StatusSource + ?Sized>(
    source: &S,
    container: &str,
    interval: Duration,
    cancel: CancellationToken,
) -> HealthcheckResult {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(HealthcheckError::Cancelled),
            _ = ticker.tick() => {}
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => return Err(HealthcheckError::Cancelled),
            status = source.inspect(container) => status,
        };
        let status = match status {
            Ok(status) => status,
            Err(e) => {
                debug!("inspecting container {container}: {e:#}");
                continue;
            }
        };
        match status.state.as_deref() {
            Some(state @ ("dead" | "exited")) => {
                return Err(HealthcheckError::ContainerStopped {
                    container: container.to_string(),
                    status: state.to_string(),
                });
            }
            None => continue,
            Some(_) => {}
        }
        if status.health.as_deref() == Some("healthy") {
            return Ok(());
        }
    }
}

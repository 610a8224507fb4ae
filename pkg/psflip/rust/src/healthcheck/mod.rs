// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Strategies deciding when a freshly started worker may receive traffic.
//!
//! Every strategy answers a single question, asynchronously and exactly once:
//! [`Healthcheck::healthy`] returns a receiver that resolves with `Ok(())` when
//! the worker is healthy, or with an error when the strategy gives up or the
//! supervisor cancels the check. Exactly one strategy is configured; with
//! none, [`AliveCheck`] waits its default delay.

mod alive;
mod command;
mod docker;

pub use alive::AliveCheck;
pub use command::CommandCheck;
pub use docker::{ContainerStatus, DockerCheck, DockerStatus, StatusSource};

use crate::config::ConfigError;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub type HealthcheckResult = Result<(), HealthcheckError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HealthcheckError {
    #[error("context cancelled")]
    Cancelled,
    #[error("container {container} is {status}")]
    ContainerStopped { container: String, status: String },
}

pub trait Healthcheck: Send + Sync {
    /// Start checking. The receiver yields exactly one result; the producer
    /// never blocks on it. Cancelling `cancel` resolves it with an error.
    fn healthy(&self, cancel: CancellationToken) -> oneshot::Receiver<HealthcheckResult>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthcheckConfig {
    pub alive: Option<AliveCheck>,
    pub command: Option<CommandCheck>,
    pub docker: Option<DockerCheck>,
}

impl HealthcheckConfig {
    fn configured(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.alive.is_some() {
            names.push("alive");
        }
        if self.command.is_some() {
            names.push("command");
        }
        if self.docker.is_some() {
            names.push("docker");
        }
        names
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = self.configured();
        if names.len() > 1 {
            return Err(ConfigError::MultipleHealthchecks(names.join(", ")));
        }
        if let Some(ref c) = self.command {
            if c.cmd.is_empty() {
                return Err(ConfigError::EmptyHealthcheckCommand("command"));
            }
            if c.interval.is_zero() {
                return Err(ConfigError::ZeroInterval("command"));
            }
        }
        if let Some(ref d) = self.docker
            && d.interval.is_zero()
        {
            return Err(ConfigError::ZeroInterval("docker"));
        }
        Ok(())
    }

    /// Select the configured strategy, defaulting to [`AliveCheck`].
    pub fn build(&self) -> Result<Arc<dyn Healthcheck>, ConfigError> {
        self.validate()?;
        let hc: Arc<dyn Healthcheck> = if let Some(ref c) = self.command {
            Arc::new(c.clone())
        } else if let Some(ref d) = self.docker {
            Arc::new(d.clone())
        } else {
            Arc::new(self.alive.clone().unwrap_or_default())
        };
        Ok(hc)
    }

    /// Name of the strategy `build` selects, for logging.
    pub fn name(&self) -> &'static str {
        self.configured().first().copied().unwrap_or("alive")
    }
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use super::{Healthcheck, HealthcheckError, HealthcheckResult};
use crate::config::deserialize_duration;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

const DEFAULT_ALIVE_TIMEOUT: Duration = Duration::from_secs(5);

fn default_timeout() -> Duration {
    DEFAULT_ALIVE_TIMEOUT
}

/// Considers the worker healthy once it stayed up for `timeout`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AliveCheck {
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for AliveCheck {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_ALIVE_TIMEOUT,
        }
    }
}

impl Healthcheck for AliveCheck {
    fn healthy(&self, cancel: CancellationToken) -> oneshot::Receiver<HealthcheckResult> {
        let (tx, rx) = oneshot::channel();
        let delay = self.timeout;
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = tokio::time::sleep(delay) => Ok(()),
                _ = cancel.cancelled() => Err(HealthcheckError::Cancelled),
            };
            let _ = tx.send(result);
        });
        rx
    }
}

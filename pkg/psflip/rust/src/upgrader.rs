// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Hand-off between supervisor generations.

use crate::pidfile::write_pid_file;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::info;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Upgrader: Send + Sync {
    /// A listener for `addr`, inherited from the previous generation when the
    /// upgrader can pass sockets.
    async fn listen(&self, addr: &str) -> Result<TcpListener>;

    /// Start the next generation.
    fn upgrade(&self) -> Result<()>;

    /// Declare this generation healthy; `worker_pid` is its worker.
    fn ready(&self, worker_pid: u32) -> Result<()>;

    /// Fires once a newer generation took over, or on [`Upgrader::stop`].
    fn exit(&self) -> CancellationToken;

    fn stop(&self);
}

/// Runs a single generation: binds listeners itself and owns the PID file.
pub struct StandaloneUpgrader {
    pidfile: Option<PathBuf>,
    exit: CancellationToken,
}

impl StandaloneUpgrader {
    pub fn new(pidfile: Option<PathBuf>) -> Self {
        Self {
            pidfile,
            exit: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Upgrader for StandaloneUpgrader {
    async fn listen(&self, addr: &str) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("listening on {addr}"))
    }

    fn upgrade(&self) -> Result<()> {
        bail!("upgrades are not supported without socket passing")
    }

    fn ready(&self, worker_pid: u32) -> Result<()> {
        if self.exit.is_cancelled() {
            bail!("upgrader stopped");
        }
        if let Some(ref path) = self.pidfile {
            write_pid_file(path, std::process::id())?;
        }
        info!("generation ready (worker pid={worker_pid})");
        Ok(())
    }

    fn exit(&self) -> CancellationToken {
        self.exit.clone()
    }

    fn stop(&self) {
        self.exit.cancel();
    }
}

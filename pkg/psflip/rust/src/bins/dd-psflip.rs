// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use clap::Parser;
use dd_psflip::config::DEFAULT_CONFIG_PATH;
use dd_psflip::env::Generation;
use dd_psflip::pidfile::remove_pid_file;
use dd_psflip::{
    Config, ProxyError, StandaloneUpgrader, Supervisor, SupervisorOptions, TcpProxy, Upgrader,
};
use log::{LevelFilter, error, info};
use nix::sys::signal::Signal;
use simple_logger::SimpleLogger;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{self, SignalKind};
use tokio_util::sync::CancellationToken;

/// Zero-downtime process supervisor
///
/// Starts the configured worker, waits for it to pass its healthcheck and
/// relays signals to it until it exits or a newer generation takes over.
#[derive(Parser, Debug)]
#[command(name = "dd-psflip", version)]
struct Args {
    /// psflip configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level, overrides `quiet` from the configuration
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = SimpleLogger::new()
        .with_level(args.log_level.unwrap_or(LevelFilter::Info))
        .init()
    {
        eprintln!("failed to initialize logging: {e}");
    }

    // SAFETY: the runtime is not built yet, this is the only thread.
    let generation = unsafe { Generation::adopt() };

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")
        .and_then(|runtime| runtime.block_on(run(args, generation)));
    let code = match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(args: Args, generation: Generation) -> Result<i32> {
    let config = Config::load(&args.config).context("invalid psflip configuration")?;
    if config.quiet && args.log_level.is_none() {
        log::set_max_level(LevelFilter::Warn);
    }

    info!(
        "dd-psflip starting (version {}, generation {generation})",
        env!("CARGO_PKG_VERSION")
    );

    let healthcheck = config.healthcheck.build()?;
    info!("using {} healthcheck", config.healthcheck.name());
    let options = SupervisorOptions::from_config(&config, generation)?;
    let upgrader: Arc<dyn Upgrader> = Arc::new(StandaloneUpgrader::new(config.pidfile.clone()));

    let proxy = TcpProxy::new();
    for entry in &config.proxy {
        let listener = upgrader.listen(&entry.listen).await?;
        let serve = proxy.add(listener, entry.backend.clone());
        let listen = entry.listen.clone();
        tokio::spawn(async move {
            match serve.await {
                Ok(()) | Err(ProxyError::Closed) => {}
                Err(e) => error!("proxy {listen}: {e}"),
            }
        });
    }

    let upgrade_signal = config.upgrade.signal;
    let upgrades = unix::signal(SignalKind::from_raw(upgrade_signal as i32))
        .with_context(|| format!("subscribing to {upgrade_signal}"))?;

    let supervisor = Supervisor::new(options, healthcheck);
    let cancel = CancellationToken::new();
    supervisor
        .start(cancel.clone())
        .context("failed to start child process")?;

    tokio::spawn(handle_upgrades(
        upgrader.clone(),
        upgrade_signal,
        upgrades,
        cancel.clone(),
    ));

    let outcome = supervise(
        &supervisor,
        upgrader.as_ref(),
        &proxy,
        config.pidfile.as_deref(),
    )
    .await;

    cancel.cancel();
    supervisor.exited().await;
    upgrader.stop();
    Ok(outcome.exit_code(supervisor.exit_code()))
}

/// How supervision of this generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The worker exited, or never became healthy.
    Exited,
    /// A newer generation took over.
    Replaced,
    /// The worker is healthy but the upgrader could not record it.
    ReadyFailed,
}

impl Outcome {
    /// The process exit code given the supervisor's published code.
    fn exit_code(self, supervisor_code: i32) -> i32 {
        match self {
            Outcome::Exited | Outcome::Replaced => supervisor_code,
            Outcome::ReadyFailed => supervisor_code.max(1),
        }
    }
}

/// Wait for the worker to become ready, then until it exits or a newer
/// generation takes over.
async fn supervise(
    supervisor: &Supervisor,
    upgrader: &dyn Upgrader,
    proxy: &TcpProxy,
    pidfile: Option<&Path>,
) -> Outcome {
    tokio::select! {
        _ = supervisor.exited() => return Outcome::Exited,
        _ = supervisor.ready() => {}
    }

    if let Some(pid) = supervisor.worker_pid()
        && let Err(e) = upgrader.ready(pid)
    {
        error!("failed to signal ready: {e:#}");
        return Outcome::ReadyFailed;
    }

    let exit = upgrader.exit();
    tokio::select! {
        _ = exit.cancelled() => {
            info!("new generation took over, draining proxies");
            proxy.stop().await;
            Outcome::Replaced
        }
        _ = supervisor.exited() => {
            if let Some(path) = pidfile {
                remove_pid_file(path);
            }
            Outcome::Exited
        }
    }
}

async fn handle_upgrades(
    upgrader: Arc<dyn Upgrader>,
    sig: Signal,
    mut signals: unix::Signal,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            Some(()) = signals.recv() => {
                info!("received {sig}, upgrading");
                if let Err(e) = upgrader.upgrade() {
                    error!("error upgrading: {e:#}");
                }
            }
        }
    }
}

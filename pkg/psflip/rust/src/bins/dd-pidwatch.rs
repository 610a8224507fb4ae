// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use clap::Parser;
use dd_psflip::pidwatch::{POLL_INTERVAL, PidFileTarget, become_subreaper, wait_until_gone};
use dd_psflip::relay::SignalRelay;
use dd_psflip::{Worker, WorkerSpec, exit_code};
use log::{LevelFilter, error, info};
use simple_logger::SimpleLogger;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Start CHILD and wait until the process indicated by the pidfile exits.
#[derive(Parser, Debug)]
#[command(name = "dd-pidwatch", version)]
struct Args {
    /// Path to the pidfile
    #[arg(long)]
    pidfile: PathBuf,

    /// Suppress any output originating from dd-pidwatch
    #[arg(short, long)]
    quiet: bool,

    /// Command to start, after `--`
    #[arg(last = true, required = true, value_name = "CHILD")]
    child: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let level = if args.quiet {
        LevelFilter::Off
    } else {
        LevelFilter::Info
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("failed to initialize logging: {e}");
    }

    if let Err(e) = run(args).await {
        error!("dd-pidwatch: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let reap = become_subreaper();

    let relay = SignalRelay::subscribe(None).context("subscribing to signals")?;
    let stop = CancellationToken::new();
    tokio::spawn(relay.run(Arc::new(PidFileTarget::new(&args.pidfile)), stop.clone()));

    let spec = WorkerSpec {
        command: args.child,
        ..Default::default()
    };
    let child = Worker::spawn(&spec).context("failed to start child")?;
    let status = child.wait().await;
    info!(
        "[{child}] exited with {}, watching {}",
        exit_code(status),
        args.pidfile.display()
    );

    wait_until_gone(&args.pidfile, POLL_INTERVAL, reap).await;
    stop.cancel();
    Ok(())
}

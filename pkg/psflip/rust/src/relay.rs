// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Forwarding of process-control signals from the supervisor to its worker.

use log::debug;
use nix::sys::signal::Signal;
use std::io;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio_stream::StreamExt;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::SignalStream;
use tokio_util::sync::CancellationToken;

/// Something signals can be forwarded to. Implementations drop the signal
/// when there is nothing alive to deliver it to.
pub trait SignalTarget: Send + Sync {
    fn deliver(&self, sig: Signal);
}

/// Never relayed: child reaping, broken pipes and runtime preemption noise.
pub const IGNORED: [Signal; 3] = [Signal::SIGCHLD, Signal::SIGPIPE, Signal::SIGURG];

/// Every signal a process can catch asynchronously. Synchronous faults
/// (SIGSEGV, SIGBUS, ...) and SIGKILL/SIGSTOP are left alone.
const SUBSCRIBED: &[Signal] = &[
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGPIPE,
    Signal::SIGALRM,
    Signal::SIGTERM,
    Signal::SIGCHLD,
    Signal::SIGCONT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGURG,
    Signal::SIGXCPU,
    Signal::SIGXFSZ,
    Signal::SIGVTALRM,
    Signal::SIGPROF,
    Signal::SIGWINCH,
    Signal::SIGIO,
];

/// `reserved` is the upgrade signal, which belongs to the supervisor itself.
pub fn should_relay(sig: Signal, reserved: Option<Signal>) -> bool {
    Some(sig) != reserved && !IGNORED.contains(&sig)
}

pub struct SignalRelay {
    reserved: Option<Signal>,
    streams: StreamMap<Signal, SignalStream>,
}

impl SignalRelay {
    /// Install the signal subscriptions. Signals arriving from here on are
    /// queued until [`SignalRelay::run`] drains them.
    pub fn subscribe(reserved: Option<Signal>) -> io::Result<Self> {
        let mut streams = StreamMap::new();
        for &sig in SUBSCRIBED {
            let stream = signal(SignalKind::from_raw(sig as i32))?;
            streams.insert(sig, SignalStream::new(stream));
        }
        Ok(Self { reserved, streams })
    }

    /// Forward signals to `target` until `cancel` fires. The subscriptions are
    /// released when this returns.
    pub async fn run(mut self, target: Arc<dyn SignalTarget>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some((sig, ())) = self.streams.next() => {
                    if should_relay(sig, self.reserved) {
                        debug!("relaying {sig}");
                        target.deliver(sig);
                    } else {
                        debug!("not relaying {sig}");
                    }
                }
            }
        }
        debug!("signal relay stopped");
    }
}

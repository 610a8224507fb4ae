// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! TCP relay in front of the worker that can stop accepting without cutting
//! the connections it already relays.

use log::{debug, info};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Returned by an accept loop that ended because of [`TcpProxy::stop`].
    #[error("proxy: server closed")]
    Closed,
    #[error("proxy: accept failed: {0}")]
    Accept(#[from] io::Error),
}

#[derive(Default)]
pub struct TcpProxy {
    cancel: CancellationToken,
    tracker: TaskTracker,
    sessions: Arc<AtomicUsize>,
}

impl TcpProxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relay every connection accepted on `listener` to `destination`. The
    /// accept loop counts as running from this call on, so spawn the returned
    /// future promptly; [`TcpProxy::stop`] waits for it.
    pub fn add(
        &self,
        listener: TcpListener,
        destination: impl Into<String>,
    ) -> impl Future<Output = Result<(), ProxyError>> + Send + 'static {
        self.tracker.track_future(serve(
            listener,
            destination.into(),
            self.cancel.clone(),
            self.sessions.clone(),
        ))
    }

    /// Close every listener and wait for the accept loops to return. Sessions
    /// in flight keep running until their peers close them.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!(
            "proxy: listeners closed, {} session(s) draining",
            self.active_sessions()
        );
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

async fn serve(
    listener: TcpListener,
    destination: String,
    cancel: CancellationToken,
    sessions: Arc<AtomicUsize>,
) -> Result<(), ProxyError> {
    if let Ok(addr) = listener.local_addr() {
        info!("proxy: relaying {addr} to {destination}");
    }
    loop {
        let inbound = tokio::select! {
            _ = cancel.cancelled() => return Err(ProxyError::Closed),
            accepted = listener.accept() => accepted?.0,
        };
        let session = Session::open(sessions.clone());
        tokio::spawn(relay(inbound, destination.clone(), session));
    }
}

/// Counts one in-flight session until dropped.
struct Session(Arc<AtomicUsize>);

impl Session {
    fn open(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn relay(mut inbound: TcpStream, destination: String, _session: Session) {
    let mut outbound = match TcpStream::connect(&destination).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!("proxy: dialing {destination}: {e}");
            return;
        }
    };
    match copy_bidirectional(&mut inbound, &mut outbound).await {
        Ok((sent, received)) => {
            debug!("proxy: session to {destination} done ({sent}B out, {received}B back)")
        }
        Err(e) => debug!("proxy: session to {destination}: {e}"),
    }
}

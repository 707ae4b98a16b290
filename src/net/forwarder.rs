//! Local socket forwarding through a tunnel.
//!
//! # Responsibilities
//! - Accept local TCP sockets (bounded by the listener's permits)
//! - Open one tunnel session per socket
//! - Copy bytes both ways until either side finishes
//! - Stop accepting and close open sessions on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::duplex::{DuplexConn, Tunnel};
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::{ConnectionPermit, Listener};

/// How long open sessions get to finish after shutdown is triggered.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipes accepted local sockets through a [`Tunnel`].
pub struct Forwarder {
    tunnel: Arc<Tunnel>,
    tracker: ConnectionTracker,
}

impl Forwarder {
    pub fn new(tunnel: Tunnel) -> Self {
        Self {
            tunnel: Arc::new(tunnel),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Sessions currently being forwarded.
    pub fn active_sessions(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Accept and forward until `shutdown` fires.
    pub async fn run(&self, listener: Listener, shutdown: &Shutdown) {
        let mut stop = shutdown.subscribe();
        tracing::info!(
            transport = self.tunnel.kind().as_str(),
            "Forwarder running"
        );

        loop {
            tokio::select! {
                _ = stop.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = self.tracker.track();
                        tokio::spawn(forward(
                            Arc::clone(&self.tunnel),
                            stream,
                            peer,
                            permit,
                            guard,
                            shutdown.subscribe(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                    }
                },
            }
        }

        if !self.tracker.wait_for_drain(DRAIN_TIMEOUT).await {
            tracing::warn!(
                active = self.tracker.active_count(),
                "Sessions still open after drain timeout"
            );
        }
        tracing::info!("Forwarder stopped");
    }
}

async fn forward(
    tunnel: Arc<Tunnel>,
    mut local: TcpStream,
    peer: SocketAddr,
    _permit: ConnectionPermit,
    guard: ConnectionGuard,
    cancel: broadcast::Receiver<()>,
) {
    let id = guard.id();
    let mut remote = match tunnel.open(Some(cancel)).await {
        Ok(remote) => remote,
        Err(e) => {
            tracing::warn!(connection_id = %id, peer = %peer, error = %e, "Failed to open tunnel");
            return;
        }
    };

    tracing::debug!(connection_id = %id, peer = %peer, remote = %remote.remote_addr(), "Tunnel open");

    match tokio::io::copy_bidirectional(&mut local, &mut remote).await {
        Ok((up, down)) => {
            tracing::debug!(connection_id = %id, bytes_up = up, bytes_down = down, "Session finished");
        }
        Err(e) => {
            tracing::debug!(connection_id = %id, error = %e, "Session ended with error");
        }
    }
    remote.close();
}

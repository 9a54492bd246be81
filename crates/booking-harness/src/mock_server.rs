//! Mock peer in the server role.
//!
//! Accepts a single connection and then says nothing, so the client under
//! test has to notice the stall and give up on its own.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info};

use crate::error::{HarnessError, Result};

/// A listener bound on the service port.
///
/// The port is released when this is dropped.
#[derive(Debug)]
pub struct MockServer {
    listener: TcpListener,
}

impl MockServer {
    /// Bind and listen on `addr`. Completes before any client is launched.
    pub fn listen(addr: SocketAddr) -> Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| HarnessError::io("creating mock listener socket", e))?;

        socket
            .set_reuseaddr(true)
            .map_err(|e| HarnessError::io("setting SO_REUSEADDR", e))?;
        socket
            .bind(addr)
            .map_err(|e| HarnessError::io(format!("binding mock server to {}", addr), e))?;
        let listener = socket
            .listen(1)
            .map_err(|e| HarnessError::io(format!("listening on {}", addr), e))?;

        info!("Mock server listening on {}", addr);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| HarnessError::io("reading mock listener address", e))
    }

    /// Accept exactly one connection, failing if none arrives in time.
    pub async fn accept_within(&self, ceiling: Duration) -> Result<SilentPeer> {
        let (stream, peer) = tokio::time::timeout(ceiling, self.listener.accept())
            .await
            .map_err(|_| {
                HarnessError::assertion(format!("client never connected within {:?}", ceiling))
            })?
            .map_err(|e| HarnessError::io("accepting client connection", e))?;

        info!("Client connected from {}", peer);
        Ok(SilentPeer { stream, peer })
    }
}

/// An accepted connection the mock server never answers on.
#[derive(Debug)]
pub struct SilentPeer {
    stream: TcpStream,
    peer: SocketAddr,
}

/// How a silent hold ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldOutcome {
    /// The full duration elapsed with the client still connected.
    Elapsed,
    /// The client closed its end after the given time; the hold still ran
    /// to its deadline.
    ClientClosed(Duration),
}

impl SilentPeer {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Hold the connection open without writing for the full `duration`.
    ///
    /// Bytes the client sends are read and discarded. A client that closes
    /// or resets its end early is noted, but the hold still runs to the
    /// deadline so the client keeps the whole window to exit.
    pub async fn hold_silent(&mut self, duration: Duration) -> HoldOutcome {
        let started = tokio::time::Instant::now();
        let deadline = started + duration;
        let mut buf = [0u8; 512];

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return HoldOutcome::Elapsed,
                read = self.stream.read(&mut buf) => match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => debug!("discarding {} bytes from {}", n, self.peer),
                },
            }
        }

        let after = started.elapsed();
        info!(
            "client {} went away after {:.2}s, holding until {:.2}s",
            self.peer,
            after.as_secs_f64(),
            duration.as_secs_f64()
        );
        tokio::time::sleep_until(deadline).await;
        HoldOutcome::ClientClosed(after)
    }

    /// Close the connection.
    pub fn close(self) {
        debug!("closing connection to {}", self.peer);
        drop(self.stream);
    }
}

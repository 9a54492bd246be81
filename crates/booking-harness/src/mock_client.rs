//! Mock peer in the client role.
//!
//! Connects to the real server, sends nothing for longer than the server's
//! idle threshold, then probes whether the connection is still serviced.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use booking_wire::Response;

use crate::error::{HarnessError, Result};
use crate::verdict::Verdict;

/// A raw connection to the server that sends nothing until probed.
#[derive(Debug)]
pub struct IdleConnection {
    stream: TcpStream,
    addr: SocketAddr,
}

/// What the probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The read returned end-of-stream.
    Closed,
    /// The send or read failed with a reset or broken pipe.
    Reset(io::ErrorKind),
    /// The server answered.
    Responded(Vec<u8>),
    /// Neither data nor a close arrived before the read ceiling.
    StillOpen,
    /// Any other error.
    Unexpected(String),
}

impl ProbeOutcome {
    pub fn verdict(&self) -> Verdict {
        match self {
            Self::Closed | Self::Reset(_) => Verdict::Passed,
            Self::Responded(_) | Self::StillOpen => Verdict::Failed,
            Self::Unexpected(_) => Verdict::Indeterminate,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Closed => "server closed the idle connection".to_string(),
            Self::Reset(kind) => format!("server reset the idle connection ({:?})", kind),
            Self::Responded(bytes) => match Response::decode(bytes) {
                Some(resp) => format!(
                    "server still serviced the idle connection: {} req_id={} remaining={} {:?}",
                    resp.header.opcode,
                    resp.header.req_id,
                    resp.body.remaining_tickets,
                    resp.body.message
                ),
                None => format!(
                    "server still serviced the idle connection: {}",
                    hex_short(bytes)
                ),
            },
            Self::StillOpen => "idle connection is still open and unanswered".to_string(),
            Self::Unexpected(msg) => format!("unexpected probe error: {}", msg),
        }
    }
}

impl IdleConnection {
    /// Connect to the server, bounded by `ceiling`.
    pub async fn connect(addr: SocketAddr, ceiling: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(ceiling, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                HarnessError::assertion(format!(
                    "server at {} did not accept a connection within {:?}",
                    addr, ceiling
                ))
            })?
            .map_err(|e| {
                HarnessError::assertion(format!("could not connect to server at {}: {}", addr, e))
            })?;

        info!("Connected to server at {}", addr);
        Ok(Self { stream, addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stay silent for `duration`.
    pub async fn idle(&self, duration: Duration) {
        info!(
            "Holding connection to {} idle for {:.1}s...",
            self.addr,
            duration.as_secs_f64()
        );
        tokio::time::sleep(duration).await;
    }

    /// Send `payload` and try to read a reply. Consumes the connection,
    /// which is closed on return.
    pub async fn probe(mut self, payload: &[u8], read_ceiling: Duration) -> ProbeOutcome {
        debug!("probing {} with {} bytes", self.addr, payload.len());

        if let Err(e) = self.stream.write_all(payload).await {
            return classify(e);
        }

        let mut buf = [0u8; 256];
        match tokio::time::timeout(read_ceiling, self.stream.read(&mut buf)).await {
            Err(_) => ProbeOutcome::StillOpen,
            Ok(Ok(0)) => ProbeOutcome::Closed,
            Ok(Ok(n)) => ProbeOutcome::Responded(buf[..n].to_vec()),
            Ok(Err(e)) => classify(e),
        }
    }
}

fn classify(err: io::Error) -> ProbeOutcome {
    match err.kind() {
        kind @ (io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionAborted) => ProbeOutcome::Reset(kind),
        _ => ProbeOutcome::Unexpected(err.to_string()),
    }
}

/// Space-separated hex of an unparseable reply, cut to 16 bytes past 32.
fn hex_short(data: &[u8]) -> String {
    let shown = if data.len() > 32 { &data[..16] } else { data };
    let hex = shown
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if shown.len() < data.len() {
        format!("{} ... ({} bytes total)", hex, data.len())
    } else {
        hex
    }
}

#[cfg(test)]
mod tests {
    use booking_wire::{ServerResponse, query_request};
    use tokio::net::TcpListener;

    use super::*;

    async fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_probe_sees_orderly_close() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Drain the probe before closing so the close is a FIN, not a reset.
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await;
            drop(stream);
        });

        let conn = IdleConnection::connect(addr, Duration::from_secs(5))
            .await
            .unwrap();
        let outcome = conn
            .probe(&query_request(0), Duration::from_secs(5))
            .await;
        server.await.unwrap();

        assert_eq!(outcome, ProbeOutcome::Closed);
        assert_eq!(outcome.verdict(), Verdict::Passed);
    }

    #[tokio::test]
    async fn test_probe_sees_response() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = booking_wire::read_request(&mut stream).await.unwrap().unwrap();
            let response = Response::success(request.req_id(), ServerResponse::new(42, "ok"));
            booking_wire::write_response(&mut stream, &response).await.unwrap();
            stream
        });

        let conn = IdleConnection::connect(addr, Duration::from_secs(5))
            .await
            .unwrap();
        let outcome = conn
            .probe(&query_request(7), Duration::from_secs(5))
            .await;
        let _stream = server.await.unwrap();

        assert!(matches!(outcome, ProbeOutcome::Responded(_)));
        assert_eq!(outcome.verdict(), Verdict::Failed);
        let detail = outcome.describe();
        assert!(detail.contains("req_id=7"));
        assert!(detail.contains("remaining=42"));
    }

    #[tokio::test]
    async fn test_probe_times_out_on_silent_server() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });

        let conn = IdleConnection::connect(addr, Duration::from_secs(5))
            .await
            .unwrap();
        let outcome = conn
            .probe(&query_request(0), Duration::from_millis(200))
            .await;
        server.abort();

        assert_eq!(outcome, ProbeOutcome::StillOpen);
        assert_eq!(outcome.verdict(), Verdict::Failed);
    }

    #[tokio::test]
    async fn test_connect_refused_is_assertion_failure() {
        let (listener, addr) = listener().await;
        drop(listener);

        let err = IdleConnection::connect(addr, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::AssertionFailure(_)));
    }

    #[test]
    fn test_classification() {
        let reset = classify(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(reset.verdict(), Verdict::Passed);
        let pipe = classify(io::Error::from(io::ErrorKind::BrokenPipe));
        assert_eq!(pipe, ProbeOutcome::Reset(io::ErrorKind::BrokenPipe));
        let other = classify(io::Error::other("boom"));
        assert_eq!(other.verdict(), Verdict::Indeterminate);
    }

    #[test]
    fn test_undecodable_response_is_hex() {
        let outcome = ProbeOutcome::Responded(vec![0xde, 0xad]);
        assert!(outcome.describe().ends_with("de ad"));

        let long = ProbeOutcome::Responded(vec![0xab; 40]);
        assert!(long.describe().ends_with("ab ab ... (40 bytes total)"));
    }
}

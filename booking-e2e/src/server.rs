//! Stand-in booking server.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use booking_wire::{Request, Response, ServerResponse};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::settings::ServerSettings;

/// The shared ticket pool.
#[derive(Debug)]
pub struct TicketStore {
    remaining: Mutex<u32>,
}

impl TicketStore {
    pub fn new(tickets: u32) -> Self {
        Self {
            remaining: Mutex::new(tickets),
        }
    }

    pub fn remaining(&self) -> u32 {
        *self.remaining.lock()
    }

    /// Take `count` tickets. Returns the remaining count either way.
    pub fn book(&self, count: u32) -> Result<u32, u32> {
        let mut remaining = self.remaining.lock();
        if count == 0 || count > *remaining {
            return Err(*remaining);
        }
        *remaining -= count;
        Ok(*remaining)
    }

    pub fn handle(&self, request: &Request) -> Response {
        match request {
            Request::Query { req_id } => Response::success(
                *req_id,
                ServerResponse::new(self.remaining(), "Query successful."),
            ),
            Request::Book { req_id, body } => match self.book(body.num_tickets) {
                Ok(left) => Response::success(
                    *req_id,
                    ServerResponse::new(
                        left,
                        format!("Booking successful for user {}.", body.user_id),
                    ),
                ),
                Err(left) => Response::fail(
                    *req_id,
                    ServerResponse::new(
                        left,
                        format!(
                            "Booking failed: not enough tickets for user {}.",
                            body.user_id
                        ),
                    ),
                ),
            },
        }
    }
}

/// Bind on all interfaces and serve until terminated.
pub async fn run(settings: ServerSettings) -> io::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, settings.port));
    let listener = TcpListener::bind(addr).await?;
    serve(listener, settings).await
}

/// Serve on an already-bound listener until terminated.
pub async fn serve(listener: TcpListener, settings: ServerSettings) -> io::Result<()> {
    let store = Arc::new(TicketStore::new(settings.tickets));
    let mut terminate = Terminate::new()?;

    info!("Server listening on port {}", listener.local_addr()?.port());
    info!("Initial tickets: {}", settings.tickets);

    loop {
        tokio::select! {
            _ = terminate.recv() => {
                if settings.ignore_sigterm {
                    warn!("Ignoring termination request");
                    continue;
                }
                info!("Termination requested, shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        continue;
                    }
                };
                info!("Connection accepted from {}", peer);
                tokio::spawn(serve_connection(
                    stream,
                    peer,
                    store.clone(),
                    settings.idle_timeout,
                ));
            }
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    store: Arc<TicketStore>,
    idle_timeout: Option<Duration>,
) {
    loop {
        let next = match idle_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, booking_wire::read_request(&mut stream)).await {
                    Ok(next) => next,
                    Err(_) => {
                        info!("Evicting {} after {:?} idle", peer, limit);
                        return;
                    }
                }
            }
            None => booking_wire::read_request(&mut stream).await,
        };

        let request = match next {
            Ok(Some(request)) => request,
            Ok(None) => {
                info!("Client {} disconnected.", peer);
                return;
            }
            Err(e) => {
                warn!("Dropping {}: {}", peer, e);
                return;
            }
        };

        debug!("{} sent {:?}", peer, request);
        let response = store.handle(&request);
        if let Err(e) = booking_wire::write_response(&mut stream, &response).await {
            warn!("Failed to answer {}: {}", peer, e);
            return;
        }
    }
}

/// Graceful termination requests.
struct Terminate {
    #[cfg(unix)]
    signal: tokio::signal::unix::Signal,
}

impl Terminate {
    #[cfg(unix)]
    fn new() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            signal: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    fn new() -> io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        if self.signal.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use booking_wire::BookRequest;

    use super::*;

    fn book(req_id: u16, num_tickets: u32) -> Request {
        Request::Book {
            req_id,
            body: BookRequest {
                num_tickets,
                user_id: 7,
            },
        }
    }

    #[test]
    fn test_booking_never_oversells() {
        let store = TicketStore::new(1);
        assert_eq!(store.book(1), Ok(0));
        assert_eq!(store.book(1), Err(0));
        assert_eq!(store.book(0), Err(0));
    }

    #[test]
    fn test_handle() {
        let store = TicketStore::new(3);

        let response = store.handle(&book(1, 2));
        assert!(response.is_success());
        assert_eq!(response.header.req_id, 1);
        assert_eq!(response.body.remaining_tickets, 1);
        assert_eq!(response.body.message, "Booking successful for user 7.");

        let response = store.handle(&book(2, 2));
        assert!(!response.is_success());
        assert_eq!(response.body.remaining_tickets, 1);

        let response = store.handle(&Request::Query { req_id: 3 });
        assert!(response.is_success());
        assert_eq!(response.body.remaining_tickets, 1);
    }

    async fn spawn_server(idle_ms: u64) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let settings = ServerSettings {
            port: addr.port(),
            tickets: 5,
            idle_timeout: (idle_ms > 0).then(|| Duration::from_millis(idle_ms)),
            fail_startup: false,
            ignore_sigterm: false,
        };
        tokio::spawn(serve(listener, settings));
        addr
    }

    #[tokio::test]
    async fn test_serves_requests_over_tcp() {
        let addr = spawn_server(0).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        booking_wire::write_request(&mut stream, &book(9, 2))
            .await
            .unwrap();
        let response = booking_wire::read_response(&mut stream).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.header.req_id, 9);
        assert_eq!(response.body.remaining_tickets, 3);
    }

    #[tokio::test]
    async fn test_idle_connection_is_evicted() {
        let addr = spawn_server(100).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let mut buf = [0u8; 8];
        let n = tokio::io::AsyncReadExt::read(&mut stream, &mut buf)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }
}

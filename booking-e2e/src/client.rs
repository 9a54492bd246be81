//! Stand-in booking client.
//!
//! Runs one connection per thread, each sending a single request, and
//! prints every response the same way the real client does.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use booking_wire::{BookRequest, Request, Response};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::warn;

use crate::settings::ClientSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Query,
    Book { tickets: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// How a batch of requests went.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub completed: u32,
    pub failed: u32,
}

impl BatchOutcome {
    pub fn all_completed(&self) -> bool {
        self.failed == 0
    }
}

/// Issue `threads` concurrent requests against the server on `settings.port`.
pub async fn run(threads: u32, action: Action, settings: &ClientSettings) -> BatchOutcome {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, settings.port));
    let user_base = std::process::id() % 10_000;

    let mut tasks = JoinSet::new();
    for index in 0..threads {
        let timeout = settings.request_timeout;
        let request = build_request(action, index, user_base);
        tasks.spawn(async move {
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, exchange(addr, &request)).await {
                    Ok(result) => result,
                    Err(_) => Err(RequestError::TimedOut(limit)),
                },
                None => exchange(addr, &request).await,
            };
            (index, request, result)
        });
    }

    let mut outcome = BatchOutcome::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, request, Ok(response))) => {
                println!("{}", render(&request, &response));
                outcome.completed += 1;
            }
            Ok((index, _, Err(e))) => {
                warn!("thread {}: {}", index, e);
                outcome.failed += 1;
            }
            Err(e) => {
                warn!("request task failed: {}", e);
                outcome.failed += 1;
            }
        }
    }
    outcome
}

fn build_request(action: Action, index: u32, user_base: u32) -> Request {
    let req_id = index as u16;
    match action {
        Action::Query => Request::Query { req_id },
        Action::Book { tickets } => Request::Book {
            req_id,
            body: BookRequest {
                num_tickets: tickets,
                user_id: user_base + index,
            },
        },
    }
}

async fn exchange(addr: SocketAddr, request: &Request) -> Result<Response, RequestError> {
    let mut stream = TcpStream::connect(addr).await?;
    booking_wire::write_request(&mut stream, request).await?;
    Ok(booking_wire::read_response(&mut stream).await?)
}

/// Format a response block.
pub fn render(request: &Request, response: &Response) -> String {
    let sent = match request {
        Request::Query { req_id } => format!("Sent query request (req_id={}).", req_id),
        Request::Book { req_id, body } => format!(
            "Sent book request for {} tickets (user_id={}, req_id={}).",
            body.num_tickets, body.user_id, req_id
        ),
    };
    let rule = "-".repeat(40);

    let mut lines = vec![
        sent,
        rule.clone(),
        format!("Server Response (req_id={}):", response.header.req_id),
    ];
    match request {
        Request::Query { .. } => lines.push(format!("  OpCode: 0x{:X}", response.header.opcode as u16)),
        Request::Book { .. } if response.is_success() => lines.push("  Status: SUCCESS".to_string()),
        Request::Book { .. } => lines.push("  Status: FAIL".to_string()),
    }
    lines.push(format!(
        "  Remaining Tickets: {}",
        response.body.remaining_tickets
    ));
    lines.push(format!("  Message: {}", response.body.message));
    lines.push(rule);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use booking_wire::ServerResponse;
    use tokio::net::TcpListener;

    use super::*;
    use crate::server::{TicketStore, serve};
    use crate::settings::ServerSettings;

    #[test]
    fn test_render_booking() {
        let request = build_request(Action::Book { tickets: 1 }, 2, 40);
        let response = Response::fail(2, ServerResponse::new(0, "Booking failed"));
        let text = render(&request, &response);

        assert!(text.starts_with("Sent book request for 1 tickets (user_id=42, req_id=2)."));
        assert!(text.contains("\n  Status: FAIL\n"));
        assert!(text.contains("\n  Remaining Tickets: 0\n"));
    }

    #[test]
    fn test_render_query() {
        let request = build_request(Action::Query, 0, 0);
        let store = TicketStore::new(12);
        let text = render(&request, &store.handle(&request));
        assert!(text.contains("  OpCode: 0x1001"));
        assert!(text.contains("  Remaining Tickets: 12"));
    }

    #[tokio::test]
    async fn test_contest_against_one_ticket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = ServerSettings {
            port,
            tickets: 1,
            idle_timeout: None,
            fail_startup: false,
            ignore_sigterm: false,
        };
        tokio::spawn(serve(listener, server));

        let settings = ClientSettings {
            port,
            request_timeout: Some(Duration::from_secs(5)),
            exit_delay: None,
            ignore_errors: false,
        };
        let outcome = run(5, Action::Book { tickets: 1 }, &settings).await;
        assert_eq!(outcome.completed, 5);
        assert!(outcome.all_completed());
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let settings = ClientSettings {
            port,
            request_timeout: Some(Duration::from_millis(200)),
            exit_delay: None,
            ignore_errors: false,
        };
        let outcome = run(1, Action::Query, &settings).await;
        hold.abort();

        assert_eq!(outcome.failed, 1);
        assert!(!outcome.all_completed());
    }
}

//! Booking protocol wire types.
//!
//! Every message is an 8-byte header followed by an opcode-specific body.
//! All integers are little-endian and structures are packed, so the layouts
//! below are exact byte offsets.
//!
//! ```text
//! Header          [packet_len: u32][opcode: u16][req_id: u16]
//! BookRequest     [num_tickets: u32][user_id: u32]
//! ServerResponse  [remaining_tickets: u32][message: 64 bytes, NUL padded]
//! ```
//!
//! `packet_len` counts the header plus the body.

#![deny(unsafe_code)]

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

// =============================================================================
// Sizes and opcodes
// =============================================================================

/// Size of the fixed header.
pub const HEADER_SIZE: usize = 8;

/// Size of a booking request body.
pub const BOOK_REQUEST_SIZE: usize = 8;

/// Capacity of the response message field, including the terminating NUL.
pub const MESSAGE_SIZE: usize = 64;

/// Size of a server response body.
pub const RESPONSE_SIZE: usize = 4 + MESSAGE_SIZE;

/// Operation carried in a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    QueryAvailability = 0x0001,
    BookTicket = 0x0002,
    ResponseSuccess = 0x1001,
    ResponseFail = 0x1002,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::QueryAvailability),
            0x0002 => Some(Self::BookTicket),
            0x1001 => Some(Self::ResponseSuccess),
            0x1002 => Some(Self::ResponseFail),
            _ => None,
        }
    }

    /// Returns true for the two response opcodes.
    #[inline]
    pub const fn is_response(self) -> bool {
        matches!(self, Self::ResponseSuccess | Self::ResponseFail)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueryAvailability => write!(f, "QUERY_AVAILABILITY"),
            Self::BookTicket => write!(f, "BOOK_TICKET"),
            Self::ResponseSuccess => write!(f, "RESPONSE_SUCCESS"),
            Self::ResponseFail => write!(f, "RESPONSE_FAIL"),
        }
    }
}

// =============================================================================
// Header
// =============================================================================

/// Fixed 8-byte message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub packet_len: u32,
    pub opcode: Opcode,
    pub req_id: u16,
}

impl Header {
    /// Header for a message whose body is `body_len` bytes long.
    pub fn new(opcode: Opcode, req_id: u16, body_len: usize) -> Self {
        Self {
            packet_len: (HEADER_SIZE + body_len) as u32,
            opcode,
            req_id,
        }
    }

    /// Number of body bytes that follow this header.
    pub fn body_len(&self) -> usize {
        (self.packet_len as usize).saturating_sub(HEADER_SIZE)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.packet_len.to_le_bytes());
        buf[4..6].copy_from_slice(&(self.opcode as u16).to_le_bytes());
        buf[6..8].copy_from_slice(&self.req_id.to_le_bytes());
        buf
    }

    /// Decode a header, rejecting unknown opcodes and impossible lengths.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> io::Result<Self> {
        let packet_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let raw_opcode = u16::from_le_bytes([buf[4], buf[5]]);
        let req_id = u16::from_le_bytes([buf[6], buf[7]]);

        if (packet_len as usize) < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("packet too short: {} bytes", packet_len),
            ));
        }

        let opcode = Opcode::from_u16(raw_opcode).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown opcode 0x{:04x}", raw_opcode),
            )
        })?;

        Ok(Self {
            packet_len,
            opcode,
            req_id,
        })
    }
}

// =============================================================================
// Bodies
// =============================================================================

/// Body of a `BOOK_TICKET` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookRequest {
    pub num_tickets: u32,
    pub user_id: u32,
}

impl BookRequest {
    pub fn to_bytes(&self) -> [u8; BOOK_REQUEST_SIZE] {
        let mut buf = [0u8; BOOK_REQUEST_SIZE];
        buf[0..4].copy_from_slice(&self.num_tickets.to_le_bytes());
        buf[4..8].copy_from_slice(&self.user_id.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; BOOK_REQUEST_SIZE]) -> Self {
        Self {
            num_tickets: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            user_id: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

/// Body shared by every server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
    pub remaining_tickets: u32,
    pub message: String,
}

impl ServerResponse {
    pub fn new(remaining_tickets: u32, message: impl Into<String>) -> Self {
        Self {
            remaining_tickets,
            message: message.into(),
        }
    }

    /// Encode, truncating the message so a terminating NUL always fits.
    pub fn to_bytes(&self) -> [u8; RESPONSE_SIZE] {
        let mut buf = [0u8; RESPONSE_SIZE];
        buf[0..4].copy_from_slice(&self.remaining_tickets.to_le_bytes());

        let mut end = self.message.len().min(MESSAGE_SIZE - 1);
        while !self.message.is_char_boundary(end) {
            end -= 1;
        }
        buf[4..4 + end].copy_from_slice(&self.message.as_bytes()[..end]);
        buf
    }

    pub fn from_bytes(buf: &[u8; RESPONSE_SIZE]) -> Self {
        let text = &buf[4..];
        let end = text.iter().position(|b| *b == 0).unwrap_or(text.len());
        Self {
            remaining_tickets: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            message: String::from_utf8_lossy(&text[..end]).into_owned(),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// A decoded request as seen by a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Query { req_id: u16 },
    Book { req_id: u16, body: BookRequest },
}

impl Request {
    pub fn req_id(&self) -> u16 {
        match self {
            Self::Query { req_id } | Self::Book { req_id, .. } => *req_id,
        }
    }

    /// Encode the full request, header included.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Query { req_id } => Header::new(Opcode::QueryAvailability, *req_id, 0)
                .to_bytes()
                .to_vec(),
            Self::Book { req_id, body } => {
                let mut out = Vec::with_capacity(HEADER_SIZE + BOOK_REQUEST_SIZE);
                out.extend_from_slice(
                    &Header::new(Opcode::BookTicket, *req_id, BOOK_REQUEST_SIZE).to_bytes(),
                );
                out.extend_from_slice(&body.to_bytes());
                out
            }
        }
    }
}

/// A decoded response as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub header: Header,
    pub body: ServerResponse,
}

impl Response {
    pub fn success(req_id: u16, body: ServerResponse) -> Self {
        Self {
            header: Header::new(Opcode::ResponseSuccess, req_id, RESPONSE_SIZE),
            body,
        }
    }

    pub fn fail(req_id: u16, body: ServerResponse) -> Self {
        Self {
            header: Header::new(Opcode::ResponseFail, req_id, RESPONSE_SIZE),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.header.opcode == Opcode::ResponseSuccess
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + RESPONSE_SIZE);
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.body.to_bytes());
        out
    }

    /// Decode a complete response from a byte slice.
    ///
    /// Returns `None` if the slice is not exactly one well-formed response.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != HEADER_SIZE + RESPONSE_SIZE {
            return None;
        }
        let header = Header::from_bytes(bytes[..HEADER_SIZE].try_into().ok()?).ok()?;
        if !header.opcode.is_response() {
            return None;
        }
        let body = ServerResponse::from_bytes(bytes[HEADER_SIZE..].try_into().ok()?);
        Some(Self { header, body })
    }
}

/// Encoded `QUERY_AVAILABILITY` request with the given id.
pub fn query_request(req_id: u16) -> Vec<u8> {
    Request::Query { req_id }.to_bytes()
}

// =============================================================================
// Async I/O
// =============================================================================

/// Read one request.
///
/// Returns `Ok(None)` on a clean end of stream before any header byte; a
/// stream that ends inside the header fails with `UnexpectedEof`.
pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Request>> {
    let mut head = [0u8; HEADER_SIZE];
    if reader.read(&mut head[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut head[1..]).await?;
    let header = Header::from_bytes(&head)?;

    match header.opcode {
        Opcode::QueryAvailability => Ok(Some(Request::Query {
            req_id: header.req_id,
        })),
        Opcode::BookTicket => {
            let mut body = [0u8; BOOK_REQUEST_SIZE];
            reader.read_exact(&mut body).await?;
            Ok(Some(Request::Book {
                req_id: header.req_id,
                body: BookRequest::from_bytes(&body),
            }))
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected {} from client", other),
        )),
    }
}

/// Read one response, failing with `UnexpectedEof` on a short stream.
pub async fn read_response<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Response> {
    let mut head = [0u8; HEADER_SIZE];
    reader.read_exact(&mut head).await?;
    let header = Header::from_bytes(&head)?;

    if !header.opcode.is_response() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected {} from server", header.opcode),
        ));
    }

    let mut body = [0u8; RESPONSE_SIZE];
    reader.read_exact(&mut body).await?;
    Ok(Response {
        header,
        body: ServerResponse::from_bytes(&body),
    })
}

pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: &Request,
) -> io::Result<()> {
    writer.write_all(&request.to_bytes()).await?;
    writer.flush().await
}

pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
) -> io::Result<()> {
    writer.write_all(&response.to_bytes()).await?;
    writer.flush().await
}

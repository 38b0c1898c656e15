//! HTTP connection: per-direction framing state machine driving a socket
//! transparently across chunked/contiguous/unbound encodings (spec §4.4).
//! Grounded on `original_source/pcomn_http/http_connection.{h,cpp}` for the
//! `_pending_in`/`_pending_out` design and on
//! `yaleman-goatns::servers.rs` for the timeout-wrapped I/O idiom.

use super::error::HttpError;
use super::message::{ContentFraming, HttpRequest, HttpResponse};
use crate::net::StreamSocket;

/// Inbound framing state (spec §4.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingIn {
    /// No message received yet, or the previous body is fully consumed.
    Empty,
    /// Contiguous body; value is bytes remaining.
    Contiguous(u64),
    /// Chunked body; `in_chunk` is bytes remaining in the current chunk,
    /// `done` once the zero-chunk and trailers have been consumed.
    Chunked { in_chunk: u64, done: bool },
    /// Body runs until the peer closes the connection.
    Unbound,
}

/// Outbound framing state (spec §4.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingOut {
    Idle,
    Contiguous(u64),
    Chunked,
}

/// Drives one HTTP/1.1 connection's wire protocol over a [`StreamSocket`].
/// Role-specific header injection (Date/Server/Connection on the server
/// side, Host/User-Agent on the client side) lives in [`super::server`] and
/// [`super::client`], which wrap this type.
pub struct Connection {
    stream: StreamSocket,
    pending_in: PendingIn,
    pending_out: PendingOut,
    /// Bytes read from the socket but not yet consumed by header parsing
    /// or body reads.
    read_buf: Vec<u8>,
}

const READ_CHUNK: usize = 8 * 1024;

impl Connection {
    pub fn new(stream: StreamSocket) -> Self {
        Connection {
            stream,
            pending_in: PendingIn::Empty,
            pending_out: PendingOut::Idle,
            read_buf: Vec::new(),
        }
    }

    pub fn stream(&self) -> &StreamSocket {
        &self.stream
    }

    pub fn eoc(&self) -> bool {
        matches!(
            self.pending_in,
            PendingIn::Empty
                | PendingIn::Contiguous(0)
                | PendingIn::Chunked { done: true, .. }
        )
    }

    pub fn eot(&self) -> bool {
        matches!(self.pending_out, PendingOut::Idle)
    }

    fn establish_inbound(&mut self, framing: ContentFraming, suppress_body: bool) {
        self.pending_in = if suppress_body {
            PendingIn::Empty
        } else {
            match framing {
                ContentFraming::Length(0) | ContentFraming::Empty => PendingIn::Empty,
                ContentFraming::Length(n) => PendingIn::Contiguous(n),
                ContentFraming::Chunked => PendingIn::Chunked {
                    in_chunk: 0,
                    done: false,
                },
                ContentFraming::Unbound => PendingIn::Unbound,
            }
        };
    }

    async fn fill(&mut self, timeout_ms: u64) -> Result<usize, HttpError> {
        let mut tmp = vec![0u8; READ_CHUNK];
        let n = self.stream.receive(&mut tmp, timeout_ms).await?;
        self.read_buf.extend_from_slice(&tmp[..n]);
        Ok(n)
    }

    /// Reads raw bytes up to and including the header-terminating blank
    /// line, returning the header block as text and leaving any trailing
    /// body bytes buffered for subsequent [`Connection::receive`] calls.
    async fn read_header_block(&mut self, timeout_ms: u64) -> Result<String, HttpError> {
        loop {
            if let Some(pos) = find_subslice(&self.read_buf, b"\r\n\r\n") {
                let head = self.read_buf[..pos + 4].to_vec();
                self.read_buf.drain(..pos + 4);
                return Ok(String::from_utf8_lossy(&head).into_owned());
            }
            let n = self.fill(timeout_ms).await?;
            if n == 0 {
                if self.read_buf.is_empty() {
                    return Err(HttpError::ConnectionClosed);
                }
                return Err(HttpError::ConnectionClosed);
            }
        }
    }

    async fn read_line(&mut self, timeout_ms: u64) -> Result<String, HttpError> {
        loop {
            if let Some(pos) = find_subslice(&self.read_buf, b"\r\n") {
                let line = self.read_buf[..pos].to_vec();
                self.read_buf.drain(..pos + 2);
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            let n = self.fill(timeout_ms).await?;
            if n == 0 {
                return Err(HttpError::ConnectionClosed);
            }
        }
    }

    pub async fn receive_request(&mut self, timeout_ms: u64) -> Result<HttpRequest, HttpError> {
        if !self.eoc() {
            return Err(HttpError::LogicError(
                "previous inbound message not fully consumed".into(),
            ));
        }
        let text = self.read_header_block(timeout_ms).await?;
        let request = HttpRequest::parse(&text)?;
        let is_head = request.method == super::message::Method::Head;
        self.establish_inbound(request.core.content_framing(), is_head);
        Ok(request)
    }

    pub async fn receive_response(
        &mut self,
        suppress_body: bool,
        timeout_ms: u64,
    ) -> Result<HttpResponse, HttpError> {
        if !self.eoc() {
            return Err(HttpError::LogicError(
                "previous inbound message not fully consumed".into(),
            ));
        }
        let text = self.read_header_block(timeout_ms).await?;
        let response = HttpResponse::parse(&text)?;
        self.establish_inbound(response.core.content_framing(), suppress_body);
        Ok(response)
    }

    /// Reads body bytes against the current inbound framing mode,
    /// transparently handling chunk sizes and trailers (spec §4.4.1).
    pub async fn receive(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<usize, HttpError> {
        match self.pending_in {
            PendingIn::Empty => Ok(0),
            PendingIn::Contiguous(remaining) => {
                if remaining == 0 {
                    return Ok(0);
                }
                let want = (remaining as usize).min(buf.len());
                let n = self.read_buffered_or_socket(&mut buf[..want], timeout_ms).await?;
                if n == 0 {
                    return Err(HttpError::ConnectionClosed);
                }
                self.pending_in = PendingIn::Contiguous(remaining - n as u64);
                Ok(n)
            }
            PendingIn::Unbound => {
                let n = self.read_buffered_or_socket(buf, timeout_ms).await?;
                Ok(n)
            }
            PendingIn::Chunked { .. } => self.receive_chunked(buf, timeout_ms).await,
        }
    }

    async fn read_buffered_or_socket(
        &mut self,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<usize, HttpError> {
        if self.read_buf.is_empty() {
            self.fill(timeout_ms).await?;
        }
        let n = self.read_buf.len().min(buf.len());
        buf[..n].copy_from_slice(&self.read_buf[..n]);
        self.read_buf.drain(..n);
        Ok(n)
    }

    async fn receive_chunked(
        &mut self,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<usize, HttpError> {
        loop {
            let (in_chunk, done) = match self.pending_in {
                PendingIn::Chunked { in_chunk, done } => (in_chunk, done),
                _ => unreachable!(),
            };
            if done {
                return Ok(0);
            }
            if in_chunk == 0 {
                let size_line = self.read_line(timeout_ms).await?;
                let size_str = size_line.split(';').next().unwrap_or("").trim();
                let size = u64::from_str_radix(size_str, 16).map_err(|_| {
                    HttpError::MessageError(format!("invalid chunk size {size_line:?}"))
                })?;
                if size == 0 {
                    loop {
                        let trailer = self.read_line(timeout_ms).await?;
                        if trailer.is_empty() {
                            break;
                        }
                    }
                    self.pending_in = PendingIn::Chunked {
                        in_chunk: 0,
                        done: true,
                    };
                    return Ok(0);
                }
                self.pending_in = PendingIn::Chunked {
                    in_chunk: size,
                    done: false,
                };
                continue;
            }
            let want = (in_chunk as usize).min(buf.len());
            let n = self.read_buffered_or_socket(&mut buf[..want], timeout_ms).await?;
            if n == 0 {
                return Err(HttpError::ConnectionClosed);
            }
            let remaining = in_chunk - n as u64;
            if remaining == 0 {
                let crlf = self.read_line(timeout_ms).await?;
                if !crlf.is_empty() {
                    return Err(HttpError::MessageError(
                        "missing CRLF between chunks".into(),
                    ));
                }
            }
            self.pending_in = PendingIn::Chunked {
                in_chunk: remaining,
                done: false,
            };
            return Ok(n);
        }
    }

    fn establish_outbound(&mut self, framing: ContentFraming, suppress_body: bool) {
        self.pending_out = if suppress_body {
            PendingOut::Idle
        } else {
            match framing {
                ContentFraming::Length(0) | ContentFraming::Empty => PendingOut::Idle,
                ContentFraming::Length(n) => PendingOut::Contiguous(n),
                ContentFraming::Chunked => PendingOut::Chunked,
                ContentFraming::Unbound => PendingOut::Contiguous(u64::MAX),
            }
        };
    }

    pub async fn send_request(
        &mut self,
        request: &HttpRequest,
        timeout_ms: u64,
    ) -> Result<(), HttpError> {
        if !self.eot() {
            return Err(HttpError::LogicError(
                "previous outbound message not finished".into(),
            ));
        }
        let text = request.emit("\r\n");
        self.stream
            .transmit(text.as_bytes(), timeout_ms)
            .await
            .map_err(HttpError::from)?;
        self.establish_outbound(request.core.content_framing(), false);
        Ok(())
    }

    pub async fn send_response(
        &mut self,
        response: &HttpResponse,
        suppress_body: bool,
        timeout_ms: u64,
    ) -> Result<(), HttpError> {
        if !self.eot() {
            return Err(HttpError::LogicError(
                "previous outbound message not finished".into(),
            ));
        }
        let text = response.emit("\r\n");
        self.stream
            .transmit(text.as_bytes(), timeout_ms)
            .await
            .map_err(HttpError::from)?;
        self.establish_outbound(response.core.content_framing(), suppress_body);
        Ok(())
    }

    /// Writes one unit of outbound body content (spec §4.4.1). In
    /// `Chunked` mode, an empty `buf` closes the chunked body. In
    /// contiguous mode, the cumulative total must not exceed the
    /// declared length.
    pub async fn transmit(&mut self, buf: &[u8], timeout_ms: u64) -> Result<usize, HttpError> {
        match self.pending_out {
            PendingOut::Idle => Err(HttpError::LogicError(
                "no outbound message in progress".into(),
            )),
            PendingOut::Contiguous(remaining) => {
                if buf.len() as u64 > remaining {
                    return Err(HttpError::LogicError(format!(
                        "transmit of {} bytes exceeds {remaining} bytes remaining",
                        buf.len()
                    )));
                }
                let n = self.stream.transmit(buf, timeout_ms).await?;
                self.pending_out = if remaining == u64::MAX {
                    PendingOut::Contiguous(u64::MAX)
                } else {
                    PendingOut::Contiguous(remaining - n as u64)
                };
                Ok(n)
            }
            PendingOut::Chunked => {
                if buf.is_empty() {
                    self.stream.transmit(b"0\r\n\r\n", timeout_ms).await?;
                    self.pending_out = PendingOut::Idle;
                    return Ok(0);
                }
                let header = format!("{:x}\r\n", buf.len());
                self.stream.transmit(header.as_bytes(), timeout_ms).await?;
                let n = self.stream.transmit(buf, timeout_ms).await?;
                self.stream.transmit(b"\r\n", timeout_ms).await?;
                Ok(n)
            }
        }
    }

    pub fn close(&self) {
        self.stream.close();
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::message::{HttpVersion, Method};
    use crate::net::{AcceptFlags, ServerSocket, StreamSocket};
    use crate::net::address::{Ipv4Addr, SockAddr};

    async fn loopback_pair() -> (StreamSocket, StreamSocket) {
        let server = ServerSocket::bind(SockAddr::v4(Ipv4Addr::LOCALHOST, 0), 4).unwrap();
        let addr = server.local_addr().unwrap();
        let connector = tokio::spawn(async move { StreamSocket::connect(addr, 1_000_000).await });
        let accepted = server.accept(AcceptFlags::empty()).await.unwrap().unwrap();
        let connected = connector.await.unwrap().unwrap();
        (accepted, connected)
    }

    #[tokio::test]
    async fn get_round_trip() {
        let (server_stream, client_stream) = loopback_pair().await;
        let mut server_conn = Connection::new(server_stream);
        let mut client_conn = Connection::new(client_stream);

        let mut request = HttpRequest::new(Method::Get, "/index", HttpVersion::HTTP_1_1);
        request.core.headers.set("host", "example");
        client_conn.send_request(&request, 1_000).await.unwrap();

        let received = server_conn.receive_request(1_000).await.unwrap();
        assert_eq!(received.method, Method::Get);
        assert_eq!(received.target, "/index");
        assert_eq!(received.core.host(), Some("example"));

        let mut response = HttpResponse::new(HttpVersion::HTTP_1_1, 200).unwrap();
        response.core.set_content_length(5);
        server_conn.send_response(&response, false, 1_000).await.unwrap();
        server_conn.transmit(b"HELLO", 1_000).await.unwrap();

        let response = client_conn.receive_response(false, 1_000).await.unwrap();
        assert_eq!(response.status(), 200);
        let mut body = [0u8; 5];
        client_conn.receive(&mut body, 1_000).await.unwrap();
        assert_eq!(&body, b"HELLO");
        assert!(client_conn.eoc());
    }

    #[tokio::test]
    async fn chunked_response_round_trip() {
        let (server_stream, client_stream) = loopback_pair().await;
        let mut server_conn = Connection::new(server_stream);
        let mut client_conn = Connection::new(client_stream);

        let mut response = HttpResponse::new(HttpVersion::HTTP_1_1, 200).unwrap();
        response.core.set_chunked();
        server_conn.send_response(&response, false, 1_000).await.unwrap();
        server_conn.transmit(&[1u8; 3], 1_000).await.unwrap();
        server_conn.transmit(&[2u8; 5], 1_000).await.unwrap();
        server_conn.transmit(&[3u8; 7], 1_000).await.unwrap();
        server_conn.transmit(&[], 1_000).await.unwrap();

        client_conn.receive_response(false, 1_000).await.unwrap();
        let mut total = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = client_conn.receive(&mut buf, 1_000).await.unwrap();
            if n == 0 {
                break;
            }
            total.extend_from_slice(&buf[..n]);
        }
        assert_eq!(total.len(), 15);
        assert!(client_conn.eoc());
    }

    #[tokio::test]
    async fn head_suppresses_body() {
        let (server_stream, client_stream) = loopback_pair().await;
        let mut server_conn = Connection::new(server_stream);
        let mut client_conn = Connection::new(client_stream);

        let request = HttpRequest::new(Method::Head, "/", HttpVersion::HTTP_1_1);
        client_conn.send_request(&request, 1_000).await.unwrap();
        let received = server_conn.receive_request(1_000).await.unwrap();
        assert_eq!(received.method, Method::Head);

        let mut response = HttpResponse::new(HttpVersion::HTTP_1_1, 200).unwrap();
        response.core.set_content_length(100);
        server_conn.send_response(&response, true, 1_000).await.unwrap();
        assert!(server_conn.eot());

        let response = client_conn.receive_response(true, 1_000).await.unwrap();
        assert_eq!(response.core.content_framing(), super::super::message::ContentFraming::Length(100));
        let mut buf = [0u8; 16];
        let n = client_conn.receive(&mut buf, 1_000).await.unwrap();
        assert_eq!(n, 0);
        assert!(client_conn.eoc());
    }
}

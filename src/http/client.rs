//! Client-role connection wrapper: Accept-Encoding/Host/User-Agent
//! injection, keep-alive for 1.1, and the 1xx continue counter (spec
//! §4.4.3).

use super::connection::Connection;
use super::error::HttpError;
use super::message::{HttpRequest, HttpResponse, HttpVersion, Method};
use crate::net::StreamSocket;

/// Extracts the authority from an absolute-URI request target
/// (`http://host[:port]/path`), the first leg of the `Host:` header
/// fallback (spec:179). Origin-form targets (`/path`) yield `None`.
fn host_from_target(target: &str) -> Option<String> {
    let rest = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"))?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    if authority.is_empty() {
        None
    } else {
        Some(authority.to_string())
    }
}

pub struct ClientConnection {
    connection: Connection,
    user_agent: String,
    continue_count: u64,
    /// Host this connection was opened to, used as the second leg of the
    /// `Host:` header fallback (spec §4.4.3) when a request carries
    /// neither its own `Host` header nor an absolute-URI target.
    connection_host: Option<String>,
}

impl ClientConnection {
    pub fn new(stream: StreamSocket, user_agent: impl Into<String>) -> Self {
        ClientConnection {
            connection: Connection::new(stream),
            user_agent: user_agent.into(),
            continue_count: 0,
            connection_host: None,
        }
    }

    /// Records the host this connection targets, consulted by
    /// [`ClientConnection::send_request`] as the `Host:` header fallback
    /// before the socket peer address.
    pub fn set_connection_host(&mut self, host: impl Into<String>) {
        self.connection_host = Some(host.into());
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn continue_count(&self) -> u64 {
        self.continue_count
    }

    /// Builds and sends a request with `Accept-Encoding`, `Host`, and
    /// `User-Agent` injected, keeping the connection alive when the
    /// version is 1.1 and this is not declared the last message.
    pub async fn request(
        &mut self,
        method: Method,
        target: impl Into<String>,
        version: HttpVersion,
        timeout_ms: u64,
    ) -> Result<(), HttpError> {
        self.send_request(method, target, version, false, timeout_ms)
            .await
    }

    pub async fn send_request(
        &mut self,
        method: Method,
        target: impl Into<String>,
        version: HttpVersion,
        is_last: bool,
        timeout_ms: u64,
    ) -> Result<(), HttpError> {
        let mut request = HttpRequest::new(method, target, version);
        request.core.headers.set("accept-encoding", "identity");

        if !request.core.headers.contains("host") {
            if let Some(host) = host_from_target(&request.target) {
                request.core.headers.set("host", host);
            } else if let Some(host) = self.connection_host.clone() {
                request.core.headers.set("host", host);
            } else if let Ok(peer) = self.connection.stream().peer_addr() {
                request.core.headers.set("host", peer.to_string());
            }
        }
        request.core.headers.set("user-agent", self.user_agent.clone());

        if version == HttpVersion::HTTP_1_1 && !is_last {
            request.core.set_connection("keep-alive");
            request.core.headers.set("keep-alive", "300");
        }

        self.connection.send_request(&request, timeout_ms).await
    }

    /// Reads a response, transparently absorbing 1xx informational
    /// responses into [`ClientConnection::continue_count`] without
    /// touching the answered balance (spec §4.4.3).
    pub async fn receive_response(&mut self, timeout_ms: u64) -> Result<HttpResponse, HttpError> {
        loop {
            let response = self.connection.receive_response(false, timeout_ms).await?;
            if response.is_informational() {
                self.continue_count += 1;
                continue;
            }
            return Ok(response);
        }
    }

    pub async fn receive(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<usize, HttpError> {
        self.connection.receive(buf, timeout_ms).await
    }

    pub fn eoc(&self) -> bool {
        self.connection.eoc()
    }

    pub fn eot(&self) -> bool {
        self.connection.eot()
    }

    pub fn close(&self) {
        self.connection.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::server::ServerConnection;
    use crate::net::address::{Ipv4Addr, SockAddr};
    use crate::net::{AcceptFlags, ServerSocket};

    #[test]
    fn host_from_target_reads_absolute_uri() {
        assert_eq!(
            host_from_target("http://example.com:8080/path"),
            Some("example.com:8080".to_string())
        );
        assert_eq!(host_from_target("/path"), None);
    }

    #[tokio::test]
    async fn connection_host_wins_over_peer_address() {
        let listener = ServerSocket::bind(SockAddr::v4(Ipv4Addr::LOCALHOST, 0), 4).unwrap();
        let addr = listener.local_addr().unwrap();
        let connector = tokio::spawn(async move { StreamSocket::connect(addr, 1_000_000).await });
        let accepted = listener.accept(AcceptFlags::empty()).await.unwrap().unwrap();
        let client_stream = connector.await.unwrap().unwrap();

        let mut server = ServerConnection::new(accepted, "pcommon/0.1");
        let mut client = ClientConnection::new(client_stream, "pcommon-client/0.1");
        client.set_connection_host("configured.example");

        client
            .request(Method::Get, "/", HttpVersion::HTTP_1_1, 1_000)
            .await
            .unwrap();
        let request = server.receive_request(1_000).await.unwrap();
        assert_eq!(request.core.headers.get("host"), Some("configured.example"));
    }

    #[tokio::test]
    async fn client_injects_headers_and_counts_continue() {
        let listener = ServerSocket::bind(SockAddr::v4(Ipv4Addr::LOCALHOST, 0), 4).unwrap();
        let addr = listener.local_addr().unwrap();
        let connector = tokio::spawn(async move { StreamSocket::connect(addr, 1_000_000).await });
        let accepted = listener.accept(AcceptFlags::empty()).await.unwrap().unwrap();
        let client_stream = connector.await.unwrap().unwrap();

        let mut server = ServerConnection::new(accepted, "pcommon/0.1");
        let mut client = ClientConnection::new(client_stream, "pcommon-client/0.1");

        client
            .request(Method::Get, "/", HttpVersion::HTTP_1_1, 1_000)
            .await
            .unwrap();
        let request = server.receive_request(1_000).await.unwrap();
        assert_eq!(request.core.headers.get("accept-encoding"), Some("identity"));
        assert!(request.core.headers.contains("host"));
        assert_eq!(
            request.core.headers.get("user-agent"),
            Some("pcommon-client/0.1")
        );
        assert!(request.core.flags.keep_alive);

        let interim = HttpResponse::new(HttpVersion::HTTP_1_1, 100).unwrap();
        server.respond(interim, 1_000).await.unwrap();
        let final_response = HttpResponse::new(HttpVersion::HTTP_1_1, 200).unwrap();
        server.respond(final_response, 1_000).await.unwrap();

        let response = client.receive_response(1_000).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(client.continue_count(), 1);
    }
}

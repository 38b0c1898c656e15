//! Server-role connection wrapper: Date/Server/Connection header
//! injection, HEAD body suppression, and the answered/unanswered balance
//! (spec §4.4.2).

use chrono::Utc;

use super::connection::Connection;
use super::error::HttpError;
use super::message::{HttpRequest, HttpResponse, Method};
use crate::net::StreamSocket;

pub struct ServerConnection {
    connection: Connection,
    server_name: String,
    last_request: Option<HttpRequest>,
    unanswered: u64,
}

impl ServerConnection {
    pub fn new(stream: StreamSocket, server_name: impl Into<String>) -> Self {
        ServerConnection {
            connection: Connection::new(stream),
            server_name: server_name.into(),
            last_request: None,
            unanswered: 0,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn unanswered(&self) -> u64 {
        self.unanswered
    }

    pub async fn receive_request(&mut self, timeout_ms: u64) -> Result<&HttpRequest, HttpError> {
        let request = self.connection.receive_request(timeout_ms).await?;
        self.unanswered += 1;
        self.last_request = Some(request);
        Ok(self.last_request.as_ref().unwrap())
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

    /// Stamps `Date`, `Server`, and a `Connection` derived from the last
    /// request, then sends the response. Rejected when `unanswered == 0`
    /// unless the response is 1xx (spec §4.4.2).
    pub async fn respond(
        &mut self,
        mut response: HttpResponse,
        timeout_ms: u64,
    ) -> Result<(), HttpError> {
        if self.unanswered == 0 && !response.is_informational() {
            return Err(HttpError::LogicError(
                "respond() called with no outstanding request".into(),
            ));
        }
        response
            .core
            .headers
            .set("date", Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string());
        response.core.headers.set("server", self.server_name.clone());

        if let Some(request) = &self.last_request {
            if request.core.flags.close_connection {
                response.core.set_connection("close");
            } else if request.core.flags.keep_alive {
                response.core.set_connection("keep-alive");
                response.core.headers.set("keep-alive", "timeout=5");
            }
        }

        let suppress_body = self
            .last_request
            .as_ref()
            .map(|r| r.method == Method::Head)
            .unwrap_or(false);

        self.connection
            .send_response(&response, suppress_body, timeout_ms)
            .await?;
        if !response.is_informational() {
            self.unanswered -= 1;
        }
        Ok(())
    }

    pub async fn transmit(&mut self, buf: &[u8], timeout_ms: u64) -> Result<usize, HttpError> {
        self.connection.transmit(buf, timeout_ms).await
    }

    pub fn close(&self) {
        self.connection.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::client::ClientConnection;
    use crate::http::message::HttpVersion;
    use crate::net::address::{Ipv4Addr, SockAddr};
    use crate::net::{AcceptFlags, ServerSocket};

    #[tokio::test]
    async fn respond_rejected_with_no_outstanding_request() {
        let listener = ServerSocket::bind(SockAddr::v4(Ipv4Addr::LOCALHOST, 0), 4).unwrap();
        let addr = listener.local_addr().unwrap();
        let connector = tokio::spawn(async move { StreamSocket::connect(addr, 1_000_000).await });
        let accepted = listener.accept(AcceptFlags::empty()).await.unwrap().unwrap();
        let _client = connector.await.unwrap().unwrap();

        let mut server = ServerConnection::new(accepted, "pcommon/0.1");
        let response = HttpResponse::new(HttpVersion::HTTP_1_1, 200).unwrap();
        assert!(server.respond(response, 1_000).await.is_err());
    }

    #[tokio::test]
    async fn server_stamps_date_and_server_headers() {
        let listener = ServerSocket::bind(SockAddr::v4(Ipv4Addr::LOCALHOST, 0), 4).unwrap();
        let addr = listener.local_addr().unwrap();
        let connector = tokio::spawn(async move { StreamSocket::connect(addr, 1_000_000).await });
        let accepted = listener.accept(AcceptFlags::empty()).await.unwrap().unwrap();
        let client_stream = connector.await.unwrap().unwrap();

        let mut server = ServerConnection::new(accepted, "pcommon/0.1");
        let mut client = ClientConnection::new(client_stream, "pcommon-client/0.1");

        client
            .request(
                crate::http::message::Method::Get,
                "/",
                HttpVersion::HTTP_1_1,
                1_000,
            )
            .await
            .unwrap();
        server.receive_request(1_000).await.unwrap();
        let response = HttpResponse::new(HttpVersion::HTTP_1_1, 200).unwrap();
        server.respond(response, 1_000).await.unwrap();

        let response = client.receive_response(1_000).await.unwrap();
        assert!(response.core.headers.contains("date"));
        assert_eq!(response.core.headers.get("server"), Some("pcommon/0.1"));
    }
}

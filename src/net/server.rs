//! `ServerSocket`: bind, listen, and accept connected streams. Spec §4.2.

use std::os::fd::AsRawFd;

use socket2::{Domain, Type};
use tokio::net::{TcpListener, TcpStream};

use super::address::SockAddr;
use super::error::NetError;
use super::socket::{dup_basic, BasicSocket};
use super::stream::StreamSocket;

/// Error-suppression flags for [`ServerSocket::accept`] (spec §4.2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptFlags {
    /// In non-blocking mode, return `Ok(None)` on `EAGAIN`/`EWOULDBLOCK`
    /// instead of propagating an error.
    pub allow_eagain: bool,
    /// Return `Ok(None)` if the accept was interrupted by a signal.
    pub allow_eintr: bool,
}

impl AcceptFlags {
    pub fn empty() -> Self {
        AcceptFlags::default()
    }
}

pub struct ServerSocket {
    basic: BasicSocket,
    listener: TcpListener,
}

impl ServerSocket {
    /// Binds and listens on `local`, with `backlog` pending connections.
    pub fn bind(local: SockAddr, backlog: i32) -> Result<Self, NetError> {
        let domain = match local.addr() {
            super::address::IpAddr::V4(_) => Domain::IPV4,
            super::address::IpAddr::V6(_) => Domain::IPV6,
        };
        let socket = socket2::Socket::new(domain, Type::STREAM, None).map_err(NetError::SocketError)?;
        socket.set_reuse_address(true).map_err(NetError::SocketError)?;
        socket
            .bind(&socket2::SockAddr::from(local.to_std()))
            .map_err(NetError::SocketError)?;
        socket.listen(backlog).map_err(NetError::SocketError)?;
        socket.set_nonblocking(true).map_err(NetError::SocketError)?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener).map_err(NetError::SocketError)?;
        let basic = dup_basic(listener.as_raw_fd())?;
        Ok(ServerSocket { basic, listener })
    }

    pub fn basic(&self) -> &BasicSocket {
        &self.basic
    }

    pub fn local_addr(&self) -> Result<SockAddr, NetError> {
        self.listener
            .local_addr()
            .map(SockAddr::from_std)
            .map_err(NetError::SocketError)
    }

    /// Accepts a connection, delegating the returned stream to
    /// [`StreamSocket`]'s own constructor (spec §4.2). `flags` controls
    /// whether `EAGAIN`/`EWOULDBLOCK` and signal interruption are
    /// suppressed into `Ok(None)` rather than propagated as errors.
    pub async fn accept(&self, flags: AcceptFlags) -> Result<Option<StreamSocket>, NetError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _peer)) => return Ok(Some(wrap_accepted(stream)?)),
                Err(e) if is_eagain(&e) && flags.allow_eagain => return Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                    if flags.allow_eintr {
                        return Ok(None);
                    }
                    continue;
                }
                Err(e) => return Err(NetError::SocketError(e)),
            }
        }
    }

    pub fn close(&self) {
        self.basic.close();
    }
}

fn is_eagain(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
}

fn wrap_accepted(stream: TcpStream) -> Result<StreamSocket, NetError> {
    let basic = dup_basic(stream.as_raw_fd())?;
    Ok(StreamSocket::new(basic, stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::address::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn accept_roundtrip() {
        let local = SockAddr::v4(Ipv4Addr::LOCALHOST, 0);
        let server = ServerSocket::bind(local, 16).unwrap();
        let bound = server.local_addr().unwrap();

        let connector = tokio::spawn(async move { StreamSocket::connect(bound, 1_000_000).await });

        let accepted = server.accept(AcceptFlags::empty()).await.unwrap();
        assert!(accepted.is_some());
        let client = connector.await.unwrap().unwrap();
        assert!(matches!(client.peer_addr().unwrap().addr(), IpAddr::V4(_)));
    }
}

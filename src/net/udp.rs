//! `UdpSocket`: datagram read/send with per-call timeouts. Spec §4.2.

use std::os::fd::AsRawFd;
use std::time::Duration;

use socket2::{Domain, Type};
use tokio::net::UdpSocket as TokioUdpSocket;
use tokio::time::timeout;

use super::address::SockAddr;
use super::error::NetError;
use super::socket::{dup_basic, BasicSocket};

pub struct UdpSocket {
    basic: BasicSocket,
    socket: TokioUdpSocket,
}

impl UdpSocket {
    pub fn bind(local: SockAddr) -> Result<Self, NetError> {
        let domain = match local.addr() {
            super::address::IpAddr::V4(_) => Domain::IPV4,
            super::address::IpAddr::V6(_) => Domain::IPV6,
        };
        let socket = socket2::Socket::new(domain, Type::DGRAM, None).map_err(NetError::SocketError)?;
        socket
            .bind(&socket2::SockAddr::from(local.to_std()))
            .map_err(NetError::SocketError)?;
        socket.set_nonblocking(true).map_err(NetError::SocketError)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = TokioUdpSocket::from_std(std_socket).map_err(NetError::SocketError)?;
        let basic = dup_basic(socket.as_raw_fd())?;
        Ok(UdpSocket { basic, socket })
    }

    pub fn basic(&self) -> &BasicSocket {
        &self.basic
    }

    pub fn local_addr(&self) -> Result<SockAddr, NetError> {
        self.socket
            .local_addr()
            .map(SockAddr::from_std)
            .map_err(NetError::SocketError)
    }

    /// Reads one datagram with a millisecond timeout (spec §4.2).
    pub async fn read(
        &self,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<(usize, SockAddr), NetError> {
        match timeout(Duration::from_millis(timeout_ms), self.socket.recv_from(buf)).await {
            Ok(Ok((n, peer))) => Ok((n, SockAddr::from_std(peer))),
            Ok(Err(e)) => Err(NetError::ReceiveError(e)),
            Err(_elapsed) => Err(NetError::OperationTimeout),
        }
    }

    /// Sends one datagram. A `0` return means transient buffer pressure and
    /// is recoverable by retrying; it is not an error (spec §4.2).
    pub async fn send_message(&self, buffer: &[u8], peer: SockAddr) -> Result<usize, NetError> {
        self.socket
            .send_to(buffer, peer.to_std())
            .await
            .map_err(NetError::TransmitError)
    }

    pub fn close(&self) {
        self.basic.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::address::Ipv4Addr;

    #[tokio::test]
    async fn send_and_read_roundtrip() {
        let a = UdpSocket::bind(SockAddr::v4(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let b = UdpSocket::bind(SockAddr::v4(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let b_addr = b.local_addr().unwrap();

        a.send_message(b"hello", b_addr).await.unwrap();
        let mut buf = [0u8; 16];
        let (n, _peer) = b.read(&mut buf, 1_000).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
    }
}

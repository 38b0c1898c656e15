//! `BasicSocket`: RAII + shared ownership over a kernel descriptor, with
//! typed `getsockopt`/`setsockopt` and timed readiness polling. Spec §4.2,
//! §5, §9. Grounded on `yaleman-goatns::servers.rs` for the timeout idiom
//! and enriched from `aws-s2n-quic-platform` for the raw-option seam.

use std::net::Shutdown;
use std::sync::{Arc, Mutex};

use socket2::{Domain, SockAddr as RawSockAddr, Socket, Type};

use super::address::SockAddr;
use super::error::NetError;

/// A kernel socket descriptor shared by value. Per spec §9, lifetime is the
/// longest holder; `close()` is idempotent and safe to call from multiple
/// owners or from a `Drop` impl.
#[derive(Clone)]
pub struct BasicSocket {
    inner: Arc<Mutex<Option<Socket>>>,
}

impl BasicSocket {
    pub fn new_stream(domain: Domain) -> Result<Self, NetError> {
        Self::new(domain, Type::STREAM)
    }

    pub fn new_datagram(domain: Domain) -> Result<Self, NetError> {
        Self::new(domain, Type::DGRAM)
    }

    fn new(domain: Domain, ty: Type) -> Result<Self, NetError> {
        let socket = Socket::new(domain, ty, None).map_err(NetError::SocketError)?;
        socket.set_nonblocking(true).map_err(NetError::SocketError)?;
        Ok(BasicSocket {
            inner: Arc::new(Mutex::new(Some(socket))),
        })
    }

    pub(crate) fn from_socket2(socket: Socket) -> Self {
        BasicSocket {
            inner: Arc::new(Mutex::new(Some(socket))),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&Socket) -> std::io::Result<T>) -> Result<T, NetError> {
        let guard = self.inner.lock().expect("basic socket mutex poisoned");
        let socket = guard
            .as_ref()
            .ok_or_else(|| NetError::SocketError(closed_error()))?;
        f(socket).map_err(NetError::SocketError)
    }

    pub fn bind(&self, addr: SockAddr) -> Result<(), NetError> {
        self.with(|s| s.bind(&RawSockAddr::from(addr.to_std())))
    }

    pub fn local_addr(&self) -> Result<SockAddr, NetError> {
        self.with(|s| s.local_addr())
            .map(|sa| SockAddr::from_std(sa.as_socket().expect("AF_INET{,6} local addr")))
    }

    pub fn set_reuse_address(&self, value: bool) -> Result<(), NetError> {
        self.with(|s| s.set_reuse_address(value))
    }

    pub fn reuse_address(&self) -> Result<bool, NetError> {
        self.with(|s| s.reuse_address())
    }

    pub fn set_recv_buffer_size(&self, size: usize) -> Result<(), NetError> {
        self.with(|s| s.set_recv_buffer_size(size))
    }

    pub fn recv_buffer_size(&self) -> Result<usize, NetError> {
        self.with(|s| s.recv_buffer_size())
    }

    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), NetError> {
        self.with(|s| s.set_send_buffer_size(size))
    }

    pub fn send_buffer_size(&self) -> Result<usize, NetError> {
        self.with(|s| s.send_buffer_size())
    }

    pub fn set_keepalive(&self, value: bool) -> Result<(), NetError> {
        self.with(|s| s.set_keepalive(value))
    }

    pub fn set_nodelay(&self, value: bool) -> Result<(), NetError> {
        self.with(|s| s.set_nodelay(value))
    }

    pub fn shutdown(&self, how: Shutdown) -> Result<(), NetError> {
        self.with(|s| s.shutdown(how))
    }

    /// Idempotent: the first call closes the descriptor by dropping it;
    /// every subsequent call observes `None` and is a safe no-op.
    pub fn close(&self) {
        let mut guard = self.inner.lock().expect("basic socket mutex poisoned");
        guard.take();
    }

}

/// Builds a [`BasicSocket`] over a `dup(2)`-ed copy of `fd`, for the cases
/// where a `tokio::net` type already owns the descriptor used for actual
/// I/O and a second, independently-closable handle is needed for
/// `setsockopt`/`getsockopt` access (spec §4.2 `basic_socket` underlying
/// `stream_socket`/`server_socket`).
pub(crate) fn dup_basic(fd: std::os::fd::RawFd) -> Result<BasicSocket, NetError> {
    use std::os::fd::FromRawFd;
    let dup_fd = unsafe { libc::dup(fd) };
    if dup_fd < 0 {
        return Err(NetError::SocketError(std::io::Error::last_os_error()));
    }
    let socket = unsafe { Socket::from_raw_fd(dup_fd) };
    Ok(BasicSocket::from_socket2(socket))
}

fn closed_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "socket already closed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_is_idempotent() {
        let sock = BasicSocket::new_stream(Domain::IPV4).unwrap();
        sock.close();
        sock.close(); // must not panic
        assert!(sock.bind(SockAddr::from_std("127.0.0.1:0".parse().unwrap())).is_err());
    }

    #[test]
    fn shared_ownership_observes_close_from_any_handle() {
        let sock = BasicSocket::new_stream(Domain::IPV4).unwrap();
        let shared = sock.clone();
        sock.close();
        assert!(shared
            .bind(SockAddr::from_std("127.0.0.1:0".parse().unwrap()))
            .is_err());
    }
}

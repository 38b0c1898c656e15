//! `StreamSocket`: scatter/gather receive/transmit, zero-copy file
//! transmit, and connect with a timeout. Spec §4.2.

use std::io::IoSlice;
use std::os::fd::AsRawFd;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, Interest};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::address::SockAddr;
use super::error::{is_closed_pipe, is_reset, NetError};
use super::socket::{dup_basic, BasicSocket};

pub struct StreamSocket {
    basic: BasicSocket,
    stream: TcpStream,
}

impl StreamSocket {
    pub(crate) fn new(basic: BasicSocket, stream: TcpStream) -> Self {
        StreamSocket { basic, stream }
    }

    pub async fn connect(peer: SockAddr, timeout_us: u64) -> Result<Self, NetError> {
        let stream = match timeout(
            Duration::from_micros(timeout_us),
            TcpStream::connect(peer.to_std()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(NetError::ConnectionError(e)),
            Err(_elapsed) => return Err(NetError::OperationTimeout),
        };
        let basic = dup_basic(stream.as_raw_fd())?;
        Ok(StreamSocket::new(basic, stream))
    }

    pub fn basic(&self) -> &BasicSocket {
        &self.basic
    }

    pub fn peer_addr(&self) -> Result<SockAddr, NetError> {
        self.stream
            .peer_addr()
            .map(SockAddr::from_std)
            .map_err(NetError::SocketError)
    }

    pub fn local_addr(&self) -> Result<SockAddr, NetError> {
        self.stream
            .local_addr()
            .map(SockAddr::from_std)
            .map_err(NetError::SocketError)
    }

    /// Scatter/gather receive with a per-call millisecond timeout.
    /// Error mapping per spec §4.2: `ECONNRESET` -> [`NetError::SenderClosed`],
    /// any other failure -> [`NetError::ReceiveError`], elapsed timeout ->
    /// [`NetError::OperationTimeout`].
    pub async fn receive(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<usize, NetError> {
        match timeout(Duration::from_millis(timeout_ms), self.stream.read(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) if is_reset(&e) => Err(NetError::SenderClosed),
            Ok(Err(e)) => Err(NetError::ReceiveError(e)),
            Err(_elapsed) => Err(NetError::OperationTimeout),
        }
    }

    pub async fn receive_vectored(
        &mut self,
        bufs: &mut [std::io::IoSliceMut<'_>],
        timeout_ms: u64,
    ) -> Result<usize, NetError> {
        let stream = &self.stream;
        let op = async move {
            loop {
                stream.readable().await?;
                match stream.try_read_vectored(bufs) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                    Err(e) => return Err(e),
                }
            }
        };
        match timeout(Duration::from_millis(timeout_ms), op).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) if is_reset(&e) => Err(NetError::SenderClosed),
            Ok(Err(e)) => Err(NetError::ReceiveError(e)),
            Err(_elapsed) => Err(NetError::OperationTimeout),
        }
    }

    /// Error mapping per spec §4.2: `EPIPE`/`ECONNRESET` ->
    /// [`NetError::ReceiverClosed`], any other failure ->
    /// [`NetError::TransmitError`], elapsed timeout ->
    /// [`NetError::OperationTimeout`].
    pub async fn transmit(&mut self, buf: &[u8], timeout_ms: u64) -> Result<usize, NetError> {
        match timeout(Duration::from_millis(timeout_ms), self.stream.write(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) if is_closed_pipe(&e) => Err(NetError::ReceiverClosed),
            Ok(Err(e)) => Err(NetError::TransmitError(e)),
            Err(_elapsed) => Err(NetError::OperationTimeout),
        }
    }

    pub async fn transmit_vectored(
        &mut self,
        bufs: &[IoSlice<'_>],
        timeout_ms: u64,
    ) -> Result<usize, NetError> {
        match timeout(
            Duration::from_millis(timeout_ms),
            self.stream.write_vectored(bufs),
        )
        .await
        {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) if is_closed_pipe(&e) => Err(NetError::ReceiverClosed),
            Ok(Err(e)) => Err(NetError::TransmitError(e)),
            Err(_elapsed) => Err(NetError::OperationTimeout),
        }
    }

    /// Zero-copy file transmit via `sendfile(2)` on Linux, falling back to
    /// a read/write copy loop on other platforms (spec §4.2, §4.4.4).
    #[cfg(target_os = "linux")]
    pub async fn transmit_file(
        &mut self,
        file: &std::fs::File,
        size: u64,
        offset: u64,
    ) -> Result<u64, NetError> {
        let in_fd = file.as_raw_fd();
        let mut remaining = size;
        let mut cur_offset = offset as libc::off_t;
        while remaining > 0 {
            self.stream.writable().await.map_err(NetError::TransmitError)?;
            let chunk = remaining.min(i32::MAX as u64) as usize;
            let result = self.stream.try_io(Interest::WRITABLE, || {
                let mut off = cur_offset;
                let rc = unsafe {
                    libc::sendfile(
                        self.stream.as_raw_fd(),
                        in_fd,
                        &mut off,
                        chunk,
                    )
                };
                if rc < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok((rc as u64, off))
                }
            });
            match result {
                Ok((sent, new_off)) => {
                    if sent == 0 {
                        break;
                    }
                    remaining -= sent;
                    cur_offset = new_off;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) if is_closed_pipe(&e) => return Err(NetError::ReceiverClosed),
                Err(e) => return Err(NetError::TransmitError(e)),
            }
        }
        Ok(size - remaining)
    }

    #[cfg(not(target_os = "linux"))]
    pub async fn transmit_file(
        &mut self,
        file: &std::fs::File,
        size: u64,
        offset: u64,
    ) -> Result<u64, NetError> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = file.try_clone().map_err(NetError::TransmitError)?;
        file.seek(SeekFrom::Start(offset)).map_err(NetError::TransmitError)?;
        let mut remaining = size;
        let mut buf = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = file.read(&mut buf[..want]).map_err(NetError::TransmitError)?;
            if n == 0 {
                break;
            }
            let mut sent = 0;
            while sent < n {
                sent += match self.stream.write(&buf[sent..n]).await {
                    Ok(n) => n,
                    Err(e) if is_closed_pipe(&e) => return Err(NetError::ReceiverClosed),
                    Err(e) => return Err(NetError::TransmitError(e)),
                };
            }
            remaining -= n as u64;
        }
        Ok(size - remaining)
    }

    pub fn shutdown(&self, how: std::net::Shutdown) -> Result<(), NetError> {
        self.basic.shutdown(how)
    }

    pub fn close(&self) {
        self.basic.close();
    }
}

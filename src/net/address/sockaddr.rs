//! `SockAddr`: an address plus a 16-bit port. Spec §3.1, §6.4.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use super::ipv4::Ipv4Addr;
use super::ipv6::Ipv6Addr;
use crate::net::error::NetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpAddr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl fmt::Display for IpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddr::V4(a) => write!(f, "{a}"),
            IpAddr::V6(a) => write!(f, "{a}"),
        }
    }
}

impl IpAddr {
    /// Unwraps an IPv4-mapped IPv6 address down to its `V4` form;
    /// a plain V4 address or a non-mapped V6 address is unchanged.
    pub fn to_canonical(self) -> IpAddr {
        match self {
            IpAddr::V4(_) => self,
            IpAddr::V6(a) => a.to_canonical(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SockAddr {
    addr: IpAddr,
    port: u16,
}

impl SockAddr {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        SockAddr { addr, port }
    }

    pub fn v4(addr: Ipv4Addr, port: u16) -> Self {
        SockAddr::new(IpAddr::V4(addr), port)
    }

    pub fn v6(addr: Ipv6Addr, port: u16) -> Self {
        SockAddr::new(IpAddr::V6(addr), port)
    }

    pub fn addr(self) -> IpAddr {
        self.addr
    }

    pub fn port(self) -> u16 {
        self.port
    }

    pub fn to_std(self) -> SocketAddr {
        match self.addr {
            IpAddr::V4(a) => SocketAddr::new(std::net::IpAddr::V4(a.to_std()), self.port),
            IpAddr::V6(a) => SocketAddr::new(std::net::IpAddr::V6(a.to_std()), self.port),
        }
    }

    pub fn from_std(sa: SocketAddr) -> Self {
        match sa {
            SocketAddr::V4(v4) => SockAddr::v4(Ipv4Addr::from_std(*v4.ip()), v4.port()),
            SocketAddr::V6(v6) => SockAddr::v6(Ipv6Addr::from_std(*v6.ip()), v6.port()),
        }
    }
}

impl fmt::Display for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr {
            IpAddr::V4(a) => write!(f, "{a}:{}", self.port),
            IpAddr::V6(a) => write!(f, "[{a}]:{}", self.port),
        }
    }
}

impl FromStr for SockAddr {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sa: SocketAddr = s
            .parse()
            .map_err(|_| NetError::InvalidStrRepr(format!("invalid socket address {s:?}")))?;
        Ok(SockAddr::from_std(sa))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_v4() {
        let sa = SockAddr::from_str("127.0.0.1:8080").unwrap();
        assert_eq!(sa.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn round_trip_v6() {
        let sa = SockAddr::from_str("[::1]:8080").unwrap();
        assert_eq!(sa.port(), 8080);
        assert_eq!(sa.to_string(), "[::1]:8080");
    }
}

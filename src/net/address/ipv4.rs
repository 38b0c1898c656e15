//! IPv4 address value type. Spec §3.1, §4.1, §6.2.

use std::cmp::Ordering;
use std::fmt;
use std::net::ToSocketAddrs;
use std::str::FromStr;

use crate::net::error::NetError;

/// How a textual form is interpreted by [`Ipv4Addr::parse`].
///
/// Mirrors `original_source/pcomn_net/netsockets.h`'s parsing-mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Strict dotted-decimal only.
    OnlyDotDec,
    /// An empty string parses to `0.0.0.0`.
    AllowEmpty,
    /// If the string isn't a valid dotted form, resolve it as a hostname.
    /// A valid dotted form is still returned directly, without a DNS call.
    UseHostname,
}

/// A 32-bit IPv4 address, stored host-order internally.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Addr {
    bits: u32,
}

impl Ipv4Addr {
    pub const UNSPECIFIED: Ipv4Addr = Ipv4Addr { bits: 0 };
    pub const BROADCAST: Ipv4Addr = Ipv4Addr { bits: 0xFFFF_FFFF };
    pub const LOCALHOST: Ipv4Addr = Ipv4Addr { bits: 0x7F00_0001 };

    pub const fn from_octets(octets: [u8; 4]) -> Self {
        Ipv4Addr {
            bits: u32::from_be_bytes(octets),
        }
    }

    pub const fn from_u32_host(bits: u32) -> Self {
        Ipv4Addr { bits }
    }

    pub const fn to_u32_host(self) -> u32 {
        self.bits
    }

    pub fn from_std(addr: std::net::Ipv4Addr) -> Self {
        Ipv4Addr::from_octets(addr.octets())
    }

    pub fn to_std(self) -> std::net::Ipv4Addr {
        std::net::Ipv4Addr::from(self.bits.to_be_bytes())
    }

    /// Byte `i` in network order; `0` is the most significant byte.
    pub const fn octet(self, i: usize) -> u8 {
        self.bits.to_be_bytes()[i]
    }

    pub const fn octets(self) -> [u8; 4] {
        self.bits.to_be_bytes()
    }

    pub fn is_unspecified(self) -> bool {
        self.bits == 0
    }

    pub fn is_broadcast(self) -> bool {
        self.bits == 0xFFFF_FFFF
    }

    pub fn is_loopback(self) -> bool {
        self.octet(0) == 127
    }

    pub fn is_multicast(self) -> bool {
        (224..=239).contains(&self.octet(0))
    }

    /// Reverse DNS; never fails, falls back to the dotted-decimal form.
    pub fn hostname(self) -> String {
        reverse_lookup(std::net::IpAddr::V4(self.to_std())).unwrap_or_else(|| self.to_string())
    }

    pub fn parse(s: &str, mode: ParseMode) -> Result<Self, NetError> {
        if s.is_empty() && mode == ParseMode::AllowEmpty {
            return Ok(Ipv4Addr::UNSPECIFIED);
        }
        match parse_dotted_decimal(s) {
            Ok(addr) => Ok(addr),
            Err(e) => {
                if mode == ParseMode::UseHostname {
                    resolve_hostname(s)
                } else {
                    Err(e)
                }
            }
        }
    }
}

fn parse_dotted_decimal(s: &str) -> Result<Ipv4Addr, NetError> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 4 {
        return Err(NetError::InvalidStrRepr(format!(
            "not a dotted-decimal IPv4 address: {s:?}"
        )));
    }
    let mut octets = [0u8; 4];
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NetError::InvalidStrRepr(format!(
                "invalid octet {part:?} in {s:?}"
            )));
        }
        let value: u32 = part
            .parse()
            .map_err(|_| NetError::InvalidStrRepr(format!("invalid octet {part:?} in {s:?}")))?;
        if value > 255 {
            return Err(NetError::InvalidStrRepr(format!(
                "octet {part:?} out of range in {s:?}"
            )));
        }
        octets[i] = value as u8;
    }
    Ok(Ipv4Addr::from_octets(octets))
}

fn resolve_hostname(s: &str) -> Result<Ipv4Addr, NetError> {
    (s, 0u16)
        .to_socket_addrs()
        .map_err(NetError::SystemError)?
        .find_map(|sa| match sa.ip() {
            std::net::IpAddr::V4(v4) => Some(Ipv4Addr::from_std(v4)),
            std::net::IpAddr::V6(_) => None,
        })
        .ok_or_else(|| {
            NetError::SystemError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no A record for {s:?}"),
            ))
        })
}

/// Best-effort reverse DNS via `getnameinfo(3)`. Returns `None` on any
/// failure so callers can fall back to the dotted-decimal/canonical form.
pub(crate) fn reverse_lookup(ip: std::net::IpAddr) -> Option<String> {
    let sockaddr = std::net::SocketAddr::new(ip, 0);
    let sock2: socket2::SockAddr = sockaddr.into();
    let mut host = [0_i8; libc::NI_MAXHOST as usize];
    // SAFETY: `sock2` owns a valid sockaddr of the length we pass; `host`
    // is a correctly sized stack buffer and its length is passed through.
    let rc = unsafe {
        libc::getnameinfo(
            sock2.as_ptr(),
            sock2.len(),
            host.as_mut_ptr(),
            host.len() as libc::socklen_t,
            std::ptr::null_mut(),
            0,
            libc::NI_NAMEREQD,
        )
    };
    if rc != 0 {
        return None;
    }
    let cstr = unsafe { std::ffi::CStr::from_ptr(host.as_ptr()) };
    cstr.to_str().ok().map(str::to_owned)
}

impl fmt::Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.octets();
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl fmt::Debug for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ipv4Addr({self})")
    }
}

impl FromStr for Ipv4Addr {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ipv4Addr::parse(s, ParseMode::OnlyDotDec)
    }
}

impl PartialOrd for Ipv4Addr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ipv4Addr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bits.cmp(&other.bits)
    }
}

impl serde::Serialize for Ipv4Addr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Ipv4Addr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ipv4Addr::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for s in ["0.0.0.0", "255.255.255.255", "172.16.1.20", "10.0.0.1"] {
            let a = Ipv4Addr::from_str(s).unwrap();
            assert_eq!(a.to_string(), s);
        }
    }

    #[test]
    fn rejects_malformed() {
        assert!(Ipv4Addr::from_str("256.0.0.1").is_err());
        assert!(Ipv4Addr::from_str("1.2.3").is_err());
        assert!(Ipv4Addr::from_str("1.2.3.4.5").is_err());
        assert!(Ipv4Addr::from_str("").is_err());
        assert!(Ipv4Addr::from_str("-1.2.3.4").is_err());
    }

    #[test]
    fn allow_empty_mode() {
        assert_eq!(
            Ipv4Addr::parse("", ParseMode::AllowEmpty).unwrap(),
            Ipv4Addr::UNSPECIFIED
        );
        assert!(Ipv4Addr::parse("", ParseMode::OnlyDotDec).is_err());
    }

    #[test]
    fn use_hostname_mode_does_not_resolve_valid_dotted_form() {
        // A valid dotted form must short-circuit before any resolver call.
        let a = Ipv4Addr::parse("127.0.0.1", ParseMode::UseHostname).unwrap();
        assert_eq!(a, Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn octet_is_network_order() {
        let a = Ipv4Addr::from_octets([1, 2, 3, 4]);
        assert_eq!(a.octet(0), 1);
        assert_eq!(a.octet(3), 4);
    }

    #[test]
    fn ordering_is_over_u32() {
        let a = Ipv4Addr::from_octets([1, 0, 0, 0]);
        let b = Ipv4Addr::from_octets([1, 0, 0, 1]);
        assert!(a < b);
    }

    #[test]
    fn classification() {
        assert!(Ipv4Addr::LOCALHOST.is_loopback());
        assert!(Ipv4Addr::from_str("224.0.0.1").unwrap().is_multicast());
        assert!(Ipv4Addr::UNSPECIFIED.is_unspecified());
        assert!(Ipv4Addr::BROADCAST.is_broadcast());
    }
}

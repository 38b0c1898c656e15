//! CIDR subnet arithmetic, with cross-family matching. Spec §3.1, §4.1.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::ipv4::Ipv4Addr;
use super::ipv6::Ipv6Addr;
use crate::net::error::NetError;

fn netmask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix as u32)
    }
}

fn netmask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - prefix as u32)
    }
}

/// An IPv4 address plus prefix length. The stored address keeps its host
/// part intact; [`Ipv4Subnet::subnet_addr`] masks on demand (spec §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Subnet {
    address: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Subnet {
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, NetError> {
        if prefix_len > 32 {
            return Err(NetError::InvalidArgument(format!(
                "IPv4 prefix length {prefix_len} out of range 0..=32"
            )));
        }
        Ok(Ipv4Subnet {
            address,
            prefix_len,
        })
    }

    pub fn address(self) -> Ipv4Addr {
        self.address
    }

    pub fn prefix_len(self) -> u8 {
        self.prefix_len
    }

    pub fn netmask(self) -> Ipv4Addr {
        Ipv4Addr::from_u32_host(netmask_v4(self.prefix_len))
    }

    pub fn subnet_addr(self) -> Ipv4Addr {
        Ipv4Addr::from_u32_host(self.address.to_u32_host() & netmask_v4(self.prefix_len))
    }

    pub fn addr_range(self) -> (Ipv4Addr, Ipv4Addr) {
        let mask = netmask_v4(self.prefix_len);
        let first = self.address.to_u32_host() & mask;
        let last = first | !mask;
        (
            Ipv4Addr::from_u32_host(first),
            Ipv4Addr::from_u32_host(last),
        )
    }

    pub fn match_v4(self, addr: Ipv4Addr) -> bool {
        (addr.to_u32_host() & netmask_v4(self.prefix_len)) == self.subnet_addr().to_u32_host()
    }

    /// An IPv6 address matches iff it is IPv4-mapped and its embedded IPv4
    /// matches (spec §3.1/§4.1); a non-mapped address never matches.
    pub fn match_v6(self, addr: Ipv6Addr) -> bool {
        addr.is_ipv4_mapped() && self.match_v4(addr.to_ipv4())
    }
}

impl fmt::Display for Ipv4Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Subnet {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, prefix_str) = s.split_once('/').ok_or_else(|| {
            NetError::InvalidStrRepr(format!("missing `/prefix` in IPv4 subnet {s:?}"))
        })?;
        if addr_str.contains(':') {
            return Err(NetError::InvalidStrRepr(format!(
                "{s:?} is not an IPv4 subnet"
            )));
        }
        let address = Ipv4Addr::from_str(addr_str)?;
        let prefix_len: u8 = prefix_str.parse().map_err(|_| {
            NetError::InvalidStrRepr(format!("invalid prefix length {prefix_str:?} in {s:?}"))
        })?;
        Ipv4Subnet::new(address, prefix_len)
    }
}

impl PartialOrd for Ipv4Subnet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ipv4Subnet {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.subnet_addr(), self.prefix_len).cmp(&(other.subnet_addr(), other.prefix_len))
    }
}

/// An IPv6 address plus prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Subnet {
    address: Ipv6Addr,
    prefix_len: u8,
}

impl Ipv6Subnet {
    pub fn new(address: Ipv6Addr, prefix_len: u8) -> Result<Self, NetError> {
        if prefix_len > 128 {
            return Err(NetError::InvalidArgument(format!(
                "IPv6 prefix length {prefix_len} out of range 0..=128"
            )));
        }
        Ok(Ipv6Subnet {
            address,
            prefix_len,
        })
    }

    pub fn address(self) -> Ipv6Addr {
        self.address
    }

    pub fn prefix_len(self) -> u8 {
        self.prefix_len
    }

    pub fn netmask(self) -> Ipv6Addr {
        Ipv6Addr::from_octets(netmask_v6(self.prefix_len).to_be_bytes())
    }

    pub fn subnet_addr(self) -> Ipv6Addr {
        let addr_bits = u128::from_be_bytes(self.address.octets());
        Ipv6Addr::from_octets((addr_bits & netmask_v6(self.prefix_len)).to_be_bytes())
    }

    pub fn addr_range(self) -> (Ipv6Addr, Ipv6Addr) {
        let mask = netmask_v6(self.prefix_len);
        let addr_bits = u128::from_be_bytes(self.address.octets());
        let first = addr_bits & mask;
        let last = first | !mask;
        (
            Ipv6Addr::from_octets(first.to_be_bytes()),
            Ipv6Addr::from_octets(last.to_be_bytes()),
        )
    }

    pub fn match_addr(self, addr: Ipv6Addr) -> bool {
        let mask = netmask_v6(self.prefix_len);
        let bits = u128::from_be_bytes(addr.octets());
        let subnet_bits = u128::from_be_bytes(self.subnet_addr().octets());
        (bits & mask) == subnet_bits
    }
}

impl fmt::Display for Ipv6Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv6Subnet {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, prefix_str) = s.split_once('/').ok_or_else(|| {
            NetError::InvalidStrRepr(format!("missing `/prefix` in IPv6 subnet {s:?}"))
        })?;
        if !addr_str.contains(':') {
            return Err(NetError::InvalidStrRepr(format!(
                "{s:?} is not an IPv6 subnet"
            )));
        }
        let address = Ipv6Addr::from_str(addr_str)?;
        let prefix_len: u8 = prefix_str.parse().map_err(|_| {
            NetError::InvalidStrRepr(format!("invalid prefix length {prefix_str:?} in {s:?}"))
        })?;
        Ipv6Subnet::new(address, prefix_len)
    }
}

impl PartialOrd for Ipv6Subnet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ipv6Subnet {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.subnet_addr(), self.prefix_len).cmp(&(other.subnet_addr(), other.prefix_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_subnet_match() {
        let sub = Ipv4Subnet::from_str("172.16.1.0/12").unwrap();
        assert!(sub.match_v4(Ipv4Addr::from_str("172.16.1.20").unwrap()));
        assert!(!sub.match_v4(Ipv4Addr::from_str("172.48.1.1").unwrap()));
    }

    #[test]
    fn ipv4_mapped_ipv6_matched_by_ipv4_subnet() {
        let sub = Ipv4Subnet::from_str("1.2.3.4/32").unwrap();
        assert!(sub.match_v6(Ipv6Addr::from_str("::ffff:1.2.3.4").unwrap()));
        assert!(!sub.match_v6(Ipv6Addr::from_str("::1.2.3.4").unwrap()));
    }

    #[test]
    fn rejects_wrong_family_text() {
        assert!(Ipv6Subnet::from_str("1.2.3.4/24").is_err());
        assert!(Ipv4Subnet::from_str("::1/64").is_err());
    }

    #[test]
    fn rejects_out_of_range_prefix() {
        assert!(Ipv4Subnet::new(Ipv4Addr::UNSPECIFIED, 33).is_err());
        assert!(Ipv6Subnet::new(Ipv6Addr::UNSPECIFIED, 129).is_err());
    }

    #[test]
    fn addr_range() {
        let sub = Ipv4Subnet::from_str("10.0.0.5/24").unwrap();
        let (first, last) = sub.addr_range();
        assert_eq!(first, Ipv4Addr::from_str("10.0.0.0").unwrap());
        assert_eq!(last, Ipv4Addr::from_str("10.0.0.255").unwrap());
    }

    #[test]
    fn subnet_ordering() {
        let a = Ipv4Subnet::from_str("10.0.0.0/24").unwrap();
        let b = Ipv4Subnet::from_str("10.0.1.0/24").unwrap();
        assert!(a < b);
    }
}

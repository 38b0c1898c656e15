//! IPv6 address value type. Spec §3.1, §4.1, §6.2.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::ipv4::Ipv4Addr;
use crate::net::error::NetError;

/// Controls whether an embedded IPv4 dotted-decimal tail is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ipv6ParseMode {
    /// RFC 5952 canonical form, `::` compression, and an embedded
    /// dotted-decimal IPv4 tail are all accepted.
    Standard,
    /// Reject a trailing dotted-decimal quad outright.
    IgnoreDotDec,
}

/// A 128-bit IPv6 address, stored as eight 16-bit groups.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv6Addr {
    groups: [u16; 8],
}

impl Ipv6Addr {
    pub const UNSPECIFIED: Ipv6Addr = Ipv6Addr { groups: [0; 8] };
    pub const LOOPBACK: Ipv6Addr = Ipv6Addr {
        groups: [0, 0, 0, 0, 0, 0, 0, 1],
    };

    pub const fn from_segments(groups: [u16; 8]) -> Self {
        Ipv6Addr { groups }
    }

    pub fn from_octets(bytes: [u8; 16]) -> Self {
        let mut groups = [0u16; 8];
        for i in 0..8 {
            groups[i] = u16::from_be_bytes([bytes[2 * i], bytes[2 * i + 1]]);
        }
        Ipv6Addr { groups }
    }

    pub fn octets(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        for (i, g) in self.groups.iter().enumerate() {
            let b = g.to_be_bytes();
            out[2 * i] = b[0];
            out[2 * i + 1] = b[1];
        }
        out
    }

    pub const fn segments(self) -> [u16; 8] {
        self.groups
    }

    pub fn from_std(addr: std::net::Ipv6Addr) -> Self {
        Ipv6Addr::from_octets(addr.octets())
    }

    pub fn to_std(self) -> std::net::Ipv6Addr {
        std::net::Ipv6Addr::from(self.octets())
    }

    pub fn is_unspecified(self) -> bool {
        self.groups == [0; 8]
    }

    pub fn is_loopback(self) -> bool {
        self == Ipv6Addr::LOOPBACK
    }

    pub fn is_multicast(self) -> bool {
        (self.groups[0] & 0xFF00) == 0xFF00
    }

    /// True iff the high 80 bits are zero and the next 16 bits are
    /// `0xFFFF` (spec §3.1/§4.1). The all-zero address is *not* considered
    /// mapped, even though `::ffff:0.0.0.0` is — they are distinct values.
    pub fn is_ipv4_mapped(self) -> bool {
        self.groups[0..5] == [0, 0, 0, 0, 0] && self.groups[5] == 0xFFFF
    }

    /// The embedded IPv4 address if this is IPv4-mapped, otherwise the
    /// zero address (never an error — spec §4.1).
    pub fn to_ipv4(self) -> Ipv4Addr {
        if self.is_ipv4_mapped() {
            let o = self.octets();
            Ipv4Addr::from_octets([o[12], o[13], o[14], o[15]])
        } else {
            Ipv4Addr::UNSPECIFIED
        }
    }

    pub fn map_ipv4(v4: Ipv4Addr) -> Self {
        let o = v4.octets();
        Ipv6Addr::from_octets([
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, o[0], o[1], o[2], o[3],
        ])
    }

    /// Strips the IPv4-mapped wrapper for display/logging: an
    /// `::ffff:a.b.c.d` address canonicalizes to its embedded
    /// [`IpAddr::V4`]; anything else canonicalizes to itself
    /// (spec §3.1 supplement, `pcomn_net` dual-stack normalization).
    pub fn to_canonical(self) -> super::sockaddr::IpAddr {
        if self.is_ipv4_mapped() {
            super::sockaddr::IpAddr::V4(self.to_ipv4())
        } else {
            super::sockaddr::IpAddr::V6(self)
        }
    }

    pub fn parse(s: &str, mode: Ipv6ParseMode) -> Result<Self, NetError> {
        parse_ipv6(s, mode)
    }

    /// Longest run (length >= 2) of zero groups; ties go to the first run.
    fn best_zero_run(self) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize)> = None;
        let mut run_start = None;
        for i in 0..=8 {
            let is_zero = i < 8 && self.groups[i] == 0;
            match (is_zero, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(start)) => {
                    let len = i - start;
                    if len >= 2 && best.map(|(_, blen)| len > blen).unwrap_or(true) {
                        best = Some((start, len));
                    }
                    run_start = None;
                }
                _ => {}
            }
        }
        best
    }
}

fn invalid(msg: impl Into<String>) -> NetError {
    NetError::InvalidStrRepr(msg.into())
}

fn parse_hex_group(g: &str) -> Result<u16, NetError> {
    if g.is_empty() || g.len() > 4 || !g.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid(format!("invalid IPv6 group {g:?}")));
    }
    u16::from_str_radix(g, 16).map_err(|_| invalid(format!("invalid IPv6 group {g:?}")))
}

fn expand_side(groups: &[&str], ipv4_tail: bool) -> Result<Vec<u16>, NetError> {
    let mut out = Vec::with_capacity(groups.len() + 1);
    for (i, g) in groups.iter().enumerate() {
        if ipv4_tail && i == groups.len() - 1 {
            let v4 = Ipv4Addr::parse(g, super::ipv4::ParseMode::OnlyDotDec)?;
            let bits = v4.to_u32_host();
            out.push((bits >> 16) as u16);
            out.push((bits & 0xFFFF) as u16);
        } else {
            out.push(parse_hex_group(g)?);
        }
    }
    Ok(out)
}

fn parse_ipv6(s: &str, mode: Ipv6ParseMode) -> Result<Ipv6Addr, NetError> {
    if s.is_empty() {
        return Err(invalid("empty IPv6 address"));
    }

    let (left_str, right_str, compress) = match s.find("::") {
        Some(idx) => {
            let left = &s[..idx];
            let right = &s[idx + 2..];
            if right.contains("::") {
                return Err(invalid(format!("more than one `::` in {s:?}")));
            }
            (left, right, true)
        }
        None => (s, "", false),
    };

    if compress {
        if left_str.starts_with(':') || left_str.ends_with(':') || right_str.starts_with(':') {
            return Err(invalid(format!("malformed `::` compression in {s:?}")));
        }
    } else if left_str.starts_with(':') || left_str.ends_with(':') {
        return Err(invalid(format!("leading or trailing colon in {s:?}")));
    }
    if right_str.ends_with(':') {
        return Err(invalid(format!("trailing colon in {s:?}")));
    }

    let left_groups: Vec<&str> = if left_str.is_empty() {
        vec![]
    } else {
        left_str.split(':').collect()
    };
    let right_groups: Vec<&str> = if right_str.is_empty() {
        vec![]
    } else {
        right_str.split(':').collect()
    };

    let ipv4_tail_in_right = right_groups.last().is_some_and(|g| g.contains('.'));
    let ipv4_tail_in_left =
        !compress && !ipv4_tail_in_right && left_groups.last().is_some_and(|g| g.contains('.'));
    if (ipv4_tail_in_right || ipv4_tail_in_left) && mode == Ipv6ParseMode::IgnoreDotDec {
        return Err(invalid(format!(
            "embedded IPv4 tail rejected by IGNORE_DOTDEC in {s:?}"
        )));
    }

    let left_vals = expand_side(&left_groups, ipv4_tail_in_left)?;
    let right_vals = expand_side(&right_groups, ipv4_tail_in_right)?;

    let groups: Vec<u16> = if compress {
        let total = left_vals.len() + right_vals.len();
        if total > 8 {
            return Err(invalid(format!("too many groups in {s:?}")));
        }
        let zeros = 8 - total;
        let mut full = Vec::with_capacity(8);
        full.extend_from_slice(&left_vals);
        full.extend(std::iter::repeat_n(0u16, zeros));
        full.extend_from_slice(&right_vals);
        full
    } else {
        if left_vals.len() != 8 {
            return Err(invalid(format!(
                "expected 8 groups, found {} in {s:?}",
                left_vals.len()
            )));
        }
        left_vals
    };

    let mut array = [0u16; 8];
    array.copy_from_slice(&groups);
    Ok(Ipv6Addr::from_segments(array))
}

impl fmt::Display for Ipv6Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv4_mapped() {
            let v4 = self.to_ipv4();
            return write!(f, "::ffff:{v4}");
        }
        match self.best_zero_run() {
            Some((start, len)) => {
                let before = &self.groups[..start];
                let after = &self.groups[start + len..];
                let fmt_side = |side: &[u16]| {
                    side.iter()
                        .map(|g| format!("{g:x}"))
                        .collect::<Vec<_>>()
                        .join(":")
                };
                write!(f, "{}::{}", fmt_side(before), fmt_side(after))
            }
            None => {
                let s = self
                    .groups
                    .iter()
                    .map(|g| format!("{g:x}"))
                    .collect::<Vec<_>>()
                    .join(":");
                write!(f, "{s}")
            }
        }
    }
}

impl fmt::Debug for Ipv6Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ipv6Addr({self})")
    }
}

impl FromStr for Ipv6Addr {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ipv6Addr::parse(s, Ipv6ParseMode::Standard)
    }
}

impl PartialOrd for Ipv6Addr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ipv6Addr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.groups.cmp(&other.groups)
    }
}

impl serde::Serialize for Ipv6Addr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Ipv6Addr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ipv6Addr::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_full_form() {
        let s = "2001:db8:0:0:0:0:0:1";
        let a = Ipv6Addr::from_str(s).unwrap();
        assert_eq!(a.to_string(), "2001:db8::1");
    }

    #[test]
    fn unspecified_and_loopback() {
        assert_eq!(Ipv6Addr::from_str("::").unwrap(), Ipv6Addr::UNSPECIFIED);
        assert_eq!(Ipv6Addr::from_str("::1").unwrap(), Ipv6Addr::LOOPBACK);
        assert_eq!(Ipv6Addr::UNSPECIFIED.to_string(), "::");
        assert_eq!(Ipv6Addr::LOOPBACK.to_string(), "::1");
    }

    #[test]
    fn ipv4_mapped() {
        let a = Ipv6Addr::from_str("::ffff:1.2.3.4").unwrap();
        assert!(a.is_ipv4_mapped());
        assert_eq!(a.to_ipv4(), Ipv4Addr::from_octets([1, 2, 3, 4]));
        assert_eq!(a.to_string(), "::ffff:1.2.3.4");

        let not_mapped = Ipv6Addr::from_str("::1.2.3.4").unwrap();
        assert!(!not_mapped.is_ipv4_mapped());
        assert_eq!(not_mapped.to_ipv4(), Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn unspecified_is_not_ipv4_mapped_unspecified() {
        let mapped_unspec = Ipv6Addr::from_str("::ffff:0.0.0.0").unwrap();
        assert!(mapped_unspec.is_ipv4_mapped());
        assert_ne!(mapped_unspec, Ipv6Addr::UNSPECIFIED);
    }

    #[test]
    fn ignore_dotdec_rejects_tail() {
        assert!(Ipv6Addr::parse("::ffff:1.2.3.4", Ipv6ParseMode::IgnoreDotDec).is_err());
        assert!(Ipv6Addr::parse("::1", Ipv6ParseMode::IgnoreDotDec).is_ok());
    }

    #[test]
    fn rejects_two_compressions() {
        assert!(Ipv6Addr::from_str("1::2::3").is_err());
    }

    #[test]
    fn rejects_trailing_colon() {
        assert!(Ipv6Addr::from_str("1:2:3:4:5:6:7:8:").is_err());
        assert!(Ipv6Addr::from_str("::1:").is_err());
    }

    #[test]
    fn rejects_oversized_group() {
        assert!(Ipv6Addr::from_str("12345::1").is_err());
    }

    #[test]
    fn to_canonical_strips_ipv4_mapped_wrapper() {
        let mapped = Ipv6Addr::from_str("::ffff:192.0.2.1").unwrap();
        assert_eq!(
            mapped.to_canonical(),
            super::super::sockaddr::IpAddr::V4(Ipv4Addr::from_octets([192, 0, 2, 1]))
        );

        let plain = Ipv6Addr::from_str("2001:db8::1").unwrap();
        assert_eq!(plain.to_canonical(), super::super::sockaddr::IpAddr::V6(plain));
    }

    #[test]
    fn canonical_form_picks_first_longest_run() {
        // Two zero runs of equal length (two groups each): first wins.
        let a = Ipv6Addr::from_segments([1, 0, 0, 2, 0, 0, 3, 4]);
        assert_eq!(a.to_string(), "1::2:0:0:3:4");
    }
}

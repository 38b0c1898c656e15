//! Dual-stack address model: pure value types, parsers, formatters, and
//! range arithmetic (spec §3.1, §4.1). Grounded on
//! `aws-s2n-quic-core::inet::{ipv4,ipv6}` for structure and on
//! `original_source/pcomn_net` for exact parsing-mode semantics.

mod ipv4;
mod ipv6;
mod sockaddr;
mod subnet;

pub use ipv4::{Ipv4Addr, ParseMode as Ipv4ParseMode};
pub use ipv6::{Ipv6Addr, Ipv6ParseMode};
pub use sockaddr::{IpAddr, SockAddr};
pub use subnet::{Ipv4Subnet, Ipv6Subnet};

// ringtun - peer-to-peer IP tunnel daemon core
// Copyright (C) 2026  ringtun contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Fixed-width network addresses, wide enough to hold an IPv6 address,
//! used as the key into every peer/socket lookup.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const NET_ADDR_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

/// Opaque 16-byte address key. IPv4 addresses occupy the first 4 bytes;
/// the remaining 12 stay zero. Two addresses compare equal iff they
/// represent the same host at the same family.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetAddress {
    bytes: [u8; NET_ADDR_LEN],
    family: AddressFamily,
}

impl NetAddress {
    pub fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Self::from_v4(v4),
            IpAddr::V6(v6) => Self::from_v6(v6),
        }
    }

    pub fn from_v4(addr: Ipv4Addr) -> Self {
        let mut bytes = [0u8; NET_ADDR_LEN];
        bytes[..4].copy_from_slice(&addr.octets());
        Self {
            bytes,
            family: AddressFamily::V4,
        }
    }

    pub fn from_v6(addr: Ipv6Addr) -> Self {
        Self {
            bytes: addr.octets(),
            family: AddressFamily::V6,
        }
    }

    /// Builds a NetAddress straight from the bytes as they sit in an IPv4
    /// header's destination field (no validation beyond length).
    pub fn from_ipv4_header_bytes(field: &[u8; 4]) -> Self {
        Self::from_v4(Ipv4Addr::from(*field))
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn as_bytes(&self) -> &[u8; NET_ADDR_LEN] {
        &self.bytes
    }

    pub fn to_ip(&self) -> IpAddr {
        match self.family {
            AddressFamily::V4 => {
                let mut v4 = [0u8; 4];
                v4.copy_from_slice(&self.bytes[..4]);
                IpAddr::V4(Ipv4Addr::from(v4))
            }
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(self.bytes)),
        }
    }

    /// Strict bytewise-unsigned greater-than over the full zero-padded
    /// 16-byte representation, regardless of family. Both ends must agree
    /// on the zero-padding convention above for this to be meaningful
    /// across families.
    pub fn strictly_greater_than(&self, other: &NetAddress) -> bool {
        self.bytes > other.bytes
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ip())
    }
}

impl fmt::Debug for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetAddress({})", self.to_ip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_padding_is_zero() {
        let a = NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(&a.as_bytes()[4..], &[0u8; 12]);
    }

    #[test]
    fn equal_iff_same_host_and_family() {
        let a = NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, 1));
        let b = NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, 1));
        let c = NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn strict_greater_matches_bytewise_memcmp() {
        let a = NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, 1));
        let b = NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, 2));
        assert!(b.strictly_greater_than(&a));
        assert!(!a.strictly_greater_than(&b));
        assert!(!a.strictly_greater_than(&a));
    }

    #[test]
    fn display_roundtrips_through_ip() {
        let a = NetAddress::from_v4(Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(a.to_string(), "192.168.1.1");
    }
}

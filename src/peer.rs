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

//! A peer known from the peer file but not (yet) carrying a live
//! connection.

use std::net::IpAddr;

use crate::addr::NetAddress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassivePeer {
    pub addr: NetAddress,
    /// The hostname or literal address as it appeared in the peer file,
    /// kept around so reconciliation can re-resolve it.
    pub host: String,
    pub port: u16,
}

impl PassivePeer {
    pub fn new(host: String, port: u16, resolved: IpAddr) -> Self {
        Self {
            addr: NetAddress::from_ip(resolved),
            host,
            port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn passive_peer_carries_resolved_address() {
        let p = PassivePeer::new("peer.example".into(), 7000, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(p.addr, NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(p.port, 7000);
    }
}

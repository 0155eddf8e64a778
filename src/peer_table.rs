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

//! Indexes peers by address across their three possible states: known
//! but unconnected, live with a socket, or known and not currently
//! connected (disconnected).

use std::collections::{HashMap, HashSet};

use mio::Token;

use crate::addr::NetAddress;
use crate::peer::PassivePeer;

#[derive(Default)]
pub struct PeerTable {
    /// Peers read from the peer file, keyed by resolved address.
    pub passive: HashMap<NetAddress, PassivePeer>,
    /// Address -> slab token of the live `Socket::Connection` for that
    /// peer, if one is currently established.
    pub live: HashMap<NetAddress, Token>,
    /// Passive peers with no live connection right now, either because
    /// one was never established or because it died and is awaiting a
    /// future reconnect attempt.
    pub disconnected: HashSet<NetAddress>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self, addr: &NetAddress) -> bool {
        self.live.contains_key(addr)
    }

    pub fn mark_live(&mut self, addr: NetAddress, token: Token) {
        self.disconnected.remove(&addr);
        self.live.insert(addr, token);
    }

    pub fn mark_disconnected(&mut self, addr: NetAddress) {
        self.live.remove(&addr);
        self.disconnected.insert(addr);
    }

    pub fn token_for(&self, addr: &NetAddress) -> Option<Token> {
        self.live.get(addr).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(n: u8) -> NetAddress {
        NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, n))
    }

    #[test]
    fn mark_live_clears_disconnected() {
        let mut t = PeerTable::new();
        t.mark_disconnected(addr(1));
        assert!(t.disconnected.contains(&addr(1)));
        t.mark_live(addr(1), Token(3));
        assert!(!t.disconnected.contains(&addr(1)));
        assert_eq!(t.token_for(&addr(1)), Some(Token(3)));
    }
}

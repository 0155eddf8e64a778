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

//! Everything the event loop threads through a single readiness pass:
//! the socket slab, the peer table, the tun backlog, and our own
//! configured addresses.

use std::path::PathBuf;

use mio::{Poll, Token};
use slab::Slab;

use crate::addr::NetAddress;
use crate::counters::Counters;
use crate::peer_table::PeerTable;
use crate::route::RouteManager;
use crate::socket::Socket;

pub struct IoContext<R: RouteManager> {
    pub poll: Poll,
    pub sockets: Slab<Socket>,
    pub tun_token: Token,
    pub peers: PeerTable,
    pub route_manager: R,
    pub address_set: String,
    pub self_addrs: Vec<NetAddress>,
    pub peer_file: PathBuf,
    pub listener_port: u16,
    pub conn_ring_bytes: usize,
    pub counters: Counters,
}

impl<R: RouteManager> IoContext<R> {
    /// Maps a slab key to the `mio::Token` used in readiness events; the
    /// two are the same integer space, kept as distinct types for
    /// clarity at call sites.
    pub fn token_of(key: usize) -> Token {
        Token(key)
    }

    pub fn key_of(token: Token) -> usize {
        token.0
    }

    pub fn insert_socket(&mut self, socket: Socket) -> Token {
        let key = self.sockets.insert(socket);
        Self::token_of(key)
    }

    pub fn remove_socket(&mut self, token: Token) -> Option<Socket> {
        let key = Self::key_of(token);
        if self.sockets.contains(key) {
            Some(self.sockets.remove(key))
        } else {
            None
        }
    }
}

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

use std::path::PathBuf;

use serde::Deserialize;

fn default_conn_ring_bytes() -> usize {
    128 * 1024
}

fn default_tun_ring_bytes() -> usize {
    4 * 1024 * 1024
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(rename(deserialize = "General"))]
    pub general: General,
}

#[derive(Deserialize, Debug)]
pub struct General {
    /// IPv4 address this host is known as to its peers.
    ///
    /// At least one of `self_addr_v4`/`self_addr_v6` must be set.
    pub self_addr_v4: Option<String>,

    /// IPv6 address this host is known as to its peers.
    pub self_addr_v6: Option<String>,

    /// TCP port the peer listener binds and peers are dialed on.
    pub listener_port: u16,

    /// Path to the peer file, re-read on every reload.
    pub peer_file: PathBuf,

    /// Name of the kernel address-set the route manager adds/removes peer
    /// addresses from.
    pub address_set: String,

    /// Capacity, in bytes, of each connection's rx and tx ring.
    #[serde(default = "default_conn_ring_bytes")]
    pub conn_ring_bytes: usize,

    /// Capacity, in bytes, of the single shared tun tx backlog ring.
    #[serde(default = "default_tun_ring_bytes")]
    pub tun_ring_bytes: usize,
}

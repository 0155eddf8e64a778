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

//! Core of a peer-to-peer IP tunnel daemon: a single-threaded event loop
//! that shuttles L3 packets between a tun device and a mesh of TCP
//! connections to other instances of itself, reconciling the mesh
//! against a peer file on disk (see each module for its slice of it).

pub mod addr;
pub mod config;
pub mod context;
pub mod controls;
pub mod counters;
pub mod error;
pub mod event_loop;
pub mod framer;
pub mod peer;
pub mod peer_table;
pub mod reconcile;
pub mod ring;
pub mod route;
pub mod socket;

use std::os::fd::RawFd;

use error::RingtunResult;
use event_loop::EventLoop;
use reconcile::StdResolver;
use route::IpsetRouteManager;

/// Runs the daemon to completion (until a stop signal is observed).
pub fn run(config: &config::Config, tun_fd: RawFd) -> RingtunResult<()> {
    let mut event_loop = EventLoop::new(config, tun_fd, IpsetRouteManager::new(), StdResolver)?;
    event_loop.run()
}

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

//! Reloads the peer file and reconciles it against the live peer table:
//! resolves hosts, drops peers no longer listed, and decides which side
//! of a pair initiates the outbound connection.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::net::{IpAddr, ToSocketAddrs};
use std::path::Path;

use crate::addr::{AddressFamily, NetAddress};
use crate::peer::PassivePeer;
use crate::peer_table::PeerTable;

/// Hostname resolution, pulled behind a trait so reconciliation logic
/// can be tested against a fixed table instead of the real resolver.
pub trait Resolver {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolves through the OS stub resolver via `ToSocketAddrs`, the same
/// path `std::net::TcpStream::connect` would use.
pub struct StdResolver;

impl Resolver for StdResolver {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        // Port is irrelevant for resolution; `ToSocketAddrs` needs one.
        let addrs = (host, 0u16).to_socket_addrs()?;
        Ok(addrs.map(|sa| sa.ip()).collect())
    }
}

/// One line from the peer file: a bare host specifier, IP or DNS name.
/// The port always comes from the daemon's own configured listener
/// port, never from the line itself. Blank lines and `#`-prefixed
/// comments are skipped.
fn parse_peer_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line)
}

/// The outcome of one reconciliation pass: who to connect out to, and
/// who to tear down.
pub struct ReconcileResult {
    /// Peers that should have an outbound connection attempted, because
    /// this process's self-address is the strictly-greater of the pair
    /// and no live connection exists yet.
    pub connect_to: Vec<PassivePeer>,
    /// Live peers no longer present in the reloaded file.
    pub drop_addrs: Vec<NetAddress>,
}

pub struct PeerReconciler<R: Resolver> {
    resolver: R,
}

impl<R: Resolver> PeerReconciler<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Reads `peer_file`, resolves every host, and compares the result
    /// against `table.passive` and `table.live` to decide what changed.
    /// `self_addrs` holds this process's own configured address(es); a
    /// peer whose family has no corresponding self-address is skipped,
    /// via two explicit `&&`-joined conditions rather than an
    /// easily-miswritten single boolean expression.
    pub fn reconcile(
        &self,
        peer_file: &Path,
        table: &mut PeerTable,
        self_addrs: &[NetAddress],
        listener_port: u16,
    ) -> io::Result<ReconcileResult> {
        let contents = fs::read_to_string(peer_file)?;
        let mut fresh: Vec<PassivePeer> = Vec::new();
        let mut fresh_addrs: HashSet<NetAddress> = HashSet::new();

        for line in contents.lines() {
            let Some(host) = parse_peer_line(line) else {
                continue;
            };
            let port = listener_port;
            let resolved = match self.resolver.resolve(host) {
                Ok(ips) if !ips.is_empty() => ips,
                Ok(_) => {
                    log::warn!("peer host {} resolved to no addresses", host);
                    continue;
                }
                Err(e) => {
                    log::warn!("failed to resolve peer host {}: {}", host, e);
                    continue;
                }
            };

            for ip in resolved {
                let family_has_self = self_addrs.iter().any(|a| {
                    a.family()
                        == match ip {
                            IpAddr::V4(_) => AddressFamily::V4,
                            IpAddr::V6(_) => AddressFamily::V6,
                        }
                });
                let is_self = self_addrs.iter().any(|a| a.to_ip() == ip);
                if family_has_self && !is_self {
                    let peer = PassivePeer::new(host.to_string(), port, ip);
                    fresh_addrs.insert(peer.addr);
                    fresh.push(peer);
                }
            }
        }

        let drop_addrs: Vec<NetAddress> = table
            .passive
            .keys()
            .filter(|a| !fresh_addrs.contains(a))
            .copied()
            .collect();

        table.passive.retain(|a, _| fresh_addrs.contains(a));
        for peer in &fresh {
            table.passive.insert(peer.addr, peer.clone());
        }

        let connect_to: Vec<PassivePeer> = fresh
            .into_iter()
            .filter(|p| !table.is_live(&p.addr))
            .filter(|p| {
                self_addrs
                    .iter()
                    .filter(|s| s.family() == p.addr.family())
                    .any(|s| s.strictly_greater_than(&p.addr))
            })
            .collect();

        Ok(ReconcileResult {
            connect_to,
            drop_addrs,
        })
    }
}

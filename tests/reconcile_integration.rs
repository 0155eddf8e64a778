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

//! Exercises a full reload/reconcile/route cycle against fakes for
//! DNS and the kernel route set, the way the core is meant to be tested
//! without root or a real network.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};

use ringtun::addr::NetAddress;
use ringtun::peer_table::PeerTable;
use ringtun::reconcile::{PeerReconciler, Resolver};
use ringtun::route::{RecordingRouteManager, RouteManager};

struct FixedResolver(HashMap<&'static str, Vec<IpAddr>>);

impl Resolver for FixedResolver {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.0
            .get(host)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown host in test fixture"))
    }
}

static FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn write_peer_file(contents: &str) -> std::path::PathBuf {
    let id = FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "ringtun-integration-peers-{}-{}",
        std::process::id(),
        id
    ));
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn new_higher_peer_triggers_connect_and_route_add() {
    let mut hosts = HashMap::new();
    hosts.insert("node-b", vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))]);
    let reconciler = PeerReconciler::new(FixedResolver(hosts));

    let peer_file = write_peer_file("node-b\n");
    let mut table = PeerTable::new();
    let self_addrs = vec![NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, 200))];

    let result = reconciler
        .reconcile(&peer_file, &mut table, &self_addrs, 7000)
        .expect("reconcile should succeed");

    assert_eq!(result.connect_to.len(), 1);
    assert!(result.drop_addrs.is_empty());

    let mut routes = RecordingRouteManager::new();
    for peer in &result.connect_to {
        routes.add("peers", &peer.addr).unwrap();
    }
    assert_eq!(routes.added.len(), 1);

    let _ = fs::remove_file(&peer_file);
}

#[test]
fn peer_removed_from_file_is_torn_down_and_route_dropped() {
    let reconciler = PeerReconciler::new(FixedResolver(HashMap::new()));

    let peer_file = write_peer_file("");
    let mut table = PeerTable::new();
    let stale = NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, 9));
    table
        .passive
        .insert(stale, ringtun::peer::PassivePeer::new("gone".into(), 1, stale.to_ip()));

    let self_addrs = vec![NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, 200))];
    let result = reconciler
        .reconcile(&peer_file, &mut table, &self_addrs, 7000)
        .expect("reconcile should succeed");

    assert_eq!(result.drop_addrs, vec![stale]);

    let mut routes = RecordingRouteManager::new();
    for addr in &result.drop_addrs {
        routes.remove("peers", addr).unwrap();
    }
    assert_eq!(routes.removed, vec![("peers".to_string(), stale)]);

    let _ = fs::remove_file(&peer_file);
}

#[test]
fn malformed_lines_in_peer_file_are_skipped_not_fatal() {
    let mut hosts = HashMap::new();
    hosts.insert("node-b", vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))]);
    let reconciler = PeerReconciler::new(FixedResolver(hosts));

    let peer_file = write_peer_file("# comment\n\nnode-b\nnot-a-resolvable-host\n");
    let mut table = PeerTable::new();
    let self_addrs = vec![NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, 200))];

    let result = reconciler
        .reconcile(&peer_file, &mut table, &self_addrs, 7000)
        .expect("malformed lines must not abort reconciliation");
    assert_eq!(result.connect_to.len(), 1);

    let _ = fs::remove_file(&peer_file);
}

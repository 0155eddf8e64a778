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

//! Installs and removes the kernel-side route that makes a peer's
//! address reachable only while its connection is live.
//!
//! Shells out to `ipset` through `std::process::Command` with the
//! address as a single argv element, never through a shell, so an
//! address string can never be interpreted as extra shell syntax.

use std::process::Command;

use crate::addr::NetAddress;

pub trait RouteManager {
    fn add(&mut self, set_name: &str, addr: &NetAddress) -> std::io::Result<()>;
    fn remove(&mut self, set_name: &str, addr: &NetAddress) -> std::io::Result<()>;
}

/// Drives the system `ipset` binary directly, argv-only.
pub struct IpsetRouteManager;

impl IpsetRouteManager {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, args: &[&str]) -> std::io::Result<std::process::ExitStatus> {
        Command::new("ipset").args(args).status()
    }
}

impl Default for IpsetRouteManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteManager for IpsetRouteManager {
    /// A non-zero exit is fatal to the caller's socket setup.
    fn add(&mut self, set_name: &str, addr: &NetAddress) -> std::io::Result<()> {
        let ip = addr.to_ip().to_string();
        let args = ["add", set_name, &ip, "-exist"];
        let status = self.run(&args)?;
        if !status.success() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("ipset {:?} exited with {}", args, status),
            ));
        }
        Ok(())
    }

    /// A non-zero exit here is logged and ignored, never surfaced to the
    /// caller.
    fn remove(&mut self, set_name: &str, addr: &NetAddress) -> std::io::Result<()> {
        let ip = addr.to_ip().to_string();
        let args = ["del", set_name, &ip, "-exist"];
        match self.run(&args) {
            Ok(status) if !status.success() => {
                log::warn!("ipset {:?} exited with {}", args, status);
            }
            Err(e) => log::warn!("failed to run ipset {:?}: {}", args, e),
            Ok(_) => {}
        }
        Ok(())
    }
}

/// Test double that records calls instead of touching the kernel.
#[derive(Default)]
pub struct RecordingRouteManager {
    pub added: Vec<(String, NetAddress)>,
    pub removed: Vec<(String, NetAddress)>,
}

impl RecordingRouteManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RouteManager for RecordingRouteManager {
    fn add(&mut self, set_name: &str, addr: &NetAddress) -> std::io::Result<()> {
        self.added.push((set_name.to_string(), *addr));
        Ok(())
    }

    fn remove(&mut self, set_name: &str, addr: &NetAddress) -> std::io::Result<()> {
        self.removed.push((set_name.to_string(), *addr));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn recording_manager_tracks_add_and_remove() {
        let mut mgr = RecordingRouteManager::new();
        let a = NetAddress::from_v4(Ipv4Addr::new(10, 0, 0, 1));
        mgr.add("peers", &a).unwrap();
        mgr.remove("peers", &a).unwrap();
        assert_eq!(mgr.added, vec![("peers".to_string(), a)]);
        assert_eq!(mgr.removed, vec![("peers".to_string(), a)]);
    }
}

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

//! Per-direction byte/packet/drop counters, logged periodically instead
//! of exported as a metrics endpoint.

use std::fmt;

#[derive(Debug, Default, Clone, Copy)]
pub struct Direction {
    pub bytes: u64,
    pub packets: u64,
    pub drops: u64,
    pub drop_bytes: u64,
}

impl Direction {
    pub fn record(&mut self, bytes: usize) {
        self.bytes += bytes as u64;
        self.packets += 1;
    }

    /// `bytes` is the size of the packet that could not be enqueued, so
    /// the drop-byte counter reflects the sum of dropped packet lengths.
    pub fn record_drop(&mut self, bytes: usize) {
        self.drops += 1;
        self.drop_bytes += bytes as u64;
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub tun_rx: Direction,
    pub tun_tx: Direction,
    pub world_rx: Direction,
    pub world_tx: Direction,
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tun_rx={}p/{}B tun_tx={}p/{}B world_rx={}p/{}B world_tx={}p/{}B \
             drops(tun_rx={}p/{}B,tun_tx={}p/{}B,world_rx={}p/{}B,world_tx={}p/{}B)",
            self.tun_rx.packets, self.tun_rx.bytes,
            self.tun_tx.packets, self.tun_tx.bytes,
            self.world_rx.packets, self.world_rx.bytes,
            self.world_tx.packets, self.world_tx.bytes,
            self.tun_rx.drops, self.tun_rx.drop_bytes,
            self.tun_tx.drops, self.tun_tx.drop_bytes,
            self.world_rx.drops, self.world_rx.drop_bytes,
            self.world_tx.drops, self.world_tx.drop_bytes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accumulates_bytes_and_packets() {
        let mut d = Direction::default();
        d.record(10);
        d.record(5);
        assert_eq!(d.bytes, 15);
        assert_eq!(d.packets, 2);
    }

    #[test]
    fn record_drop_tracks_count_and_bytes_separately_from_delivered() {
        let mut d = Direction::default();
        d.record_drop(1500);
        assert_eq!(d.drops, 1);
        assert_eq!(d.drop_bytes, 1500);
        assert_eq!(d.packets, 0);
        assert_eq!(d.bytes, 0);
    }
}

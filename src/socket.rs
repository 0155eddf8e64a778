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

//! The tagged socket variant: listener / connection / tun.

use std::os::fd::RawFd;

use mio::net::{TcpListener, TcpStream};

use crate::addr::{AddressFamily, NetAddress};
use crate::framer::TunPacketBuffer;
use crate::ring::RingBuffer;

pub const MAX_L3_PACKET_SIZE: usize = 0xFFFF;
const INITIAL_TUN_SCRATCH_SIZE: usize = 4096;

pub struct Connection {
    pub stream: TcpStream,
    pub peer: NetAddress,
    pub family: AddressFamily,
    pub outbound: bool,
    pub rx: RingBuffer,
    pub tx: RingBuffer,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        peer: NetAddress,
        family: AddressFamily,
        outbound: bool,
        ring_capacity: usize,
    ) -> Self {
        Self {
            stream,
            peer,
            family,
            outbound,
            rx: RingBuffer::new(ring_capacity),
            tx: RingBuffer::new(ring_capacity),
        }
    }

    pub fn raw_fd(&self) -> RawFd {
        use std::os::fd::AsRawFd;
        self.stream.as_raw_fd()
    }
}

/// The single process-wide tun device socket. Its tx ring is the shared
/// backlog referenced by every connection's tun-bound pusher.
pub struct TunSocket {
    pub fd: RawFd,
    pub tx: RingBuffer,
    pub read_scratch: Vec<u8>,
    pub write_scratch: TunPacketBuffer,
}

impl TunSocket {
    pub fn new(fd: RawFd, backlog_capacity: usize) -> Self {
        Self {
            fd,
            tx: RingBuffer::new(backlog_capacity),
            // Sized to the largest possible IPv4 packet up front: the tun
            // device hands back exactly one packet per read, so a
            // smaller, grow-on-demand buffer would risk truncating the
            // first oversized packet before it could grow.
            read_scratch: vec![0u8; MAX_L3_PACKET_SIZE],
            write_scratch: TunPacketBuffer::new(INITIAL_TUN_SCRATCH_SIZE),
        }
    }
}

pub enum Socket {
    Listener { listener: TcpListener, family: AddressFamily },
    Connection(Connection),
    Tun(TunSocket),
}

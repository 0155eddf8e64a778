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

//! Slices L3 packets out of ring buffers and routes them to the tun
//! device or to a peer connection.
//!
//! Every length read here is bounds-checked against the slice it reads
//! from, even when the caller "knows" enough bytes are present.

use std::io::{ErrorKind, IoSlice, Read, Write};
use std::os::fd::RawFd;

use crate::ring::IoOutcome;

/// Extracts the IPv4 total-length field (bytes 2-3, network order) from
/// an occupied region that may be split across the ring wrap. Returns 0
/// if not enough bytes are present yet to know the length.
///
/// Handled as three explicit, bounds-checked cases instead of an
/// unaligned pointer cast over the split spans.
pub fn parse_l3_packet_len(span_a: &[u8], span_b: &[u8]) -> u16 {
    let len1 = span_a.len();
    let len2 = span_b.len();
    if len1 >= 4 {
        u16::from_be_bytes([span_a[2], span_a[3]])
    } else if len1 == 3 && len2 >= 1 {
        u16::from_be_bytes([span_a[2], span_b[0]])
    } else if len1 <= 2 && len1 + len2 >= 4 {
        u16::from_be_bytes([span_b[2 - len1], span_b[3 - len1]])
    } else {
        0
    }
}

/// Reads the high nibble of the first octet (the IP version), pulling
/// from whichever span has a byte.
fn first_octet(span_a: &[u8], span_b: &[u8]) -> Option<u8> {
    if let Some(b) = span_a.first() {
        Some(*b)
    } else {
        span_b.first().copied()
    }
}

/// Context the tun-bound pusher needs: the tun fd for a direct `writev`
/// attempt, and the shared backlog ring for when that would block.
pub struct TunTx<'a> {
    pub fd: RawFd,
    pub backlog: &'a mut crate::ring::RingBuffer,
}

impl<'a> TunTx<'a> {
    /// Writes `pkt` (possibly split across `a`/`b`) to the tun device,
    /// falling back to the shared backlog ring when the device isn't
    /// immediately writable, or when the backlog is already non-empty
    /// (packets must stay in order).
    fn push_packet(&mut self, a: &[u8], b: &[u8]) -> usize {
        if self.backlog.is_empty() {
            let slices: [IoSlice; 2] = [IoSlice::new(a), IoSlice::new(b)];
            match write_vectored_fd(self.fd, &slices) {
                Ok(written) => return written,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => {
                    log::warn!("failed to write {} bytes to tun: {}", a.len() + b.len(), e);
                    return 0;
                }
            }
        }
        self.push_to_backlog(a, b)
    }

    fn push_to_backlog(&mut self, a: &[u8], b: &[u8]) -> usize {
        let mut src = TwoSpanReader::new(a, b);
        let total = a.len() + b.len();
        let outcome = self.backlog.fill(
            |chunk, additional_len| src.copy_atomic_into(chunk, additional_len),
            None::<&mut fn(&[u8], &[u8]) -> usize>,
        );
        match outcome {
            IoOutcome::OkExhausted if src.remaining() == 0 => total,
            _ => {
                debug_assert_eq!(src.remaining(), total, "partial copy into tun backlog");
                0
            }
        }
    }
}

/// Copies the whole packet or nothing: refuses a partial copy unless the
/// entire remaining source fits in the free region plus the promised
/// future-wrap capacity.
struct TwoSpanReader<'a> {
    a: &'a [u8],
    b: &'a [u8],
}

impl<'a> TwoSpanReader<'a> {
    fn new(a: &'a [u8], b: &'a [u8]) -> Self {
        Self { a, b }
    }

    fn remaining(&self) -> usize {
        self.a.len() + self.b.len()
    }

    fn copy_atomic_into(&mut self, dst: &mut [u8], additional_len: usize) -> (usize, IoOutcome) {
        if self.remaining() > dst.len() + additional_len {
            return (0, IoOutcome::OkExhausted);
        }
        let mut written = 0;
        if !self.a.is_empty() {
            let n = self.a.len().min(dst.len() - written);
            dst[written..written + n].copy_from_slice(&self.a[..n]);
            self.a = &self.a[n..];
            written += n;
        }
        if !self.b.is_empty() {
            let n = self.b.len().min(dst.len() - written);
            dst[written..written + n].copy_from_slice(&self.b[..n]);
            self.b = &self.b[n..];
            written += n;
        }
        let outcome = if self.remaining() == 0 {
            IoOutcome::OkExhausted
        } else {
            IoOutcome::Ok
        };
        (written, outcome)
    }
}

fn write_vectored_fd(fd: RawFd, slices: &[IoSlice]) -> std::io::Result<usize> {
    // SAFETY: `fd` is kept open and owned by the TunSocket for the
    // daemon's lifetime; writev here does not take ownership of it.
    let mut file = unsafe { <std::fs::File as std::os::fd::FromRawFd>::from_raw_fd(fd) };
    let result = file.write_vectored(slices);
    std::mem::forget(file);
    result
}

/// Pusher used by a connection's rx-ring `fill`: slices whole L3 packets
/// out of the newly-received bytes and forwards each to the tun device.
/// Returns how many bytes it consumed.
pub fn push_to_tun(span_a: &[u8], span_b: &[u8], tun_tx: &mut TunTx) -> usize {
    let version = match first_octet(span_a, span_b) {
        Some(b) => b >> 4,
        None => return 0,
    };
    match version {
        4 => push_to_tun_ipv4(span_a, span_b, tun_tx),
        6 => {
            log::warn!("IPv6 packet handling is not implemented, letting backlog build");
            0
        }
        other => {
            log::warn!(
                "encountered an unknown packet type (L3 version: {}), leaving bytes in ring",
                other
            );
            0
        }
    }
}

fn push_to_tun_ipv4(span_a: &[u8], span_b: &[u8], tun_tx: &mut TunTx) -> usize {
    let mut a = span_a;
    let mut b = span_b;
    let mut overall = 0usize;

    loop {
        let pkt_len = parse_l3_packet_len(a, b) as usize;
        if pkt_len == 0 || a.len() + b.len() < pkt_len {
            return overall;
        }

        let pushed = if a.len() >= pkt_len {
            let n = tun_tx.push_packet(&a[..pkt_len], &[]);
            a = &a[n..];
            n
        } else {
            let from_b = pkt_len - a.len();
            let n = tun_tx.push_packet(a, &b[..from_b]);
            if n > 0 {
                b = &b[from_b..];
                a = &[];
            }
            n
        };

        if pushed == 0 {
            return overall;
        }
        overall += pushed;
    }
}

/// Reassembles whole L3 packets out of the ring while draining the tun
/// tx backlog. The ring may hold several whole packets concatenated, or
/// a packet whose bytes straddle the wrap; `scratch` carries a partial
/// packet across calls.
pub struct TunPacketBuffer {
    scratch: Vec<u8>,
    len: usize,
    current_pkt_len: usize,
}

impl TunPacketBuffer {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            scratch: vec![0u8; initial_capacity],
            len: 0,
            current_pkt_len: 0,
        }
    }

    fn ensure_capacity(&mut self, needed: usize) {
        if needed > self.scratch.len() {
            let mut new_cap = self.scratch.len() * 2;
            if new_cap < needed {
                new_cap = needed;
            }
            self.scratch.resize(new_cap, 0);
        }
    }

    /// Drain handler for the tun tx ring. Writes one whole packet per
    /// `write`/`writev` to `fd` (spec invariant: "each write to the tun
    /// fd contains exactly one complete L3 packet").
    pub fn write_to_tun(&mut self, chunk: &[u8], fd: RawFd) -> (usize, IoOutcome) {
        let mut buf = chunk;
        let mut total_consumed = 0usize;

        loop {
            if buf.is_empty() {
                return (total_consumed, IoOutcome::OkExhausted);
            }

            if self.current_pkt_len == 0 {
                let pkt_len = parse_l3_packet_len(buf, &[]) as usize;
                if pkt_len == 0 {
                    return (total_consumed, IoOutcome::OkExhausted);
                }
                if pkt_len <= buf.len() {
                    match write_fd(fd, &buf[..pkt_len]) {
                        Ok(Some(written)) => {
                            debug_assert_eq!(written, pkt_len);
                            buf = &buf[written..];
                            total_consumed += written;
                            continue;
                        }
                        Ok(None) => return (total_consumed, IoOutcome::OkExhausted),
                        Err(e) => {
                            log::error!("failed to write to tun device: {}", e);
                            return (total_consumed, IoOutcome::UnknownErr);
                        }
                    }
                } else {
                    self.ensure_capacity(pkt_len);
                    self.scratch[..buf.len()].copy_from_slice(buf);
                    self.len = buf.len();
                    self.current_pkt_len = pkt_len;
                    total_consumed += buf.len();
                    return (total_consumed, IoOutcome::OkExhausted);
                }
            } else {
                let deficit = self.current_pkt_len - self.len;
                if buf.len() >= deficit {
                    let slices = [
                        IoSlice::new(&self.scratch[..self.len]),
                        IoSlice::new(&buf[..deficit]),
                    ];
                    match write_vectored_fd(fd, &slices) {
                        Ok(written) if written == self.len + deficit => {
                            buf = &buf[deficit..];
                            total_consumed += deficit;
                            self.len = 0;
                            self.current_pkt_len = 0;
                            continue;
                        }
                        Ok(_) => {
                            // Partial vectored write: tun devices only
                            // accept whole-packet writes, so treat
                            // anything short as "try again later".
                            return (total_consumed, IoOutcome::OkExhausted);
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {
                            return (total_consumed, IoOutcome::OkExhausted)
                        }
                        Err(e) => {
                            log::error!("failed to write to tun device: {}", e);
                            return (total_consumed, IoOutcome::UnknownErr);
                        }
                    }
                } else {
                    self.ensure_capacity(self.len + buf.len());
                    self.scratch[self.len..self.len + buf.len()].copy_from_slice(buf);
                    self.len += buf.len();
                    total_consumed += buf.len();
                    return (total_consumed, IoOutcome::OkExhausted);
                }
            }
        }
    }
}

fn write_fd(fd: RawFd, data: &[u8]) -> std::io::Result<Option<usize>> {
    // SAFETY: see write_vectored_fd above.
    let mut file = unsafe { <std::fs::File as std::os::fd::FromRawFd>::from_raw_fd(fd) };
    let result = match file.write(data) {
        Ok(n) => Ok(Some(n)),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    };
    std::mem::forget(file);
    result
}

/// Reads up to `buf.len()` bytes from the tun device. Each successful
/// read is exactly one L3 packet.
pub fn read_tun_packet(fd: RawFd, buf: &mut [u8]) -> std::io::Result<Option<usize>> {
    // SAFETY: see write_vectored_fd above.
    let mut file = unsafe { <std::fs::File as std::os::fd::FromRawFd>::from_raw_fd(fd) };
    let result = match file.read(buf) {
        Ok(n) => Ok(Some(n)),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    };
    std::mem::forget(file);
    result
}

pub fn destination_ipv4(packet: &[u8]) -> Option<[u8; 4]> {
    if packet.len() < 20 {
        return None;
    }
    Some([packet[16], packet[17], packet[18], packet[19]])
}

/// Fill handler that copies a whole tun-sourced packet into a
/// connection's tx ring, or nothing.
pub struct PacketSource<'a> {
    packet: &'a [u8],
    written: usize,
}

impl<'a> PacketSource<'a> {
    pub fn new(packet: &'a [u8]) -> Self {
        Self { packet, written: 0 }
    }

    pub fn handler(&mut self, dst: &mut [u8], additional_len: usize) -> (usize, IoOutcome) {
        let available = self.packet.len() - self.written;
        let to_write = available.min(dst.len());

        if self.written == 0 && self.packet.len() > to_write + additional_len {
            return (0, IoOutcome::OkNotEnoughSpace);
        }

        dst[..to_write].copy_from_slice(&self.packet[self.written..self.written + to_write]);
        self.written += to_write;

        let outcome = if self.written == self.packet.len() {
            IoOutcome::OkExhausted
        } else {
            IoOutcome::Ok
        };
        (to_write, outcome)
    }
}

/// Pusher used alongside `PacketSource`: sends the bytes just admitted
/// to the connection's tx ring straight out over the socket, to shave
/// tail latency off the first write after a fill.
pub fn write_passthru_to_conn(span_a: &[u8], span_b: &[u8], fd: RawFd) -> usize {
    let mut written = 0usize;
    if !span_a.is_empty() {
        match send_fd(fd, span_a) {
            Some(n) => written += n,
            None => return written,
        }
        if written < span_a.len() {
            return written;
        }
    }
    if !span_b.is_empty() {
        match send_fd(fd, span_b) {
            Some(n) => written += n,
            None => return written,
        }
    }
    written
}

/// `send(2)` with `MSG_NOSIGNAL` so a peer that has reset the connection
/// raises `EPIPE` instead of `SIGPIPE`.
pub fn send_fd(fd: RawFd, data: &[u8]) -> Option<usize> {
    let ret = unsafe {
        libc::send(
            fd,
            data.as_ptr() as *const libc::c_void,
            data.len(),
            libc::MSG_NOSIGNAL,
        )
    };
    if ret < 0 {
        None
    } else {
        Some(ret as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_len_whole_in_first_span() {
        let hdr = [0x45, 0x00, 0x00, 0x3c];
        assert_eq!(parse_l3_packet_len(&hdr, &[]), 0x3c);
    }

    #[test]
    fn parse_len_split_three_one() {
        let a = [0x45, 0x00, 0x01];
        let b = [0x2c, 0xaa, 0xbb];
        assert_eq!(parse_l3_packet_len(&a, &b), 0x012c);
    }

    #[test]
    fn parse_len_split_two_two() {
        let a = [0x45, 0x00];
        let b = [0x02, 0x00, 0xaa];
        assert_eq!(parse_l3_packet_len(&a, &b), 0x0200);
    }

    #[test]
    fn parse_len_insufficient_bytes() {
        let a = [0x45, 0x00];
        assert_eq!(parse_l3_packet_len(&a, &[]), 0);
    }

    #[test]
    fn destination_ipv4_reads_bytes_16_to_19() {
        let mut pkt = vec![0u8; 24];
        pkt[0] = 0x45;
        pkt[16..20].copy_from_slice(&[10, 0, 0, 2]);
        assert_eq!(destination_ipv4(&pkt), Some([10, 0, 0, 2]));
    }

    #[test]
    fn destination_ipv4_rejects_short_packet() {
        let pkt = vec![0u8; 10];
        assert_eq!(destination_ipv4(&pkt), None);
    }

    #[test]
    fn packet_source_admits_a_packet_that_fits_whole() {
        let mut ring = crate::ring::RingBuffer::new(64);
        let packet = vec![0xABu8; 32];
        let mut source = PacketSource::new(&packet);
        let outcome = ring.fill(
            |dst, additional_len| source.handler(dst, additional_len),
            None::<&mut fn(&[u8], &[u8]) -> usize>,
        );
        assert_eq!(outcome, IoOutcome::OkExhausted);
        assert_eq!(ring.len(), packet.len());
    }

    #[test]
    fn packet_source_refuses_a_packet_that_does_not_fit_even_with_wrap_promise() {
        let mut ring = crate::ring::RingBuffer::new(16);
        let packet = vec![0xCDu8; 32];
        let mut source = PacketSource::new(&packet);
        let outcome = ring.fill(
            |dst, additional_len| source.handler(dst, additional_len),
            None::<&mut fn(&[u8], &[u8]) -> usize>,
        );
        assert_eq!(outcome, IoOutcome::OkNotEnoughSpace);
        assert!(ring.is_empty(), "a rejected packet must not be partially enqueued");
    }
}

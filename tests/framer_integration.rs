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

//! Builds an IPv4 packet by hand and pushes it through a ring buffer to
//! confirm `parse_l3_packet_len` and the destination lookup agree on
//! the same bytes regardless of where the wrap falls.

use ringtun::framer::{destination_ipv4, parse_l3_packet_len};
use ringtun::ring::{IoOutcome, RingBuffer};

fn build_ipv4_packet(total_len: u16, dest: [u8; 4]) -> Vec<u8> {
    let mut pkt = vec![0u8; total_len as usize];
    pkt[0] = 0x45; // version 4, IHL 5
    pkt[2..4].copy_from_slice(&total_len.to_be_bytes());
    pkt[16..20].copy_from_slice(&dest);
    pkt
}

#[test]
fn packet_length_is_readable_after_wrapping_through_the_ring() {
    let mut ring = RingBuffer::new(16);
    // Push 12 bytes, drain them, so the next fill starts mid-buffer and
    // the 16-byte packet below straddles the wrap point.
    let mut cursor = 0usize;
    let filler = vec![0xAAu8; 12];
    ring.fill::<_, fn(&[u8], &[u8]) -> usize>(
        |chunk, _other| {
            let n = chunk.len().min(filler.len() - cursor);
            chunk[..n].copy_from_slice(&filler[cursor..cursor + n]);
            cursor += n;
            let outcome = if cursor == filler.len() {
                IoOutcome::OkExhausted
            } else {
                IoOutcome::Ok
            };
            (n, outcome)
        },
        None,
    );
    ring.drain(|chunk, _| (chunk.len(), IoOutcome::Ok));

    let packet = build_ipv4_packet(16, [192, 168, 1, 42]);
    let mut cursor = 0usize;
    ring.fill::<_, fn(&[u8], &[u8]) -> usize>(
        |chunk, _other| {
            let n = chunk.len().min(packet.len() - cursor);
            chunk[..n].copy_from_slice(&packet[cursor..cursor + n]);
            cursor += n;
            let outcome = if cursor == packet.len() {
                IoOutcome::OkExhausted
            } else {
                IoOutcome::Ok
            };
            (n, outcome)
        },
        None,
    );

    let (span_a, span_b) = ring.occupied_spans();
    assert_eq!(span_a.len() + span_b.len(), 16);
    assert_eq!(parse_l3_packet_len(span_a, span_b), 16);

    // Reassemble into one contiguous buffer and confirm the destination
    // field decodes the same way regardless of the split point.
    let mut whole = Vec::with_capacity(16);
    whole.extend_from_slice(span_a);
    whole.extend_from_slice(span_b);
    assert_eq!(destination_ipv4(&whole), Some([192, 168, 1, 42]));
}

#[test]
fn two_concatenated_packets_are_each_recoverable() {
    let mut ring = RingBuffer::new(64);
    let p1 = build_ipv4_packet(20, [10, 0, 0, 1]);
    let p2 = build_ipv4_packet(24, [10, 0, 0, 2]);
    let mut all = p1.clone();
    all.extend_from_slice(&p2);

    let mut cursor = 0usize;
    ring.fill::<_, fn(&[u8], &[u8]) -> usize>(
        |chunk, _other| {
            let n = chunk.len().min(all.len() - cursor);
            chunk[..n].copy_from_slice(&all[cursor..cursor + n]);
            cursor += n;
            let outcome = if cursor == all.len() {
                IoOutcome::OkExhausted
            } else {
                IoOutcome::Ok
            };
            (n, outcome)
        },
        None,
    );

    let (span_a, _span_b) = ring.occupied_spans();
    let first_len = parse_l3_packet_len(span_a, &[]);
    assert_eq!(first_len, 20);
    let second_len = parse_l3_packet_len(&span_a[first_len as usize..], &[]);
    assert_eq!(second_len, 24);
}

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

//! Fixed-capacity circular byte buffer with a drain/fill protocol shared
//! by every byte-movement path in the daemon. Kept allocation-free past
//! construction and free of `dyn` on the hot path: `drain`/`fill` are
//! generic over handler/pusher closures so the compiler monomorphizes
//! each call site independently.

/// Outcome of a single handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOutcome {
    /// Progress was made; the caller should call the handler again.
    Ok,
    /// Would block (EAGAIN/EWOULDBLOCK) or no more data/space; stop.
    OkExhausted,
    /// Peer closed or fatal connection error; destroy the socket.
    Kill,
    /// Unexpected syscall error; log and continue.
    UnknownErr,
    /// An atomic multi-byte write did not fit; treat as a drop.
    OkNotEnoughSpace,
}

/// Fixed-capacity single-producer/single-consumer ring.
///
/// Invariants: `0 <= start, end <= sz`; `wrapped => end <= start`;
/// `!wrapped => start <= end`; empty iff `!wrapped && start == end`;
/// full iff `wrapped && start == end`.
pub struct RingBuffer {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    wrapped: bool,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
            wrapped: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.wrapped && self.start == self.end
    }

    /// True when there is no room left for another byte. Note this is
    /// `len() == capacity()`, which also catches the momentary state
    /// where the occupied region runs exactly up to `sz` without having
    /// wrapped yet (`wrapped` only flips on the *next* fill attempt) —
    /// the two are functionally the same "no free span" state.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Occupied byte count, for diagnostics and tests.
    pub fn len(&self) -> usize {
        if self.wrapped {
            (self.buf.len() - self.start) + self.end
        } else {
            self.end - self.start
        }
    }

    /// The occupied region split across the wrap, as two spans `(a, b)`
    /// where `b` is empty unless the occupied region straddles the wrap.
    pub fn occupied_spans(&self) -> (&[u8], &[u8]) {
        if self.wrapped {
            (&self.buf[self.start..], &self.buf[..self.end])
        } else {
            (&self.buf[self.start..self.end], &[])
        }
    }

    fn debug_check_invariants(&self) {
        debug_assert!(self.start <= self.buf.len());
        debug_assert!(self.end <= self.buf.len());
        if self.wrapped {
            debug_assert!(self.end <= self.start);
        } else {
            debug_assert!(self.start <= self.end);
        }
    }

    /// Repeatedly present the occupied contiguous region to `handler`,
    /// which must advance `start` by the bytes it consumed and return an
    /// `IoOutcome`. `handler(chunk, other_len) -> (consumed, outcome)`;
    /// `other_len` is the length of the second (wrapped) span, a
    /// pessimistic promise of future capacity for atomic multi-byte
    /// writers.
    pub fn drain<H>(&mut self, mut handler: H) -> IoOutcome
    where
        H: FnMut(&[u8], usize) -> (usize, IoOutcome),
    {
        loop {
            if self.wrapped {
                if self.start == self.buf.len() {
                    self.start = 0;
                    self.wrapped = false;
                    continue;
                }
                let (consumed, outcome) =
                    handler(&self.buf[self.start..], self.end);
                self.start += consumed;
                self.debug_check_invariants();
                if outcome != IoOutcome::Ok {
                    return outcome;
                }
            } else {
                if self.start == self.end {
                    return IoOutcome::Ok;
                }
                let (consumed, outcome) =
                    handler(&self.buf[self.start..self.end], 0);
                self.start += consumed;
                self.debug_check_invariants();
                if outcome != IoOutcome::Ok {
                    return outcome;
                }
            }
        }
    }

    /// Repeatedly present the free contiguous region to `handler`, which
    /// writes into it and returns how many bytes it admitted plus an
    /// outcome. After every handler call, if `pusher` is supplied, it is
    /// offered the newly-occupied region (possibly split across the
    /// wrap) and may consume a prefix, returning how many bytes it moved
    /// `pusher(span_a, span_b) -> moved`.
    ///
    /// When the ring is already full, only the pusher can make further
    /// progress; if a full pass finds nothing for the pusher to move,
    /// `fill` reports `OkExhausted` rather than spinning the handler
    /// against a zero-length region (that region would, for a real recv
    /// handler, misread as a closed connection — see DESIGN.md).
    pub fn fill<H, P>(&mut self, mut handler: H, mut pusher: Option<&mut P>) -> IoOutcome
    where
        H: FnMut(&mut [u8], usize) -> (usize, IoOutcome),
        P: FnMut(&[u8], &[u8]) -> usize,
    {
        loop {
            if self.is_full() {
                let moved = match pusher.as_deref_mut() {
                    Some(pusher) => self.push_occupied(pusher),
                    None => 0,
                };
                if moved == 0 {
                    return IoOutcome::OkExhausted;
                }
                continue;
            }

            let outcome = if self.wrapped {
                let (admitted, outcome) =
                    handler(&mut self.buf[self.end..self.start], 0);
                self.end += admitted;
                outcome
            } else if self.end == self.buf.len() {
                self.end = 0;
                self.wrapped = true;
                continue;
            } else {
                let (admitted, outcome) =
                    handler(&mut self.buf[self.end..], self.start);
                self.end += admitted;
                outcome
            };
            self.debug_check_invariants();

            if let Some(pusher) = pusher.as_deref_mut() {
                self.push_occupied(pusher);
            }

            if outcome != IoOutcome::Ok {
                return outcome;
            }
        }
    }

    fn push_occupied<P>(&mut self, pusher: &mut P) -> usize
    where
        P: FnMut(&[u8], &[u8]) -> usize,
    {
        let (len1, len2) = if self.wrapped {
            (self.buf.len() - self.start, self.end)
        } else {
            (self.end - self.start, 0)
        };
        if len1 == 0 && len2 == 0 {
            return 0;
        }
        let moved = if self.wrapped {
            if len1 == 0 {
                pusher(&self.buf[..len2], &[])
            } else {
                pusher(&self.buf[self.start..], &self.buf[..self.end])
            }
        } else {
            pusher(&self.buf[self.start..self.end], &[])
        };
        if moved == 0 {
            return 0;
        }
        if self.wrapped {
            if moved > len1 {
                self.start = moved - len1;
                self.wrapped = false;
            } else {
                self.start += moved;
            }
        } else {
            self.start += moved;
        }
        self.debug_check_invariants();
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_bytes(ring: &mut RingBuffer, data: &[u8]) -> IoOutcome {
        let mut cursor = 0usize;
        ring.fill::<_, fn(&[u8], &[u8]) -> usize>(
            |chunk, _other| {
                let n = chunk.len().min(data.len() - cursor);
                chunk[..n].copy_from_slice(&data[cursor..cursor + n]);
                cursor += n;
                let outcome = if cursor == data.len() {
                    IoOutcome::OkExhausted
                } else {
                    IoOutcome::Ok
                };
                (n, outcome)
            },
            None,
        )
    }

    fn drain_all(ring: &mut RingBuffer) -> Vec<u8> {
        let mut out = Vec::new();
        ring.drain(|chunk, _other| {
            out.extend_from_slice(chunk);
            (chunk.len(), IoOutcome::Ok)
        });
        out
    }

    #[test]
    fn empty_ring_invariants() {
        let r = RingBuffer::new(16);
        assert!(r.is_empty());
        assert!(!r.is_full());
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn fill_then_drain_round_trips_bytes() {
        let mut r = RingBuffer::new(16);
        let data = b"hello world";
        fill_bytes(&mut r, data);
        assert_eq!(r.len(), data.len());
        let out = drain_all(&mut r);
        assert_eq!(out, data);
        assert!(r.is_empty());
    }

    #[test]
    fn wrap_around_preserves_order() {
        let mut r = RingBuffer::new(8);
        fill_bytes(&mut r, b"abcdef");
        // drain 4 bytes, freeing room at the front
        let mut out = Vec::new();
        r.drain(|chunk, _| {
            let take = chunk.len().min(4 - out.len());
            out.extend_from_slice(&chunk[..take]);
            (take, if out.len() == 4 { IoOutcome::OkExhausted } else { IoOutcome::Ok })
        });
        assert_eq!(out, b"abcd");
        // fill more, forcing a wrap
        fill_bytes(&mut r, b"ghijkl");
        let rest = drain_all(&mut r);
        assert_eq!(rest, b"efghijkl");
    }

    #[test]
    fn full_ring_reports_full() {
        let mut r = RingBuffer::new(4);
        fill_bytes(&mut r, b"abcd");
        assert!(r.is_full());
        assert_eq!(r.len(), 4);
    }

    #[test]
    fn pusher_drains_concurrently_with_fill() {
        let mut r = RingBuffer::new(16);
        let mut pushed = Vec::new();
        let mut cursor = 0usize;
        let data = b"0123456789";
        r.fill(
            |chunk, _other| {
                let n = chunk.len().min(data.len() - cursor);
                chunk[..n].copy_from_slice(&data[cursor..cursor + n]);
                cursor += n;
                let outcome = if cursor == data.len() {
                    IoOutcome::OkExhausted
                } else {
                    IoOutcome::Ok
                };
                (n, outcome)
            },
            Some(&mut |a: &[u8], b: &[u8]| {
                pushed.extend_from_slice(a);
                pushed.extend_from_slice(b);
                a.len() + b.len()
            }),
        );
        assert_eq!(pushed, data);
        assert!(r.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_fill_drain_sequence_preserves_bytes(
            chunks in proptest::collection::vec(proptest::collection::vec(0u8..=255, 1..32), 1..25)
        ) {
            // Each chunk is smaller than capacity so a single fill() call
            // always has somewhere to put every byte in one pass.
            let mut r = RingBuffer::new(64);
            let mut expected = Vec::new();
            let mut produced = Vec::new();
            for chunk in &chunks {
                fill_bytes(&mut r, chunk);
                expected.extend_from_slice(chunk);
                let drained = drain_all(&mut r);
                produced.extend_from_slice(&drained);
            }
            prop_assert_eq!(produced, expected);
            prop_assert!(r.is_empty());
        }
    }
}

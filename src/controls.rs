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

//! Flags a signal handler can set from signal context and the event
//! loop polls between readiness waits.

use std::sync::atomic::{AtomicBool, Ordering};

static RELOAD_REQUESTED: AtomicBool = AtomicBool::new(false);
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn request_reload() {
    RELOAD_REQUESTED.store(true, Ordering::SeqCst);
}

pub fn request_stop() {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

/// Consumes and clears the reload flag; true at most once per request.
pub fn take_reload_requested() -> bool {
    RELOAD_REQUESTED.swap(false, Ordering::SeqCst)
}

pub fn stop_requested() -> bool {
    STOP_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both flags are process-global, so exercise them from a single test
    // rather than risk interleaving with a parallel test thread.
    #[test]
    fn flags_behave_as_one_shot_and_sticky() {
        request_reload();
        assert!(take_reload_requested());
        assert!(!take_reload_requested());

        request_stop();
        assert!(stop_requested());
        assert!(stop_requested());
    }
}

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

use thiserror::Error;

/// Initialization failures that abort start-up. Per-connection or
/// per-packet faults never reach this type: they are logged and counted
/// in place instead.
#[derive(Debug, Error)]
pub enum RingtunError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    #[error("at least one of self_addr_v4/self_addr_v6 must be set")]
    NoSelfAddress,

    #[error("could not initialize the readiness multiplexer")]
    PollInit(#[source] std::io::Error),

    #[error("no listening socket could be bound on port {0}")]
    NoListenerBound(u16),

    #[error("invalid RINGTUN_TUN_FD value: {0}")]
    InvalidTunFd(String),
}

impl RingtunError {
    /// Stable code for the embedding program's exit status / metrics.
    pub fn code(&self) -> u8 {
        match self {
            RingtunError::NoSelfAddress => 1,
            RingtunError::NoListenerBound(_) => 2,
            RingtunError::PollInit(_) => 3,
            RingtunError::InvalidTunFd(_) => 4,
            RingtunError::ConfigError(_) => 5,
            RingtunError::InvalidAddress(_) => 6,
            RingtunError::IoError(_) => 7,
        }
    }
}

pub type RingtunResult<T> = std::result::Result<T, RingtunError>;

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

#[macro_use]
extern crate log;

use std::env::var;
use std::os::fd::RawFd;
use std::process::ExitCode;

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use ringtun::config::Config;
use ringtun::controls;
use ringtun::error::RingtunError;

fn main() -> ExitCode {
    env_logger::init();

    let config_loc = var("RINGTUN_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config: Config = match load_config(&config_loc) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load configuration from {}: {}", config_loc, e);
            return ExitCode::from(e.code());
        }
    };

    let tun_fd: RawFd = match var("RINGTUN_TUN_FD") {
        Ok(v) => match v.parse() {
            Ok(fd) => fd,
            Err(_) => {
                error!("RINGTUN_TUN_FD={:?} is not a valid file descriptor", v);
                return ExitCode::from(RingtunError::InvalidTunFd(v).code());
            }
        },
        Err(_) => {
            error!("RINGTUN_TUN_FD is not set; the tun device must be opened by the caller");
            return ExitCode::from(RingtunError::InvalidTunFd(String::new()).code());
        }
    };

    if let Err(e) = spawn_signal_thread() {
        error!("failed to install signal handlers: {}", e);
        return ExitCode::FAILURE;
    }

    match ringtun::run(&config, tun_fd) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("event loop exited with an error: {}", e);
            ExitCode::from(e.code())
        }
    }
}

fn load_config(path: &str) -> Result<Config, RingtunError> {
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

/// Maps SIGHUP to a peer-file reload and SIGTERM/SIGINT to a graceful
/// stop, both delivered as plain atomics the event loop polls, avoiding
/// any real work inside the signal handler itself.
fn spawn_signal_thread() -> std::io::Result<()> {
    let mut signals = Signals::new([SIGHUP, SIGTERM, SIGINT])?;
    std::thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGHUP => {
                    info!("received SIGHUP, reloading peer file on next loop iteration");
                    controls::request_reload();
                }
                SIGTERM | SIGINT => {
                    info!("received stop signal, shutting down");
                    controls::request_stop();
                }
                _ => unreachable!(),
            }
        }
    });
    Ok(())
}

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

//! The single-threaded readiness loop: one `mio::Poll` multiplexes the
//! tun device, the listener(s), and every live connection. Nothing here
//! blocks except the call to `poll.poll` itself.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::time::Duration;

use mio::event::Event;
use mio::net::TcpListener as MioTcpListener;
use mio::unix::SourceFd;
use mio::{Events, Interest, Token};
use socket2::{Domain, Protocol, Socket as Socket2, Type};

use crate::addr::{AddressFamily, NetAddress};
use crate::config::Config;
use crate::context::IoContext;
use crate::controls;
use crate::error::{RingtunError, RingtunResult};
use crate::framer::{self, PacketSource, TunTx};
use crate::peer::PassivePeer;
use crate::reconcile::{PeerReconciler, Resolver};
use crate::ring::IoOutcome;
use crate::route::RouteManager;
use crate::socket::{Connection, Socket, TunSocket};

/// `mio::Poll::poll` is given this timeout rather than blocking forever:
/// the stop/reload flags are set from a `signal-hook` iterator thread,
/// not a real signal handler interrupting this thread's syscall, so an
/// infinite wait would never notice a signal with no socket traffic.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Binds a non-blocking listener for `family` on `port` with
/// `SO_REUSEADDR` set.
fn bind_listener(family: AddressFamily, port: u16) -> RingtunResult<MioTcpListener> {
    let domain = match family {
        AddressFamily::V4 => Domain::IPV4,
        AddressFamily::V6 => Domain::IPV6,
    };
    let socket =
        Socket2::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(RingtunError::IoError)?;
    socket.set_reuse_address(true).map_err(RingtunError::IoError)?;
    socket.set_nonblocking(true).map_err(RingtunError::IoError)?;
    let bind_addr = match family {
        AddressFamily::V4 => format!("0.0.0.0:{}", port),
        AddressFamily::V6 => format!("[::]:{}", port),
    };
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|_| RingtunError::NoListenerBound(port))?;
    socket.bind(&addr.into()).map_err(RingtunError::IoError)?;
    socket.listen(1024).map_err(RingtunError::IoError)?;
    let std_listener: std::net::TcpListener = socket.into();
    MioTcpListener::from_std(std_listener).map_err(RingtunError::IoError)
}

pub struct EventLoop<R: RouteManager, S: Resolver> {
    ctx: IoContext<R>,
    reconciler: PeerReconciler<S>,
}

impl<R: RouteManager, S: Resolver> EventLoop<R, S> {
    pub fn new(config: &Config, tun_fd: RawFd, route_manager: R, resolver: S) -> RingtunResult<Self> {
        let mut self_addrs = Vec::new();
        if let Some(v4) = &config.general.self_addr_v4 {
            self_addrs.push(NetAddress::from_ip(
                v4.parse().map_err(RingtunError::InvalidAddress)?,
            ));
        }
        if let Some(v6) = &config.general.self_addr_v6 {
            self_addrs.push(NetAddress::from_ip(
                v6.parse().map_err(RingtunError::InvalidAddress)?,
            ));
        }
        if self_addrs.is_empty() {
            return Err(RingtunError::NoSelfAddress);
        }

        let poll = mio::Poll::new().map_err(RingtunError::PollInit)?;
        let mut sockets = slab::Slab::new();

        let tun_entry = sockets.vacant_entry();
        let tun_token = Token(tun_entry.key());
        poll.registry()
            .register(
                &mut SourceFd(&tun_fd),
                tun_token,
                Interest::READABLE | Interest::WRITABLE,
            )
            .map_err(RingtunError::IoError)?;
        tun_entry.insert(Socket::Tun(TunSocket::new(tun_fd, config.general.tun_ring_bytes)));

        let mut bound_any = false;
        for family in [AddressFamily::V4, AddressFamily::V6] {
            let has_self = self_addrs.iter().any(|a| a.family() == family);
            if !has_self {
                continue;
            }
            match bind_listener(family, config.general.listener_port) {
                Ok(mut listener) => {
                    let entry = sockets.vacant_entry();
                    let token = Token(entry.key());
                    if let Err(e) = poll
                        .registry()
                        .register(&mut listener, token, Interest::READABLE)
                    {
                        log::warn!("failed to register {:?} listener: {}", family, e);
                        continue;
                    }
                    entry.insert(Socket::Listener { listener, family });
                    bound_any = true;
                }
                Err(e) => log::warn!(
                    "failed to bind {:?} listener on port {}: {}",
                    family,
                    config.general.listener_port,
                    e
                ),
            }
        }
        if !bound_any {
            return Err(RingtunError::NoListenerBound(config.general.listener_port));
        }

        let ctx = IoContext {
            poll,
            sockets,
            tun_token,
            peers: crate::peer_table::PeerTable::new(),
            route_manager,
            address_set: config.general.address_set.clone(),
            self_addrs,
            peer_file: config.general.peer_file.clone(),
            listener_port: config.general.listener_port,
            conn_ring_bytes: config.general.conn_ring_bytes,
            counters: crate::counters::Counters::default(),
        };

        Ok(Self {
            ctx,
            reconciler: PeerReconciler::new(resolver),
        })
    }

    pub fn run(&mut self) -> RingtunResult<()> {
        let mut events = Events::with_capacity(256);
        self.reconcile_peers();

        loop {
            if controls::stop_requested() {
                log::info!("stop requested, shutting down event loop");
                return Ok(());
            }

            match self.ctx.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(RingtunError::IoError(e)),
            }

            for event in events.iter() {
                self.dispatch(event);
            }

            if controls::take_reload_requested() {
                self.reconcile_peers();
            }

            log::trace!("{}", self.ctx.counters);
        }
    }

    fn reconcile_peers(&mut self) {
        let peer_file = self.ctx.peer_file.clone();
        let self_addrs = self.ctx.self_addrs.clone();
        match self.reconciler.reconcile(
            &peer_file,
            &mut self.ctx.peers,
            &self_addrs,
            self.ctx.listener_port,
        ) {
            Ok(result) => {
                for addr in result.drop_addrs {
                    if let Some(token) = self.ctx.peers.token_for(&addr) {
                        self.teardown_connection(token);
                    }
                    if let Err(e) = self.ctx.route_manager.remove(&self.ctx.address_set, &addr) {
                        log::warn!("failed to remove route for {}: {}", addr, e);
                    }
                    self.ctx.peers.disconnected.remove(&addr);
                }
                for peer in result.connect_to {
                    self.initiate_connection(peer);
                }
            }
            Err(e) => log::warn!("failed to reconcile peer file: {}", e),
        }
    }

    fn initiate_connection(&mut self, peer: PassivePeer) {
        let sock_addr = SocketAddr::new(peer.addr.to_ip(), peer.port);
        let stream = match mio::net::TcpStream::connect(sock_addr) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("failed to initiate connection to {}: {}", peer.addr, e);
                return;
            }
        };
        let family = peer.addr.family();
        let conn = Connection::new(stream, peer.addr, family, true, self.ctx.conn_ring_bytes);
        let token = self.ctx.insert_socket(Socket::Connection(conn));
        if !self.register_connection(token) {
            self.ctx.remove_socket(token);
            return;
        }
        // Route installation is the last setup step; on failure the
        // socket is rejected outright and the peer stays disconnected
        // for the next reconcile pass to retry.
        if let Err(e) = self.ctx.route_manager.add(&self.ctx.address_set, &peer.addr) {
            log::warn!("route install for {} failed, rejecting socket: {}", peer.addr, e);
            if let Some(Socket::Connection(mut conn)) = self.ctx.remove_socket(token) {
                let _ = self.ctx.poll.registry().deregister(&mut conn.stream);
            }
            self.ctx.peers.mark_disconnected(peer.addr);
            return;
        }
        self.ctx.peers.mark_live(peer.addr, token);
        log::info!("initiated outbound connection to {}", peer.addr);
    }

    fn register_connection(&mut self, token: Token) -> bool {
        let key = IoContext::<R>::key_of(token);
        let Some(Socket::Connection(conn)) = self.ctx.sockets.get_mut(key) else {
            return false;
        };
        match self.ctx.poll.registry().register(
            &mut conn.stream,
            token,
            Interest::READABLE | Interest::WRITABLE,
        ) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("failed to register connection socket: {}", e);
                false
            }
        }
    }

    fn dispatch(&mut self, event: &Event) {
        let token = event.token();
        if token == self.ctx.tun_token {
            if event.is_readable() {
                self.handle_tun_readable();
            }
            if event.is_writable() {
                self.handle_tun_writable();
            }
            return;
        }

        let key = IoContext::<R>::key_of(token);
        let is_listener = matches!(self.ctx.sockets.get(key), Some(Socket::Listener { .. }));
        if is_listener {
            if event.is_readable() {
                self.handle_accept(token);
            }
            return;
        }

        if event.is_readable() {
            self.handle_conn_readable(token);
        }
        if event.is_writable() {
            self.handle_conn_writable(token);
        }
    }

    fn handle_accept(&mut self, listener_token: Token) {
        loop {
            let key = IoContext::<R>::key_of(listener_token);
            let (result, family) = match self.ctx.sockets.get(key) {
                Some(Socket::Listener { listener, family }) => (listener.accept(), *family),
                _ => return,
            };
            match result {
                Ok((stream, peer_addr)) => {
                    let peer = NetAddress::from_ip(peer_addr.ip());
                    // Accept collision policy: reject the new connection,
                    // keep the existing live one. `stream` is simply
                    // dropped, closing the new fd.
                    if self.ctx.peers.is_live(&peer) {
                        log::warn!(
                            "rejecting inbound connection from {}: a live connection already exists",
                            peer
                        );
                        continue;
                    }
                    let conn = Connection::new(stream, peer, family, false, self.ctx.conn_ring_bytes);
                    let token = self.ctx.insert_socket(Socket::Connection(conn));
                    if !self.register_connection(token) {
                        self.ctx.remove_socket(token);
                        continue;
                    }
                    if let Err(e) = self.ctx.route_manager.add(&self.ctx.address_set, &peer) {
                        log::warn!("route install for inbound {} failed, rejecting: {}", peer, e);
                        if let Some(Socket::Connection(mut conn)) = self.ctx.remove_socket(token) {
                            let _ = self.ctx.poll.registry().deregister(&mut conn.stream);
                        }
                        continue;
                    }
                    self.ctx.peers.mark_live(peer, token);
                    log::info!("accepted inbound connection from {}", peer);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) => {
                    log::warn!("accept failed: {}", e);
                    return;
                }
            }
        }
    }

    /// Drains bytes off the wire into the connection's rx ring, handing
    /// whole packets straight to the tun backlog as they become
    /// available. The tun socket is lifted out of the slab for the
    /// duration so both it and the connection can be borrowed mutably
    /// at once.
    fn handle_conn_readable(&mut self, token: Token) {
        let key = IoContext::<R>::key_of(token);
        let tun_key = IoContext::<R>::key_of(self.ctx.tun_token);

        let mut tun_socket = match self.ctx.sockets.try_remove(tun_key) {
            Some(Socket::Tun(t)) => t,
            Some(other) => {
                self.ctx.sockets.insert(other);
                return;
            }
            None => return,
        };

        let mut destroy = false;
        if let Some(Socket::Connection(conn)) = self.ctx.sockets.get_mut(key) {
            let fd = conn.raw_fd();
            let mut tun_tx = TunTx {
                fd: tun_socket.fd,
                backlog: &mut tun_socket.tx,
            };
            let mut received = 0usize;
            let mut pushed_to_tun = 0usize;
            let outcome = conn.rx.fill(
                |chunk, additional_len| {
                    let (n, outcome) = recv_into(fd, chunk, additional_len);
                    received += n;
                    (n, outcome)
                },
                Some(&mut |a: &[u8], b: &[u8]| {
                    let n = framer::push_to_tun(a, b, &mut tun_tx);
                    pushed_to_tun += n;
                    n
                }),
            );
            if matches!(outcome, IoOutcome::Kill) {
                destroy = true;
            }
            if received > 0 {
                self.ctx.counters.world_rx.record(received);
            }
            if pushed_to_tun > 0 {
                self.ctx.counters.tun_tx.record(pushed_to_tun);
            }
        }

        // `try_remove` guarantees the slot stays vacant until the next
        // insert; re-inserting here always lands back at `tun_key`.
        let reinserted_key = self.ctx.sockets.insert(Socket::Tun(tun_socket));
        debug_assert_eq!(reinserted_key, tun_key);

        if destroy {
            self.teardown_connection(token);
        }
    }

    fn handle_conn_writable(&mut self, token: Token) {
        let key = IoContext::<R>::key_of(token);
        let mut destroy = false;
        if let Some(Socket::Connection(conn)) = self.ctx.sockets.get_mut(key) {
            let fd = conn.raw_fd();
            let outcome = conn.tx.drain(|chunk, _additional| send_from(fd, chunk));
            if matches!(outcome, IoOutcome::Kill) {
                destroy = true;
            }
        }
        if destroy {
            self.teardown_connection(token);
        }
    }

    /// Lifts the tun socket out of the slab for the duration of the read
    /// loop so its persistent read-scratch buffer can be borrowed
    /// mutably while `forward_tun_packet` is free to borrow the rest of
    /// `ctx` (including the slab, for the destination connection).
    fn handle_tun_readable(&mut self) {
        let tun_key = IoContext::<R>::key_of(self.ctx.tun_token);
        let mut tun_socket = match self.ctx.sockets.try_remove(tun_key) {
            Some(Socket::Tun(t)) => t,
            Some(other) => {
                self.ctx.sockets.insert(other);
                return;
            }
            None => return,
        };

        loop {
            match framer::read_tun_packet(tun_socket.fd, &mut tun_socket.read_scratch) {
                Ok(Some(n)) if n > 0 => {
                    self.ctx.counters.tun_rx.record(n);
                    self.forward_tun_packet(&tun_socket.read_scratch[..n]);
                }
                Ok(Some(_)) | Ok(None) => break,
                Err(e) => {
                    log::warn!("failed to read from tun device: {}", e);
                    break;
                }
            }
        }

        let reinserted_key = self.ctx.sockets.insert(Socket::Tun(tun_socket));
        debug_assert_eq!(reinserted_key, tun_key);
    }

    /// Routes one tun-sourced packet to the connection for its
    /// destination address, if one is live. Dispatches on IP version
    /// first, as a plain `match` with one arm per version and no shared
    /// fall-through arm.
    fn forward_tun_packet(&mut self, packet: &[u8]) {
        match packet.first().map(|b| b >> 4) {
            Some(4) => self.forward_tun_packet_ipv4(packet),
            Some(6) => {
                log::warn!("dropping an IPv6 packet from tun; IPv6 forwarding is stubbed");
                self.ctx.counters.tun_rx.record_drop(packet.len());
            }
            Some(other) => {
                log::warn!("dropping an unknown L3 packet from tun (version {})", other);
                self.ctx.counters.tun_rx.record_drop(packet.len());
            }
            None => self.ctx.counters.tun_rx.record_drop(0),
        }
    }

    fn forward_tun_packet_ipv4(&mut self, packet: &[u8]) {
        // Both "no destination connection" and "tx ring cannot hold the
        // packet" are world-tx drops.
        let Some(dest) = framer::destination_ipv4(packet) else {
            self.ctx.counters.world_tx.record_drop(packet.len());
            return;
        };
        let dest_addr = NetAddress::from_ipv4_header_bytes(&dest);
        let Some(token) = self.ctx.peers.token_for(&dest_addr) else {
            self.ctx.counters.world_tx.record_drop(packet.len());
            return;
        };
        let key = IoContext::<R>::key_of(token);
        if let Some(Socket::Connection(conn)) = self.ctx.sockets.get_mut(key) {
            let fd = conn.raw_fd();
            let mut source = PacketSource::new(packet);
            let outcome = conn.tx.fill(
                |dst, additional_len| source.handler(dst, additional_len),
                Some(&mut |a: &[u8], b: &[u8]| framer::write_passthru_to_conn(a, b, fd)),
            );
            if outcome == IoOutcome::OkNotEnoughSpace {
                self.ctx.counters.world_tx.record_drop(packet.len());
            } else {
                self.ctx.counters.world_tx.record(packet.len());
            }
        } else {
            self.ctx.counters.world_tx.record_drop(packet.len());
        }
    }

    fn handle_tun_writable(&mut self) {
        let tun_key = IoContext::<R>::key_of(self.ctx.tun_token);
        if let Some(Socket::Tun(tun)) = self.ctx.sockets.get_mut(tun_key) {
            let fd = tun.fd;
            let scratch = &mut tun.write_scratch;
            tun.tx.drain(|chunk, _additional| scratch.write_to_tun(chunk, fd));
        }
    }

    fn teardown_connection(&mut self, token: Token) {
        if let Some(Socket::Connection(mut conn)) = self.ctx.remove_socket(token) {
            let _ = self.ctx.poll.registry().deregister(&mut conn.stream);
            if conn.outbound {
                self.ctx.peers.mark_disconnected(conn.peer);
            } else {
                self.ctx.peers.live.remove(&conn.peer);
            }
            log::info!("tearing down connection to {}", conn.peer);
            let _ = self
                .ctx
                .route_manager
                .remove(&self.ctx.address_set, &conn.peer);
        }
    }
}

fn recv_into(fd: RawFd, buf: &mut [u8], _additional_len: usize) -> (usize, IoOutcome) {
    let ret = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
    if ret > 0 {
        (ret as usize, IoOutcome::Ok)
    } else if ret == 0 {
        (0, IoOutcome::Kill)
    } else {
        let err = std::io::Error::last_os_error();
        match err.kind() {
            ErrorKind::WouldBlock => (0, IoOutcome::OkExhausted),
            ErrorKind::Interrupted => (0, IoOutcome::Ok),
            _ => (0, IoOutcome::UnknownErr),
        }
    }
}

fn send_from(fd: RawFd, buf: &[u8]) -> (usize, IoOutcome) {
    match framer::send_fd(fd, buf) {
        Some(n) if n == buf.len() => (n, IoOutcome::Ok),
        Some(n) => (n, IoOutcome::OkExhausted),
        None => {
            let err = std::io::Error::last_os_error();
            match err.kind() {
                ErrorKind::WouldBlock => (0, IoOutcome::OkExhausted),
                ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => (0, IoOutcome::Kill),
                _ => (0, IoOutcome::UnknownErr),
            }
        }
    }
}

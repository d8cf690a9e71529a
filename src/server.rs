//! C6 (event loop / readiness driver) and the connection-list half of C5
//! (broadcast + replay). Mirrors the original `page.c` main loop and
//! `server.h` (`server_step_client`, `server_ws_handle_request`), rebuilt on
//! `mio::Poll` + `slab::Slab` instead of the C original's raw `poll(2)` +
//! intrusive linked list.

use std::io::{self, ErrorKind};
use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;

use crate::connection::{Connection, Phase, StepResult};
use crate::error::ServerError;
use crate::ring::{Point, PointRing};

const LISTENER_TOKEN: Token = Token(0);
const TOKEN_BASE: usize = 1;

/// The original C program blocks in `poll(2)` with no timeout (`-1`) since
/// it never shuts down on its own. This port adds an orderly shutdown path
/// (SIGINT/SIGTERM -> `AtomicBool`, with no original counterpart), which
/// needs the loop to wake up periodically to notice the flag even when no
/// connection has anything to do.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct Server {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: Slab<Connection>,
    next_id: u64,
    ring: PointRing,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn new(std_listener: StdTcpListener, shutdown: Arc<AtomicBool>) -> Result<Self, ServerError> {
        std_listener.set_nonblocking(true).map_err(ServerError::Bind)?;
        let mut listener = TcpListener::from_std(std_listener);

        let poll = Poll::new().map_err(ServerError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(ServerError::Poll)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(128),
            listener,
            connections: Slab::new(),
            next_id: 0,
            ring: PointRing::default(),
            shutdown,
        })
    }

    /// Run until the shutdown flag is observed. Drops every connection and
    /// frees the ring (via ordinary `Drop`) on the way out.
    ///
    /// Mirrors `page.c`'s `main` loop: one `poll` wakeup drives a pass over
    /// *every* live connection, not just the ones whose token was reported
    /// ready (`server_step_client` is called for each client in the list
    /// every iteration; each `step` call itself no-ops on `WouldBlock`). This
    /// is also where the per-connection idle timeout gets its only chance to
    /// fire; it is checked inside `step`, so a connection only times out
    /// once something wakes the loop.
    pub fn run(&mut self) -> io::Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.poll.poll(&mut self.events, Some(SHUTDOWN_POLL_INTERVAL)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "poll() failed, retrying");
                    continue;
                }
            }

            if self.events.iter().any(|ev| ev.token() == LISTENER_TOKEN) {
                self.accept_new_connections();
            }

            let slots: Vec<usize> = self.connections.iter().map(|(slot, _)| slot).collect();
            for slot in slots {
                if self.connections.contains(slot) {
                    self.drive_connection(slot);
                }
            }
        }

        tracing::info!("shutdown signal observed, dropping all connections");
        for (_, conn) in self.connections.iter_mut() {
            let _ = self.poll.registry().deregister(&mut conn.stream);
        }
        self.connections.clear();
        Ok(())
    }

    fn accept_new_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let entry = self.connections.vacant_entry();
                    let slot = entry.key();
                    let token = Token(slot + TOKEN_BASE);

                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        tracing::warn!(error = %e, "failed to register accepted connection");
                        continue;
                    }

                    let id = self.next_id;
                    self.next_id += 1;
                    tracing::info!(connection_id = id, %peer, "accepted connection");
                    entry.insert(Connection::new(id, stream));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(error = %e, "accept() failed");
                    break;
                }
            }
        }
    }

    /// The step wrapper: loop `step` handling
    /// `Restart`/`WsMessageReady`, stopping at `NoAction`/`Error`, and
    /// replaying ring contents exactly once right after an HTTP->Websocket
    /// phase transition.
    fn drive_connection(&mut self, slot: usize) {
        let pre_phase = self.connections[slot].phase;

        loop {
            let result = self.connections[slot].step();
            match result {
                StepResult::Error(e) => {
                    let id = self.connections[slot].id;
                    tracing::warn!(connection_id = id, error = %e, "dropping connection");
                    self.drop_connection(slot);
                    return;
                }
                StepResult::NoAction => break,
                StepResult::Restart => continue,
                StepResult::WsMessageReady(payload) => {
                    self.handle_ws_message(slot, &payload);
                    continue;
                }
            }
        }

        if !self.connections.contains(slot) {
            return;
        }
        if pre_phase != Phase::Websocket && self.connections[slot].phase == Phase::Websocket {
            self.replay_to(slot);
        }

        self.reregister(slot);
    }

    fn reregister(&mut self, slot: usize) {
        let Some(conn) = self.connections.get_mut(slot) else {
            return;
        };
        let token = Token(slot + TOKEN_BASE);
        let interest = conn.interest();
        if let Err(e) = self
            .poll
            .registry()
            .reregister(&mut conn.stream, token, interest)
        {
            tracing::warn!(connection_id = conn.id, error = %e, "reregister failed");
        }
    }

    fn drop_connection(&mut self, slot: usize) {
        if self.connections.contains(slot) {
            let mut conn = self.connections.remove(slot);
            let _ = self.poll.registry().deregister(&mut conn.stream);
        }
    }

    /// C5: parse the payload, update the ring (possibly emitting a `Remove`
    /// broadcast first), then broadcast the new `Add`.
    fn handle_ws_message(&mut self, sender_slot: usize, payload: &[u8]) {
        let sender_id = self.connections[sender_slot].id;

        let Some((path_id, x, y)) = parse_point_payload(payload) else {
            tracing::warn!(connection_id = sender_id, "malformed point payload, dropping message");
            return;
        };

        if let Some(evicted) = self.ring.push_add(sender_id, path_id, x, y) {
            self.broadcast(&evicted);
        }

        let added = Point {
            action: crate::ring::Action::Add,
            client_id: sender_id,
            path_id,
            x,
            y,
        };
        self.broadcast(&added);
    }

    fn broadcast(&mut self, point: &Point) {
        let encoded = point.encode();
        for slot in self.ws_slots() {
            if let Some(conn) = self.connections.get_mut(slot) {
                conn.enqueue_ws_text(encoded.as_bytes());
            }
            self.reregister(slot);
        }
    }

    /// Replay the ring's current contents to a newly-upgraded peer.
    /// Best-effort: only one outbound frame fits at a time, so later points
    /// may be dropped if the peer hasn't drained yet.
    fn replay_to(&mut self, slot: usize) {
        let encoded: Vec<String> = self.ring.iter_live().map(Point::encode).collect();
        if let Some(conn) = self.connections.get_mut(slot) {
            for text in encoded {
                if !conn.enqueue_ws_text(text.as_bytes()) {
                    break;
                }
            }
        }
    }

    fn ws_slots(&self) -> Vec<usize> {
        self.connections
            .iter()
            .filter(|(_, c)| c.phase == Phase::Websocket)
            .map(|(slot, _)| slot)
            .collect()
    }
}

/// Parse `"<path_id>, <x>, <y>"`.
fn parse_point_payload(payload: &[u8]) -> Option<(u64, f64, f64)> {
    let text = std::str::from_utf8(payload).ok()?;
    let mut parts = text.split(',').map(str::trim);
    let path_id: u64 = parts.next()?.parse().ok()?;
    let x: f64 = parts.next()?.parse().ok()?;
    let y: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((path_id, x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_payload() {
        assert_eq!(
            parse_point_payload(b"7, 100, 200"),
            Some((7, 100.0, 200.0))
        );
    }

    #[test]
    fn rejects_extra_fields() {
        assert_eq!(parse_point_payload(b"7, 100, 200, 9"), None);
    }

    #[test]
    fn rejects_non_numeric_fields() {
        assert_eq!(parse_point_payload(b"abc, 1, 2"), None);
    }

    #[test]
    fn rejects_missing_fields() {
        assert_eq!(parse_point_payload(b"7, 100"), None);
    }
}

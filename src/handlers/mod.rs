//! Relay command handlers.
//!
//! The [`Dispatcher`] owns nothing but its session id and a reference to the
//! shared [`Registry`]. Each frame is decoded into a [`Command`] and applied
//! in a single critical section; the frames it produces are collected as
//! [`Delivery`] values and sent only after the registry lock is released.
//!
//! ## Replies
//!
//! | Command | Reply to caller | Frame to target |
//! |---|---|---|
//! | `join <id>` | target banner, or `no group found` / `already a member` | `joined <self>` |
//! | `add <id>` | `added to self` / `already added` | caller banner |
//! | `publish <msg>` | - | `<self> <msg>` to every peer |
//! | `write <id> <msg>` | - | `<self> <msg>` to that peer |

mod command;

pub use command::Command;

use crate::state::{ConnectionHandle, Registry, RegistryGuard, SessionId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

pub const NO_GROUP_FOUND: &str = "no group found";
pub const ALREADY_A_MEMBER: &str = "already a member";
pub const ALREADY_ADDED: &str = "already added";
pub const ADDED_TO_SELF: &str = "added to self";

/// What the connection loop should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Exit,
}

/// A frame waiting to be sent once the registry lock is dropped.
#[derive(Debug)]
pub struct Delivery {
    pub to: ConnectionHandle,
    pub frame: String,
}

/// Per-connection command processor.
pub struct Dispatcher {
    session: SessionId,
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(session: SessionId, registry: Arc<Registry>) -> Self {
        Self { session, registry }
    }

    /// Decode and apply one inbound frame.
    pub fn dispatch(&self, frame: &str) -> Outcome {
        let start = Instant::now();
        let command = Command::parse(frame);

        let (outcome, deliveries) = {
            let mut registry = self.registry.lock();
            self.apply(&mut registry, command)
        };

        for delivery in deliveries {
            trace!(to = %delivery.to.session(), "Delivering frame");
            delivery.to.send(delivery.frame);
        }

        crate::metrics::record_command(command.name(), start.elapsed().as_secs_f64());
        outcome
    }

    /// Apply a command against the locked registry.
    fn apply(&self, registry: &mut RegistryGuard<'_>, command: Command<'_>) -> (Outcome, Vec<Delivery>) {
        let mut out = Vec::new();
        match command {
            Command::Exit => return (Outcome::Exit, out),
            Command::Join(target) => self.join(registry, target, &mut out),
            Command::Publish(text) => self.publish(registry, text, &mut out),
            Command::Add(target) => self.add(registry, target, &mut out),
            Command::Write { target, text } => self.write(registry, target, text, &mut out),
            Command::Banner(text) => self.banner(registry, text),
            Command::Unknown(verb) => trace!(verb, "Ignoring unrecognized command"),
        }
        (Outcome::Continue, out)
    }

    /// `join <id>`: the caller becomes a peer of the target.
    fn join(&self, registry: &mut RegistryGuard<'_>, target: &str, out: &mut Vec<Delivery>) {
        let Some(me) = registry.lookup(self.session.as_str()) else {
            debug!("Join from unregistered session");
            return;
        };
        let host = me.host().clone();

        let Some(other) = registry.lookup_mut(target) else {
            out.push(Delivery { to: host, frame: NO_GROUP_FOUND.to_string() });
            return;
        };

        if other.add_peer(self.session.clone(), host.clone()) {
            debug!(group = %other.id(), members = other.peer_count(), "Joined group");
            out.push(Delivery { to: host, frame: other.banner().to_string() });
            out.push(Delivery {
                to: other.host().clone(),
                frame: format!("joined {}", self.session),
            });
        } else {
            out.push(Delivery { to: host, frame: ALREADY_A_MEMBER.to_string() });
        }
    }

    /// `add <id>`: the target becomes a peer of the caller. Unknown targets
    /// are ignored without a reply.
    fn add(&self, registry: &mut RegistryGuard<'_>, target: &str, out: &mut Vec<Delivery>) {
        let Some((other_id, other_host)) = registry
            .lookup(target)
            .map(|other| (other.id().clone(), other.host().clone()))
        else {
            return;
        };
        let Some(me) = registry.lookup_mut(self.session.as_str()) else {
            debug!("Add from unregistered session");
            return;
        };

        if me.add_peer(other_id, other_host.clone()) {
            debug!(peer = %target, "Added peer");
            out.push(Delivery { to: me.host().clone(), frame: ADDED_TO_SELF.to_string() });
            out.push(Delivery { to: other_host, frame: me.banner().to_string() });
        } else {
            out.push(Delivery { to: me.host().clone(), frame: ALREADY_ADDED.to_string() });
        }
    }

    /// `publish <msg>`: relay to every peer.
    fn publish(&self, registry: &RegistryGuard<'_>, text: &str, out: &mut Vec<Delivery>) {
        let Some(me) = registry.lookup(self.session.as_str()) else {
            return;
        };
        let frame = format!("{} {}", self.session, text);
        let peers = me.list_peers();
        crate::metrics::record_fanout(peers.len());
        out.extend(peers.into_iter().map(|peer| {
            trace!(peer = %peer.id, "Publishing to peer");
            Delivery {
                to: peer.conn,
                frame: frame.clone(),
            }
        }));
    }

    /// `write <id> <msg>`: relay to one peer, if it is one.
    fn write(&self, registry: &RegistryGuard<'_>, target: &str, text: &str, out: &mut Vec<Delivery>) {
        let Some(peer) = registry
            .lookup(self.session.as_str())
            .and_then(|me| me.peer(target))
        else {
            return;
        };
        out.push(Delivery {
            to: peer.conn.clone(),
            frame: format!("{} {}", self.session, text),
        });
    }

    /// `banner <text>`: replace the banner. Existing peers are not notified.
    fn banner(&self, registry: &mut RegistryGuard<'_>, text: &str) {
        if let Some(me) = registry.lookup_mut(self.session.as_str()) {
            me.set_banner(text.to_string());
        }
    }
}

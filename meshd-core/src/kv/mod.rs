//! The coordination KV adapter (§4.C): typed CRUD plus a snapshot-then-stream
//! watch, expressed as a trait so the membership core (§4.E) and the
//! orchestrator (§4.F) are generic over the concrete transport.

use crate::error::KvError;
use crossbeam_channel::Receiver;
use ipnet::IpNet;
use meshd_shared::Peer;

#[cfg(test)]
pub mod memory;
#[cfg(target_os = "linux")]
pub mod nats;

/// One change notification from a `peers.*` watch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Put { key: String, value: Vec<u8>, revision: u64 },
    Delete { key: String, revision: u64 },
    Purge { key: String, revision: u64 },
    /// Marks the boundary between the initial snapshot and steady-state
    /// updates. Delivered exactly once, as the first sentinel on the stream.
    EndOfSnapshot,
}

pub trait KvStore: Send + Sync {
    /// Writes a new record at `peers.<b64(peer.allowed_ip)>`. Fails with
    /// `KeyExists` if a record is already present there.
    fn create_peer(&self, peer: &Peer) -> Result<u64, KvError>;

    /// Reads the current record at `peers.<b64(allowed_ip)>`.
    fn get_peer(&self, allowed_ip: &IpNet) -> Result<(Peer, u64), KvError>;

    /// Compare-and-swap update against `expected_revision`.
    fn update_peer(&self, peer: &Peer, expected_revision: u64) -> Result<u64, KvError>;

    /// Compare-and-swap delete against `expected_revision`.
    fn delete_peer(&self, allowed_ip: &IpNet, expected_revision: u64) -> Result<(), KvError>;

    /// Watches the `peers.*` subject. The returned channel begins with the
    /// full current snapshot (each as `Event::Put`), followed by
    /// `Event::EndOfSnapshot`, and then streams updates indefinitely.
    fn watch(&self) -> Result<Receiver<Event>, KvError>;

    /// Closes the underlying connection. Called once, at the end of
    /// `Agent::stop()` (§4.F); idempotent.
    fn close(&self) -> Result<(), KvError>;
}

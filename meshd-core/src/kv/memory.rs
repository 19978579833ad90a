//! An in-process `KvStore` test double, used by this crate's own test suite
//! to drive the §8 scenarios deterministically without a live NATS server.

use super::{Event, KvStore};
use crate::error::KvError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use ipnet::IpNet;
use meshd_shared::{peer::kv_key_for, Peer};
use std::{collections::HashMap, sync::Mutex};

struct Record {
    value: Vec<u8>,
    revision: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Record>,
    next_revision: u64,
    subscribers: Vec<Sender<Event>>,
}

#[derive(Default)]
pub struct MemoryKvStore {
    inner: Mutex<Inner>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a peer record directly, bypassing `create_peer`'s conflict
    /// check. Used by tests to pre-populate the store before a `watch`.
    pub fn seed(&self, peer: &Peer) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_revision += 1;
        let revision = inner.next_revision;
        inner.entries.insert(
            peer.kv_key(),
            Record {
                value: peer.encode(),
                revision,
            },
        );
    }

    fn publish(inner: &mut Inner, event: Event) {
        inner.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl KvStore for MemoryKvStore {
    fn create_peer(&self, peer: &Peer) -> Result<u64, KvError> {
        let mut inner = self.inner.lock().unwrap();
        let key = peer.kv_key();
        if inner.entries.contains_key(&key) {
            return Err(KvError::KeyExists);
        }
        inner.next_revision += 1;
        let revision = inner.next_revision;
        inner.entries.insert(
            key.clone(),
            Record {
                value: peer.encode(),
                revision,
            },
        );
        Self::publish(
            &mut inner,
            Event::Put {
                key,
                value: peer.encode(),
                revision,
            },
        );
        Ok(revision)
    }

    fn get_peer(&self, allowed_ip: &IpNet) -> Result<(Peer, u64), KvError> {
        let inner = self.inner.lock().unwrap();
        let key = kv_key_for(allowed_ip);
        let record = inner.entries.get(&key).ok_or(KvError::KeyNotFound)?;
        let peer = Peer::decode(&record.value).map_err(|_| KvError::KeyNotFound)?;
        Ok((peer, record.revision))
    }

    fn update_peer(&self, peer: &Peer, expected_revision: u64) -> Result<u64, KvError> {
        let mut inner = self.inner.lock().unwrap();
        let key = peer.kv_key();
        let current = inner.entries.get(&key).ok_or(KvError::KeyNotFound)?;
        if current.revision != expected_revision {
            return Err(KvError::RevisionMismatch);
        }
        inner.next_revision += 1;
        let revision = inner.next_revision;
        inner.entries.insert(
            key.clone(),
            Record {
                value: peer.encode(),
                revision,
            },
        );
        Self::publish(
            &mut inner,
            Event::Put {
                key,
                value: peer.encode(),
                revision,
            },
        );
        Ok(revision)
    }

    fn delete_peer(&self, allowed_ip: &IpNet, expected_revision: u64) -> Result<(), KvError> {
        let mut inner = self.inner.lock().unwrap();
        let key = kv_key_for(allowed_ip);
        let current = inner.entries.get(&key).ok_or(KvError::KeyNotFound)?;
        if current.revision != expected_revision {
            return Err(KvError::RevisionMismatch);
        }
        inner.entries.remove(&key);
        inner.next_revision += 1;
        let revision = inner.next_revision;
        Self::publish(&mut inner, Event::Delete { key, revision });
        Ok(())
    }

    fn watch(&self) -> Result<Receiver<Event>, KvError> {
        let mut inner = self.inner.lock().unwrap();
        let (tx, rx) = unbounded();

        for (key, record) in inner.entries.iter() {
            let _ = tx.send(Event::Put {
                key: key.clone(),
                value: record.value.clone(),
                revision: record.revision,
            });
        }
        let _ = tx.send(Event::EndOfSnapshot);

        inner.subscribers.push(tx);
        Ok(rx)
    }

    fn close(&self) -> Result<(), KvError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshd_shared::PublicKey;
    use wireguard_control::Key;

    fn sample_peer(allowed_ip: &str) -> Peer {
        Peer {
            name: "node-a".into(),
            public_key: PublicKey(Key::generate_private().get_public()),
            advertise_address: "203.0.113.9".parse().unwrap(),
            allowed_ip: allowed_ip.parse().unwrap(),
            wg_port: 51820,
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = MemoryKvStore::new();
        let peer = sample_peer("10.42.0.1/24");
        let revision = store.create_peer(&peer).unwrap();

        let (fetched, fetched_rev) = store.get_peer(&peer.allowed_ip).unwrap();
        assert_eq!(fetched, peer);
        assert_eq!(fetched_rev, revision);
    }

    #[test]
    fn create_twice_at_the_same_address_fails() {
        let store = MemoryKvStore::new();
        let peer = sample_peer("10.42.0.1/24");
        store.create_peer(&peer).unwrap();

        let mut other = sample_peer("10.42.0.1/24");
        other.name = "node-b".into();
        assert!(matches!(
            store.create_peer(&other),
            Err(KvError::KeyExists)
        ));
    }

    #[test]
    fn update_with_stale_revision_fails() {
        let store = MemoryKvStore::new();
        let peer = sample_peer("10.42.0.1/24");
        let revision = store.create_peer(&peer).unwrap();

        let mut updated = peer.clone();
        updated.name = "node-a-renamed".into();
        store.update_peer(&updated, revision).unwrap();

        assert!(matches!(
            store.update_peer(&updated, revision),
            Err(KvError::RevisionMismatch)
        ));
    }

    #[test]
    fn watch_snapshot_then_stream() {
        let store = MemoryKvStore::new();
        let seeded = sample_peer("10.42.0.1/24");
        store.seed(&seeded);

        let events = store.watch().unwrap();
        assert_eq!(
            events.recv().unwrap(),
            Event::Put {
                key: seeded.kv_key(),
                value: seeded.encode(),
                revision: 1,
            }
        );
        assert_eq!(events.recv().unwrap(), Event::EndOfSnapshot);

        let other = sample_peer("10.42.0.2/24");
        store.create_peer(&other).unwrap();
        match events.recv().unwrap() {
            Event::Put { key, .. } => assert_eq!(key, other.kv_key()),
            other => panic!("expected Put, got {other:?}"),
        }
    }
}

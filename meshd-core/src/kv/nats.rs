//! A `KvStore` backed by a NATS JetStream key-value bucket, the same family
//! of client the original agent this system descends from used
//! (`nats.go`'s `jetstream.KeyValue`), translated to this crate's blocking
//! idiom rather than goroutines and channels.

use super::{Event, KvStore};
use crate::error::KvError;
use crossbeam_channel::{unbounded, Receiver};
use ipnet::IpNet;
use meshd_shared::{peer::kv_key_for, Peer};
use nats::jetstream::kv::{Operation, Store};
use std::{io, path::Path};

pub struct NatsKvStore {
    connection: nats::Connection,
    store: Store,
}

impl NatsKvStore {
    /// Connects to `url` using the credentials file at `creds_path`, and
    /// binds to the named JetStream KV bucket.
    pub fn connect(url: &str, creds_path: &Path, bucket: &str) -> Result<Self, KvError> {
        let connection = nats::Options::with_credentials(creds_path)
            .connect(url)
            .map_err(|e| KvError::Unavailable(e.to_string()))?;
        let context = nats::jetstream::new(connection.clone());
        let store = context
            .key_value(bucket)
            .map_err(|e| KvError::Unavailable(e.to_string()))?;

        Ok(Self { connection, store })
    }
}

fn classify_io_error(err: io::Error) -> KvError {
    let message = err.to_string();
    if message.contains("wrong last sequence") || message.contains("revision") {
        KvError::RevisionMismatch
    } else if message.contains("already exists") || message.contains("key exists") {
        KvError::KeyExists
    } else if message.contains("not found") {
        KvError::KeyNotFound
    } else {
        KvError::Unavailable(message)
    }
}

impl KvStore for NatsKvStore {
    fn create_peer(&self, peer: &Peer) -> Result<u64, KvError> {
        self.store
            .create(&peer.kv_key(), peer.encode())
            .map_err(classify_io_error)
    }

    fn get_peer(&self, allowed_ip: &IpNet) -> Result<(Peer, u64), KvError> {
        let key = kv_key_for(allowed_ip);
        let entry = self
            .store
            .entry(&key)
            .map_err(classify_io_error)?
            .ok_or(KvError::KeyNotFound)?;
        let peer = Peer::decode(&entry.value).map_err(|_| KvError::KeyNotFound)?;
        Ok((peer, entry.revision))
    }

    fn update_peer(&self, peer: &Peer, expected_revision: u64) -> Result<u64, KvError> {
        self.store
            .update(&peer.kv_key(), peer.encode(), expected_revision)
            .map_err(classify_io_error)
    }

    fn delete_peer(&self, allowed_ip: &IpNet, expected_revision: u64) -> Result<(), KvError> {
        let key = kv_key_for(allowed_ip);
        // `Store::delete` has no revision-checked variant, unlike `update`.
        // Fence on the expected revision through `update` first, same CAS
        // primitive `update_peer` uses, so there's no gap between checking
        // the revision and acting on it; the value written is irrelevant
        // since `delete` removes the key right after.
        self.store
            .update(&key, &b""[..], expected_revision)
            .map_err(classify_io_error)?;
        self.store.delete(&key).map_err(classify_io_error)
    }

    fn watch(&self) -> Result<Receiver<Event>, KvError> {
        let watch = self.store.watch_all().map_err(classify_io_error)?;
        let (tx, rx) = unbounded();

        std::thread::spawn(move || {
            let mut past_snapshot = false;
            for item in watch {
                let entry = match item {
                    Ok(Some(entry)) => entry,
                    Ok(None) => {
                        if !past_snapshot {
                            past_snapshot = true;
                            if tx.send(Event::EndOfSnapshot).is_err() {
                                return;
                            }
                        }
                        continue;
                    },
                    Err(_) => continue,
                };

                let event = match entry.operation {
                    Operation::Put => Event::Put {
                        key: entry.key,
                        value: entry.value,
                        revision: entry.revision,
                    },
                    Operation::Delete => Event::Delete {
                        key: entry.key,
                        revision: entry.revision,
                    },
                    Operation::Purge => Event::Purge {
                        key: entry.key,
                        revision: entry.revision,
                    },
                };

                if tx.send(event).is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }

    fn close(&self) -> Result<(), KvError> {
        self.connection.close();
        Ok(())
    }
}

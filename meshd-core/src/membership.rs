//! Synced membership state (§4.E): the watch loop, the in-memory peer map,
//! and the snapshot/stream callback protocol.

use crate::kv::{Event, KvStore};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use meshd_shared::{Peer, PublicKey};
use std::{
    collections::HashMap,
    sync::{Mutex, RwLock},
    thread::JoinHandle,
};

/// The three callbacks invoked as the watch loop observes change events.
/// This is the polymorphism boundary between the KV watch and whatever
/// consumes membership changes (the tunnel device controller, in practice).
pub struct Callbacks {
    pub on_init_peers: Box<dyn Fn(HashMap<String, Peer>) + Send + Sync>,
    pub on_peer_put: Box<dyn Fn(&Peer) + Send + Sync>,
    pub on_peer_delete: Box<dyn Fn(&Peer) + Send + Sync>,
}

pub struct SyncedMembership {
    peers: std::sync::Arc<RwLock<HashMap<String, Peer>>>,
    stop_tx: Sender<()>,
    finish_rx: Receiver<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncedMembership {
    /// Starts the watch: runs the snapshot phase inline (so `on_init_peers`
    /// has already fired by the time this returns), then spawns the
    /// steady-state stream loop on a dedicated worker thread.
    pub fn start<K: KvStore + ?Sized>(
        kv: &K,
        ignore_peer: PublicKey,
        callbacks: Callbacks,
    ) -> Result<Self, crate::error::KvError> {
        let events = kv.watch()?;
        let peers = std::sync::Arc::new(RwLock::new(HashMap::new()));

        loop {
            match events.recv() {
                Ok(Event::EndOfSnapshot) => break,
                Ok(Event::Put { key, value, .. }) => match Peer::decode(&value) {
                    Ok(peer) => {
                        if peer.public_key != ignore_peer {
                            peers.write().unwrap().insert(key, peer);
                        }
                    },
                    Err(e) => log::error!("failed to decode peer record during snapshot: {e}"),
                },
                Ok(Event::Delete { .. } | Event::Purge { .. }) => {
                    // The original watch source never emits these before the
                    // end-of-snapshot sentinel; ignore defensively.
                },
                Err(_) => break,
            }
        }

        let snapshot = peers.read().unwrap().clone();
        (callbacks.on_init_peers)(snapshot);
        log::info!("initialized peers, count={}", peers.read().unwrap().len());

        let (stop_tx, stop_rx) = bounded(0);
        let (finish_tx, finish_rx) = bounded(0);
        let worker_peers = peers.clone();

        let worker = std::thread::spawn(move || {
            log::info!("started continuous peer synchronization");
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(events) -> message => {
                        match message {
                            Ok(Event::Put { key, value, .. }) => {
                                match Peer::decode(&value) {
                                    Ok(peer) => {
                                        if peer.public_key == ignore_peer {
                                            continue;
                                        }
                                        log::info!("peer put: {} ({})", peer.name, peer.public_key);
                                        worker_peers.write().unwrap().insert(key, peer.clone());
                                        (callbacks.on_peer_put)(&peer);
                                    },
                                    Err(e) => log::error!("failed to decode peer record: {e}"),
                                }
                            },
                            Ok(Event::Delete { key, .. } | Event::Purge { key, .. }) => {
                                let removed = worker_peers.write().unwrap().remove(&key);
                                if let Some(peer) = removed {
                                    log::info!("peer delete: {} ({})", peer.name, peer.public_key);
                                    (callbacks.on_peer_delete)(&peer);
                                }
                            },
                            Ok(Event::EndOfSnapshot) => {},
                            Err(_) => break,
                        }
                    }
                }
            }
            let _ = finish_tx.send(());
        });

        Ok(Self {
            peers,
            stop_tx,
            finish_rx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// A snapshot copy of the values currently in the map. Safe to call
    /// concurrently with the stream loop.
    pub fn list_peers(&self) -> Vec<Peer> {
        self.peers.read().unwrap().values().cloned().collect()
    }

    /// Stops the stream loop and blocks until it has fully drained. Not
    /// idempotent beyond the first call (the stop channel is consumed).
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
        let _ = self.finish_rx.recv();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

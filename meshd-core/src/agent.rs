//! The agent orchestrator (§4.F): binds self-registration, device setup,
//! and the membership watch into a lifecycle.

use crate::{
    device::TunnelDevice,
    error::{AgentError, KvError},
    kv::KvStore,
    membership::{Callbacks, SyncedMembership},
};
use meshd_shared::Peer;
use std::sync::{Arc, Mutex};
use wireguard_control::Key;

pub struct Agent<K: KvStore, D: TunnelDevice> {
    kv: Arc<K>,
    device: Arc<D>,
    self_peer: Peer,
    private_key: Key,
    membership: Mutex<Option<SyncedMembership>>,
}

impl<K, D> Agent<K, D>
where
    K: KvStore + 'static,
    D: TunnelDevice + 'static,
{
    pub fn new(self_peer: Peer, private_key: Key, kv: Arc<K>, device: Arc<D>) -> Self {
        Self {
            kv,
            device,
            self_peer,
            private_key,
            membership: Mutex::new(None),
        }
    }

    pub fn self_peer(&self) -> &Peer {
        &self.self_peer
    }

    /// Brings up the tunnel device, atomically claims this node's record in
    /// the KV, then starts the membership watch. Per §5, a failed start
    /// tears down the device it already brought up (unlike a normal `stop`,
    /// which leaves the device in place so the node can rejoin by
    /// restarting).
    pub fn start(&self) -> Result<(), AgentError> {
        self.device.ensure()?;
        self.device.set_addr(self.self_peer.allowed_ip)?;
        self.device
            .init_config(&self.private_key, self.self_peer.wg_port)?;

        if let Err(e) = self.claim_self_record() {
            self.teardown_device_after_failed_start();
            return Err(e);
        }

        let device_for_init = self.device.clone();
        let device_for_put = self.device.clone();
        let device_for_delete = self.device.clone();

        let membership = match SyncedMembership::start(
            self.kv.as_ref(),
            self.self_peer.public_key.clone(),
            Callbacks {
                on_init_peers: Box::new(move |peers| {
                    let peers: Vec<Peer> = peers.into_values().collect();
                    if let Err(e) = device_for_init.replace_peers(&peers) {
                        log::error!("failed to replace peers: {e}");
                    }
                }),
                on_peer_put: Box::new(move |peer| {
                    if let Err(e) = device_for_put.add_peer(peer) {
                        log::error!("failed to add peer: {e}");
                    }
                }),
                on_peer_delete: Box::new(move |peer| {
                    if let Err(e) = device_for_delete.remove_peer(&peer.public_key) {
                        log::error!("failed to remove peer: {e}");
                    }
                }),
            },
        ) {
            Ok(membership) => membership,
            Err(e) => {
                self.teardown_device_after_failed_start();
                return Err(AgentError::from(e));
            },
        };

        *self.membership.lock().unwrap() = Some(membership);
        Ok(())
    }

    /// Releases the tunnel device acquired earlier in a `start()` call that
    /// went on to fail. Logged, not propagated: the original error is what
    /// the caller needs to see.
    fn teardown_device_after_failed_start(&self) {
        if let Err(e) = self.device.remove() {
            log::error!("failed to remove tunnel device after failed start: {e}");
        }
    }

    /// Step 1 of `start()`: atomically claim `peers.<b64(self.allowed_ip)>`,
    /// retrying once on a `KeyExists` race against another instance on the
    /// same host.
    fn claim_self_record(&self) -> Result<(), AgentError> {
        for _ in 0..2 {
            match self.kv.get_peer(&self.self_peer.allowed_ip) {
                Err(KvError::KeyNotFound) => match self.kv.create_peer(&self.self_peer) {
                    Ok(_) => return Ok(()),
                    Err(KvError::KeyExists) => continue,
                    Err(e) => return Err(e.into()),
                },
                Ok((stored, revision)) => {
                    if stored.public_key != self.self_peer.public_key {
                        return Err(AgentError::AddressAlreadyInUse);
                    }
                    self.kv.update_peer(&self.self_peer, revision)?;
                    return Ok(());
                },
                Err(e) => return Err(e.into()),
            }
        }
        Err(AgentError::AddressAlreadyInUse)
    }

    /// The full current peer map, excluding self. Safe to call concurrently
    /// with the stream loop.
    pub fn list_peers(&self) -> Vec<Peer> {
        self.membership
            .lock()
            .unwrap()
            .as_ref()
            .map(|m| m.list_peers())
            .unwrap_or_default()
    }

    /// Stops the membership watch (blocking) and releases it. Idempotent:
    /// calling this more than once after the first is a no-op.
    pub fn stop(&self) {
        if let Some(membership) = self.membership.lock().unwrap().take() {
            log::info!("stopping");
            membership.stop();
            if let Err(e) = self.kv.close() {
                log::error!("failed to close kv connection: {e}");
            }
        }
    }
}

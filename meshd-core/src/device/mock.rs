//! An in-process `TunnelDevice` test double recording the calls made to it,
//! so the orchestrator (§4.F) and membership core (§4.E) can be exercised
//! without a real kernel device.

use super::TunnelDevice;
use crate::error::DeviceError;
use ipnet::IpNet;
use meshd_shared::{Peer, PublicKey};
use std::sync::Mutex;

#[derive(Default)]
pub struct MockTunnelDevice {
    state: Mutex<MockState>,
}

#[derive(Default)]
pub struct MockState {
    pub ensured: bool,
    pub removed: bool,
    pub addr: Option<IpNet>,
    pub peers: Vec<Peer>,
}

impl MockTunnelDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Peer> {
        self.state.lock().unwrap().peers.clone()
    }

    pub fn was_ensured(&self) -> bool {
        self.state.lock().unwrap().ensured
    }

    pub fn was_removed(&self) -> bool {
        self.state.lock().unwrap().removed
    }

    pub fn addr(&self) -> Option<IpNet> {
        self.state.lock().unwrap().addr
    }
}

impl TunnelDevice for MockTunnelDevice {
    fn ensure(&self) -> Result<(), DeviceError> {
        self.state.lock().unwrap().ensured = true;
        Ok(())
    }

    fn set_addr(&self, cidr: IpNet) -> Result<(), DeviceError> {
        self.state.lock().unwrap().addr = Some(cidr);
        Ok(())
    }

    fn init_config(&self, _private_key: &wireguard_control::Key, _listen_port: u16) -> Result<(), DeviceError> {
        Ok(())
    }

    fn add_peer(&self, peer: &Peer) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        state.peers.retain(|p| p.public_key != peer.public_key);
        state.peers.push(peer.clone());
        Ok(())
    }

    fn remove_peer(&self, public_key: &PublicKey) -> Result<(), DeviceError> {
        self.state
            .lock()
            .unwrap()
            .peers
            .retain(|p| &p.public_key != public_key);
        Ok(())
    }

    fn replace_peers(&self, peers: &[Peer]) -> Result<(), DeviceError> {
        self.state.lock().unwrap().peers = peers.to_vec();
        Ok(())
    }

    fn remove(&self) -> Result<(), DeviceError> {
        self.state.lock().unwrap().removed = true;
        Ok(())
    }
}

//! The tunnel device controller (§4.D): the idempotent kernel-facing half
//! of the agent.

use crate::error::DeviceError;
use ipnet::IpNet;
use meshd_shared::{Peer, PublicKey};

#[cfg(target_os = "linux")]
pub mod netlink;

#[cfg(test)]
pub mod mock;

#[cfg(target_os = "linux")]
mod wg;
#[cfg(target_os = "linux")]
pub use wg::WgTunnelDevice;

pub trait TunnelDevice: Send + Sync {
    /// Ensures a kernel tunnel link with the configured name exists and is
    /// administratively up. Creates it if absent; raises it either way.
    fn ensure(&self) -> Result<(), DeviceError>;

    /// Assigns `cidr` to the link and removes every other address in the
    /// same address family. Failures removing stragglers are logged, not
    /// propagated.
    fn set_addr(&self, cidr: IpNet) -> Result<(), DeviceError>;

    /// Applies the static device configuration: private key and listen port.
    fn init_config(&self, private_key: &wireguard_control::Key, listen_port: u16) -> Result<(), DeviceError>;

    /// Applies a single peer config without touching the rest of the peer set.
    ///
    /// Skips (and logs) peers whose `allowed_ip`/`advertise_address` can't be
    /// turned into a kernel peer config; this can't actually happen for a
    /// [`Peer`] since those fields are already typed, but mirrors the
    /// contract for callers that build configs from raw strings.
    fn add_peer(&self, peer: &Peer) -> Result<(), DeviceError>;

    /// Removes the peer matching `public_key`. A no-op if absent.
    fn remove_peer(&self, public_key: &PublicKey) -> Result<(), DeviceError>;

    /// Atomically replaces the entire peer set.
    fn replace_peers(&self, peers: &[Peer]) -> Result<(), DeviceError>;

    /// Deletes the device. A no-op if absent.
    fn remove(&self) -> Result<(), DeviceError>;
}

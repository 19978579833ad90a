use super::netlink;
use crate::error::DeviceError;
use ipnet::IpNet;
use meshd_shared::{Peer, PublicKey};
use netlink_packet_route::constants::{AF_INET, AF_INET6};
use std::net::{IpAddr, SocketAddr};
use wireguard_control::{Backend, Device, DeviceUpdate, InterfaceName, Key, PeerConfigBuilder};

pub struct WgTunnelDevice {
    name: InterfaceName,
    backend: Backend,
}

impl WgTunnelDevice {
    pub fn new(name: InterfaceName) -> Self {
        Self {
            name,
            backend: Backend::default(),
        }
    }

    fn peer_config(peer: &Peer) -> PeerConfigBuilder {
        PeerConfigBuilder::new(&peer.public_key.0)
            .set_endpoint(SocketAddr::new(peer.advertise_address, peer.wg_port))
            .add_allowed_ip(peer.allowed_ip.addr(), peer.allowed_ip.prefix_len())
    }

    fn address_family(addr: IpAddr) -> u8 {
        match addr {
            IpAddr::V4(_) => AF_INET as u8,
            IpAddr::V6(_) => AF_INET6 as u8,
        }
    }
}

impl super::TunnelDevice for WgTunnelDevice {
    fn ensure(&self) -> Result<(), DeviceError> {
        let name = self.name.as_str_lossy();
        if !netlink::link_exists(&name)? {
            netlink::create_wireguard_link(&name)?;
        }
        netlink::set_link_up(&name)?;
        Ok(())
    }

    fn set_addr(&self, cidr: IpNet) -> Result<(), DeviceError> {
        let name = self.name.as_str_lossy();
        netlink::add_address(&name, cidr)?;

        let family = Self::address_family(cidr.addr());
        for existing in netlink::list_addresses(&name, family)? {
            if existing != cidr {
                if let Err(e) = netlink::delete_address(&name, &existing) {
                    log::warn!("failed to remove stray address {existing} from {name}: {e}");
                }
            }
        }
        Ok(())
    }

    fn init_config(&self, private_key: &Key, listen_port: u16) -> Result<(), DeviceError> {
        DeviceUpdate::new()
            .set_private_key(private_key.clone())
            .set_listen_port(listen_port)
            .apply(&self.name, self.backend)?;
        Ok(())
    }

    fn add_peer(&self, peer: &Peer) -> Result<(), DeviceError> {
        DeviceUpdate::new()
            .add_peer(Self::peer_config(peer))
            .apply(&self.name, self.backend)?;
        Ok(())
    }

    fn remove_peer(&self, public_key: &PublicKey) -> Result<(), DeviceError> {
        DeviceUpdate::new()
            .remove_peer_by_key(&public_key.0)
            .apply(&self.name, self.backend)?;
        Ok(())
    }

    fn replace_peers(&self, peers: &[Peer]) -> Result<(), DeviceError> {
        let builders: Vec<_> = peers.iter().map(Self::peer_config).collect();
        DeviceUpdate::new()
            .add_peers(&builders)
            .replace_peers()
            .apply(&self.name, self.backend)?;
        Ok(())
    }

    fn remove(&self) -> Result<(), DeviceError> {
        match Device::get(&self.name, self.backend) {
            Ok(device) => device.delete().map_err(DeviceError::from),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DeviceError::from(e)),
        }
    }
}

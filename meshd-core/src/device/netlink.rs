//! Link-up and address assignment helpers for the Linux kernel backend.
//!
//! `wireguard-control` owns WireGuard device *configuration*; it has no
//! opinion on interface *addressing*, which remains a plain rtnetlink
//! concern, requested through the workspace's own `netlink-request` helper
//! the same way `wireguard-control`'s own kernel backend drives link
//! enumeration.

use ipnet::IpNet;
use netlink_packet_route::{
    address::{nlas::Nla as AddressNla, AddressHeader, AddressMessage},
    constants::*,
    link::{self, nlas::Nla as LinkNla},
    LinkMessage, NetlinkMessage, NetlinkPayload, RtnlMessage,
};
use netlink_request::netlink_request_rtnl;
use std::{io, net::IpAddr};

fn link_index(name: &str) -> io::Result<Option<u32>> {
    let responses = netlink_request_rtnl(
        RtnlMessage::GetLink(LinkMessage::default()),
        Some(NLM_F_DUMP | NLM_F_REQUEST),
    )?;

    for response in responses {
        if let NetlinkMessage {
            payload: NetlinkPayload::InnerMessage(RtnlMessage::NewLink(link)),
            ..
        } = response
        {
            let matches_name = link.nlas.iter().any(|nla| match nla {
                LinkNla::IfName(n) => n == name,
                _ => false,
            });
            if matches_name {
                return Ok(Some(link.header.index));
            }
        }
    }
    Ok(None)
}

pub fn link_exists(name: &str) -> io::Result<bool> {
    Ok(link_index(name)?.is_some())
}

pub fn set_link_up(name: &str) -> io::Result<()> {
    let index = link_index(name)?
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "link not found"))?;

    let mut message = LinkMessage::default();
    message.header.index = index;
    message.header.flags = IFF_UP;
    message.header.change_mask = IFF_UP;

    netlink_request_rtnl(
        RtnlMessage::SetLink(message),
        Some(NLM_F_REQUEST | NLM_F_ACK),
    )?;
    Ok(())
}

fn address_family(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => AF_INET as u8,
        IpAddr::V6(_) => AF_INET6 as u8,
    }
}

fn address_bytes(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(a) => a.octets().to_vec(),
        IpAddr::V6(a) => a.octets().to_vec(),
    }
}

pub fn list_addresses(name: &str, family: u8) -> io::Result<Vec<IpNet>> {
    let index = link_index(name)?
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "link not found"))?;

    let mut message = AddressMessage::default();
    message.header.family = family;
    let responses = netlink_request_rtnl(
        RtnlMessage::GetAddress(message),
        Some(NLM_F_DUMP | NLM_F_REQUEST),
    )?;

    let mut addrs = Vec::new();
    for response in responses {
        if let NetlinkMessage {
            payload: NetlinkPayload::InnerMessage(RtnlMessage::NewAddress(addr_msg)),
            ..
        } = response
        {
            if addr_msg.header.index != index {
                continue;
            }
            let ip = addr_msg.nlas.iter().find_map(|nla| match nla {
                AddressNla::Address(bytes) => bytes_to_ip(addr_msg.header.family, bytes),
                _ => None,
            });
            if let Some(ip) = ip {
                if let Ok(net) = IpNet::new(ip, addr_msg.header.prefix_len) {
                    addrs.push(net);
                }
            }
        }
    }
    Ok(addrs)
}

fn bytes_to_ip(family: u8, bytes: &[u8]) -> Option<IpAddr> {
    if family as i32 == AF_INET && bytes.len() == 4 {
        Some(IpAddr::from([bytes[0], bytes[1], bytes[2], bytes[3]]))
    } else if family as i32 == AF_INET6 && bytes.len() == 16 {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(bytes);
        Some(IpAddr::from(octets))
    } else {
        None
    }
}

pub fn add_address(name: &str, cidr: IpNet) -> io::Result<()> {
    let index = link_index(name)?
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "link not found"))?;

    let mut message = AddressMessage::default();
    message.header = AddressHeader {
        family: address_family(&cidr.addr()),
        prefix_len: cidr.prefix_len(),
        flags: 0,
        scope: 0,
        index,
    };
    message
        .nlas
        .push(AddressNla::Address(address_bytes(&cidr.addr())));
    message
        .nlas
        .push(AddressNla::Local(address_bytes(&cidr.addr())));

    netlink_request_rtnl(
        RtnlMessage::NewAddress(message),
        Some(NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_REPLACE),
    )?;
    Ok(())
}

pub fn delete_address(name: &str, cidr: &IpNet) -> io::Result<()> {
    let index = link_index(name)?
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "link not found"))?;

    let mut message = AddressMessage::default();
    message.header = AddressHeader {
        family: address_family(&cidr.addr()),
        prefix_len: cidr.prefix_len(),
        flags: 0,
        scope: 0,
        index,
    };
    message
        .nlas
        .push(AddressNla::Address(address_bytes(&cidr.addr())));

    netlink_request_rtnl(
        RtnlMessage::DelAddress(message),
        Some(NLM_F_REQUEST | NLM_F_ACK),
    )?;
    Ok(())
}

pub fn create_wireguard_link(name: &str) -> io::Result<()> {
    let mut message = LinkMessage::default();
    message.nlas.push(LinkNla::IfName(name.to_owned()));
    message
        .nlas
        .push(LinkNla::Info(vec![link::nlas::Info::Kind(
            link::nlas::InfoKind::Wireguard,
        )]));

    netlink_request_rtnl(
        RtnlMessage::NewLink(message),
        Some(NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL),
    )?;
    Ok(())
}

//! Deterministic carving of a host subnet out of a mesh prefix (§4.A).

use ipnet::IpNet;
use rand_core::{OsRng, RngCore};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Carves a random host subnet of `host_prefix_len` bits out of `mesh_prefix`.
///
/// Bits `[0, mesh_prefix.prefix_len())` are copied verbatim from the mesh
/// prefix; bits `[mesh_prefix.prefix_len(), host_prefix_len)` are drawn from
/// the OS CSPRNG; the remaining tail bits are left zero. No collision check
/// is performed here; uniqueness is enforced by the KV on registration.
///
/// Panics if `host_prefix_len` is shorter than the mesh prefix's own length,
/// or longer than the address family allows (32 for IPv4, 128 for IPv6).
pub fn random_subnet(mesh_prefix: IpNet, host_prefix_len: u8) -> IpNet {
    assert!(
        host_prefix_len >= mesh_prefix.prefix_len(),
        "host prefix length must be at least as long as the mesh prefix length"
    );

    match mesh_prefix {
        IpNet::V4(net) => {
            let max_len = 32;
            assert!(host_prefix_len <= max_len, "IPv4 prefix length out of range");
            let mut bytes = net.network().octets();
            carve(&mut bytes, net.prefix_len(), host_prefix_len);
            let addr = Ipv4Addr::from(bytes);
            IpNet::new(IpAddr::V4(addr), host_prefix_len)
                .expect("constructed prefix length already validated")
        },
        IpNet::V6(net) => {
            let max_len = 128;
            assert!(host_prefix_len <= max_len, "IPv6 prefix length out of range");
            let mut bytes = net.network().octets();
            carve(&mut bytes, net.prefix_len(), host_prefix_len);
            let addr = Ipv6Addr::from(bytes);
            IpNet::new(IpAddr::V6(addr), host_prefix_len)
                .expect("constructed prefix length already validated")
        },
    }
}

/// Sets bits `[from, to)` of `bytes` (big-endian, MSB-first within each byte)
/// from a CSPRNG source, leaving bits outside that range untouched by this
/// function (the caller is expected to have already zeroed/copied the rest).
fn carve(bytes: &mut [u8], from: u8, to: u8) {
    let mut random = vec![0u8; bytes.len()];
    OsRng.fill_bytes(&mut random);

    for bit_index in from..to {
        let byte_index = (bit_index / 8) as usize;
        let bit_in_byte = 7 - (bit_index % 8);
        let mask = 1u8 << bit_in_byte;
        bytes[byte_index] = (bytes[byte_index] & !mask) | (random[byte_index] & mask);
    }
}

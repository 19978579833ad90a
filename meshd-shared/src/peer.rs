//! The peer record: the sole entity persisted in the coordination KV store.
//!
//! See the `public_key` field for the base64 serde shim around
//! [`wireguard_control::Key`] that gives the wire format its 44-character
//! base64 shape.

use ipnet::IpNet;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, net::IpAddr};
use wireguard_control::{InvalidKey, Key};

/// A peer's WireGuard public key, (de)serialized as the canonical 44-character
/// base64 form used everywhere else this key appears (config files, `wg show`).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(pub Key);

impl PublicKey {
    pub fn to_base64(&self) -> String {
        self.0.to_base64()
    }

    pub fn from_base64(s: &str) -> Result<Self, InvalidKey> {
        Key::from_base64(s).map(PublicKey)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl From<Key> for PublicKey {
    fn from(key: Key) -> Self {
        PublicKey(key)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_base64(&s).map_err(|_| D::Error::custom("invalid base64 public key"))
    }
}

/// One node's membership record: identity, reachability, and cryptographic key.
///
/// `allowed_ip` doubles as the record's primary key: it's the CIDR this peer
/// is reachable at through the overlay, and it's the input to the KV key
/// derivation in [`Peer::kv_key`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub name: String,
    pub public_key: PublicKey,
    pub advertise_address: IpAddr,
    pub allowed_ip: IpNet,
    pub wg_port: u16,
}

#[derive(Debug)]
pub struct PeerDecodeError(serde_json::Error);

impl fmt::Display for PeerDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to decode peer record: {}", self.0)
    }
}

impl std::error::Error for PeerDecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl Peer {
    /// Decodes a peer from its on-KV JSON representation. Unknown fields are
    /// ignored; a missing required field is an error. Pure and deterministic.
    pub fn decode(bytes: &[u8]) -> Result<Self, PeerDecodeError> {
        serde_json::from_slice(bytes).map_err(PeerDecodeError)
    }

    /// Encodes a peer to its canonical on-KV JSON representation.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Peer serialization is infallible")
    }

    /// The KV key this peer's record is stored and looked up under.
    pub fn kv_key(&self) -> String {
        kv_key_for(&self.allowed_ip)
    }
}

/// `peers.<url-safe-base64(allowed_ip)>` - the one key layout the `peers.*`
/// subject ever uses.
pub fn kv_key_for(allowed_ip: &IpNet) -> String {
    format!(
        "peers.{}",
        base64::encode_config(allowed_ip.to_string(), base64::URL_SAFE)
    )
}

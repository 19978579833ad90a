//! The agent's validated configuration record (spec §6.4).
//!
//! Loaded from a TOML file via `serde`+`toml`, the same way the teacher
//! crate's `InterfaceConfig` is loaded, with `kebab-case` field names
//! matching its convention.

use crate::{chmod, warn_on_dangerous_mode, Error, IoErrorContext, WrappedIoError};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::{
    fs::OpenOptions,
    io::Write,
    net::IpAddr,
    path::{Path, PathBuf},
};
use wireguard_control::{InterfaceName, InvalidInterfaceName, InvalidKey, Key};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AgentConfig {
    pub node_name: String,
    pub advertise_address: IpAddr,
    pub private_address: IpAddr,
    pub mesh_cidr: IpNet,
    pub host_prefix_length: u8,
    pub device_name: String,
    pub listen_port: u16,
    pub private_key_path: PathBuf,
    pub kv_url: String,
    pub kv_creds_path: PathBuf,
    pub kv_bucket: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("private-address {0} does not lie inside mesh-cidr {1}")]
    PrivateAddressOutsideMesh(IpAddr, IpNet),

    #[error("host-prefix-length {0} is shorter than mesh-cidr's prefix length {1}")]
    HostPrefixTooShort(u8, u8),

    #[error("host-prefix-length {0} exceeds the address family's maximum of {1} bits")]
    HostPrefixTooLong(u8, u8),

    #[error("device-name {0:?} is not a valid interface name: {1}")]
    InvalidDeviceName(String, InvalidInterfaceName),

    #[error("private-key-path: {0}")]
    PrivateKeyUnreadable(#[from] WrappedIoError),

    #[error("private-key-path {0:?} does not contain a valid base64-encoded key: {1}")]
    InvalidPrivateKey(PathBuf, InvalidKey),
}

impl AgentConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).with_path(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save a new config file, failing if one already exists at `path`.
    pub fn save_new(&self, path: impl AsRef<Path>, mode: u32) -> Result<(), WrappedIoError> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path)
            .with_path(path)?;

        chmod(&file, mode).with_path(path)?;
        file.write_all(toml::to_string(self).unwrap().as_bytes())
            .with_path(path)?;

        Ok(())
    }

    /// Checks the validation rules in spec §6.4: the mesh CIDR, advertise
    /// address and private address already parsed successfully simply by
    /// virtue of deserializing into their typed fields; what's left is the
    /// cross-field and filesystem checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mesh_cidr.contains(&self.private_address) {
            return Err(ConfigError::PrivateAddressOutsideMesh(
                self.private_address,
                self.mesh_cidr,
            ));
        }

        if self.host_prefix_length < self.mesh_cidr.prefix_len() {
            return Err(ConfigError::HostPrefixTooShort(
                self.host_prefix_length,
                self.mesh_cidr.prefix_len(),
            ));
        }

        let max_prefix_length = match self.mesh_cidr {
            IpNet::V4(_) => 32,
            IpNet::V6(_) => 128,
        };
        if self.host_prefix_length > max_prefix_length {
            return Err(ConfigError::HostPrefixTooLong(
                self.host_prefix_length,
                max_prefix_length,
            ));
        }

        self.device_name
            .parse::<InterfaceName>()
            .map_err(|e| ConfigError::InvalidDeviceName(self.device_name.clone(), e))?;

        self.load_private_key()?;

        Ok(())
    }

    /// Reads and parses the private key file: trims whitespace, then parses
    /// canonical base64, mirroring the original agent's
    /// `os.ReadFile` + `wgtypes.ParseKey(strings.TrimSpace(...))` sequence.
    pub fn load_private_key(&self) -> Result<Key, ConfigError> {
        let _ = warn_on_dangerous_mode(&self.private_key_path);
        let contents = std::fs::read_to_string(&self.private_key_path)
            .with_path(&self.private_key_path)
            .map_err(ConfigError::PrivateKeyUnreadable)?;

        Key::from_base64(contents.trim())
            .map_err(|e| ConfigError::InvalidPrivateKey(self.private_key_path.clone(), e))
    }

    /// The CIDR this node's own peer record is keyed and routed under.
    pub fn private_cidr(&self) -> IpNet {
        IpNet::new(self.private_address, self.host_prefix_length)
            .expect("validate() already checked private_address fits the host prefix length")
    }

    pub fn device_interface_name(&self) -> InterfaceName {
        self.device_name
            .parse()
            .expect("validate() already checked device_name parses")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AgentConfig {
        AgentConfig {
            node_name: "node-a".into(),
            advertise_address: "203.0.113.9".parse().unwrap(),
            private_address: "fd10::1".parse().unwrap(),
            mesh_cidr: "fd10::/16".parse().unwrap(),
            host_prefix_length: 48,
            device_name: "wg-mesh0".into(),
            listen_port: 51820,
            private_key_path: PathBuf::from("/does/not/exist"),
            kv_url: "nats://127.0.0.1:4222".into(),
            kv_creds_path: PathBuf::from("/does/not/exist.creds"),
            kv_bucket: "mesh-peers".into(),
        }
    }

    #[test]
    fn rejects_private_address_outside_mesh() {
        let mut config = sample();
        config.private_address = "10.0.0.1".parse().unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PrivateAddressOutsideMesh(_, _))
        ));
    }

    #[test]
    fn rejects_host_prefix_shorter_than_mesh_prefix() {
        let mut config = sample();
        config.host_prefix_length = 8;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HostPrefixTooShort(_, _))
        ));
    }

    #[test]
    fn rejects_host_prefix_longer_than_address_family_allows() {
        let mut config = sample();
        config.host_prefix_length = 200;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HostPrefixTooLong(200, 128))
        ));
    }

    #[test]
    fn rejects_unreadable_private_key_path() {
        let config = sample();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PrivateKeyUnreadable(_))
        ));
    }

    #[test]
    fn from_file_round_trips_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meshd.toml");
        std::fs::write(
            &path,
            r#"
            node-name = "node-a"
            advertise-address = "203.0.113.9"
            private-address = "fd10::1"
            mesh-cidr = "fd10::/16"
            host-prefix-length = 48
            device-name = "wg-mesh0"
            listen-port = 51820
            private-key-path = "/etc/meshd/private.key"
            kv-url = "nats://127.0.0.1:4222"
            kv-creds-path = "/etc/meshd/mesh.creds"
            kv-bucket = "mesh-peers"
            "#,
        )
        .unwrap();

        let config = AgentConfig::from_file(&path).unwrap();
        assert_eq!(config.node_name, "node-a");
        assert_eq!(config.host_prefix_length, 48);
    }
}

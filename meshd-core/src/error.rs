use meshd_shared::PeerDecodeError;
use thiserror::Error;

/// Errors returned by the KV store adapter (§4.C).
#[derive(Error, Debug)]
pub enum KvError {
    #[error("key already exists")]
    KeyExists,

    #[error("key not found")]
    KeyNotFound,

    #[error("revision mismatch")]
    RevisionMismatch,

    #[error("KV store unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the tunnel device controller (§4.D).
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("kernel operation failed: {0}")]
    KernelOpFailed(#[from] std::io::Error),
}

/// Top-level, domain-level agent errors (§7).
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("configuration invalid: {0}")]
    ConfigInvalid(#[from] meshd_shared::ConfigError),

    #[error("address already in use by another public key")]
    AddressAlreadyInUse,

    #[error("KV store unavailable: {0}")]
    KvUnavailable(#[from] KvError),

    #[error("kernel tunnel device operation failed: {0}")]
    KernelOpFailed(#[from] DeviceError),

    #[error("failed to decode peer record: {0}")]
    PeerDecodeFailed(#[from] PeerDecodeError),
}

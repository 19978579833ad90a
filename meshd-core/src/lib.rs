//! Core orchestration logic for the mesh agent: address planning, the peer
//! record codec (re-exported from `meshd-shared`), the KV and tunnel-device
//! adapters, synced membership, and the agent orchestrator that binds them
//! together.

pub mod address;
pub mod agent;
pub mod device;
pub mod error;
pub mod kv;
pub mod membership;

pub use address::random_subnet;
pub use agent::Agent;
pub use device::TunnelDevice;
pub use error::{AgentError, DeviceError, KvError};
pub use kv::{Event, KvStore};
pub use membership::{Callbacks, SyncedMembership};

//! On-disk registry catalog (spec §4.C3): servers and agents share one
//! generic store engine, differentiated only by [`entity::RegistryEntity`].

pub mod entity;
pub mod state;
pub mod store;

pub use entity::RegistryEntity;
pub use state::EnableDisableState;
pub use store::RegistryStore;

use registry_types::{Agent, Server};

/// Catalog of MCP tool servers.
pub type ServerStore = RegistryStore<Server>;
/// Catalog of A2A agents.
pub type AgentStore = RegistryStore<Agent>;

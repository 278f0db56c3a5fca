//! The contract shared by the two symmetric registry subcomponents
//! (`Servers`, `Agents`) — spec §4.C3.

use chrono::{DateTime, Utc};
use registry_types::{Agent, GatewayResult, RatingBuffer, Server};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeSet;

/// Implemented by every entity kind the registry stores. Pulls the fields
/// every store operation needs to touch (ownership, timestamps, rating
/// buffer, enabled flag) behind one seam so `RegistryStore<E>` is written
/// once and instantiated for both `Server` and `Agent`.
pub trait RegistryEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Filename suffix before `.json` (spec §4.C3: `_agent` for agents, empty for servers).
    const FILE_SUFFIX: &'static str;
    /// Whether `register` may overwrite an existing path (servers only, spec §4.C3).
    const SUPPORTS_OVERWRITE: bool;
    /// Per-kind state document filename (spec §6.2: `server_state.json` / `agent_state.json`).
    const STATE_FILE_NAME: &'static str;

    fn path(&self) -> &str;
    fn set_path(&mut self, path: String);
    fn registered_by(&self) -> &str;
    fn set_registered_by(&mut self, by: String);
    fn registered_at(&self) -> DateTime<Utc>;
    fn set_registered_at(&mut self, at: DateTime<Utc>);
    fn set_updated_at(&mut self, at: DateTime<Utc>);
    fn set_enabled(&mut self, enabled: bool);
    fn rating_buffer_mut(&mut self) -> &mut RatingBuffer;
    /// Used by the scan orchestrator to append `security-pending` on an
    /// unsafe verdict (spec §4.C6).
    fn tags_mut(&mut self) -> &mut BTreeSet<String>;
    /// Fills derived fields and checks the entity kind's invariants
    /// (normalizes `path` as a side effect).
    fn validate(&mut self) -> GatewayResult<()>;
}

impl RegistryEntity for Server {
    const FILE_SUFFIX: &'static str = "";
    const SUPPORTS_OVERWRITE: bool = true;
    const STATE_FILE_NAME: &'static str = "server_state.json";

    fn path(&self) -> &str {
        &self.path
    }
    fn set_path(&mut self, path: String) {
        self.path = path;
    }
    fn registered_by(&self) -> &str {
        &self.registered_by
    }
    fn set_registered_by(&mut self, by: String) {
        self.registered_by = by;
    }
    fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
    fn set_registered_at(&mut self, at: DateTime<Utc>) {
        self.registered_at = at;
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    fn set_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
    }
    fn rating_buffer_mut(&mut self) -> &mut RatingBuffer {
        &mut self.ratings
    }
    fn tags_mut(&mut self) -> &mut BTreeSet<String> {
        &mut self.tags
    }
    fn validate(&mut self) -> GatewayResult<()> {
        Server::validate(self)
    }
}

impl RegistryEntity for Agent {
    const FILE_SUFFIX: &'static str = "_agent";
    const SUPPORTS_OVERWRITE: bool = false;
    const STATE_FILE_NAME: &'static str = "agent_state.json";

    fn path(&self) -> &str {
        &self.path
    }
    fn set_path(&mut self, path: String) {
        self.path = path;
    }
    fn registered_by(&self) -> &str {
        &self.registered_by
    }
    fn set_registered_by(&mut self, by: String) {
        self.registered_by = by;
    }
    fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }
    fn set_registered_at(&mut self, at: DateTime<Utc>) {
        self.registered_at = at;
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    fn set_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
    }
    fn rating_buffer_mut(&mut self) -> &mut RatingBuffer {
        &mut self.ratings
    }
    fn tags_mut(&mut self) -> &mut BTreeSet<String> {
        &mut self.tags
    }
    fn validate(&mut self) -> GatewayResult<()> {
        Agent::validate_and_fill(self)
    }
}

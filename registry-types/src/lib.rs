//! Shared entity models, error taxonomy, and user context for the gateway
//! registry. No I/O lives here — every type is a plain, serializable value.

pub mod agent;
pub mod error;
pub mod identity;
pub mod path;
pub mod rating;
pub mod server;

pub use agent::{
    derive_skill_id, normalize_scheme_type, Agent, Capabilities, Provider, SchemeType,
    SecurityScheme, Skill, TrustLevel, Visibility,
};
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use identity::{BearerClaimsExtractor, IdentityExtractor, Permission, UserContext};
pub use path::{alternate_form, normalize_path, safe_path};
pub use rating::{RatingBuffer, RatingEntry, MAX_RATINGS, MAX_RATING, MIN_RATING};
pub use server::{redacted_headers, ParsedDescription, Server, Tool};

/// The two entity kinds the registry distinguishes throughout (spec §3.5,
/// glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    McpServer,
    A2aAgent,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::McpServer => "mcp_server",
            EntityKind::A2aAgent => "a2a_agent",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//! Hybrid semantic search (spec §4.C8) and the access filter (spec §4.C9)
//! built on top of [`registry_vector`].

pub mod access;
pub mod boost;
pub mod discovery;
pub mod hybrid;
pub mod text;

pub use access::{filter_entities, is_accessible, FilterableEntity};
pub use boost::{extract_matching_tools, keyword_boost, tokenize, BoostInput, ToolMatch, ToolSource};
pub use discovery::{discover, DiscoveryMatch};
pub use hybrid::{search, AgentResult, SearchKind, SearchResults, ServerResult, ToolResult};
pub use text::{agent_embedding_text, server_embedding_text};

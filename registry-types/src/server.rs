//! Server entity model (spec §3.1): the registry's record for an MCP tool
//! server.

use crate::error::GatewayError;
use crate::path::normalize_path;
use crate::rating::RatingBuffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedDescription {
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub args: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parsed_description: ParsedDescription,
    #[serde(default = "default_schema")]
    pub schema: serde_json::Value,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Server {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub proxy_url: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub tool_list: Vec<Tool>,
    #[serde(default)]
    pub auth_provider: Option<String>,
    #[serde(default)]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub supported_transports: BTreeSet<String>,
    /// May carry credentials; never log without [`redacted_headers`].
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub ratings: RatingBuffer,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Source-of-truth serialization of `tool_list`, used for embedding-text
    /// stability and hashing; kept in lockstep with `tool_list` by
    /// [`Server::sync_tool_list_json`].
    #[serde(default)]
    pub tool_list_json: String,
    #[serde(default)]
    pub registered_by: String,
    #[serde(default = "Utc::now")]
    pub registered_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Materialized from the enable/disable state document; not part of the
    /// persisted entity document's authoritative fields (re-derived on load).
    #[serde(default)]
    pub is_enabled: bool,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("proxy_url", &self.proxy_url)
            .field("tags", &self.tags)
            .field("num_tools", &self.tool_list.len())
            .field("headers", &redacted_headers(&self.headers))
            .field("is_enabled", &self.is_enabled)
            .finish()
    }
}

/// Redacts header values (they may carry credentials) for logging.
pub fn redacted_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|k| (k.clone(), "***REDACTED***".to_string()))
        .collect()
}

impl Server {
    /// Derivable, cached tool count (spec §3.1 `num_tools`).
    pub fn num_tools(&self) -> usize {
        self.tool_list.len()
    }

    /// Cached average rating (spec §3.1 `num_stars`).
    pub fn num_stars(&self) -> f64 {
        self.ratings.num_stars()
    }

    /// Recomputes `tool_list_json` from `tool_list` so the two never drift.
    pub fn sync_tool_list_json(&mut self) -> Result<(), GatewayError> {
        self.tool_list_json = serde_json::to_string(&self.tool_list)?;
        Ok(())
    }

    /// Normalizes `path` and checks the invariants of spec §3.1:
    /// well-shaped path, unique tool names, and `tool_list_json` agreeing
    /// with `tool_list`.
    pub fn validate(&mut self) -> Result<(), GatewayError> {
        self.path = normalize_path(&self.path)?;

        let mut seen = BTreeSet::new();
        for tool in &self.tool_list {
            if !seen.insert(tool.name.clone()) {
                return Err(GatewayError::invalid(format!(
                    "duplicate tool name '{}' in server '{}'",
                    tool.name, self.path
                )));
            }
        }

        let expected: Vec<Tool> = serde_json::from_str(&self.tool_list_json).unwrap_or_default();
        if self.tool_list_json.is_empty() || expected.len() != self.tool_list.len() {
            self.sync_tool_list_json()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Server {
        Server {
            path: "/context7".into(),
            name: "context7".into(),
            description: "docs".into(),
            proxy_url: "http://localhost:9000".into(),
            tags: BTreeSet::new(),
            tool_list: vec![Tool {
                name: "resolve-library-id".into(),
                description: "resolve".into(),
                parsed_description: ParsedDescription::default(),
                schema: serde_json::json!({}),
            }],
            auth_provider: None,
            auth_type: None,
            supported_transports: BTreeSet::new(),
            headers: BTreeMap::new(),
            ratings: RatingBuffer::new(),
            metadata: BTreeMap::new(),
            tool_list_json: String::new(),
            registered_by: "alice".into(),
            registered_at: Utc::now(),
            updated_at: Utc::now(),
            is_enabled: false,
        }
    }

    #[test]
    fn validate_rejects_duplicate_tool_names() {
        let mut s = sample();
        s.tool_list.push(s.tool_list[0].clone());
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_normalizes_path_and_syncs_json() {
        let mut s = sample();
        s.path = "context7/".into();
        s.validate().unwrap();
        assert_eq!(s.path, "/context7");
        assert!(!s.tool_list_json.is_empty());
    }

    #[test]
    fn debug_redacts_headers() {
        let mut s = sample();
        s.headers.insert("Authorization".into(), "Bearer secret".into());
        let debug = format!("{:?}", s);
        assert!(!debug.contains("secret"));
    }
}

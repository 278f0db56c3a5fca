//! Agent (A2A card) entity model (spec §3.2).

use crate::error::GatewayError;
use crate::path::normalize_path;
use crate::rating::RatingBuffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    Public,
    Private,
    GroupRestricted,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Public
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Unverified,
    Community,
    Verified,
    Trusted,
}

impl Default for TrustLevel {
    fn default() -> Self {
        TrustLevel::Unverified
    }
}

impl TrustLevel {
    /// Boost contribution for skill-based discovery scoring (spec §4.C8).
    pub fn trust_boost(self) -> f64 {
        match self {
            TrustLevel::Unverified => 0.0,
            TrustLevel::Community => 0.2,
            TrustLevel::Verified => 0.5,
            TrustLevel::Trusted => 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub organization: String,
    pub url: String,
}

/// Security scheme `type`, normalized to the closed set in spec §3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemeType {
    ApiKey,
    Http,
    Oauth2,
    OpenIdConnect,
}

/// Maps the raw input scheme-type string to the closed [`SchemeType`] set.
/// Applied identically on register and update (spec.md Open Question #3 /
/// SPEC_FULL.md resolution #3) — one table, called from both paths.
pub fn normalize_scheme_type(raw: &str) -> Result<SchemeType, GatewayError> {
    match raw.to_ascii_lowercase().as_str() {
        "apikey" | "api_key" => Ok(SchemeType::ApiKey),
        "http" => Ok(SchemeType::Http),
        "bearer" => Ok(SchemeType::Http),
        "oauth2" => Ok(SchemeType::Oauth2),
        "openid" | "openidconnect" | "openid_connect" => Ok(SchemeType::OpenIdConnect),
        other => Err(GatewayError::invalid(format!(
            "unrecognized security scheme type '{other}'"
        ))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub scheme_type: SchemeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_id_connect_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default)]
    pub streaming: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_modes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_modes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<serde_json::Value>>,
}

/// Derives a skill id from its name when absent (spec §3.2).
pub fn derive_skill_id(name: &str) -> String {
    name.to_ascii_lowercase().replace(' ', "-")
}

fn default_transport() -> String {
    "JSONRPC".to_string()
}

fn default_modes() -> Vec<String> {
    vec!["text/plain".to_string()]
}

fn default_license() -> String {
    "N/A".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub protocol_version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default = "default_modes")]
    pub default_input_modes: Vec<String>,
    #[serde(default = "default_modes")]
    pub default_output_modes: Vec<String>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default = "default_transport")]
    pub preferred_transport: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default)]
    pub security_schemes: BTreeMap<String, SecurityScheme>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub allowed_groups: BTreeSet<String>,
    #[serde(default)]
    pub trust_level: TrustLevel,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default = "default_license")]
    pub license: String,
    #[serde(default)]
    pub num_stars: f64,
    #[serde(default)]
    pub ratings: RatingBuffer,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub registered_by: String,
    #[serde(default = "Utc::now")]
    pub registered_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Agent {
    /// Validates the invariants of spec §3.2. Derives `path` from `name`
    /// and skill ids from skill names where absent, before checking
    /// uniqueness/shape.
    pub fn validate_and_fill(&mut self) -> Result<(), GatewayError> {
        if self.path.trim().is_empty() {
            if self.name.trim().is_empty() {
                return Err(GatewayError::invalid("agent requires a path or a name"));
            }
            self.path = format!("/{}", self.name.to_ascii_lowercase().replace(' ', "-"));
        }
        self.path = normalize_path(&self.path)?;

        let mut seen = BTreeSet::new();
        for skill in &mut self.skills {
            if skill.id.trim().is_empty() {
                skill.id = derive_skill_id(&skill.name);
            }
            if !seen.insert(skill.id.clone()) {
                return Err(GatewayError::invalid(format!(
                    "duplicate skill id '{}' in agent '{}'",
                    skill.id, self.path
                )));
            }
        }

        if self.visibility == Visibility::GroupRestricted && self.allowed_groups.is_empty() {
            return Err(GatewayError::invalid(
                "group-restricted visibility requires at least one allowed group",
            ));
        }

        self.num_stars = self.ratings.num_stars();
        if !(0.0..=5.0).contains(&self.num_stars) {
            return Err(GatewayError::invalid("num_stars out of range [0, 5]"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Agent {
        Agent {
            path: String::new(),
            protocol_version: "0.3".into(),
            name: "Trip Planner".into(),
            description: "plans trips".into(),
            url: "http://localhost:9100".into(),
            version: "1.0".into(),
            capabilities: Capabilities::default(),
            default_input_modes: default_modes(),
            default_output_modes: default_modes(),
            skills: vec![Skill {
                id: String::new(),
                name: "Book Flight".into(),
                description: "books a flight".into(),
                tags: vec![],
                examples: None,
                input_modes: None,
                output_modes: None,
                security: None,
            }],
            preferred_transport: default_transport(),
            provider: None,
            security_schemes: BTreeMap::new(),
            visibility: Visibility::Public,
            allowed_groups: BTreeSet::new(),
            trust_level: TrustLevel::Unverified,
            tags: BTreeSet::new(),
            license: default_license(),
            num_stars: 0.0,
            ratings: RatingBuffer::new(),
            metadata: BTreeMap::new(),
            registered_by: "bob".into(),
            registered_at: Utc::now(),
            updated_at: Utc::now(),
            signature: None,
            is_enabled: false,
        }
    }

    #[test]
    fn derives_path_from_name() {
        let mut a = sample();
        a.validate_and_fill().unwrap();
        assert_eq!(a.path, "/trip-planner");
    }

    #[test]
    fn derives_skill_id_from_name() {
        let mut a = sample();
        a.validate_and_fill().unwrap();
        assert_eq!(a.skills[0].id, "book-flight");
    }

    #[test]
    fn group_restricted_requires_groups() {
        let mut a = sample();
        a.visibility = Visibility::GroupRestricted;
        assert!(a.validate_and_fill().is_err());
    }

    #[test]
    fn scheme_type_normalization_table() {
        assert_eq!(normalize_scheme_type("bearer").unwrap(), SchemeType::Http);
        assert_eq!(normalize_scheme_type("api_key").unwrap(), SchemeType::ApiKey);
        assert_eq!(normalize_scheme_type("apikey").unwrap(), SchemeType::ApiKey);
        assert_eq!(normalize_scheme_type("openid").unwrap(), SchemeType::OpenIdConnect);
        assert_eq!(
            normalize_scheme_type("openidconnect").unwrap(),
            SchemeType::OpenIdConnect
        );
    }
}

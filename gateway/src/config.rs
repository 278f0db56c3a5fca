//! `GatewayConfig` (spec §6.3): every recognized configuration option,
//! loaded the way `CoreConfig::load` does — env path override > file >
//! defaults, then an `Environment` source with a double-underscore
//! separator so nested sections (`security.*`, `agent_security.*`,
//! `embeddings.*`) can be overridden from the process environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// `local` or `remote-llm` (spec §6.3).
    #[serde(default = "default_embeddings_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_model_dimensions")]
    pub model_dimensions: usize,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub aws_region: Option<String>,
}

fn default_embeddings_provider() -> String {
    "local".to_string()
}
fn default_model_name() -> String {
    "local-hashing-v1".to_string()
}
fn default_model_dimensions() -> usize {
    256
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: default_embeddings_provider(),
            model_name: default_model_name(),
            model_dimensions: default_model_dimensions(),
            api_key: None,
            api_base: None,
            aws_region: None,
        }
    }
}

/// One kind's scanner block (spec §4.C6): `security.*` for servers,
/// `agent_security.*` for agents, same recognized-option set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub scan_on_registration: bool,
    #[serde(default = "default_true")]
    pub block_unsafe: bool,
    pub analyzers: String,
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_seconds: u64,
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default = "default_true")]
    pub add_security_pending_tag: bool,
}

fn default_true() -> bool {
    true
}
fn default_scan_timeout() -> u64 {
    60
}

impl SecurityConfig {
    pub fn server_defaults() -> Self {
        Self {
            enabled: true,
            scan_on_registration: true,
            block_unsafe: true,
            analyzers: "yara".to_string(),
            scan_timeout_seconds: default_scan_timeout(),
            llm_api_key: None,
            add_security_pending_tag: true,
        }
    }

    pub fn agent_defaults() -> Self {
        Self {
            enabled: true,
            scan_on_registration: true,
            block_unsafe: true,
            analyzers: "yara,spec".to_string(),
            scan_timeout_seconds: default_scan_timeout(),
            llm_api_key: None,
            add_security_pending_tag: true,
        }
    }

    pub fn into_scan_config(self) -> registry_scanner::ScanConfig {
        registry_scanner::ScanConfig {
            enabled: self.enabled,
            scan_on_registration: self.scan_on_registration,
            block_unsafe: self.block_unsafe,
            analyzers: self.analyzers,
            scan_timeout_seconds: self.scan_timeout_seconds,
            llm_api_key: self.llm_api_key,
            add_security_pending_tag: self.add_security_pending_tag,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_servers_dir")]
    pub servers_dir: String,
    #[serde(default = "default_agents_dir")]
    pub agents_dir: String,
    #[serde(default = "default_scans_root")]
    pub scans_root: String,
    #[serde(default = "default_health_timeout")]
    pub health_check_timeout_seconds: u64,
    #[serde(default = "default_max_concurrent_scans")]
    pub max_concurrent_scans: usize,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default = "SecurityConfig::server_defaults")]
    pub security: SecurityConfig,
    #[serde(default = "SecurityConfig::agent_defaults")]
    pub agent_security: SecurityConfig,
}

fn default_port() -> u16 {
    8090
}
fn default_servers_dir() -> String {
    "./data/servers".to_string()
}
fn default_agents_dir() -> String {
    "./data/agents".to_string()
}
fn default_scans_root() -> String {
    "./data".to_string()
}
fn default_health_timeout() -> u64 {
    2
}
fn default_max_concurrent_scans() -> usize {
    4
}

impl GatewayConfig {
    /// Precedence: `REGISTRY_CONFIG` env path override > `config/gateway.toml`
    /// > defaults, then a `REGISTRY__SECTION__KEY`-style environment
    /// override layer (spec §6.3, mirroring `CoreConfig::load`).
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("REGISTRY_CONFIG").unwrap_or_else(|_| "config/gateway".to_string());

        let builder = config::Config::builder()
            .set_default("port", default_port() as i64)?
            .set_default("servers_dir", default_servers_dir())?
            .set_default("agents_dir", default_agents_dir())?
            .set_default("scans_root", default_scans_root())?
            .set_default("health_check_timeout_seconds", default_health_timeout() as i64)?
            .set_default("max_concurrent_scans", default_max_concurrent_scans() as i64)?
            .set_default("embeddings.provider", default_embeddings_provider())?
            .set_default("embeddings.model_name", default_model_name())?
            .set_default("embeddings.model_dimensions", default_model_dimensions() as i64)?
            .set_default("security.enabled", true)?
            .set_default("security.scan_on_registration", true)?
            .set_default("security.block_unsafe", true)?
            .set_default("security.analyzers", "yara")?
            .set_default("security.scan_timeout_seconds", default_scan_timeout() as i64)?
            .set_default("security.add_security_pending_tag", true)?
            .set_default("agent_security.enabled", true)?
            .set_default("agent_security.scan_on_registration", true)?
            .set_default("agent_security.block_unsafe", true)?
            .set_default("agent_security.analyzers", "yara,spec")?
            .set_default("agent_security.scan_timeout_seconds", default_scan_timeout() as i64)?
            .set_default("agent_security.add_security_pending_tag", true)?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("REGISTRY").separator("__"))
            .build()?;

        built.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_closed_set() {
        let security = SecurityConfig::server_defaults();
        assert_eq!(security.analyzers, "yara");
        let agent_security = SecurityConfig::agent_defaults();
        assert_eq!(agent_security.analyzers, "yara,spec");
    }
}

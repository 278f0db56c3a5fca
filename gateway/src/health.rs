//! Health status: the active `/ping` probe behind `health_check` (spec
//! §4.C10) and the raw-string normalization behind the well-known status
//! endpoint (spec §6.5). Two distinct notions that happen to share a
//! vocabulary: the former is this core reaching out; the latter is this
//! core reducing whatever a health-prober collaborator published.

use crate::collaborators::HealthProber;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// `health_check(path)` (spec §4.C10): probes `agent.url + "/ping"` with
/// `timeout`, classifying any non-200 or IO error as unhealthy and never
/// raising. A disabled agent is unhealthy without being probed.
pub async fn check_agent_health(prober: &dyn HealthProber, agent_url: &str, enabled: bool, timeout: Duration) -> HealthStatus {
    if !enabled {
        return HealthStatus::Unhealthy;
    }
    let ping_url = format!("{}/ping", agent_url.trim_end_matches('/'));
    if prober.probe(&ping_url, timeout).await {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    }
}

/// Reduces a health-prober collaborator's raw published status string to
/// the closed vocabulary the well-known endpoint exposes (spec §6.5).
pub fn normalize_health_status(raw: Option<&str>) -> &'static str {
    match raw {
        Some("healthy") | Some("healthy-auth-expired") => "healthy",
        Some(s) if s.starts_with("unhealthy") || s.starts_with("error") => "unhealthy",
        Some("disabled") => "disabled",
        Some("checking") | None => "unknown",
        Some(_) => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct AlwaysUp;
    #[async_trait]
    impl HealthProber for AlwaysUp {
        async fn probe(&self, _url: &str, _timeout: Duration) -> bool {
            true
        }

        async fn published_status(&self, _path: &str) -> Option<String> {
            Some("healthy".to_string())
        }
    }

    struct AlwaysDown;
    #[async_trait]
    impl HealthProber for AlwaysDown {
        async fn probe(&self, _url: &str, _timeout: Duration) -> bool {
            false
        }

        async fn published_status(&self, _path: &str) -> Option<String> {
            Some("unhealthy: probe failed".to_string())
        }
    }

    #[tokio::test]
    async fn disabled_agent_is_never_probed() {
        let status = check_agent_health(&AlwaysUp, "http://x", false, Duration::from_secs(1)).await;
        assert_eq!(status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn enabled_agent_reflects_probe_result() {
        assert_eq!(
            check_agent_health(&AlwaysUp, "http://x", true, Duration::from_secs(1)).await,
            HealthStatus::Healthy
        );
        assert_eq!(
            check_agent_health(&AlwaysDown, "http://x", true, Duration::from_secs(1)).await,
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn normalizes_known_prefixes() {
        assert_eq!(normalize_health_status(Some("healthy-auth-expired")), "healthy");
        assert_eq!(normalize_health_status(Some("unhealthy: timeout")), "unhealthy");
        assert_eq!(normalize_health_status(Some("error: refused")), "unhealthy");
        assert_eq!(normalize_health_status(Some("disabled")), "disabled");
        assert_eq!(normalize_health_status(Some("checking")), "unknown");
        assert_eq!(normalize_health_status(None), "unknown");
    }
}

//! Narrow trait seams for the external systems the Control API talks to
//! but does not own (spec §6.4): a health prober for agent/server
//! reachability checks, a reverse-proxy emitter for routing changes, and a
//! Keycloak admin client for group management. Each is a thin trait with
//! a default implementation; a deployment wires in a real one the way the
//! teacher's `ModelRouter` swaps backends behind one trait.

use async_trait::async_trait;
use registry_types::GatewayResult;
use std::time::Duration;

/// Checks whether an HTTP endpoint is reachable (spec §4.C10
/// `health_check`), and separately exposes whatever per-path status string
/// the collaborator itself publishes (spec §6.4 "publishes per-path status
/// string; the core only reads and normalizes it"). The two are distinct:
/// `probe` is this core reaching out on demand; `published_status` is
/// reading something the collaborator already decided on its own schedule.
#[async_trait]
pub trait HealthProber: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> bool;

    /// Raw status string for `path`, in whatever vocabulary the
    /// collaborator uses (`"healthy"`, `"unhealthy: <reason>"`, ...), fed
    /// through [`crate::health::normalize_health_status`] before it is
    /// exposed. `None` means the collaborator has nothing published yet.
    async fn published_status(&self, path: &str) -> Option<String>;
}

/// Issues a `GET` against `url` and treats any successful status as
/// healthy, mirroring a liveness probe rather than a full protocol
/// handshake.
pub struct HttpHealthProber {
    client: reqwest::Client,
}

impl HttpHealthProber {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpHealthProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProber for HttpHealthProber {
    async fn probe(&self, url: &str, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.client.get(url).send()).await {
            Ok(Ok(response)) => response.status().is_success(),
            _ => false,
        }
    }

    async fn published_status(&self, _path: &str) -> Option<String> {
        // No external status-publishing backend wired yet; stands in until a
        // deployment connects this to a real one, same as the no-op
        // collaborators below.
        None
    }
}

/// Notifies an external reverse proxy that a server's route changed
/// (spec §6.4). The core never proxies traffic itself (spec Non-goals);
/// this is a fire-and-forget notification seam.
#[async_trait]
pub trait ReverseProxyEmitter: Send + Sync {
    async fn route_changed(&self, path: &str, proxy_url: &str, enabled: bool) -> GatewayResult<()>;
}

/// No-op emitter: logs the event and returns. Stands in until a
/// deployment wires a real reverse-proxy control plane.
pub struct LoggingReverseProxyEmitter;

#[async_trait]
impl ReverseProxyEmitter for LoggingReverseProxyEmitter {
    async fn route_changed(&self, path: &str, proxy_url: &str, enabled: bool) -> GatewayResult<()> {
        tracing::info!(path, proxy_url, enabled, "route change (no-op emitter)");
        Ok(())
    }
}

/// Manages group membership in the external identity provider (spec
/// §6.4). The core only reads groups off `UserContext`; writing them back
/// is this seam's job.
#[async_trait]
pub trait KeycloakAdmin: Send + Sync {
    async fn add_user_to_group(&self, username: &str, group: &str) -> GatewayResult<()>;
    async fn remove_user_from_group(&self, username: &str, group: &str) -> GatewayResult<()>;
}

/// No-op admin client: logs the event and returns. Stands in until a
/// deployment wires a real Keycloak (or equivalent) admin client.
pub struct LoggingKeycloakAdmin;

#[async_trait]
impl KeycloakAdmin for LoggingKeycloakAdmin {
    async fn add_user_to_group(&self, username: &str, group: &str) -> GatewayResult<()> {
        tracing::info!(username, group, "add user to group (no-op admin)");
        Ok(())
    }

    async fn remove_user_from_group(&self, username: &str, group: &str) -> GatewayResult<()> {
        tracing::info!(username, group, "remove user from group (no-op admin)");
        Ok(())
    }
}

pub mod agents;
pub mod search;
pub mod servers;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

/// Builds the full route table (spec §6.1): `/health`, `/.well-known/*`,
/// and `/v0.1/*` are unauthenticated; everything under `/api` requires a
/// bearer token via the [`crate::auth::AuthUser`] extractor on each
/// handler.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/servers/register", post(servers::register_server))
        .route("/servers/toggle", post(servers::toggle_server))
        .route("/servers", get(servers::list_servers))
        .route("/servers/add-to-groups", post(servers::add_to_groups))
        .route("/servers/remove-from-groups", post(servers::remove_from_groups))
        .route("/servers/:path/rate", post(servers::rate_server))
        .route("/servers/:path/rating", get(servers::get_server_rating))
        .route("/servers/:path/security-scan", get(servers::security_scan))
        .route("/servers/:path/rescan", post(servers::rescan_server))
        .route("/servers/:path", axum::routing::delete(servers::remove_server))
        .route("/agents/register", post(agents::register_agent))
        .route("/agents", get(agents::list_agents))
        .route("/agents/discover", post(agents::discover_by_skills))
        .route("/agents/discover/semantic", post(agents::discover_semantic))
        .route(
            "/agents/:path",
            get(agents::get_agent).put(agents::update_agent).delete(agents::delete_agent),
        )
        .route("/agents/:path/toggle", post(agents::toggle_agent))
        .route("/agents/:path/rate", post(agents::rate_agent))
        .route("/agents/:path/rescan", post(agents::rescan_agent))
        .route("/agents/:path/security-scan", get(agents::agent_security_scan))
        .route("/agents/:path/health", get(agents::health_check))
        .route("/search", get(search::hybrid_search));

    Router::new()
        .route("/health", get(health))
        .route("/.well-known/health", get(well_known_health))
        .route("/v0.1/servers", get(servers::catalog_list_servers))
        .route("/v0.1/servers/:name/versions", get(servers::catalog_list_versions))
        .route(
            "/v0.1/servers/:name/versions/:version",
            get(servers::catalog_get_version),
        )
        .nest("/api", api)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// `/.well-known/health` (spec §6.5): per-path `health_status`, derived
/// from the health-prober collaborator's raw published string, never by
/// probing here.
async fn well_known_health(axum::extract::State(state): axum::extract::State<AppState>) -> axum::Json<serde_json::Value> {
    let mut statuses = serde_json::Map::new();
    for server in state.servers.list().await {
        let raw = state.health_prober.published_status(&server.path).await;
        let status = crate::health::normalize_health_status(raw.as_deref());
        statuses.insert(server.path, serde_json::json!(status));
    }
    for agent in state.agents.list().await {
        let raw = state.health_prober.published_status(&agent.path).await;
        let status = crate::health::normalize_health_status(raw.as_deref());
        statuses.insert(agent.path, serde_json::json!(status));
    }

    axum::Json(serde_json::json!({
        "servers": state.servers.len(),
        "agents": state.agents.len(),
        "health_status": statuses,
    }))
}

//! Agent ops (spec §4.C10 "Agent ops"): `/api/agents/*`. Analogous to
//! [`crate::routes::servers`] with JSON bodies throughout (A2A cards are
//! naturally nested, unlike the server form), plus the three
//! agent-specific ops: health check and the two discovery flavors.

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::health;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use registry_search::{access, agent_embedding_text, discover, search, SearchKind};
use registry_types::{Agent, EntityKind, GatewayError, Permission, Visibility};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    #[serde(flatten)]
    pub agent: Agent,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Serialize)]
pub struct RegisteredAgentView {
    pub name: String,
    pub path: String,
    pub url: String,
    pub num_skills: usize,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub is_enabled: bool,
}

impl From<&Agent> for RegisteredAgentView {
    fn from(a: &Agent) -> Self {
        Self {
            name: a.name.clone(),
            path: a.path.clone(),
            url: a.url.clone(),
            num_skills: a.skills.len(),
            registered_at: a.registered_at,
            is_enabled: a.is_enabled,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterAgentResponse {
    pub message: String,
    pub agent: RegisteredAgentView,
}

/// `POST /api/agents/register` (spec §4.C10 `register_agent`, A2A
/// camelCase JSON body, spec §6.1 `201` shape).
pub async fn register_agent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<RegisterAgentRequest>,
) -> ApiResult<(StatusCode, Json<RegisterAgentResponse>)> {
    let mut agent = request.agent;
    agent.validate_and_fill()?;

    let registered = state.agents.register(agent, &user.username, request.overwrite).await?;

    let text = agent_embedding_text(&registered);
    let snapshot = serde_json::to_value(&registered)?;
    state
        .vector_index
        .upsert(
            state.embeddings.as_ref(),
            &registered.path,
            EntityKind::A2aAgent,
            &text,
            snapshot,
            registered.is_enabled,
        )
        .await?;

    if state.agent_scan_config.scan_on_registration {
        let path = registered.path.clone();
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = state
                .scan_orchestrator
                .scan_agent(
                    &state.agent_scan_config,
                    &state.agent_scan_archive,
                    &state.agents,
                    &state.vector_index,
                    state.embeddings.as_ref(),
                    &path,
                )
                .await
            {
                tracing::error!(error = %e, path, "registration scan failed to run");
            }
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(RegisterAgentResponse {
            message: "agent registered".to_string(),
            agent: RegisteredAgentView::from(&registered),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListAgentsQuery {
    pub query: Option<String>,
    #[serde(default)]
    pub enabled_only: bool,
    pub visibility: Option<String>,
}

/// `GET /api/agents` (spec §4.C10 `list_agents`): access-filtered,
/// optionally narrowed by a plain substring `query` and `visibility`.
pub async fn list_agents(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(q): Query<ListAgentsQuery>,
) -> Json<Vec<Agent>> {
    let all = state.agents.list().await;
    let filterable: Vec<access::FilterableEntity> = all.iter().map(access::FilterableEntity::from).collect();
    let visible_paths: std::collections::BTreeSet<String> = access::filter_entities(filterable, &user)
        .into_iter()
        .map(|e| e.path.to_string())
        .collect();

    let visibility_filter = q.visibility.as_deref().and_then(|v| match v {
        "public" => Some(Visibility::Public),
        "private" => Some(Visibility::Private),
        "group-restricted" => Some(Visibility::GroupRestricted),
        _ => None,
    });

    let results: Vec<Agent> = all
        .into_iter()
        .filter(|a| visible_paths.contains(&a.path))
        .filter(|a| !q.enabled_only || a.is_enabled)
        .filter(|a| visibility_filter.map_or(true, |v| a.visibility == v))
        .filter(|a| {
            q.query
                .as_deref()
                .map(|needle| {
                    let needle = needle.to_lowercase();
                    a.name.to_lowercase().contains(&needle) || a.description.to_lowercase().contains(&needle)
                })
                .unwrap_or(true)
        })
        .collect();

    Json(results)
}

fn full_path(tail: &str) -> String {
    if tail.starts_with('/') {
        tail.to_string()
    } else {
        format!("/{tail}")
    }
}

/// `GET /api/agents/{path:any}`.
pub async fn get_agent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(tail): Path<String>,
) -> ApiResult<Json<Agent>> {
    let path = full_path(&tail);
    let agent = state
        .agents
        .get(&path)
        .ok_or_else(|| GatewayError::not_found(format!("no agent registered at '{path}'")))?;
    if !access::is_accessible(&access::FilterableEntity::from(&agent), &user) {
        return Err(GatewayError::forbidden("not permitted to view this agent").into());
    }
    Ok(Json(agent))
}

/// `PUT /api/agents/{path:any}` (spec §4.C10 `update_agent`, via C3's
/// generic `update`: owner/admin only, path/owner/timestamps/ratings
/// carried over regardless of body content).
pub async fn update_agent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(tail): Path<String>,
    Json(mut agent): Json<Agent>,
) -> ApiResult<Json<Agent>> {
    let path = full_path(&tail);
    agent.validate_and_fill()?;
    let updated = state.agents.update(&path, agent, &user).await?;

    let text = agent_embedding_text(&updated);
    let snapshot = serde_json::to_value(&updated)?;
    state
        .vector_index
        .upsert(
            state.embeddings.as_ref(),
            &updated.path,
            EntityKind::A2aAgent,
            &text,
            snapshot,
            updated.is_enabled,
        )
        .await?;

    Ok(Json(updated))
}

/// `DELETE /api/agents/{path:any}`.
pub async fn delete_agent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(tail): Path<String>,
) -> ApiResult<StatusCode> {
    let path = full_path(&tail);
    state.agents.delete(&path, &user).await?;
    state.vector_index.remove(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ToggleQuery {
    pub enabled: bool,
}

/// `POST /api/agents/{path}/toggle?enabled=bool`.
pub async fn toggle_agent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(tail): Path<String>,
    Query(q): Query<ToggleQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = full_path(&tail);
    if !user.allows(Permission::ToggleService, &path) {
        return Err(GatewayError::forbidden("not permitted to toggle this agent").into());
    }
    let enabled = state.agents.set_enabled(&path, q.enabled).await?;
    let agent = state
        .agents
        .get(&path)
        .ok_or_else(|| GatewayError::not_found(format!("no agent registered at '{path}'")))?;

    let text = agent_embedding_text(&agent);
    let snapshot = serde_json::to_value(&agent)?;
    state
        .vector_index
        .upsert(state.embeddings.as_ref(), &path, EntityKind::A2aAgent, &text, snapshot, enabled)
        .await?;

    Ok(Json(serde_json::json!({ "enabled": enabled })))
}

#[derive(Debug, Deserialize)]
pub struct RateAgentRequest {
    pub rating: u8,
}

/// `POST /api/agents/{path}/rate`.
pub async fn rate_agent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(tail): Path<String>,
    Json(body): Json<RateAgentRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = full_path(&tail);
    if !user.allows(Permission::Rate, &path) {
        return Err(GatewayError::forbidden("not permitted to rate this agent").into());
    }
    let avg = state.agents.rate(&path, &user.username, body.rating).await?;
    Ok(Json(serde_json::json!({ "avg": avg, "msg": "rating recorded" })))
}

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub skills: Vec<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct DiscoverMatchView {
    pub agent: Agent,
    pub relevance: f64,
}

/// `POST /api/agents/discover` (spec §4.C10 `discover_by_skills`).
pub async fn discover_by_skills(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<DiscoverRequest>,
) -> Json<Vec<DiscoverMatchView>> {
    let all = state.agents.list().await;
    let accessible: Vec<&Agent> = all
        .iter()
        .filter(|a| a.is_enabled)
        .filter(|a| access::is_accessible(&access::FilterableEntity::from(*a), &user))
        .collect();

    let mut matches = discover(accessible, &body.skills, body.tags.as_deref());
    matches.truncate(body.max_results.clamp(1, 50));

    Json(
        matches
            .into_iter()
            .map(|m| DiscoverMatchView {
                agent: m.agent.clone(),
                relevance: m.relevance,
            })
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
pub struct SemanticDiscoverQuery {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Serialize)]
pub struct SemanticAgentResult {
    pub agent: Agent,
    pub relevance_score: f64,
}

/// `POST /api/agents/discover/semantic?query&max_results` (spec §4.C10
/// `discover_semantic`): the `a2a_agent` bucket of the hybrid pipeline
/// only, filtered through C9 like every other search/discovery response
/// (spec §1 data flow: "C9 filters → response").
pub async fn discover_semantic(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(q): Query<SemanticDiscoverQuery>,
) -> ApiResult<Json<Vec<SemanticAgentResult>>> {
    let results = search(
        &state.vector_index,
        state.embeddings.as_ref(),
        &q.query,
        Some(&[SearchKind::A2aAgent]),
        q.max_results,
    )
    .await?;

    Ok(Json(
        results
            .agents
            .into_iter()
            .filter(|r| r.agent.is_enabled)
            .filter(|r| access::is_accessible(&access::FilterableEntity::from(&r.agent), &user))
            .map(|r| SemanticAgentResult {
                agent: r.agent,
                relevance_score: (r.relevance_score * 100.0).round() / 100.0,
            })
            .collect(),
    ))
}

/// `POST /api/agents/{path}/rescan` — admin only (spec §6.1).
pub async fn rescan_agent(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(tail): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if !user.is_admin() {
        return Err(GatewayError::forbidden("rescan is admin-only").into());
    }
    let path = full_path(&tail);
    let outcome = state
        .scan_orchestrator
        .scan_agent(
            &state.agent_scan_config,
            &state.agent_scan_archive,
            &state.agents,
            &state.vector_index,
            state.embeddings.as_ref(),
            &path,
        )
        .await?;
    Ok(Json(serde_json::json!({
        "path": outcome.path,
        "is_safe": outcome.is_safe,
        "critical": outcome.critical,
        "high": outcome.high,
        "medium": outcome.medium,
        "low": outcome.low,
        "scan_failed": outcome.scan_failed,
    })))
}

/// `GET /api/agents/{path}/security-scan`.
pub async fn agent_security_scan(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(tail): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = full_path(&tail);
    let latest = state
        .agent_scan_archive
        .latest(&path)
        .await?
        .ok_or_else(|| GatewayError::not_found(format!("no scan on record for '{path}'")))?;
    Ok(Json(latest))
}

/// `GET /api/agents/{path}/health` (spec §4.C10 `health_check`).
pub async fn health_check(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(tail): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = full_path(&tail);
    let agent = state
        .agents
        .get(&path)
        .ok_or_else(|| GatewayError::not_found(format!("no agent registered at '{path}'")))?;

    let status = health::check_agent_health(
        state.health_prober.as_ref(),
        &agent.url,
        agent.is_enabled,
        std::time::Duration::from_secs(state.config.health_check_timeout_seconds),
    )
    .await;

    Ok(Json(serde_json::json!({ "status": status.as_str() })))
}

//! Hybrid search (spec §4.C8): the one endpoint that spans all three
//! result buckets, with the access filter (§4.C9) applied to the agent
//! bucket before it leaves the core.

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use registry_search::{access, search, SearchKind};
use serde::{Deserialize, Serialize};

fn default_max_results() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    /// Comma-separated subset of `mcp_server,tool,a2a_agent`; absent means
    /// all three.
    pub kinds: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn parse_kinds(raw: Option<&str>) -> Option<Vec<SearchKind>> {
    raw.map(|s| {
        s.split(',')
            .filter_map(|token| match token.trim() {
                "mcp_server" => Some(SearchKind::McpServer),
                "tool" => Some(SearchKind::Tool),
                "a2a_agent" => Some(SearchKind::A2aAgent),
                _ => None,
            })
            .collect()
    })
}

#[derive(Debug, Serialize, Default)]
pub struct SearchResponse {
    pub servers: Vec<registry_types::Server>,
    pub tools: Vec<ToolView>,
    pub agents: Vec<registry_types::Agent>,
}

#[derive(Debug, Serialize)]
pub struct ToolView {
    pub server_path: String,
    pub tool_name: String,
    pub description: String,
    pub relevance_score: f64,
}

/// `GET /api/search?query&kinds&max_results`.
pub async fn hybrid_search(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(q): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let kinds = parse_kinds(q.kinds.as_deref());
    let results = search(
        &state.vector_index,
        state.embeddings.as_ref(),
        &q.query,
        kinds.as_deref(),
        q.max_results,
    )
    .await?;

    let servers: Vec<registry_types::Server> = results.servers.into_iter().map(|r| r.server).collect();

    let tools = results
        .tools
        .into_iter()
        .map(|t| ToolView {
            server_path: t.server_path,
            tool_name: t.tool_name,
            description: t.description,
            relevance_score: t.relevance_score,
        })
        .collect();

    let agents: Vec<registry_types::Agent> = results
        .agents
        .into_iter()
        .map(|r| r.agent)
        .filter(|a| access::is_accessible(&access::FilterableEntity::from(a), &user))
        .collect();

    Ok(Json(SearchResponse { servers, tools, agents }))
}

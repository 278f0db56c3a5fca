//! Server ops (spec §4.C10 "Server ops"): `/api/servers/*`.

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Form, Json};
use registry_search::server_embedding_text;
use registry_types::{GatewayError, Permission, Server, Tool};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Flat form body for `POST /api/servers/register` (spec §6.1: "form-encoded;
/// fields in §3.1"). `tool_list`, `headers`, and `metadata` travel as JSON
/// strings within the form since they are not flat key/value pairs.
#[derive(Debug, Deserialize)]
pub struct RegisterServerForm {
    #[serde(default)]
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub proxy_url: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub tool_list_json: String,
    #[serde(default)]
    pub auth_provider: Option<String>,
    #[serde(default)]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub supported_transports: String,
    #[serde(default)]
    pub headers_json: String,
    #[serde(default)]
    pub metadata_json: String,
    #[serde(default)]
    pub overwrite: bool,
}

fn split_csv(s: &str) -> BTreeSet<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl RegisterServerForm {
    fn into_server(self) -> Result<Server, ApiError> {
        let tool_list: Vec<Tool> = if self.tool_list_json.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.tool_list_json)
                .map_err(|e| GatewayError::invalid(format!("malformed tool_list_json: {e}")))?
        };
        let headers: BTreeMap<String, String> = if self.headers_json.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&self.headers_json)
                .map_err(|e| GatewayError::invalid(format!("malformed headers_json: {e}")))?
        };
        let metadata: BTreeMap<String, serde_json::Value> = if self.metadata_json.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&self.metadata_json)
                .map_err(|e| GatewayError::invalid(format!("malformed metadata_json: {e}")))?
        };

        Ok(Server {
            path: self.path,
            name: self.name,
            description: self.description,
            proxy_url: self.proxy_url,
            tags: split_csv(&self.tags),
            tool_list,
            auth_provider: self.auth_provider,
            auth_type: self.auth_type,
            supported_transports: split_csv(&self.supported_transports),
            headers,
            ratings: Default::default(),
            metadata,
            tool_list_json: String::new(),
            registered_by: String::new(),
            registered_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            is_enabled: false,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterServerResponse {
    pub message: String,
    pub server: Server,
}

/// `POST /api/servers/register` (spec §4.C10 `register_server`): validate
/// → C3 write → C7 upsert → 201 → fire the scan off in the background
/// (spec §5 ordering: the response carries C3/C7 state; C6 follows).
pub async fn register_server(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<RegisterServerForm>,
) -> ApiResult<(StatusCode, Json<RegisterServerResponse>)> {
    let overwrite = form.overwrite;
    let mut server = form.into_server()?;
    server.validate()?;

    let registered = state.servers.register(server, &user.username, overwrite).await?;

    let text = server_embedding_text(&registered);
    let snapshot = serde_json::to_value(&registered)?;
    state
        .vector_index
        .upsert(
            state.embeddings.as_ref(),
            &registered.path,
            registry_types::EntityKind::McpServer,
            &text,
            snapshot,
            registered.is_enabled,
        )
        .await?;

    if state.server_scan_config.scan_on_registration {
        let path = registered.path.clone();
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = state
                .scan_orchestrator
                .scan_server(
                    &state.server_scan_config,
                    &state.server_scan_archive,
                    &state.servers,
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
        Json(RegisterServerResponse {
            message: "server registered".to_string(),
            server: registered,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ToggleServerForm {
    pub path: String,
    pub enabled: bool,
}

/// `POST /api/servers/toggle` (spec §4.C10 `toggle_server`).
pub async fn toggle_server(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<ToggleServerForm>,
) -> ApiResult<Json<serde_json::Value>> {
    if !user.allows(Permission::ToggleService, &form.path) {
        return Err(GatewayError::forbidden("not permitted to toggle this server").into());
    }

    let enabled = state.servers.set_enabled(&form.path, form.enabled).await?;
    let server = state
        .servers
        .get(&form.path)
        .ok_or_else(|| GatewayError::not_found(format!("no server registered at '{}'", form.path)))?;

    let text = server_embedding_text(&server);
    let snapshot = serde_json::to_value(&server)?;
    state
        .vector_index
        .upsert(
            state.embeddings.as_ref(),
            &server.path,
            registry_types::EntityKind::McpServer,
            &text,
            snapshot,
            enabled,
        )
        .await?;

    state
        .reverse_proxy
        .route_changed(&server.path, &server.proxy_url, enabled)
        .await?;

    Ok(Json(serde_json::json!({ "enabled": enabled })))
}

/// `GET /api/servers` (spec §4.C10 `list_servers`): ordered list, filtered
/// by the access rules of spec §4.C9 (servers are always-public, so this
/// mainly matters once agents share the listing surface downstream).
pub async fn list_servers(State(state): State<AppState>, AuthUser(_user): AuthUser) -> Json<Vec<Server>> {
    Json(state.servers.list().await)
}

#[derive(Debug, Deserialize)]
pub struct GroupsForm {
    pub server_name: String,
    pub group_names: String,
}

const METADATA_GROUPS_KEY: &str = "groups";

fn groups_from_metadata(server: &Server) -> BTreeSet<String> {
    server
        .metadata
        .get(METADATA_GROUPS_KEY)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// `POST /api/servers/add-to-groups` (spec §4.C10 `add_to_groups`): stored
/// as free-form `metadata["groups"]`, since servers carry no dedicated
/// group field (spec §3.1).
pub async fn add_to_groups(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<GroupsForm>,
) -> ApiResult<StatusCode> {
    if !user.allows(Permission::ModifyService, &form.server_name) {
        return Err(GatewayError::forbidden("not permitted to modify this server").into());
    }
    let to_add = split_csv(&form.group_names);
    state
        .servers
        .system_update(&form.server_name, |server| {
            let mut groups = groups_from_metadata(server);
            groups.extend(to_add.iter().cloned());
            server.metadata.insert(
                METADATA_GROUPS_KEY.to_string(),
                serde_json::Value::Array(groups.into_iter().map(serde_json::Value::String).collect()),
            );
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/servers/remove-from-groups` (spec §4.C10 `remove_from_groups`).
pub async fn remove_from_groups(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<GroupsForm>,
) -> ApiResult<StatusCode> {
    if !user.allows(Permission::ModifyService, &form.server_name) {
        return Err(GatewayError::forbidden("not permitted to modify this server").into());
    }
    let to_remove = split_csv(&form.group_names);
    state
        .servers
        .system_update(&form.server_name, |server| {
            let mut groups = groups_from_metadata(server);
            for g in &to_remove {
                groups.remove(g);
            }
            server.metadata.insert(
                METADATA_GROUPS_KEY.to_string(),
                serde_json::Value::Array(groups.into_iter().map(serde_json::Value::String).collect()),
            );
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RateForm {
    pub rating: u8,
}

/// `POST /api/servers/{path}/rate` (spec §4.C10 `rate_server`).
pub async fn rate_server(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(path): Path<String>,
    Json(body): Json<RateForm>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = format!("/{path}");
    if !user.allows(Permission::Rate, &path) {
        return Err(GatewayError::forbidden("not permitted to rate this server").into());
    }
    let avg = state.servers.rate(&path, &user.username, body.rating).await?;
    Ok(Json(serde_json::json!({ "avg": avg, "msg": "rating recorded" })))
}

/// `GET /api/servers/{path}/rating` (spec §4.C10 `get_server_rating`).
pub async fn get_server_rating(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(path): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = format!("/{path}");
    let server = state
        .servers
        .get(&path)
        .ok_or_else(|| GatewayError::not_found(format!("no server registered at '{path}'")))?;
    Ok(Json(serde_json::json!({
        "num_stars": server.num_stars(),
        "entries": server.ratings.entries(),
    })))
}

/// `GET /api/servers/{path}/security-scan` (spec §4.C10 `security_scan`):
/// the latest archived scan, or `NotFound` when never scanned (the
/// "NoScan" error in spec's table collapses onto NotFound — there is no
/// separate kind for it in the closed error taxonomy of §7).
pub async fn security_scan(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(path): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = format!("/{path}");
    let latest = state
        .server_scan_archive
        .latest(&path)
        .await?
        .ok_or_else(|| GatewayError::not_found(format!("no scan on record for '{path}'")))?;
    Ok(Json(latest))
}

/// `POST /api/servers/{path}/rescan` (spec §4.C10 `rescan_server`):
/// synchronous — the caller waits for the fresh verdict, unlike the
/// background scan fired at registration.
pub async fn rescan_server(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(path): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = format!("/{path}");
    if !user.allows(Permission::ModifyService, &path) {
        return Err(GatewayError::forbidden("not permitted to rescan this server").into());
    }
    let outcome = state
        .scan_orchestrator
        .scan_server(
            &state.server_scan_config,
            &state.server_scan_archive,
            &state.servers,
            &state.vector_index,
            state.embeddings.as_ref(),
            &path,
        )
        .await?;
    Ok(Json(serde_json::to_value(&ScanOutcomeView::from(outcome))?))
}

/// `DELETE /api/servers/{path}` (spec §4.C10 `remove_server`).
pub async fn remove_server(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(path): Path<String>,
) -> ApiResult<StatusCode> {
    let path = format!("/{path}");
    state.servers.delete(&path, &user).await?;
    state.vector_index.remove(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct ScanOutcomeView {
    path: String,
    is_safe: bool,
    critical: u32,
    high: u32,
    medium: u32,
    low: u32,
    scan_failed: bool,
}

impl From<registry_scanner::ScanOutcome> for ScanOutcomeView {
    fn from(o: registry_scanner::ScanOutcome) -> Self {
        Self {
            path: o.path,
            is_safe: o.is_safe,
            critical: o.critical,
            high: o.high,
            medium: o.medium,
            low: o.low,
            scan_failed: o.scan_failed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

/// `GET /v0.1/servers` (spec §4.C10 "Catalog", unauthenticated).
pub async fn catalog_list_servers(
    State(state): State<AppState>,
    Query(q): Query<CatalogQuery>,
) -> ApiResult<Json<crate::catalog::CatalogPage>> {
    Ok(Json(
        crate::catalog::list_servers(&state.servers, q.cursor.as_deref(), q.limit).await?,
    ))
}

/// `GET /v0.1/servers/{name}/versions`.
pub async fn catalog_list_versions(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<Vec<Server>> {
    Json(crate::catalog::list_versions(&state.servers, &format!("/{name}")).await)
}

/// `GET /v0.1/servers/{name}/versions/{version}`.
pub async fn catalog_get_version(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, String)>,
) -> ApiResult<Json<Server>> {
    crate::catalog::get_version(&state.servers, &format!("/{name}"), &version)
        .await
        .map(Json)
        .ok_or_else(|| GatewayError::not_found(format!("no such version '{version}' for '{name}'")).into())
}

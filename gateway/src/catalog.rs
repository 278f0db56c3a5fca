//! Catalog ops (spec §4.C10): read-only, unauthenticated listing of
//! registered servers with opaque cursor pagination over registration
//! order. Mirrors the shape of an Anthropic-style MCP registry listing
//! endpoint — `cursor` is base64 of the next start offset, never a raw
//! index a caller could usefully guess beyond "give me the next page".

use base64::Engine;
use registry_store::ServerStore;
use registry_types::{GatewayResult, Server};
use serde::Serialize;

const DEFAULT_PAGE_SIZE: usize = 30;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct CatalogPage {
    pub servers: Vec<Server>,
    pub next_cursor: Option<String>,
}

fn encode_cursor(offset: usize) -> String {
    base64::engine::general_purpose::STANDARD.encode(offset.to_string())
}

fn decode_cursor(cursor: &str) -> GatewayResult<usize> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cursor)
        .map_err(|e| registry_types::GatewayError::invalid(format!("malformed cursor: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| registry_types::GatewayError::invalid(format!("malformed cursor: {e}")))?;
    text.parse::<usize>()
        .map_err(|e| registry_types::GatewayError::invalid(format!("malformed cursor: {e}")))
}

/// `GET /v0.1/servers` (spec §4.C10 `anthropic_list_servers`): a stable
/// page over registration order, a fresh opaque cursor when more remain.
pub async fn list_servers(
    store: &ServerStore,
    cursor: Option<&str>,
    limit: Option<usize>,
) -> GatewayResult<CatalogPage> {
    let start = match cursor {
        Some(c) => decode_cursor(c)?,
        None => 0,
    };
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let all = store.list().await;
    let page: Vec<Server> = all.iter().skip(start).take(limit).cloned().collect();
    let next_cursor = if start + page.len() < all.len() {
        Some(encode_cursor(start + page.len()))
    } else {
        None
    };

    Ok(CatalogPage {
        servers: page,
        next_cursor,
    })
}

/// `GET /v0.1/servers/{path}/versions` (spec §4.C10
/// `anthropic_list_versions`): this registry keeps exactly one live
/// version per path, so the list is the current entity or empty.
pub async fn list_versions(store: &ServerStore, path: &str) -> Vec<Server> {
    store.get(path).into_iter().collect()
}

/// `GET /v0.1/servers/{path}/versions/{version}` (spec §4.C10
/// `anthropic_get_version`): returns the current entity only if its
/// `version` field (the server's own declared version string) matches.
pub async fn get_version(store: &ServerStore, path: &str, version: &str) -> Option<Server> {
    store.get(path).filter(|s| {
        s.metadata
            .get("version")
            .and_then(|v| v.as_str())
            .map(|v| v == version)
            .unwrap_or(version == "latest")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};

    fn sample(path: &str) -> Server {
        Server {
            path: path.to_string(),
            name: path.trim_start_matches('/').to_string(),
            description: String::new(),
            proxy_url: "http://localhost:9000".to_string(),
            tags: BTreeSet::new(),
            tool_list: Vec::new(),
            auth_provider: None,
            auth_type: None,
            supported_transports: BTreeSet::new(),
            headers: BTreeMap::new(),
            ratings: Default::default(),
            metadata: BTreeMap::new(),
            tool_list_json: String::new(),
            registered_by: "alice".to_string(),
            registered_at: Utc::now(),
            updated_at: Utc::now(),
            is_enabled: true,
        }
    }

    #[tokio::test]
    async fn pages_through_registration_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ServerStore::open(dir.path()).await.unwrap();
        for i in 0..5 {
            store
                .register(sample(&format!("/s{i}")), "alice", false)
                .await
                .unwrap();
        }

        let first = list_servers(&store, None, Some(2)).await.unwrap();
        assert_eq!(first.servers.len(), 2);
        assert!(first.next_cursor.is_some());

        let second = list_servers(&store, first.next_cursor.as_deref(), Some(2))
            .await
            .unwrap();
        assert_eq!(second.servers.len(), 2);

        let third = list_servers(&store, second.next_cursor.as_deref(), Some(2))
            .await
            .unwrap();
        assert_eq!(third.servers.len(), 1);
        assert!(third.next_cursor.is_none());
    }

    #[test]
    fn rejects_malformed_cursor() {
        assert!(decode_cursor("not-base64!!!").is_err());
    }
}

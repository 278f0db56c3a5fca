//! Hybrid Search query pipeline (spec §4.C8): vector recall, keyword
//! boost, and the three-bucket projection (servers, tools, agents).

use crate::boost::{extract_matching_tools, keyword_boost, tokenize, BoostInput, ToolSource};
use registry_embeddings::EmbeddingsClient;
use registry_types::{Agent, EntityKind, GatewayResult, Server};
use registry_vector::VectorIndex;

/// The three kinds a caller may ask for (spec §4.C8 "Query pipeline":
/// `kinds ⊆ {mcp_server, tool, a2a_agent}`). Distinct from
/// [`registry_types::EntityKind`] because `Tool` has no entry of its own in
/// the index — it is projected out of `mcp_server` hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    McpServer,
    Tool,
    A2aAgent,
}

#[derive(Debug, Clone)]
pub struct ServerResult {
    pub path: String,
    pub server: Server,
    pub relevance_score: f64,
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub server_path: String,
    pub tool_name: String,
    pub description: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone)]
pub struct AgentResult {
    pub path: String,
    pub agent: Agent,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub servers: Vec<ServerResult>,
    pub tools: Vec<ToolResult>,
    pub agents: Vec<AgentResult>,
}

fn clamp_max_results(max_results: usize) -> usize {
    max_results.clamp(1, 50)
}

/// Runs the full query pipeline: embed, recall, boost, bucket, sort,
/// truncate (spec §4.C8 "Query pipeline").
pub async fn search(
    index: &VectorIndex,
    embeddings: &dyn EmbeddingsClient,
    query: &str,
    kinds: Option<&[SearchKind]>,
    max_results: usize,
) -> GatewayResult<SearchResults> {
    let max_results = clamp_max_results(max_results);

    let wants_servers = kinds.map_or(true, |k| k.contains(&SearchKind::McpServer));
    let wants_tools = kinds.map_or(true, |k| k.contains(&SearchKind::Tool));
    let wants_agents = kinds.map_or(true, |k| k.contains(&SearchKind::A2aAgent));

    let mut index_kinds = Vec::new();
    if wants_servers || wants_tools {
        index_kinds.push(EntityKind::McpServer);
    }
    if wants_agents {
        index_kinds.push(EntityKind::A2aAgent);
    }

    let hits = index
        .search(embeddings, query, Some(&index_kinds), max_results)
        .await?;

    let tokens = tokenize(query);
    let mut results = SearchResults::default();

    for hit in hits {
        match hit.kind {
            EntityKind::McpServer => {
                let server: Server = match serde_json::from_value(hit.snapshot.clone()) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::error!(path = %hit.path, error = %e, "failed to decode server snapshot, skipping");
                        continue;
                    }
                };

                let tags: Vec<String> = server.tags.iter().cloned().collect();
                let item_names: Vec<String> =
                    server.tool_list.iter().map(|t| t.name.clone()).collect();
                let boost = keyword_boost(
                    &tokens,
                    &BoostInput {
                        name: &server.name,
                        tags: &tags,
                        item_names: &item_names,
                        description: &server.description,
                    },
                );
                let final_score = (hit.similarity as f64 * boost).min(1.0);

                if wants_tools {
                    let tool_matches = extract_matching_tools(
                        &tokens,
                        &server.name,
                        server.tool_list.iter().map(|t| ToolSource {
                            name: &t.name,
                            description: &t.description,
                            args: &t.parsed_description.args,
                        }),
                    );
                    for tool_match in tool_matches {
                        results.tools.push(ToolResult {
                            server_path: hit.path.clone(),
                            tool_name: tool_match.name,
                            description: tool_match.description,
                            relevance_score: ((final_score + tool_match.raw_score) / 2.0).min(1.0),
                        });
                    }
                }

                if wants_servers {
                    results.servers.push(ServerResult {
                        path: hit.path.clone(),
                        server,
                        relevance_score: final_score,
                    });
                }
            }
            EntityKind::A2aAgent => {
                if !wants_agents {
                    continue;
                }
                let agent: Agent = match serde_json::from_value(hit.snapshot.clone()) {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::error!(path = %hit.path, error = %e, "failed to decode agent snapshot, skipping");
                        continue;
                    }
                };

                let tags: Vec<String> = agent.tags.iter().cloned().collect();
                let item_names: Vec<String> =
                    agent.skills.iter().map(|s| s.name.clone()).collect();
                let boost = keyword_boost(
                    &tokens,
                    &BoostInput {
                        name: &agent.name,
                        tags: &tags,
                        item_names: &item_names,
                        description: &agent.description,
                    },
                );
                let final_score = (hit.similarity as f64 * boost).min(1.0);

                results.agents.push(AgentResult {
                    path: hit.path.clone(),
                    agent,
                    relevance_score: final_score,
                });
            }
        }
    }

    results
        .servers
        .sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
    results.servers.truncate(max_results);

    results
        .tools
        .sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
    results.tools.truncate(max_results);

    results
        .agents
        .sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
    results.agents.truncate(max_results);

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use registry_types::{ParsedDescription, Tool};
    use std::collections::{BTreeMap, BTreeSet};

    struct StubEmbeddings;

    #[async_trait]
    impl EmbeddingsClient for StubEmbeddings {
        async fn encode(&self, texts: &[String]) -> GatewayResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.to_lowercase().contains("context7") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    fn sample_server() -> Server {
        Server {
            path: "/context7".into(),
            name: "context7".into(),
            description: "documentation lookup".into(),
            proxy_url: "http://localhost:9000".into(),
            tags: BTreeSet::new(),
            tool_list: vec![Tool {
                name: "resolve-library-id".into(),
                description: "resolves a library id".into(),
                parsed_description: ParsedDescription::default(),
                schema: serde_json::json!({}),
            }],
            auth_provider: None,
            auth_type: None,
            supported_transports: BTreeSet::new(),
            headers: BTreeMap::new(),
            ratings: Default::default(),
            metadata: BTreeMap::new(),
            tool_list_json: String::new(),
            registered_by: "alice".into(),
            registered_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            is_enabled: true,
        }
    }

    #[tokio::test]
    async fn query_matching_server_name_surfaces_server_and_tools() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path(), 2).await.unwrap();
        let embeddings = StubEmbeddings;
        let server = sample_server();

        index
            .upsert(
                &embeddings,
                &server.path,
                EntityKind::McpServer,
                "context7 documentation lookup",
                serde_json::to_value(&server).unwrap(),
                true,
            )
            .await
            .unwrap();

        let results = search(&index, &embeddings, "context7 docs", None, 10)
            .await
            .unwrap();
        assert_eq!(results.servers.len(), 1);
        assert_eq!(results.servers[0].path, "/context7");
        assert!(!results.tools.is_empty());
    }

    #[tokio::test]
    async fn max_results_is_clamped() {
        assert_eq!(clamp_max_results(0), 1);
        assert_eq!(clamp_max_results(500), 50);
        assert_eq!(clamp_max_results(10), 10);
    }

    #[tokio::test]
    async fn kinds_filter_excludes_unrequested_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(dir.path(), 2).await.unwrap();
        let embeddings = StubEmbeddings;
        let server = sample_server();

        index
            .upsert(
                &embeddings,
                &server.path,
                EntityKind::McpServer,
                "context7 documentation lookup",
                serde_json::to_value(&server).unwrap(),
                true,
            )
            .await
            .unwrap();

        let results = search(
            &index,
            &embeddings,
            "context7",
            Some(&[SearchKind::A2aAgent]),
            10,
        )
        .await
        .unwrap();
        assert!(results.servers.is_empty());
        assert!(results.tools.is_empty());
        assert!(results.agents.is_empty());
    }
}

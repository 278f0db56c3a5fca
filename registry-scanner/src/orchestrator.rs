//! Scan Orchestrator (spec §4.C6): combines the Scanner Runner, Scan
//! Archive, and Registry Store to turn a scan into a verdict and, on an
//! unsafe verdict, a state mutation — without ever failing the operation
//! that triggered it.

use crate::archive::ScanArchive;
use crate::runner::{ScanRecord, ScanTarget, ScannerRunner};
use chrono::Utc;
use registry_embeddings::EmbeddingsClient;
use registry_search::{agent_embedding_text, server_embedding_text};
use registry_store::{AgentStore, ServerStore};
use registry_types::{Agent, EntityKind, GatewayError, GatewayResult, Server};
use registry_vector::VectorIndex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Per-kind configuration, with the recognized options enumerated (spec
/// §4.C6). Defaults mirror the closed set: `yara` for servers, `yara,spec`
/// for agents.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub enabled: bool,
    pub scan_on_registration: bool,
    pub block_unsafe: bool,
    pub analyzers: String,
    pub scan_timeout_seconds: u64,
    pub llm_api_key: Option<String>,
    pub add_security_pending_tag: bool,
}

impl ScanConfig {
    pub fn server_defaults() -> Self {
        Self {
            enabled: true,
            scan_on_registration: true,
            block_unsafe: true,
            analyzers: "yara".to_string(),
            scan_timeout_seconds: 60,
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
            scan_timeout_seconds: 60,
            llm_api_key: None,
            add_security_pending_tag: true,
        }
    }
}

/// The result handed back to whatever called for a scan (registration
/// hook, manual rescan endpoint): the counts and verdict, never an error
/// that unwinds the caller's own operation.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub path: String,
    pub is_safe: bool,
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub analyzers_used: Vec<String>,
    pub scan_failed: bool,
    pub error_message: Option<String>,
    pub tagged_pending: bool,
    pub disabled: bool,
}

const SECURITY_PENDING_TAG: &str = "security-pending";

/// Owns the runner and a concurrency cap; the archive and store handles
/// come in per-call since they are owned by C3/C4's respective callers
/// (spec §4 REDESIGN FLAGS "no global mutable singletons").
pub struct ScanOrchestrator {
    runner: ScannerRunner,
    semaphore: Arc<Semaphore>,
}

impl ScanOrchestrator {
    /// `max_concurrent_scans` bounds how many subprocess scans may run at
    /// once (spec §5 concurrency model).
    pub fn new(max_concurrent_scans: usize) -> Self {
        Self {
            runner: ScannerRunner::new(),
            semaphore: Arc::new(Semaphore::new(max_concurrent_scans.max(1))),
        }
    }

    /// Scans a server and applies the verdict (spec §4.C6 steps 1-5).
    pub async fn scan_server(
        &self,
        config: &ScanConfig,
        archive: &ScanArchive,
        store: &ServerStore,
        index: &VectorIndex,
        embeddings: &dyn EmbeddingsClient,
        path: &str,
    ) -> GatewayResult<ScanOutcome> {
        let server = store
            .get(path)
            .ok_or_else(|| GatewayError::not_found(format!("no server registered at '{path}'")))?;

        if !config.enabled {
            return Ok(Self::disabled_outcome(path));
        }

        let headers_json = serde_json::to_string(&server.headers)?;
        let target = ScanTarget::Server {
            proxy_url: &server.proxy_url,
            headers: Some(&headers_json),
        };

        let (record, scan_failed, error_message) =
            self.run_scoped(target, config).await;

        let (critical, high, medium, low) = record
            .as_ref()
            .map(ScanRecord::severity_counts)
            .unwrap_or((0, 0, 0, 0));
        let is_safe = !scan_failed && critical == 0 && high == 0;

        let raw_output = archive_payload(&record, scan_failed, error_message.as_deref());
        archive.save(path, &raw_output, Utc::now()).await?;

        let (tagged_pending, disabled) = if !is_safe {
            self.apply_unsafe_verdict_server(config, store, index, embeddings, &server)
                .await?
        } else {
            (false, false)
        };

        Ok(ScanOutcome {
            path: path.to_string(),
            is_safe,
            critical,
            high,
            medium,
            low,
            analyzers_used: config.analyzers.split(',').map(str::to_string).collect(),
            scan_failed,
            error_message,
            tagged_pending,
            disabled,
        })
    }

    /// Scans an agent and applies the verdict (spec §4.C6 steps 1-5).
    pub async fn scan_agent(
        &self,
        config: &ScanConfig,
        archive: &ScanArchive,
        store: &AgentStore,
        index: &VectorIndex,
        embeddings: &dyn EmbeddingsClient,
        path: &str,
    ) -> GatewayResult<ScanOutcome> {
        let agent = store
            .get(path)
            .ok_or_else(|| GatewayError::not_found(format!("no agent registered at '{path}'")))?;

        if !config.enabled {
            return Ok(Self::disabled_outcome(path));
        }

        let card = serde_json::to_value(&agent)?;
        let target = ScanTarget::Agent { agent_card: &card };

        let (record, scan_failed, error_message) =
            self.run_scoped(target, config).await;

        let (critical, high, medium, low) = record
            .as_ref()
            .map(ScanRecord::severity_counts)
            .unwrap_or((0, 0, 0, 0));
        let is_safe = !scan_failed && critical == 0 && high == 0;

        let raw_output = archive_payload(&record, scan_failed, error_message.as_deref());
        archive.save(path, &raw_output, Utc::now()).await?;

        let (tagged_pending, disabled) = if !is_safe {
            self.apply_unsafe_verdict_agent(config, store, index, embeddings, &agent)
                .await?
        } else {
            (false, false)
        };

        Ok(ScanOutcome {
            path: path.to_string(),
            is_safe,
            critical,
            high,
            medium,
            low,
            analyzers_used: config.analyzers.split(',').map(str::to_string).collect(),
            scan_failed,
            error_message,
            tagged_pending,
            disabled,
        })
    }

    /// The no-op outcome for a scan skipped because `config.enabled` is
    /// `false` (spec §4.C6 `enabled`: "master switch for the kind"): treated
    /// as safe, since a disabled scanner must not block the operation that
    /// triggered it.
    fn disabled_outcome(path: &str) -> ScanOutcome {
        ScanOutcome {
            path: path.to_string(),
            is_safe: true,
            critical: 0,
            high: 0,
            medium: 0,
            low: 0,
            analyzers_used: Vec::new(),
            scan_failed: false,
            error_message: None,
            tagged_pending: false,
            disabled: false,
        }
    }

    /// Runs the scanner behind the concurrency semaphore, folding every
    /// failure mode (timeout, subprocess error, bad output) into the
    /// fail-closed `scan_failed` branch rather than propagating (spec
    /// §4.C6 step 5). The permit is held only for the subprocess call.
    async fn run_scoped(&self, target: ScanTarget<'_>, config: &ScanConfig) -> (Option<ScanRecord>, bool, Option<String>) {
        let permit = self.semaphore.acquire().await;
        let result = self
            .runner
            .run(
                target,
                &config.analyzers,
                config.llm_api_key.as_deref(),
                Duration::from_secs(config.scan_timeout_seconds),
            )
            .await;
        drop(permit);

        match result {
            Ok(record) => (Some(record), false, None),
            Err(e) => {
                tracing::error!(error = %e, "security scan failed, treating as unsafe");
                (None, true, Some(e.to_string()))
            }
        }
    }

    async fn apply_unsafe_verdict_server(
        &self,
        config: &ScanConfig,
        store: &ServerStore,
        index: &VectorIndex,
        embeddings: &dyn EmbeddingsClient,
        server: &Server,
    ) -> GatewayResult<(bool, bool)> {
        let mut updated = server.clone();

        let tagged_pending = config.add_security_pending_tag;
        if tagged_pending {
            updated = store
                .system_update(&server.path, |e| {
                    e.tags.insert(SECURITY_PENDING_TAG.to_string());
                })
                .await?;
        }

        let disabled = config.block_unsafe;
        if disabled {
            store.set_enabled(&server.path, false).await?;
            updated.is_enabled = false;
        }

        if tagged_pending || disabled {
            let text = server_embedding_text(&updated);
            let snapshot = serde_json::to_value(&updated)?;
            index
                .upsert(embeddings, &updated.path, EntityKind::McpServer, &text, snapshot, updated.is_enabled)
                .await?;
        }

        Ok((tagged_pending, disabled))
    }

    async fn apply_unsafe_verdict_agent(
        &self,
        config: &ScanConfig,
        store: &AgentStore,
        index: &VectorIndex,
        embeddings: &dyn EmbeddingsClient,
        agent: &Agent,
    ) -> GatewayResult<(bool, bool)> {
        let mut updated = agent.clone();

        let tagged_pending = config.add_security_pending_tag;
        if tagged_pending {
            updated = store
                .system_update(&agent.path, |e| {
                    e.tags.insert(SECURITY_PENDING_TAG.to_string());
                })
                .await?;
        }

        let disabled = config.block_unsafe;
        if disabled {
            store.set_enabled(&agent.path, false).await?;
            updated.is_enabled = false;
        }

        if tagged_pending || disabled {
            let text = agent_embedding_text(&updated);
            let snapshot = serde_json::to_value(&updated)?;
            index
                .upsert(embeddings, &updated.path, EntityKind::A2aAgent, &text, snapshot, updated.is_enabled)
                .await?;
        }

        Ok((tagged_pending, disabled))
    }
}

fn archive_payload(record: &Option<ScanRecord>, scan_failed: bool, error_message: Option<&str>) -> serde_json::Value {
    match record {
        Some(record) => serde_json::json!({
            "analysis_results": record.analysis_results,
            "tool_results": record.tool_results,
            "scan_results": record.scan_results,
            "scan_failed": scan_failed,
        }),
        None => serde_json::json!({
            "error": error_message.unwrap_or("unknown scanner failure"),
            "analysis_results": {},
            "tool_results": [],
            "scan_failed": true,
        }),
    }
}

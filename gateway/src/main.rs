//! Gateway registry binary (spec §2, C10 Control API): wires every
//! subsystem crate behind one axum `Router`, the way the teacher's
//! `pagi-gateway` wires `Orchestrator`/`KnowledgeStore`/`ModelRouter`
//! behind its own `AppState`.

mod auth;
mod catalog;
mod collaborators;
mod config;
mod error;
mod health;
mod routes;
mod state;

use collaborators::{HttpHealthProber, LoggingKeycloakAdmin, LoggingReverseProxyEmitter};
use config::GatewayConfig;
use registry_scanner::{ScanArchive, ScanOrchestrator};
use registry_store::{AgentStore, ServerStore};
use registry_types::{BearerClaimsExtractor, EntityKind};
use registry_vector::VectorIndex;
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match GatewayConfig::load() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let servers = Arc::new(
        ServerStore::open(&config.servers_dir)
            .await
            .expect("failed to open server store"),
    );
    let agents = Arc::new(
        AgentStore::open(&config.agents_dir)
            .await
            .expect("failed to open agent store"),
    );

    let embeddings = registry_embeddings::build(&config.embeddings.provider, config.embeddings.model_dimensions)
        .expect("failed to build embeddings client");

    // Single global index over both entity kinds, rooted alongside the
    // server catalog per the persisted layout of spec §6.2.
    let vector_index = Arc::new(
        VectorIndex::open(&config.servers_dir, embeddings.dimension())
            .await
            .expect("failed to open vector index"),
    );

    let server_scan_archive = Arc::new(
        ScanArchive::open(&config.scans_root, EntityKind::McpServer)
            .await
            .expect("failed to open server scan archive"),
    );
    let agent_scan_archive = Arc::new(
        ScanArchive::open(&config.scans_root, EntityKind::A2aAgent)
            .await
            .expect("failed to open agent scan archive"),
    );

    let scan_orchestrator = Arc::new(ScanOrchestrator::new(config.max_concurrent_scans));

    let server_scan_config = Arc::new(config.security.clone().into_scan_config());
    let agent_scan_config = Arc::new(config.agent_security.clone().into_scan_config());

    let state = AppState {
        config: config.clone(),
        servers,
        agents,
        vector_index,
        embeddings,
        server_scan_archive,
        agent_scan_archive,
        scan_orchestrator,
        server_scan_config,
        agent_scan_config,
        identity: Arc::new(BearerClaimsExtractor),
        health_prober: Arc::new(HttpHealthProber::new()),
        reverse_proxy: Arc::new(LoggingReverseProxyEmitter),
        keycloak: Arc::new(LoggingKeycloakAdmin),
    };

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _| {
            origin
                .to_str()
                .map(|s| s.starts_with("http://localhost:") || s.starts_with("http://127.0.0.1:"))
                .unwrap_or(false)
        }))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers(Any);

    let app = routes::build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let port = config.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "gateway registry listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {addr}: {e}"));
    axum::serve(listener, app).await.unwrap();
}

//! `AppState` (spec §6.1): the single `Clone`-able handle axum threads
//! through every route, holding an `Arc` to each subsystem the way the
//! teacher's `AppState` holds `Arc<Orchestrator>`/`Arc<KnowledgeStore>`.

use crate::collaborators::{HealthProber, KeycloakAdmin, ReverseProxyEmitter};
use crate::config::GatewayConfig;
use registry_embeddings::EmbeddingsClient;
use registry_scanner::{ScanArchive, ScanConfig, ScanOrchestrator};
use registry_store::{AgentStore, ServerStore};
use registry_types::IdentityExtractor;
use registry_vector::VectorIndex;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub servers: Arc<ServerStore>,
    pub agents: Arc<AgentStore>,
    /// One index for both kinds (spec §4.C7 "Single global index").
    pub vector_index: Arc<VectorIndex>,
    pub embeddings: Arc<dyn EmbeddingsClient>,
    pub server_scan_archive: Arc<ScanArchive>,
    pub agent_scan_archive: Arc<ScanArchive>,
    pub scan_orchestrator: Arc<ScanOrchestrator>,
    pub server_scan_config: Arc<ScanConfig>,
    pub agent_scan_config: Arc<ScanConfig>,
    pub identity: Arc<dyn IdentityExtractor>,
    pub health_prober: Arc<dyn HealthProber>,
    pub reverse_proxy: Arc<dyn ReverseProxyEmitter>,
    pub keycloak: Arc<dyn KeycloakAdmin>,
}

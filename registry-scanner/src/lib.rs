//! Security Scan Orchestrator (spec §4.C4/§4.C5/§4.C6): the on-disk scan
//! archive, the external scanner subprocess runner, and the orchestrator
//! that ties a scan's verdict back into the registry store and index.

pub mod archive;
pub mod orchestrator;
pub mod runner;

pub use archive::ScanArchive;
pub use orchestrator::{ScanConfig, ScanOrchestrator, ScanOutcome};
pub use runner::{extract_bearer_token, parse_scanner_output, Finding, ScanRecord, ScanTarget, ScannerRunner, Severity};

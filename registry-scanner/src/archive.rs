//! Scan Archive (spec §4.C4): a two-tier on-disk layout for scan output,
//! one root per entity kind, written by the orchestrator after every scan.

use chrono::{DateTime, Utc};
use registry_types::{safe_path, EntityKind, GatewayError, GatewayResult};
use std::path::{Path, PathBuf};

/// `security_scans` for servers, `agent_security_scans` for agents (spec
/// §6.2) — the two roots keep their original, pre-existing names rather
/// than a mechanical `<kind>_security_scans` prefix.
fn root_dir_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::McpServer => "security_scans",
        EntityKind::A2aAgent => "agent_security_scans",
    }
}

/// `safe_path` plus the server-specific `localhost_` strip (spec §4.C4).
fn archive_safe_path(kind: EntityKind, path: &str) -> String {
    let base = safe_path(path);
    match kind {
        EntityKind::McpServer => base
            .strip_prefix("localhost_")
            .map(str::to_string)
            .unwrap_or(base),
        EntityKind::A2aAgent => base,
    }
}

/// Owns one kind's scan output directory under `<scans_root>/`.
pub struct ScanArchive {
    dir: PathBuf,
    kind: EntityKind,
}

impl ScanArchive {
    /// Opens (creating if absent) `<scans_root>/<root_dir_name(kind)>`.
    pub async fn open(scans_root: impl AsRef<Path>, kind: EntityKind) -> GatewayResult<Self> {
        let dir = scans_root.as_ref().join(root_dir_name(kind));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir, kind })
    }

    /// Writes the archive copy and overwrites the latest-pointer file for
    /// `path`, returning the latest-pointer's location.
    pub async fn save(
        &self,
        path: &str,
        raw_output: &serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> GatewayResult<PathBuf> {
        let safe = archive_safe_path(self.kind, path);
        let bytes = serde_json::to_vec_pretty(raw_output)?;

        let date_dir = self.dir.join(timestamp.format("%Y-%m-%d").to_string());
        tokio::fs::create_dir_all(&date_dir).await?;
        let archived = date_dir.join(format!(
            "scan_{safe}_{}.json",
            timestamp.format("%Y%m%d_%H%M%S")
        ));
        tokio::fs::write(&archived, &bytes).await?;
        tracing::info!(file = %archived.display(), "archived scan output");

        let latest = self.dir.join(format!("{safe}.json"));
        tokio::fs::write(&latest, &bytes).await?;
        tracing::info!(file = %latest.display(), "latest scan output saved");

        Ok(latest)
    }

    /// Reads the latest scan result for `path`, or `None` if this entity
    /// has never been scanned (spec §4.C4 "Reads go through the latest
    /// file; if absent, return no scan").
    pub async fn latest(&self, path: &str) -> GatewayResult<Option<serde_json::Value>> {
        let safe = archive_safe_path(self.kind, path);
        let latest = self.dir.join(format!("{safe}.json"));
        match tokio::fs::read(&latest).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    GatewayError::internal(format!("corrupt scan result at {}: {e}", latest.display()))
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn latest_is_none_before_any_scan() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ScanArchive::open(dir.path(), EntityKind::McpServer).await.unwrap();
        assert!(archive.latest("/context7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_writes_archive_and_latest_and_strips_localhost() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ScanArchive::open(dir.path(), EntityKind::McpServer).await.unwrap();
        let payload = serde_json::json!({"is_safe": true});
        let latest_path = archive
            .save("/localhost_context7", &payload, ts())
            .await
            .unwrap();

        assert_eq!(latest_path.file_name().unwrap().to_str().unwrap(), "context7.json");
        let roundtrip = archive.latest("/localhost_context7").await.unwrap().unwrap();
        assert_eq!(roundtrip, payload);

        let archived_dir = dir.path().join("security_scans").join("2026-07-28");
        let mut entries = tokio::fs::read_dir(&archived_dir).await.unwrap();
        let archived_file = entries.next_entry().await.unwrap().unwrap();
        assert!(archived_file
            .file_name()
            .to_str()
            .unwrap()
            .starts_with("scan_context7_20260728_120000"));
    }

    #[tokio::test]
    async fn agent_archive_uses_separate_root_and_keeps_no_localhost_strip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ScanArchive::open(dir.path(), EntityKind::A2aAgent).await.unwrap();
        archive
            .save("/localhost_agent", &serde_json::json!({}), ts())
            .await
            .unwrap();
        assert!(dir
            .path()
            .join("agent_security_scans")
            .join("localhost_agent.json")
            .exists());
    }
}

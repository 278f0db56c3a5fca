//! The generic catalog engine (spec §4.C3): one `RegistryStore<E>` serves
//! both servers and agents, since the two only differ in filename suffix,
//! overwrite policy, and state document name (all captured in
//! [`RegistryEntity`]).

use crate::entity::RegistryEntity;
use crate::state::EnableDisableState;
use chrono::Utc;
use dashmap::DashMap;
use registry_types::{alternate_form, normalize_path, safe_path, GatewayError, GatewayResult, UserContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Per-kind on-disk catalog plus its enable/disable state.
///
/// Entities live in memory in a `DashMap` keyed by canonical path; disk is
/// the source of truth at startup and on every mutation. A per-path lock
/// table serializes concurrent writers to the same entity (spec §5) without
/// blocking operations on unrelated paths.
pub struct RegistryStore<E: RegistryEntity> {
    dir: PathBuf,
    entities: DashMap<String, E>,
    state: RwLock<EnableDisableState>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    order: RwLock<Vec<String>>,
}

impl<E: RegistryEntity> RegistryStore<E> {
    /// Opens the store rooted at `dir`, creating it if absent, and loads
    /// every entity file already on disk (spec §4.C3 "Startup").
    pub async fn open(dir: impl Into<PathBuf>) -> GatewayResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let store = Self {
            dir,
            entities: DashMap::new(),
            state: RwLock::new(EnableDisableState::default()),
            locks: DashMap::new(),
            order: RwLock::new(Vec::new()),
        };
        store.load().await?;
        Ok(store)
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(E::STATE_FILE_NAME)
    }

    fn entity_path(&self, path: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}.json", safe_path(path), E::FILE_SUFFIX))
    }

    fn lock_for(&self, path: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Resolves a caller-supplied path to the key an entity is actually
    /// stored under (spec §4.C3 "Lookups try the canonical form first, then
    /// the other form"): normalizes `path`, and on a miss retries with
    /// [`alternate_form`] before giving up. Falls back to the normalized
    /// form (or the raw input, if it doesn't even normalize) so a not-found
    /// error still reports a sensible path.
    fn resolve_key(&self, path: &str) -> String {
        let canonical = normalize_path(path).unwrap_or_else(|_| path.to_string());
        if self.entities.contains_key(&canonical) {
            return canonical;
        }
        let alternate = alternate_form(&canonical);
        if self.entities.contains_key(&alternate) {
            return alternate;
        }
        canonical
    }

    /// Loads the state document (if present) and every entity file matching
    /// this kind's suffix. Corrupt entity files are logged and skipped, not
    /// fatal — a single bad file must not take the whole registry down.
    async fn load(&self) -> GatewayResult<()> {
        if let Ok(bytes) = tokio::fs::read(self.state_path()).await {
            match serde_json::from_slice::<EnableDisableState>(&bytes) {
                Ok(state) => *self.state.write().await = state,
                Err(e) => tracing::error!(error = %e, "failed to parse state document, starting empty"),
            }
        }

        let dir = self.dir.clone();
        let suffix = E::FILE_SUFFIX;
        let entries = tokio::task::spawn_blocking(move || collect_entity_files(&dir, suffix))
            .await
            .map_err(|e| GatewayError::internal(format!("load task panicked: {e}")))??;

        let mut order = self.order.write().await;
        let mut state = self.state.write().await;
        for file in entries {
            let bytes = match std::fs::read(&file) {
                Ok(b) => b,
                Err(e) => {
                    tracing::error!(file = %file.display(), error = %e, "failed to read entity file, skipping");
                    continue;
                }
            };
            let entity: E = match serde_json::from_slice(&bytes) {
                Ok(e) => e,
                Err(e) => {
                    tracing::error!(file = %file.display(), error = %e, "failed to parse entity file, skipping");
                    continue;
                }
            };
            let path = entity.path().to_string();
            if self.entities.contains_key(&path) {
                tracing::warn!(path = %path, "duplicate entity path on disk, keeping the last one read");
            } else {
                order.push(path.clone());
            }
            if !state.contains(&path) {
                state.insert_new(&path);
            }
            entity.set_enabled(state.is_enabled(&path));
            self.entities.insert(path, entity);
        }
        Ok(())
    }

    async fn persist_entity(&self, entity: &E) -> GatewayResult<()> {
        let path = self.entity_path(entity.path());
        let bytes = serde_json::to_vec_pretty(entity)?;
        write_atomic(&path, bytes).await
    }

    async fn persist_state(&self) -> GatewayResult<()> {
        let snapshot = self.state.read().await.clone();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        write_atomic(&self.state_path(), bytes).await
    }

    async fn remove_entity_file(&self, path: &str) -> GatewayResult<()> {
        let file = self.entity_path(path);
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Registers a new entity, or — for kinds where
    /// [`RegistryEntity::SUPPORTS_OVERWRITE`] is `true` — replaces an
    /// existing one at the same path when `overwrite` is set. Ratings,
    /// owner, and original registration timestamp survive an overwrite
    /// (spec Open Question: overwrite preserves history).
    pub async fn register(&self, mut entity: E, requester: &str, overwrite: bool) -> GatewayResult<E> {
        entity.validate()?;
        let path = entity.path().to_string();
        let guard = self.lock_for(&path);
        let _held = guard.lock().await;

        let now = Utc::now();
        if let Some(mut existing) = self.entities.get(&path).map(|e| e.clone()) {
            if !(E::SUPPORTS_OVERWRITE && overwrite) {
                return Err(GatewayError::conflict(format!(
                    "'{path}' is already registered"
                )));
            }
            let ratings = std::mem::take(existing.rating_buffer_mut());
            *entity.rating_buffer_mut() = ratings;
            entity.set_registered_by(existing.registered_by().to_string());
            entity.set_registered_at(existing.registered_at());
            entity.set_updated_at(now);
        } else {
            entity.set_registered_by(requester.to_string());
            entity.set_registered_at(now);
            entity.set_updated_at(now);
        }

        self.persist_entity(&entity).await?;
        {
            let mut state = self.state.write().await;
            if !state.contains(&path) {
                state.insert_new(&path);
            }
        }
        self.persist_state().await?;

        let mut order = self.order.write().await;
        if !order.iter().any(|p| p == &path) {
            order.push(path.clone());
        }
        drop(order);

        self.entities.insert(path, entity.clone());
        Ok(entity)
    }

    /// Updates an existing entity. Only the owner or an admin may do so
    /// (spec §4.C9); path, owner, registration timestamp, and ratings carry
    /// over from the stored entity regardless of what `update` contains.
    pub async fn update(&self, path: &str, mut update: E, requester: &UserContext) -> GatewayResult<E> {
        let path = self.resolve_key(path);
        let path = path.as_str();
        let guard = self.lock_for(path);
        let _held = guard.lock().await;

        let mut existing = self
            .entities
            .get(path)
            .map(|e| e.clone())
            .ok_or_else(|| GatewayError::not_found(format!("no entity registered at '{path}'")))?;

        if !requester.is_admin() && requester.username != existing.registered_by() {
            return Err(GatewayError::forbidden(
                "only the owner or an admin may modify this entity",
            ));
        }

        update.set_path(path.to_string());
        update.set_registered_by(existing.registered_by().to_string());
        update.set_registered_at(existing.registered_at());
        update.set_updated_at(Utc::now());
        *update.rating_buffer_mut() = std::mem::take(existing.rating_buffer_mut());
        update.validate()?;

        self.persist_entity(&update).await?;
        self.entities.insert(path.to_string(), update.clone());
        Ok(update)
    }

    /// Deletes an entity: filesystem first, then state, then memory, so a
    /// mid-way failure never leaves an in-memory entry with nothing backing
    /// it on disk (spec §4.C3).
    pub async fn delete(&self, path: &str, requester: &UserContext) -> GatewayResult<()> {
        let path = self.resolve_key(path);
        let path = path.as_str();
        let guard = self.lock_for(path);
        let _held = guard.lock().await;

        let existing = self
            .entities
            .get(path)
            .map(|e| e.clone())
            .ok_or_else(|| GatewayError::not_found(format!("no entity registered at '{path}'")))?;

        if !requester.is_admin() && requester.username != existing.registered_by() {
            return Err(GatewayError::forbidden(
                "only the owner or an admin may delete this entity",
            ));
        }

        self.remove_entity_file(path).await?;
        {
            let mut state = self.state.write().await;
            state.remove(path);
        }
        self.persist_state().await?;
        self.entities.remove(path);
        self.order.write().await.retain(|p| p != path);
        Ok(())
    }

    /// Enables or disables an entity in place. Idempotent (spec §4.C3
    /// `toggle`).
    pub async fn set_enabled(&self, path: &str, enabled: bool) -> GatewayResult<bool> {
        let path = self.resolve_key(path);
        let path = path.as_str();
        let guard = self.lock_for(path);
        let _held = guard.lock().await;

        if !self.entities.contains_key(path) {
            return Err(GatewayError::not_found(format!(
                "no entity registered at '{path}'"
            )));
        }

        {
            let mut state = self.state.write().await;
            state.set_enabled(path, enabled);
        }
        self.persist_state().await?;

        if let Some(mut entity) = self.entities.get_mut(path) {
            entity.set_enabled(enabled);
        }
        Ok(enabled)
    }

    /// Submits a rating and persists the updated entity, returning the new
    /// average and the capped entry list (spec §4.C2).
    pub async fn rate(&self, path: &str, user: &str, rating: u8) -> GatewayResult<f64> {
        let path = self.resolve_key(path);
        let path = path.as_str();
        let guard = self.lock_for(path);
        let _held = guard.lock().await;

        let mut entity = self
            .entities
            .get(path)
            .map(|e| e.clone())
            .ok_or_else(|| GatewayError::not_found(format!("no entity registered at '{path}'")))?;

        entity.rating_buffer_mut().submit(user, rating)?;
        let stars = entity.rating_buffer_mut().num_stars();
        self.persist_entity(&entity).await?;
        self.entities.insert(path.to_string(), entity);
        Ok(stars)
    }

    /// Applies a system-initiated mutation with no ownership check — used
    /// by the scan orchestrator to tag or fix up an entity after an async
    /// scan completes (spec §4.C6 step 4). `mutate` must not touch `path`,
    /// ownership, or timestamps; those remain store-owned.
    pub async fn system_update(&self, path: &str, mutate: impl FnOnce(&mut E)) -> GatewayResult<E> {
        let path = self.resolve_key(path);
        let path = path.as_str();
        let guard = self.lock_for(path);
        let _held = guard.lock().await;

        let mut entity = self
            .entities
            .get(path)
            .map(|e| e.clone())
            .ok_or_else(|| GatewayError::not_found(format!("no entity registered at '{path}'")))?;

        mutate(&mut entity);
        entity.set_updated_at(Utc::now());
        self.persist_entity(&entity).await?;
        self.entities.insert(path.to_string(), entity.clone());
        Ok(entity)
    }

    pub fn get(&self, path: &str) -> Option<E> {
        let path = self.resolve_key(path);
        self.entities.get(&path).map(|e| e.clone())
    }

    /// All entities in registration order (spec §6.1 catalog listing is
    /// stable across requests).
    pub async fn list(&self) -> Vec<E> {
        let order = self.order.read().await;
        order
            .iter()
            .filter_map(|p| self.entities.get(p).map(|e| e.clone()))
            .collect()
    }

    pub async fn is_enabled(&self, path: &str) -> bool {
        let path = self.resolve_key(path);
        self.state.read().await.is_enabled(&path)
    }

    pub async fn enabled_paths(&self) -> Vec<String> {
        self.state.read().await.enabled.iter().cloned().collect()
    }

    pub async fn disabled_paths(&self) -> Vec<String> {
        self.state.read().await.disabled.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Writes `bytes` to `path` via a temp file in the same directory followed
/// by a rename, so a reader never observes a partially-written file.
async fn write_atomic(path: &Path, bytes: Vec<u8>) -> GatewayResult<()> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = target.parent().ok_or_else(|| {
            GatewayError::internal("entity path has no parent directory".to_string())
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        use std::io::Write;
        tmp.write_all(&bytes)?;
        tmp.persist(&target)
            .map_err(|e| GatewayError::internal(format!("failed to persist file: {e}")))?;
        Ok::<_, GatewayError>(())
    })
    .await
    .map_err(|e| GatewayError::internal(format!("write task panicked: {e}")))??;
    Ok(())
}

fn collect_entity_files(dir: &Path, suffix: &str) -> GatewayResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if name.ends_with("_state") {
            continue;
        }
        let matches = if suffix.is_empty() {
            !name.ends_with("_agent")
        } else {
            name.ends_with(suffix)
        };
        if matches {
            out.push(path);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_types::{RatingBuffer, Server};
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_server(path: &str) -> Server {
        Server {
            path: path.to_string(),
            name: "demo".to_string(),
            description: "a test server".to_string(),
            proxy_url: "http://localhost:9000".to_string(),
            tags: BTreeSet::new(),
            tool_list: Vec::new(),
            auth_provider: None,
            auth_type: None,
            supported_transports: BTreeSet::new(),
            headers: BTreeMap::new(),
            ratings: RatingBuffer::new(),
            metadata: BTreeMap::new(),
            tool_list_json: String::new(),
            registered_by: String::new(),
            registered_at: Utc::now(),
            updated_at: Utc::now(),
            is_enabled: false,
        }
    }

    #[tokio::test]
    async fn register_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::<Server>::open(dir.path()).await.unwrap();
        let registered = store
            .register(sample_server("/demo"), "alice", false)
            .await
            .unwrap();
        assert_eq!(registered.registered_by, "alice");
        assert!(!store.is_enabled("/demo").await);
        let fetched = store.get("/demo").unwrap();
        assert_eq!(fetched.path, "/demo");
    }

    #[tokio::test]
    async fn duplicate_register_without_overwrite_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::<Server>::open(dir.path()).await.unwrap();
        store
            .register(sample_server("/demo"), "alice", false)
            .await
            .unwrap();
        let err = store
            .register(sample_server("/demo"), "bob", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), registry_types::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn overwrite_preserves_owner_and_ratings() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::<Server>::open(dir.path()).await.unwrap();
        store
            .register(sample_server("/demo"), "alice", false)
            .await
            .unwrap();
        store.rate("/demo", "carol", 5).await.unwrap();

        let replaced = store
            .register(sample_server("/demo"), "bob", true)
            .await
            .unwrap();
        assert_eq!(replaced.registered_by, "alice");
        assert_eq!(replaced.ratings.num_stars(), 5.0);
    }

    #[tokio::test]
    async fn toggle_and_persist_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::<Server>::open(dir.path()).await.unwrap();
        store
            .register(sample_server("/demo"), "alice", false)
            .await
            .unwrap();
        store.set_enabled("/demo", true).await.unwrap();
        assert!(store.is_enabled("/demo").await);

        let reopened = RegistryStore::<Server>::open(dir.path()).await.unwrap();
        assert!(reopened.is_enabled("/demo").await);
        assert!(reopened.get("/demo").unwrap().is_enabled);
    }

    #[tokio::test]
    async fn delete_removes_from_disk_state_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::<Server>::open(dir.path()).await.unwrap();
        store
            .register(sample_server("/demo"), "alice", false)
            .await
            .unwrap();
        let admin = UserContext {
            is_admin: true,
            ..Default::default()
        };
        store.delete("/demo", &admin).await.unwrap();
        assert!(store.get("/demo").is_none());
        assert!(!store.is_enabled("/demo").await);
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn lookups_resolve_trailing_slash_to_canonical_entity() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::<Server>::open(dir.path()).await.unwrap();
        store
            .register(sample_server("/demo"), "alice", false)
            .await
            .unwrap();

        store.set_enabled("/demo/", true).await.unwrap();
        assert!(store.is_enabled("/demo/").await);
        assert!(store.get("/demo/").is_some());

        let stars = store.rate("/demo/", "carol", 4).await.unwrap();
        assert_eq!(stars, 4.0);

        let updated = store
            .system_update("/demo/", |e| {
                e.tags.insert("x".to_string());
            })
            .await
            .unwrap();
        assert!(updated.tags.contains("x"));

        let admin = UserContext {
            is_admin: true,
            ..Default::default()
        };
        store.delete("/demo/", &admin).await.unwrap();
        assert!(store.get("/demo").is_none());
    }

    #[tokio::test]
    async fn update_rejects_non_owner_non_admin() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::<Server>::open(dir.path()).await.unwrap();
        store
            .register(sample_server("/demo"), "alice", false)
            .await
            .unwrap();
        let mallory = UserContext {
            username: "mallory".to_string(),
            ..Default::default()
        };
        let err = store
            .update("/demo", sample_server("/demo"), &mallory)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), registry_types::ErrorKind::Forbidden);
    }
}

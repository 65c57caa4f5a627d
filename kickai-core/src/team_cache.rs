//! In-memory team configuration cache, populated once at startup (§11).
//!
//! Bot tokens and chat ids don't change at runtime, so every lookup after
//! [`TeamConfigCache::initialize`] is a plain map read instead of a store
//! round-trip. Mirrors `team_config_cache.py`'s `TeamConfigCache`, with the
//! dependency-container `TeamService` lookup replaced by a direct
//! [`Store`] query against [`crate::store::TEAMS_COLLECTION`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{info, warn};

use crate::domain::Team;
use crate::store::{Store, StoreError, TEAMS_COLLECTION};

struct State {
    initialized: bool,
    teams: HashMap<String, Team>,
    /// Team ids already logged as "missing" (§11): warn once, not on every lookup.
    warned_missing: HashSet<String>,
}

/// Process-wide cache of [`Team`] records, loaded once and refreshed only on
/// explicit admin action.
pub struct TeamConfigCache {
    state: RwLock<State>,
}

impl Default for TeamConfigCache {
    fn default() -> Self {
        Self {
            state: RwLock::new(State {
                initialized: false,
                teams: HashMap::new(),
                warned_missing: HashSet::new(),
            }),
        }
    }
}

impl TeamConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        match self.state.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        match self.state.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    /// Load every team from `store` into the cache. A no-op if already
    /// initialized, matching the reference implementation's idempotence.
    pub async fn initialize(&self, store: &dyn Store) -> Result<(), StoreError> {
        if self.read().initialized {
            info!("team config cache already initialized");
            return Ok(());
        }

        let docs = store.query_documents(TEAMS_COLLECTION, &[], None).await?;
        let mut teams = HashMap::with_capacity(docs.len());
        for doc in docs {
            match serde_json::from_value::<Team>(doc.data) {
                Ok(team) => {
                    teams.insert(team.team_id.clone(), team);
                }
                Err(e) => warn!(team_id = %doc.id, error = %e, "skipping malformed team document"),
            }
        }

        let count = teams.len();
        let mut state = self.write();
        state.teams = teams;
        state.initialized = true;
        info!(count, "team config cache initialized");
        Ok(())
    }

    pub fn get_team(&self, team_id: &str) -> Option<Team> {
        let mut state = self.write();
        if !state.initialized {
            warn!("team config cache not initialized, returning None");
            return None;
        }
        if let Some(team) = state.teams.get(team_id) {
            return Some(team.clone());
        }
        if state.warned_missing.insert(team_id.to_string()) {
            warn!(team_id, "requested team not found in cache");
        }
        None
    }

    pub fn get_bot_token(&self, team_id: &str) -> Option<String> {
        self.get_team(team_id).map(|t| t.bot_token)
    }

    pub fn get_main_chat_id(&self, team_id: &str) -> Option<i64> {
        self.get_team(team_id).map(|t| t.main_chat_id)
    }

    pub fn get_leadership_chat_id(&self, team_id: &str) -> Option<i64> {
        self.get_team(team_id).map(|t| t.leadership_chat_id)
    }

    /// Team name with fallback to `team_id` when the name is blank (§11).
    pub fn get_team_name(&self, team_id: &str) -> Option<String> {
        let team = self.get_team(team_id)?;
        let trimmed = team.name.trim();
        if trimmed.is_empty() {
            Some(team_id.trim().to_string())
        } else {
            Some(trimmed.to_string())
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.read().initialized
    }

    pub fn get_all_team_ids(&self) -> Vec<String> {
        self.read().teams.keys().cloned().collect()
    }

    /// Replace a single team's cached entry, used after an admin edits a
    /// team's bot token or chat ids.
    pub async fn refresh_team(&self, store: &dyn Store, team_id: &str) -> Result<(), StoreError> {
        if !self.read().initialized {
            warn!("cannot refresh team config - cache not initialized");
            return Ok(());
        }

        let doc = store.get_document(TEAMS_COLLECTION, team_id).await?;
        match doc {
            Some(doc) => {
                let team: Team = serde_json::from_value::<Team>(doc.data).map_err(|e| {
                    StoreError::ConstraintViolation(format!("malformed team document {team_id}: {e}"))
                })?;
                let mut state = self.write();
                state.warned_missing.remove(team_id);
                state.teams.insert(team_id.to_string(), team);
                info!(team_id, "refreshed team config");
            }
            None => warn!(team_id, "team not found during refresh"),
        }
        Ok(())
    }

    pub fn stats(&self) -> Value {
        let state = self.read();
        serde_json::json!({
            "initialized": state.initialized,
            "team_count": state.teams.len(),
            "team_ids": state.teams.keys().cloned().collect::<Vec<_>>(),
        })
    }
}

static GLOBAL_CACHE: std::sync::OnceLock<Arc<TeamConfigCache>> = std::sync::OnceLock::new();

/// Get the process-wide team config cache, creating it on first call.
pub fn global_team_cache() -> Arc<TeamConfigCache> {
    GLOBAL_CACHE.get_or_init(|| Arc::new(TeamConfigCache::new())).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TeamStatus;
    use crate::store::MemoryStore;

    fn sample_team(team_id: &str, name: &str) -> Team {
        Team {
            team_id: team_id.to_string(),
            name: name.to_string(),
            bot_token: "token".to_string(),
            main_chat_id: 100,
            leadership_chat_id: 200,
            status: TeamStatus::Active,
        }
    }

    #[tokio::test]
    async fn initialize_loads_all_teams() {
        let store = MemoryStore::new();
        store.seed(TEAMS_COLLECTION, "KTI", serde_json::to_value(sample_team("KTI", "Kickers")).unwrap());

        let cache = TeamConfigCache::new();
        cache.initialize(&store).await.unwrap();

        assert!(cache.is_initialized());
        assert_eq!(cache.get_bot_token("KTI").as_deref(), Some("token"));
    }

    #[tokio::test]
    async fn get_before_initialize_returns_none() {
        let cache = TeamConfigCache::new();
        assert!(cache.get_team("KTI").is_none());
    }

    #[tokio::test]
    async fn blank_team_name_falls_back_to_team_id() {
        let store = MemoryStore::new();
        store.seed(TEAMS_COLLECTION, "KTI", serde_json::to_value(sample_team("KTI", "  ")).unwrap());

        let cache = TeamConfigCache::new();
        cache.initialize(&store).await.unwrap();
        assert_eq!(cache.get_team_name("KTI").as_deref(), Some("KTI"));
    }

    #[tokio::test]
    async fn refresh_team_updates_single_entry() {
        let store = MemoryStore::new();
        store.seed(TEAMS_COLLECTION, "KTI", serde_json::to_value(sample_team("KTI", "Kickers")).unwrap());
        let cache = TeamConfigCache::new();
        cache.initialize(&store).await.unwrap();

        store
            .update_document(TEAMS_COLLECTION, "KTI", serde_json::json!({"bot_token": "rotated"}))
            .await
            .unwrap();
        cache.refresh_team(&store, "KTI").await.unwrap();

        assert_eq!(cache.get_bot_token("KTI").as_deref(), Some("rotated"));
    }

    #[tokio::test]
    async fn missing_team_is_warned_only_once() {
        let store = MemoryStore::new();
        let cache = TeamConfigCache::new();
        cache.initialize(&store).await.unwrap();

        assert!(cache.get_team("GHOST").is_none());
        assert!(cache.get_team("GHOST").is_none());
        assert!(cache.read().warned_missing.contains("GHOST"));
    }
}

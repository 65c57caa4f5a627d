//! Bot fleet manager: one worker per active team (§4.H).
//!
//! Generalizes a single-bot bootstrap (load config, build one `Bot`, run one
//! `Dispatcher`) into a registry of per-team workers. The concrete Telegram
//! implementation of [`BotWorker`] lives in `kickai-telegram`; this crate
//! only knows the lifecycle contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::{Team, TeamStatus};
use crate::store::Store;
use crate::team_cache::TeamConfigCache;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("worker for team {0} failed to start: {1}")]
    StartFailed(String, String),

    #[error("transport error for team {0}: {1}")]
    Transport(String, String),
}

/// A running bot frontend for exactly one team. Transport-agnostic: the
/// fleet manager only drives the lifecycle, never the wire protocol.
#[async_trait]
pub trait BotWorker: Send + Sync {
    fn team_id(&self) -> &str;

    /// Run until `shutdown` is requested or the worker fails unrecoverably.
    /// Runs on its own spawned task; a failure here never affects other teams.
    async fn run(self: Arc<Self>) -> Result<(), FleetError>;

    /// Ask the worker to stop. Must be safe to call while `run` is in flight.
    async fn shutdown(&self);

    /// Send an out-of-band message, used for admin broadcasts (§4.H).
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), FleetError>;
}

#[async_trait]
pub trait BotWorkerFactory: Send + Sync {
    async fn create(&self, team: Team) -> Result<Arc<dyn BotWorker>, FleetError>;
}

struct RunningWorker {
    worker: Arc<dyn BotWorker>,
    handle: JoinHandle<Result<(), FleetError>>,
}

/// Owns the fleet: loads team configs, starts/stops one worker per active
/// team, and isolates a single team's failure from the rest.
pub struct FleetManager {
    store: Arc<dyn Store>,
    team_cache: Arc<TeamConfigCache>,
    factory: Arc<dyn BotWorkerFactory>,
    running: tokio::sync::Mutex<HashMap<String, RunningWorker>>,
    failed: tokio::sync::Mutex<std::collections::HashSet<String>>,
}

impl FleetManager {
    pub fn new(store: Arc<dyn Store>, team_cache: Arc<TeamConfigCache>, factory: Arc<dyn BotWorkerFactory>) -> Self {
        Self {
            store,
            team_cache,
            factory,
            running: tokio::sync::Mutex::new(HashMap::new()),
            failed: tokio::sync::Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// Populate the team cache from the store. Must run before [`Self::start_all`].
    pub async fn load(&self) -> Result<(), crate::store::StoreError> {
        self.team_cache.initialize(self.store.as_ref()).await
    }

    pub async fn team_count(&self) -> usize {
        self.team_cache.get_all_team_ids().len()
    }

    pub async fn list_failed(&self) -> Vec<String> {
        self.failed.lock().await.iter().cloned().collect()
    }

    /// Start a worker for every team with [`TeamStatus::Active`] and a
    /// complete bot configuration. A team missing `bot_token`/chat ids, or
    /// whose worker fails to start, is marked `failed` and skipped — it does
    /// not abort startup for the rest of the fleet (§4.H).
    pub async fn start_all(&self) {
        for team_id in self.team_cache.get_all_team_ids() {
            let Some(team) = self.team_cache.get_team(&team_id) else {
                continue;
            };
            if team.status != TeamStatus::Active {
                info!(team_id = %team_id, status = ?team.status, "skipping non-active team");
                continue;
            }
            if team.bot_token.is_empty() || team.main_chat_id == 0 || team.leadership_chat_id == 0 {
                warn!(team_id = %team_id, "refusing to start team with incomplete bot configuration");
                self.failed.lock().await.insert(team_id);
                continue;
            }
            self.start_one(team).await;
        }
    }

    async fn start_one(&self, team: Team) {
        let team_id = team.team_id.clone();
        match self.factory.create(team).await {
            Ok(worker) => {
                let spawned = Arc::clone(&worker);
                let handle = tokio::spawn(async move {
                    let result = spawned.run().await;
                    if let Err(ref e) = result {
                        error!(error = %e, "bot worker exited with error");
                    }
                    result
                });
                self.running.lock().await.insert(team_id.clone(), RunningWorker { worker, handle });
                info!(team_id = %team_id, "bot worker started");
            }
            Err(e) => error!(team_id = %team_id, error = %e, "failed to start bot worker"),
        }
    }

    pub async fn list_running(&self) -> Vec<String> {
        self.running.lock().await.keys().cloned().collect()
    }

    /// Send `text` to every running worker's own team (e.g. the leadership
    /// chat); callers choose which chat id per team.
    pub async fn broadcast(&self, chat_ids: &HashMap<String, i64>, text: &str) -> HashMap<String, Result<(), FleetError>> {
        let running = self.running.lock().await;
        let mut results = HashMap::new();
        for (team_id, chat_id) in chat_ids {
            if let Some(running_worker) = running.get(team_id) {
                results.insert(team_id.clone(), running_worker.worker.send_message(*chat_id, text).await);
            }
        }
        results
    }

    /// Ask every worker to stop, then wait up to `grace` before force-cancelling
    /// stragglers.
    pub async fn stop_all(&self, grace: Duration) {
        let mut running = self.running.lock().await;
        for worker in running.values() {
            worker.worker.shutdown().await;
        }

        let deadline = tokio::time::Instant::now() + grace;
        for (team_id, running_worker) in running.drain() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, running_worker.handle).await {
                Ok(Ok(Ok(()))) => info!(team_id = %team_id, "bot worker stopped cleanly"),
                Ok(Ok(Err(e))) => warn!(team_id = %team_id, error = %e, "bot worker stopped with error"),
                Ok(Err(e)) => warn!(team_id = %team_id, error = %e, "bot worker task panicked"),
                Err(_) => {
                    warn!(team_id = %team_id, "bot worker did not stop within grace period, aborting");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubWorker {
        team_id: String,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BotWorker for StubWorker {
        fn team_id(&self) -> &str {
            &self.team_id
        }

        async fn run(self: Arc<Self>) -> Result<(), FleetError> {
            while !self.stopped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(())
        }

        async fn shutdown(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }

        async fn send_message(&self, _chat_id: i64, _text: &str) -> Result<(), FleetError> {
            Ok(())
        }
    }

    struct StubFactory;

    #[async_trait]
    impl BotWorkerFactory for StubFactory {
        async fn create(&self, team: Team) -> Result<Arc<dyn BotWorker>, FleetError> {
            Ok(Arc::new(StubWorker {
                team_id: team.team_id,
                stopped: Arc::new(AtomicBool::new(false)),
            }))
        }
    }

    fn sample_team(team_id: &str, status: TeamStatus) -> Team {
        Team {
            team_id: team_id.to_string(),
            name: "Test".to_string(),
            bot_token: "tok".to_string(),
            main_chat_id: 1,
            leadership_chat_id: 2,
            status,
        }
    }

    #[tokio::test]
    async fn starts_only_active_teams() {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            crate::store::TEAMS_COLLECTION,
            "KTI",
            serde_json::to_value(sample_team("KTI", TeamStatus::Active)).unwrap(),
        );
        store.seed(
            crate::store::TEAMS_COLLECTION,
            "OLD",
            serde_json::to_value(sample_team("OLD", TeamStatus::Archived)).unwrap(),
        );

        let fleet = FleetManager::new(store, Arc::new(TeamConfigCache::new()), Arc::new(StubFactory));
        fleet.load().await.unwrap();
        fleet.start_all().await;

        let running = fleet.list_running().await;
        assert_eq!(running, vec!["KTI".to_string()]);

        fleet.stop_all(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn stop_all_clears_running_workers() {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            crate::store::TEAMS_COLLECTION,
            "KTI",
            serde_json::to_value(sample_team("KTI", TeamStatus::Active)).unwrap(),
        );

        let fleet = FleetManager::new(store, Arc::new(TeamConfigCache::new()), Arc::new(StubFactory));
        fleet.load().await.unwrap();
        fleet.start_all().await;
        fleet.stop_all(Duration::from_secs(1)).await;

        assert!(fleet.list_running().await.is_empty());
    }
}

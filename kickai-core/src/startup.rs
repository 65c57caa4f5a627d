//! Seven-phase startup validator (§4.H), fail-fast through the services
//! phase and tolerant of agent-layer problems after that point.
//!
//! Grounded on `initialization_sequence_check.py`'s phase breakdown
//! (pre-init, configuration, core dependencies, registries, services,
//! agents, post-init); modules that check Python-only facts (import paths,
//! `psutil` memory) have no Rust counterpart and are dropped.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::Settings;
use crate::registry::{ServiceRegistry, ServiceType};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreInit,
    Configuration,
    CoreDependencies,
    Registries,
    Services,
    Agents,
    PostInit,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::PreInit => "pre-initialization",
            Phase::Configuration => "configuration",
            Phase::CoreDependencies => "core dependencies",
            Phase::Registries => "registries",
            Phase::Services => "services",
            Phase::Agents => "agents",
            Phase::PostInit => "post-initialization",
        }
    }

    /// Phases before and including this one abort startup on failure;
    /// `Agents` never does (§11: agent layer problems are reported but not fatal).
    fn is_fatal(self) -> bool {
        !matches!(self, Phase::Agents)
    }
}

#[derive(Debug, Clone)]
pub struct PhaseResult {
    pub phase: Phase,
    pub passed: bool,
    pub message: String,
    pub details: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StartupReport {
    pub results: Vec<PhaseResult>,
    /// Set to the phase that triggered fail-fast abort, if any.
    pub failed_at: Option<Phase>,
}

impl StartupReport {
    pub fn passed(&self) -> bool {
        self.failed_at.is_none()
    }
}

pub struct StartupValidator {
    settings: Arc<Settings>,
    store: Arc<dyn Store>,
    registry: Arc<ServiceRegistry>,
}

impl StartupValidator {
    pub fn new(settings: Arc<Settings>, store: Arc<dyn Store>, registry: Arc<ServiceRegistry>) -> Self {
        Self { settings, store, registry }
    }

    pub async fn run(&self) -> StartupReport {
        let mut results = Vec::new();
        let mut failed_at = None;

        for phase in [
            Phase::PreInit,
            Phase::Configuration,
            Phase::CoreDependencies,
            Phase::Registries,
            Phase::Services,
            Phase::Agents,
            Phase::PostInit,
        ] {
            let result = self.run_phase(phase).await;
            let passed = result.passed;
            results.push(result);

            if !passed && phase.is_fatal() {
                error!(phase = phase.name(), "startup validation failed, halting");
                failed_at = Some(phase);
                break;
            }
        }

        StartupReport { results, failed_at }
    }

    async fn run_phase(&self, phase: Phase) -> PhaseResult {
        match phase {
            Phase::PreInit => self.check_pre_init(),
            Phase::Configuration => self.check_configuration(),
            Phase::CoreDependencies => self.check_core_dependencies().await,
            Phase::Registries => self.check_registries(),
            Phase::Services => self.check_services().await,
            Phase::Agents => self.check_agents(),
            Phase::PostInit => self.check_post_init(),
        }
    }

    fn check_pre_init(&self) -> PhaseResult {
        let mut details = Vec::new();
        let mut issues = Vec::new();

        let probe = std::env::temp_dir().join(format!("kickai_startup_{}", uuid::Uuid::now_v7()));
        match std::fs::write(&probe, b"ok") {
            Ok(()) => {
                details.push("filesystem write permissions available".to_string());
                let _ = std::fs::remove_file(&probe);
            }
            Err(e) => issues.push(format!("filesystem permission issue: {e}")),
        }

        finish(Phase::PreInit, issues, details)
    }

    fn check_configuration(&self) -> PhaseResult {
        let mut details = Vec::new();
        let mut issues = Vec::new();

        if self.settings.firebase_project_id.is_empty() {
            issues.push("firebase_project_id is empty".to_string());
        } else {
            details.push("core settings loaded".to_string());
        }
        if self.settings.jwt_secret.is_empty() {
            issues.push("jwt_secret is empty".to_string());
        }

        finish(Phase::Configuration, issues, details)
    }

    async fn check_core_dependencies(&self) -> PhaseResult {
        let mut details = Vec::new();
        let mut issues = Vec::new();

        match self.store.list_collections().await {
            Ok(collections) => details.push(format!("store reachable, {} collections", collections.len())),
            Err(e) => issues.push(format!("store unreachable: {e}")),
        }

        finish(Phase::CoreDependencies, issues, details)
    }

    fn check_registries(&self) -> PhaseResult {
        let stats = self.registry.get_statistics();
        let details = vec![format!("registry holds {} service definitions", stats.total_services)];
        finish(Phase::Registries, Vec::new(), details)
    }

    async fn check_services(&self) -> PhaseResult {
        let mut details = Vec::new();
        let mut issues = Vec::new();

        let health = self.registry.check_all_services_health().await;
        let mut unhealthy_core = Vec::new();

        for (name, status) in &health {
            let Some(def) = self.registry.get_service_definition(name) else {
                continue;
            };
            let is_healthy = matches!(status.status, crate::registry::ServiceStatus::Healthy);
            if def.service_type == ServiceType::Core && !is_healthy {
                unhealthy_core.push(name.clone());
            }
            details.push(format!("{name}: {:?}", status.status));
        }

        if !unhealthy_core.is_empty() {
            issues.push(format!("unhealthy core services: {unhealthy_core:?}"));
        }

        finish(Phase::Services, issues, details)
    }

    fn check_agents(&self) -> PhaseResult {
        // No LLM inference in this system (§4.I non-goal); the agent layer
        // is the deterministic fallback responder, which has no external
        // dependency to fail on.
        finish(Phase::Agents, Vec::new(), vec!["fallback agent layer ready".to_string()])
    }

    fn check_post_init(&self) -> PhaseResult {
        finish(Phase::PostInit, Vec::new(), vec!["startup sequence complete".to_string()])
    }
}

fn finish(phase: Phase, issues: Vec<String>, details: Vec<String>) -> PhaseResult {
    let passed = issues.is_empty();
    let message = if passed {
        format!("{} passed", phase.name())
    } else {
        format!("{} failed: {}", phase.name(), issues.join("; "))
    };
    if passed {
        info!(phase = phase.name(), "startup phase passed");
    }
    PhaseResult { phase, passed, message, details }
}

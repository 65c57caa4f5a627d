//! Health checker chain for the service registry (§4.C/§4.H).
//!
//! Mirrors `DefaultServiceHealthChecker`'s `hasattr`-based duck typing with a
//! trait-object downcast: a checker claims a service by name, then tries to
//! downcast the stored instance to whatever concrete type it knows how to
//! probe. The "does this thing support `ping`/`test_connection`?" duck
//! typing the reference implementation does at runtime becomes a capability
//! trait ([`ExternalProbe`]) here: a service advertises what it can be
//! probed with instead of a checker introspecting its methods.

use std::any::Any;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;

use crate::agent::{AgentLayer, AgentRequest};
use crate::registry::{ServiceHealth, ServiceStatus};
use crate::store::Store;

/// One probe in the chain the registry consults in order (§4.C).
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Whether this checker wants to handle `service_name`. The registry
    /// uses the first checker (in chain order) that returns `true`.
    fn supports(&self, service_name: &str) -> bool;

    async fn check(&self, service_name: &str, instance: Option<&(dyn Any + Send + Sync)>) -> ServiceHealth;
}

/// Capability an external integration can advertise for health probing,
/// replacing the reference implementation's `test_connection`/`ping`/`status`
/// duck typing with an explicit interface.
#[async_trait]
pub trait ExternalProbe: Send + Sync {
    async fn probe(&self) -> Result<(), String>;
}

fn healthy(service_name: &str) -> ServiceHealth {
    healthy_with(service_name, HashMap::new())
}

fn healthy_with(service_name: &str, metadata: HashMap<String, serde_json::Value>) -> ServiceHealth {
    ServiceHealth {
        service_name: service_name.to_string(),
        status: ServiceStatus::Healthy,
        last_check: None,
        response_time: None,
        error_message: None,
        metadata,
    }
}

fn unhealthy(service_name: &str, reason: impl Into<String>) -> ServiceHealth {
    unhealthy_with(service_name, reason, HashMap::new())
}

fn unhealthy_with(
    service_name: &str,
    reason: impl Into<String>,
    metadata: HashMap<String, serde_json::Value>,
) -> ServiceHealth {
    ServiceHealth {
        service_name: service_name.to_string(),
        status: ServiceStatus::Unhealthy,
        last_check: None,
        response_time: None,
        error_message: Some(reason.into()),
        metadata,
    }
}

/// Checks that a registered [`Store`] instance can round-trip a
/// `list_collections` call. Required plug-in (§4.E): prefers a live
/// connectivity probe over validating method presence, which in a
/// statically-typed port is guaranteed by the type system instead.
pub struct StoreHealthChecker;

#[async_trait]
impl HealthChecker for StoreHealthChecker {
    fn supports(&self, service_name: &str) -> bool {
        let name = service_name.to_lowercase();
        ["store", "database", "datastore", "repository"].iter().any(|k| name.contains(k))
    }

    async fn check(&self, service_name: &str, instance: Option<&(dyn Any + Send + Sync)>) -> ServiceHealth {
        let Some(instance) = instance else {
            return unhealthy(service_name, "service instance is missing");
        };
        let Some(store) = instance.downcast_ref::<std::sync::Arc<dyn Store>>() else {
            return unhealthy(service_name, "registered instance is not a Store");
        };
        let mut metadata = HashMap::new();
        metadata.insert("checker_type".to_string(), json!("database"));
        metadata.insert("connection_test".to_string(), json!(true));
        match store.list_collections().await {
            Ok(_) => healthy_with(service_name, metadata),
            Err(e) => unhealthy_with(service_name, e.to_string(), metadata),
        }
    }
}

/// Required plug-in (§4.E) for the player/team domain services. This port has
/// no separate `PlayerService`/`TeamService` type — every tool talks to
/// [`Store`] directly through team-scoped collections — so the probe is the
/// same store round-trip, claimed under the player/team name instead of the
/// store name.
pub struct DomainServiceHealthChecker;

#[async_trait]
impl HealthChecker for DomainServiceHealthChecker {
    fn supports(&self, service_name: &str) -> bool {
        let name = service_name.to_lowercase();
        name.contains("player") || name.contains("team")
    }

    async fn check(&self, service_name: &str, instance: Option<&(dyn Any + Send + Sync)>) -> ServiceHealth {
        let Some(instance) = instance else {
            return unhealthy(service_name, "service instance is missing");
        };
        let Some(store) = instance.downcast_ref::<std::sync::Arc<dyn Store>>() else {
            return unhealthy(service_name, "registered instance exposes no queryable store");
        };
        let mut metadata = HashMap::new();
        metadata.insert("checker_type".to_string(), json!("domain_service"));
        match store.list_collections().await {
            Ok(_) => healthy_with(service_name, metadata),
            Err(e) => unhealthy_with(service_name, e.to_string(), metadata),
        }
    }
}

/// Required plug-in (§4.E) for the agent/router layer: attempts a canonical
/// diagnostic exchange through [`AgentLayer::respond`] rather than the
/// reference implementation's dynamic `create_agent` probe.
pub struct AgentHealthChecker;

#[async_trait]
impl HealthChecker for AgentHealthChecker {
    fn supports(&self, service_name: &str) -> bool {
        let name = service_name.to_lowercase();
        ["agent", "crew", "router", "message"].iter().any(|k| name.contains(k))
    }

    async fn check(&self, service_name: &str, instance: Option<&(dyn Any + Send + Sync)>) -> ServiceHealth {
        let Some(instance) = instance else {
            return unhealthy(service_name, "service instance is missing");
        };
        let Some(agent) = instance.downcast_ref::<std::sync::Arc<dyn AgentLayer>>() else {
            return unhealthy(service_name, "registered instance does not implement AgentLayer");
        };
        let reply = agent
            .respond(AgentRequest {
                telegram_id: 0,
                team_id: "__health_probe__",
                chat_type: "private",
                text: "__health_probe__",
            })
            .await;
        let mut metadata = HashMap::new();
        metadata.insert("checker_type".to_string(), json!("agent_service"));
        metadata.insert("agent_creation_test".to_string(), json!(true));
        if reply.is_empty() {
            unhealthy_with(service_name, "diagnostic agent call returned an empty reply", metadata)
        } else {
            healthy_with(service_name, metadata)
        }
    }
}

/// Required plug-in (§4.E) for external integrations (Telegram, Firebase,
/// LLM providers, …). Probes via [`ExternalProbe`] when the service
/// advertises one; otherwise falls back to existence validation, mirroring
/// the reference implementation's final "basic validation" branch.
pub struct ExternalHealthChecker;

#[async_trait]
impl HealthChecker for ExternalHealthChecker {
    fn supports(&self, service_name: &str) -> bool {
        let name = service_name.to_lowercase();
        ["llm", "telegram", "firebase", "client", "provider", "bot"]
            .iter()
            .any(|k| name.contains(k))
    }

    async fn check(&self, service_name: &str, instance: Option<&(dyn Any + Send + Sync)>) -> ServiceHealth {
        let Some(instance) = instance else {
            return unhealthy(service_name, "service instance is missing");
        };
        if let Some(probe) = instance.downcast_ref::<std::sync::Arc<dyn ExternalProbe>>() {
            let mut metadata = HashMap::new();
            metadata.insert("checker_type".to_string(), json!("external_service"));
            metadata.insert("connection_test".to_string(), json!(true));
            return match probe.probe().await {
                Ok(()) => healthy_with(service_name, metadata),
                Err(e) => unhealthy_with(service_name, e, metadata),
            };
        }
        let mut metadata = HashMap::new();
        metadata.insert("checker_type".to_string(), json!("external_service"));
        metadata.insert("basic_validation".to_string(), json!(true));
        healthy_with(service_name, metadata)
    }
}

/// Checks the bot fleet: healthy if at least one worker is running, unless
/// the team list is empty (nothing to run yet is not a failure). Not part of
/// the required plug-in set, but built the same way — claims a name,
/// downcasts, probes.
pub struct FleetHealthChecker;

#[async_trait]
impl HealthChecker for FleetHealthChecker {
    fn supports(&self, service_name: &str) -> bool {
        service_name == "fleet"
    }

    async fn check(&self, service_name: &str, instance: Option<&(dyn Any + Send + Sync)>) -> ServiceHealth {
        let Some(instance) = instance else {
            return unhealthy(service_name, "service instance is missing");
        };
        let Some(fleet) = instance.downcast_ref::<std::sync::Arc<crate::fleet::FleetManager>>() else {
            return unhealthy(service_name, "registered instance is not a FleetManager");
        };
        let running = fleet.list_running().await;
        let total = fleet.team_count().await;
        if total == 0 || !running.is_empty() {
            healthy(service_name)
        } else {
            unhealthy(service_name, "no bot workers running")
        }
    }
}

/// Last-resort checker: any registered instance that exists is healthy.
/// Always appended last so more specific checkers get first refusal.
pub struct DefaultHealthChecker;

#[async_trait]
impl HealthChecker for DefaultHealthChecker {
    fn supports(&self, _service_name: &str) -> bool {
        true
    }

    async fn check(&self, service_name: &str, instance: Option<&(dyn Any + Send + Sync)>) -> ServiceHealth {
        match instance {
            Some(_) => healthy(service_name),
            None => unhealthy(service_name, "service instance is None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn default_checker_reports_unhealthy_without_instance() {
        let checker = DefaultHealthChecker;
        let health = checker.check("whatever", None).await;
        assert_eq!(health.status, ServiceStatus::Unhealthy);
    }

    #[tokio::test]
    async fn default_checker_reports_healthy_with_instance() {
        let checker = DefaultHealthChecker;
        let instance: Arc<dyn Any + Send + Sync> = Arc::new(7i32);
        let health = checker.check("whatever", Some(&*instance)).await;
        assert_eq!(health.status, ServiceStatus::Healthy);
    }

    #[tokio::test]
    async fn store_checker_probes_list_collections() {
        let checker = StoreHealthChecker;
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let instance: Arc<dyn Any + Send + Sync> = Arc::new(store);
        let health = checker.check("store", Some(&*instance)).await;
        assert_eq!(health.status, ServiceStatus::Healthy);
        assert_eq!(health.metadata.get("checker_type"), Some(&json!("database")));
    }

    #[test]
    fn store_checker_only_supports_store() {
        let checker = StoreHealthChecker;
        assert!(checker.supports("store"));
        assert!(!checker.supports("fleet"));
    }

    #[test]
    fn domain_checker_supports_player_and_team_names() {
        let checker = DomainServiceHealthChecker;
        assert!(checker.supports("player_service"));
        assert!(checker.supports("TeamService"));
        assert!(!checker.supports("store"));
    }

    #[tokio::test]
    async fn domain_checker_probes_the_underlying_store() {
        let checker = DomainServiceHealthChecker;
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let instance: Arc<dyn Any + Send + Sync> = Arc::new(store);
        let health = checker.check("player_service", Some(&*instance)).await;
        assert_eq!(health.status, ServiceStatus::Healthy);
    }

    #[tokio::test]
    async fn agent_checker_exchanges_a_diagnostic_message() {
        let checker = AgentHealthChecker;
        let agent: Arc<dyn AgentLayer> = Arc::new(crate::agent::FallbackAgent);
        let instance: Arc<dyn Any + Send + Sync> = Arc::new(agent);
        let health = checker.check("message_router", Some(&*instance)).await;
        assert_eq!(health.status, ServiceStatus::Healthy);
        assert_eq!(health.metadata.get("checker_type"), Some(&json!("agent_service")));
    }

    #[test]
    fn agent_checker_supports_expected_keywords() {
        let checker = AgentHealthChecker;
        assert!(checker.supports("agent_factory"));
        assert!(checker.supports("crew_system"));
        assert!(checker.supports("message_router"));
        assert!(!checker.supports("store"));
    }

    struct FailingProbe;

    #[async_trait]
    impl ExternalProbe for FailingProbe {
        async fn probe(&self) -> Result<(), String> {
            Err("connection refused".to_string())
        }
    }

    #[tokio::test]
    async fn external_checker_uses_advertised_probe_when_present() {
        let checker = ExternalHealthChecker;
        let probe: Arc<dyn ExternalProbe> = Arc::new(FailingProbe);
        let instance: Arc<dyn Any + Send + Sync> = Arc::new(probe);
        let health = checker.check("telegram_bot", Some(&*instance)).await;
        assert_eq!(health.status, ServiceStatus::Unhealthy);
        assert_eq!(health.error_message.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn external_checker_falls_back_to_existence_check() {
        let checker = ExternalHealthChecker;
        let instance: Arc<dyn Any + Send + Sync> = Arc::new(42i32);
        let health = checker.check("firebase_client", Some(&*instance)).await;
        assert_eq!(health.status, ServiceStatus::Healthy);
        assert_eq!(health.metadata.get("basic_validation"), Some(&json!(true)));
    }
}

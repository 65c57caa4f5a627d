//! Service discovery: classify a service by name and register it (§4.D).
//!
//! The original scans Python packages and the dependency-injection container
//! at runtime to find service classes. Rust has no equivalent reflection, so
//! this keeps only the part that still applies once services are wired up
//! explicitly at startup: the same keyword classification, a container-scan
//! stand-in over services already known at startup, a module-scan stand-in
//! over a configured static candidate list, and a composite that runs both
//! and deduplicates by name.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::registry::{ServiceDefinition, ServiceRegistry, ServiceType};

/// Classify a service by its name using the same keyword buckets as the
/// reference implementation's `_classify_service_type`.
pub fn classify_service_type(service_name: &str) -> ServiceType {
    let name = service_name.to_lowercase();

    const CORE: &[&str] = &["store", "database", "container", "factory", "repository"];
    const EXTERNAL: &[&str] = &["telegram", "firebase", "llm", "client", "provider"];
    const FEATURE: &[&str] = &["player", "team", "match", "attendance", "payment"];

    if CORE.iter().any(|k| name.contains(k)) {
        ServiceType::Core
    } else if EXTERNAL.iter().any(|k| name.contains(k)) {
        ServiceType::External
    } else if FEATURE.iter().any(|k| name.contains(k)) {
        ServiceType::Feature
    } else {
        ServiceType::Utility
    }
}

/// A service known to one discovery strategy, ready to be classified and
/// registered. `instance` is `None` for definitions found by a scan that
/// only knows a candidate's name, not a live instance (e.g. module scan).
pub struct DiscoveredService {
    pub name: String,
    pub dependencies: Vec<String>,
    pub instance: Option<Arc<dyn Any + Send + Sync>>,
}

impl DiscoveredService {
    pub fn new(name: impl Into<String>, instance: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            instance: Some(instance),
        }
    }

    /// A definition-only discovery with no live instance to register
    /// alongside it (lazy loading), as module scan produces.
    pub fn without_instance(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            instance: None,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Names of service classes module scan would have found by reflection,
/// since this crate has no runtime class-path scan to walk. Configured
/// rather than hardcoded so a caller can extend it as new services are
/// wired up.
pub struct ModuleScanConfig {
    pub candidates: Vec<String>,
}

impl Default for ModuleScanConfig {
    fn default() -> Self {
        Self {
            candidates: vec![
                "PlayerService".to_string(),
                "TeamService".to_string(),
                "MatchRepository".to_string(),
                "AttendanceRepository".to_string(),
                "TelegramClient".to_string(),
                "FirebaseProvider".to_string(),
            ],
        }
    }
}

/// Module-scan stand-in (§4.D): every candidate name becomes a
/// definition-only [`DiscoveredService`], classified by the same keyword
/// heuristic `classify_service_type` uses.
pub fn module_scan(config: &ModuleScanConfig) -> Vec<DiscoveredService> {
    config
        .candidates
        .iter()
        .map(|name| DiscoveredService::without_instance(name.clone()))
        .collect()
}

/// Composite discovery (§4.D): combine a container scan (services already
/// known at startup, with live instances) and a module scan, deduplicating
/// by name. `container_scan` entries are listed first so they win ties —
/// a name found by both keeps its live instance rather than being
/// overwritten by a definition-only module-scan entry.
pub fn discover_services(
    container_scan: Vec<DiscoveredService>,
    module_scan: Vec<DiscoveredService>,
) -> Vec<DiscoveredService> {
    let mut seen = HashSet::new();
    let mut combined = Vec::new();

    for service in container_scan.into_iter().chain(module_scan) {
        if seen.insert(service.name.clone()) {
            combined.push(service);
        } else {
            debug!(service = %service.name, "duplicate service found during discovery");
        }
    }

    combined
}

/// Classify and register every discovered service with `registry`.
pub fn register_discovered_services(registry: &ServiceRegistry, services: Vec<DiscoveredService>) {
    for service in services {
        let service_type = classify_service_type(&service.name);
        let definition =
            ServiceDefinition::new(service.name.clone(), service_type).with_dependencies(service.dependencies);
        registry.register_service(definition, service.instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_core_services() {
        assert_eq!(classify_service_type("DocumentStore"), ServiceType::Core);
        assert_eq!(classify_service_type("team_repository"), ServiceType::Core);
        assert_eq!(classify_service_type("store"), ServiceType::Core);
    }

    #[test]
    fn classifies_external_services() {
        assert_eq!(classify_service_type("TelegramBot"), ServiceType::External);
        assert_eq!(classify_service_type("firebase_client"), ServiceType::External);
    }

    #[test]
    fn classifies_feature_services() {
        assert_eq!(classify_service_type("PlayerService"), ServiceType::Feature);
        assert_eq!(classify_service_type("attendance_tracker"), ServiceType::Feature);
    }

    #[test]
    fn defaults_to_utility() {
        assert_eq!(classify_service_type("SomethingElse"), ServiceType::Utility);
    }

    #[test]
    fn register_discovered_services_classifies_each() {
        let registry = ServiceRegistry::new(crate::registry::RegistryConfig::default());
        let services = vec![DiscoveredService::new("store", Arc::new(7i32))];
        register_discovered_services(&registry, services);
        assert_eq!(
            registry.get_service_definition("store").unwrap().service_type,
            ServiceType::Core
        );
    }

    #[test]
    fn module_scan_produces_definition_only_candidates() {
        let config = ModuleScanConfig::default();
        let discovered = module_scan(&config);
        assert_eq!(discovered.len(), config.candidates.len());
        assert!(discovered.iter().all(|s| s.instance.is_none()));
        assert!(discovered.iter().any(|s| s.name == "PlayerService"));
    }

    #[test]
    fn composite_discovery_dedupes_by_name() {
        let container = vec![DiscoveredService::new("store", Arc::new(1i32))];
        let modules = vec![
            DiscoveredService::without_instance("store"),
            DiscoveredService::without_instance("PlayerService"),
        ];

        let combined = discover_services(container, modules);

        assert_eq!(combined.len(), 2);
        let store_entry = combined.iter().find(|s| s.name == "store").unwrap();
        assert!(store_entry.instance.is_some(), "container-scan instance should win the dedup");
        assert!(combined.iter().any(|s| s.name == "PlayerService"));
    }

    #[test]
    fn composite_discovery_registers_everything_deduped() {
        let registry = ServiceRegistry::new(crate::registry::RegistryConfig::default());
        let container = vec![DiscoveredService::new("store", Arc::new(1i32))];
        let modules = module_scan(&ModuleScanConfig::default());

        let combined = discover_services(container, modules);
        register_discovered_services(&registry, combined);

        assert_eq!(
            registry.get_service_definition("store").unwrap().service_type,
            ServiceType::Core
        );
        assert_eq!(
            registry.get_service_definition("PlayerService").unwrap().service_type,
            ServiceType::Feature
        );
    }
}

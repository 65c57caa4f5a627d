//! Service registry: named service instances, circuit breakers, and health
//! caching (§4.C).
//!
//! Generalizes `registry.py`'s `ServiceRegistry`: services are stored behind
//! `Arc<dyn Any + Send + Sync>` since Rust has no single base class every
//! service instance shares, and are health-checked through the
//! [`crate::health::HealthChecker`] chain rather than `hasattr` duck typing.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::health::HealthChecker;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("failed to register service {name}: {reason}")]
    ServiceRegistrationError { name: String, reason: String },

    #[error("circuit breaker open for service: {0}")]
    CircuitBreakerOpen(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    /// Required for startup; an unhealthy core service fails startup (§4.H).
    Core,
    Feature,
    External,
    Utility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
    Unknown,
    Disabled,
}

/// Static metadata registered alongside a service instance.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub name: String,
    pub service_type: ServiceType,
    pub dependencies: Vec<String>,
    pub health_check_enabled: bool,
    pub timeout: Duration,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>, service_type: ServiceType) -> Self {
        Self {
            name: name.into(),
            service_type,
            dependencies: Vec::new(),
            health_check_enabled: true,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }
}

/// The most recent health check result for one service.
#[derive(Debug, Clone)]
pub struct ServiceHealth {
    pub service_name: String,
    pub status: ServiceStatus,
    pub last_check: Option<Instant>,
    pub response_time: Option<Duration>,
    pub error_message: Option<String>,
    /// Freeform detail describing which probe ran and what it found (§4.E),
    /// e.g. `checker_type`, `connection_test`, `agent_creation_test`.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ServiceHealth {
    fn unknown(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            status: ServiceStatus::Unknown,
            last_check: None,
            response_time: None,
            error_message: None,
            metadata: HashMap::new(),
        }
    }
}

/// Configuration knobs for the registry, sourced from [`crate::config::RegistrySettings`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub circuit_breaker_enabled: bool,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_enabled: true,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&crate::config::RegistrySettings> for RegistryConfig {
    fn from(s: &crate::config::RegistrySettings) -> Self {
        Self {
            circuit_breaker_enabled: s.circuit_breaker_enabled,
            circuit_breaker_threshold: s.circuit_breaker_threshold,
            circuit_breaker_timeout: Duration::from_secs(s.circuit_breaker_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-service failure-tripped breaker, opened after `failure_threshold`
/// consecutive failures and half-opened again after `timeout` elapses.
struct CircuitBreaker {
    failure_threshold: u32,
    timeout: Duration,
    failure_count: u32,
    last_failure: Option<Instant>,
    state: BreakerState,
}

impl CircuitBreaker {
    fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            failure_threshold,
            timeout,
            failure_count: 0,
            last_failure: None,
            state: BreakerState::Closed,
        }
    }

    fn can_execute(&mut self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = self.last_failure.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.timeout {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&mut self) {
        self.failure_count = 0;
        self.state = BreakerState::Closed;
    }

    fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure = Some(Instant::now());
        if self.failure_count >= self.failure_threshold {
            self.state = BreakerState::Open;
        }
    }
}

#[derive(Debug, Default)]
pub struct RegistryStatistics {
    pub total_services: usize,
    pub services_by_type: HashMap<String, usize>,
    pub health_status_distribution: HashMap<String, usize>,
}

struct Inner {
    services: HashMap<String, Arc<dyn Any + Send + Sync>>,
    definitions: HashMap<String, ServiceDefinition>,
    health_status: HashMap<String, ServiceHealth>,
    circuit_breakers: HashMap<String, CircuitBreaker>,
    health_checkers: Vec<Arc<dyn HealthChecker>>,
}

/// Thread-safe registry of named service instances with health caching and
/// per-service circuit breakers.
pub struct ServiceRegistry {
    config: RegistryConfig,
    inner: Mutex<Inner>,
}

impl ServiceRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                services: HashMap::new(),
                definitions: HashMap::new(),
                health_status: HashMap::new(),
                circuit_breakers: HashMap::new(),
                health_checkers: vec![Arc::new(crate::health::DefaultHealthChecker)],
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a service, replacing any existing registration of the same name.
    pub fn register_service(
        &self,
        definition: ServiceDefinition,
        instance: Option<Arc<dyn Any + Send + Sync>>,
    ) {
        let mut inner = self.lock();
        let name = definition.name.clone();

        if inner.definitions.contains_key(&name) {
            warn!(service = %name, "service already registered, updating");
        }

        if self.config.circuit_breaker_enabled {
            inner.circuit_breakers.insert(
                name.clone(),
                CircuitBreaker::new(self.config.circuit_breaker_threshold, self.config.circuit_breaker_timeout),
            );
        }

        inner.health_status.insert(name.clone(), ServiceHealth::unknown(&name));
        inner.definitions.insert(name.clone(), definition);
        if let Some(instance) = instance {
            inner.services.insert(name.clone(), instance);
        }

        info!(service = %name, "service registered");
    }

    pub fn unregister_service(&self, service_name: &str) {
        let mut inner = self.lock();
        inner.services.remove(service_name);
        inner.definitions.remove(service_name);
        inner.health_status.remove(service_name);
        inner.circuit_breakers.remove(service_name);
        info!(service = %service_name, "service unregistered");
    }

    pub fn get_service(&self, service_name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.lock().services.get(service_name).cloned()
    }

    pub fn get_service_definition(&self, service_name: &str) -> Option<ServiceDefinition> {
        self.lock().definitions.get(service_name).cloned()
    }

    pub fn list_services(&self, service_type: Option<ServiceType>) -> Vec<String> {
        let inner = self.lock();
        match service_type {
            None => inner.definitions.keys().cloned().collect(),
            Some(t) => inner
                .definitions
                .values()
                .filter(|d| d.service_type == t)
                .map(|d| d.name.clone())
                .collect(),
        }
    }

    /// Check a single service's health, consulting the circuit breaker and
    /// the first registered checker (custom checkers are inserted at index 0
    /// by [`ServiceRegistry::add_health_checker`]) that supports it.
    pub async fn check_service_health(&self, service_name: &str) -> Result<ServiceHealth, RegistryError> {
        let definition = self
            .get_service_definition(service_name)
            .ok_or_else(|| RegistryError::ServiceNotFound(service_name.to_string()))?;

        if self.config.circuit_breaker_enabled {
            let mut inner = self.lock();
            if let Some(breaker) = inner.circuit_breakers.get_mut(service_name)
                && !breaker.can_execute()
            {
                return Err(RegistryError::CircuitBreakerOpen(service_name.to_string()));
            }
        }

        let instance = self.get_service(service_name);
        let timeout = definition.timeout;

        let checker = {
            let inner = self.lock();
            inner.health_checkers.iter().find(|c| c.supports(service_name)).cloned()
        };

        let mut health = match checker {
            Some(checker) => {
                let started = Instant::now();
                match tokio::time::timeout(timeout, checker.check(service_name, instance.as_deref())).await {
                    Ok(mut h) => {
                        h.response_time = Some(started.elapsed());
                        h
                    }
                    Err(_) => ServiceHealth {
                        service_name: service_name.to_string(),
                        status: ServiceStatus::Unhealthy,
                        last_check: Some(Instant::now()),
                        response_time: Some(started.elapsed()),
                        error_message: Some(format!("health check timeout after {timeout:?}")),
                        metadata: HashMap::new(),
                    },
                }
            }
            None => ServiceHealth::unknown(service_name),
        };

        health.last_check = Some(Instant::now());

        if self.config.circuit_breaker_enabled {
            let mut inner = self.lock();
            if let Some(breaker) = inner.circuit_breakers.get_mut(service_name) {
                match health.status {
                    ServiceStatus::Healthy => breaker.record_success(),
                    _ => breaker.record_failure(),
                }
            }
        }

        self.lock().health_status.insert(service_name.to_string(), health.clone());
        Ok(health)
    }

    /// Check every registered service concurrently (§4.H).
    pub async fn check_all_services_health(&self) -> HashMap<String, ServiceHealth> {
        let names = self.list_services(None);
        let checks = names.iter().map(|n| self.check_service_health(n));
        let results = futures::future::join_all(checks).await;

        names
            .into_iter()
            .zip(results)
            .map(|(name, result)| {
                let health = result.unwrap_or_else(|e| ServiceHealth {
                    service_name: name.clone(),
                    status: ServiceStatus::Unhealthy,
                    last_check: Some(Instant::now()),
                    response_time: None,
                    error_message: Some(e.to_string()),
                    metadata: HashMap::new(),
                });
                (name, health)
            })
            .collect()
    }

    pub fn is_service_healthy(&self, service_name: &str) -> bool {
        self.lock()
            .health_status
            .get(service_name)
            .map(|h| h.status == ServiceStatus::Healthy)
            .unwrap_or(false)
    }

    /// Custom checkers are tried before the built-ins (inserted at index 0).
    pub fn add_health_checker(&self, checker: Arc<dyn HealthChecker>) {
        self.lock().health_checkers.insert(0, checker);
    }

    pub fn get_statistics(&self) -> RegistryStatistics {
        let inner = self.lock();
        let mut stats = RegistryStatistics {
            total_services: inner.definitions.len(),
            ..Default::default()
        };

        for definition in inner.definitions.values() {
            let key = format!("{:?}", definition.service_type).to_lowercase();
            *stats.services_by_type.entry(key).or_insert(0) += 1;
        }
        for health in inner.health_status.values() {
            let key = format!("{:?}", health.status).to_lowercase();
            *stats.health_status_distribution.entry(key).or_insert(0) += 1;
        }

        stats
    }
}

static GLOBAL_REGISTRY: Mutex<Option<Arc<ServiceRegistry>>> = Mutex::new(None);

/// Get (initializing on first call) the process-wide registry singleton.
pub fn global_registry() -> Arc<ServiceRegistry> {
    let mut guard = match GLOBAL_REGISTRY.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    };
    guard
        .get_or_insert_with(|| Arc::new(ServiceRegistry::new(RegistryConfig::default())))
        .clone()
}

/// Reset the global registry. Used by tests to isolate state between runs.
pub fn reset_global_registry() {
    let mut guard = match GLOBAL_REGISTRY.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    };
    *guard = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_get_service() {
        let registry = ServiceRegistry::new(RegistryConfig::default());
        let def = ServiceDefinition::new("store", ServiceType::Core);
        registry.register_service(def, Some(Arc::new(42i32)));

        assert!(registry.get_service("store").is_some());
        assert_eq!(registry.list_services(None), vec!["store".to_string()]);
    }

    #[test]
    fn list_services_filters_by_type() {
        let registry = ServiceRegistry::new(RegistryConfig::default());
        registry.register_service(ServiceDefinition::new("store", ServiceType::Core), None);
        registry.register_service(ServiceDefinition::new("invites", ServiceType::Feature), None);

        let core = registry.list_services(Some(ServiceType::Core));
        assert_eq!(core, vec!["store".to_string()]);
    }

    #[test]
    fn unregister_removes_all_state() {
        let registry = ServiceRegistry::new(RegistryConfig::default());
        registry.register_service(ServiceDefinition::new("store", ServiceType::Core), None);
        registry.unregister_service("store");
        assert!(registry.get_service_definition("store").is_none());
    }

    #[tokio::test]
    async fn unknown_service_health_check_errors() {
        let registry = ServiceRegistry::new(RegistryConfig::default());
        let err = registry.check_service_health("missing").await.unwrap_err();
        assert!(matches!(err, RegistryError::ServiceNotFound(_)));
    }

    #[test]
    fn circuit_breaker_opens_after_threshold() {
        let mut breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        assert!(breaker.can_execute());
        breaker.record_failure();
        assert!(breaker.can_execute());
        breaker.record_failure();
        assert!(!breaker.can_execute());
    }

    #[test]
    fn circuit_breaker_recovers_after_success() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure();
        assert!(!breaker.can_execute());
        breaker.state = BreakerState::HalfOpen;
        breaker.record_success();
        assert!(breaker.can_execute());
    }
}

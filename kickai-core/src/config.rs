//! Configuration loading (§4.B).
//!
//! Settings come from environment variables overlaid on an optional TOML
//! file, following a `Config::load`/`load_from` precedence (env var > local
//! file > user config dir > defaults) extended with the env-only required
//! fields of §4.B / §6, where environment always wins over the file for
//! secrets.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// One or more required settings are missing. Aggregated so startup
    /// reports every problem at once rather than one at a time.
    #[error("missing required configuration: {0:?}")]
    MissingRequired(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Production,
    Testing,
}

impl Default for Environment {
    fn default() -> Self {
        Self::Development
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    Ollama,
}

impl Default for AiProvider {
    fn default() -> Self {
        Self::Ollama
    }
}

/// Service-registry settings nested under `[registry]` (§4.B last paragraph).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegistrySettings {
    #[serde(default = "default_true")]
    pub auto_discovery_enabled: bool,
    #[serde(default = "default_true")]
    pub health_check_enabled: bool,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_service_timeout")]
    pub service_timeout_secs: f64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_true")]
    pub circuit_breaker_enabled: bool,
    #[serde(default = "default_cb_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_cb_timeout")]
    pub circuit_breaker_timeout_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            auto_discovery_enabled: true,
            health_check_enabled: true,
            health_check_interval_secs: default_health_check_interval(),
            service_timeout_secs: default_service_timeout(),
            retry_attempts: default_retry_attempts(),
            circuit_breaker_enabled: true,
            circuit_breaker_threshold: default_cb_threshold(),
            circuit_breaker_timeout_secs: default_cb_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_health_check_interval() -> u64 {
    60
}
fn default_service_timeout() -> f64 {
    30.0
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_cb_threshold() -> u32 {
    5
}
fn default_cb_timeout() -> u64 {
    60
}

/// Advanced memory capacity caps (§11, recovered from `settings.py`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MemorySettings {
    #[serde(default = "default_true")]
    pub enable_advanced_memory: bool,
    #[serde(default = "default_mem_short")]
    pub max_short_term: u32,
    #[serde(default = "default_mem_long")]
    pub max_long_term: u32,
    #[serde(default = "default_mem_episodic")]
    pub max_episodic: u32,
    #[serde(default = "default_mem_semantic")]
    pub max_semantic: u32,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enable_advanced_memory: true,
            max_short_term: default_mem_short(),
            max_long_term: default_mem_long(),
            max_episodic: default_mem_episodic(),
            max_semantic: default_mem_semantic(),
        }
    }
}

fn default_mem_short() -> u32 {
    100
}
fn default_mem_long() -> u32 {
    1000
}
fn default_mem_episodic() -> u32 {
    500
}
fn default_mem_semantic() -> u32 {
    200
}

/// Immutable, process-wide application settings (§4.B).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,

    pub firebase_project_id: String,
    #[serde(default)]
    pub firebase_credentials_path: Option<String>,
    #[serde(default)]
    pub firebase_credentials_json: Option<String>,

    #[serde(default)]
    pub ai_provider: AiProvider,
    pub ollama_base_url: String,
    #[serde(default = "default_ai_temperature")]
    pub ai_temperature: f64,
    #[serde(default = "default_ai_max_tokens")]
    pub ai_max_tokens: u32,
    #[serde(default = "default_ai_timeout")]
    pub ai_timeout_secs: u64,
    #[serde(default = "default_ai_max_retries")]
    pub ai_max_retries: u32,

    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default)]
    pub invite_secret_key: String,

    #[serde(default)]
    pub use_mock_datastore: bool,
    #[serde(default)]
    pub use_mock_telegram: bool,
    #[serde(default)]
    pub use_mock_ui: bool,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,

    #[serde(default)]
    pub memory: MemorySettings,

    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub verbose_logging: bool,

    #[serde(default)]
    pub logging: Option<LoggingSettings>,
}

fn default_ai_temperature() -> f64 {
    0.3
}
fn default_ai_max_tokens() -> u32 {
    800
}
fn default_ai_timeout() -> u64 {
    120
}
fn default_ai_max_retries() -> u32 {
    5
}
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_max_concurrent() -> u32 {
    10
}
fn default_request_timeout() -> u64 {
    30
}
fn default_retry_delay() -> f64 {
    1.0
}
fn default_port() -> u16 {
    8080
}

/// Optional rolling-file logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingSettings {
    pub directory: String,
    #[serde(default = "default_rotation")]
    pub rotation: String,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_rotation() -> String {
    "daily".to_string()
}
fn default_max_files() -> usize {
    14
}

impl Settings {
    /// Load settings, overlaying environment variables onto an optional
    /// TOML file found via [`Settings::load`]'s search order, then validate
    /// required fields (§4.B: "startup aborts with a prioritized error list
    /// if any required field is missing").
    pub fn load(explicit_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let mut settings = Self::load_file(explicit_path)?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn load_file(explicit_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit_path {
            return Self::load_from(path);
        }
        if let Ok(path) = std::env::var("KICKAI_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                return Self::load_from(p);
            }
        }
        let local = PathBuf::from("config.toml");
        if local.exists() {
            return Self::load_from(local);
        }
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".config/kickai/config.toml");
            if user_config.exists() {
                return Self::load_from(user_config);
            }
        }
        Ok(Self::empty())
    }

    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A settings value with every required field blank, used when no
    /// config file is found; environment overrides then fill it in (or
    /// `validate` reports what's still missing).
    fn empty() -> Self {
        Self {
            environment: Environment::Development,
            firebase_project_id: String::new(),
            firebase_credentials_path: None,
            firebase_credentials_json: None,
            ai_provider: AiProvider::Ollama,
            ollama_base_url: String::new(),
            ai_temperature: default_ai_temperature(),
            ai_max_tokens: default_ai_max_tokens(),
            ai_timeout_secs: default_ai_timeout(),
            ai_max_retries: default_ai_max_retries(),
            jwt_secret: String::new(),
            invite_secret_key: String::new(),
            use_mock_datastore: false,
            use_mock_telegram: false,
            use_mock_ui: false,
            port: default_port(),
            log_level: default_log_level(),
            cache_ttl_seconds: default_cache_ttl(),
            max_concurrent_requests: default_max_concurrent(),
            request_timeout_secs: default_request_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay(),
            memory: MemorySettings::default(),
            registry: RegistrySettings::default(),
            test_mode: false,
            debug: false,
            verbose_logging: false,
            logging: None,
        }
    }

    /// Environment always wins over the file for the secrets and
    /// deployment-identity fields listed in §6.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FIREBASE_PROJECT_ID") {
            self.firebase_project_id = v;
        }
        if let Ok(v) = std::env::var("FIREBASE_CREDENTIALS_FILE") {
            self.firebase_credentials_path = Some(v);
        }
        if let Ok(v) = std::env::var("FIREBASE_CREDENTIALS_JSON") {
            self.firebase_credentials_json = Some(v);
        }
        if let Ok(v) = std::env::var("OLLAMA_BASE_URL") {
            self.ollama_base_url = v;
        }
        if let Ok(v) = std::env::var("JWT_SECRET") {
            self.jwt_secret = v;
        }
        if let Ok(v) = std::env::var("KICKAI_INVITE_SECRET_KEY") {
            self.invite_secret_key = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("ENVIRONMENT") {
            self.environment = match v.to_lowercase().as_str() {
                "production" => Environment::Production,
                "testing" => Environment::Testing,
                _ => Environment::Development,
            };
        }
        if let Ok(v) = std::env::var("USE_MOCK_DATASTORE") {
            self.use_mock_datastore = parse_bool_env(&v);
        }
        if let Ok(v) = std::env::var("USE_MOCK_TELEGRAM") {
            self.use_mock_telegram = parse_bool_env(&v);
        }
        if let Ok(v) = std::env::var("USE_MOCK_UI") {
            self.use_mock_ui = parse_bool_env(&v);
        }
        if let Ok(v) = std::env::var("PORT") {
            if let Ok(port) = v.parse() {
                self.port = port;
            }
        }
    }

    /// Aggregate every missing-required-field problem into one error
    /// (§4.B), rather than failing on the first one encountered.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.firebase_project_id.is_empty() {
            errors.push("FIREBASE_PROJECT_ID is required".to_string());
        }
        if self.firebase_credentials_path.is_none() && self.firebase_credentials_json.is_none() {
            errors.push(
                "exactly one of FIREBASE_CREDENTIALS_FILE or FIREBASE_CREDENTIALS_JSON is required"
                    .to_string(),
            );
        }
        if self.ai_provider == AiProvider::Ollama && self.ollama_base_url.is_empty() {
            errors.push("OLLAMA_BASE_URL is required for the ollama provider".to_string());
        }
        if self.jwt_secret.is_empty() {
            errors.push("JWT_SECRET is required".to_string());
        }
        if self.invite_secret_key.is_empty() {
            errors.push("KICKAI_INVITE_SECRET_KEY is required".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingRequired(errors))
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn parse_bool_env(v: &str) -> bool {
    matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
        match LOCK.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    fn clear_env() {
        for k in [
            "KICKAI_CONFIG",
            "FIREBASE_PROJECT_ID",
            "FIREBASE_CREDENTIALS_FILE",
            "FIREBASE_CREDENTIALS_JSON",
            "OLLAMA_BASE_URL",
            "JWT_SECRET",
            "KICKAI_INVITE_SECRET_KEY",
            "LOG_LEVEL",
            "ENVIRONMENT",
            "USE_MOCK_DATASTORE",
            "USE_MOCK_TELEGRAM",
            "USE_MOCK_UI",
            "PORT",
        ] {
            unsafe { std::env::remove_var(k) };
        }
    }

    #[test]
    fn missing_required_fields_are_aggregated() {
        let _g = guard();
        clear_env();
        let err = Settings::empty().validate().unwrap_err();
        match err {
            ConfigError::MissingRequired(errors) => {
                assert!(errors.iter().any(|e| e.contains("FIREBASE_PROJECT_ID")));
                assert!(errors.iter().any(|e| e.contains("JWT_SECRET")));
                assert!(errors.iter().any(|e| e.contains("OLLAMA_BASE_URL")));
            }
            other => panic!("expected MissingRequired, got {other:?}"),
        }
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let _g = guard();
        clear_env();
        unsafe { std::env::set_var("JWT_SECRET", "from-env") };

        let mut settings = Settings::empty();
        settings.jwt_secret = "from-file".to_string();
        settings.apply_env_overrides();
        assert_eq!(settings.jwt_secret, "from-env");

        clear_env();
    }

    #[test]
    fn fully_populated_settings_validate() {
        let _g = guard();
        clear_env();
        let mut settings = Settings::empty();
        settings.firebase_project_id = "proj".to_string();
        settings.firebase_credentials_json = Some("{}".to_string());
        settings.ollama_base_url = "http://localhost:11434".to_string();
        settings.jwt_secret = "secret".to_string();
        settings.invite_secret_key = "invite-secret".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
firebase_project_id = "proj"
firebase_credentials_json = "{}"
ollama_base_url = "http://localhost:11434"
jwt_secret = "secret"
invite_secret_key = "invite-secret"
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.firebase_project_id, "proj");
        assert_eq!(settings.ai_temperature, 0.3);
        assert_eq!(settings.registry.circuit_breaker_threshold, 5);
        assert_eq!(settings.port, 8080);
    }

    #[test]
    fn mock_flags_parse_from_env() {
        let _g = guard();
        clear_env();
        unsafe { std::env::set_var("USE_MOCK_DATASTORE", "true") };
        unsafe { std::env::set_var("USE_MOCK_TELEGRAM", "1") };
        unsafe { std::env::set_var("PORT", "9090") };

        let mut settings = Settings::empty();
        settings.apply_env_overrides();
        assert!(settings.use_mock_datastore);
        assert!(settings.use_mock_telegram);
        assert!(!settings.use_mock_ui);
        assert_eq!(settings.port, 9090);

        clear_env();
    }

    #[test]
    fn load_from_nonexistent_file_errors() {
        let result = Settings::load_from("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }
}

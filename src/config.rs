//! Configuration parsing and validation for copilot-gateway.
//!
//! Every section has defaults, so the gateway can run without a config file.
//! Transport-verification settings may additionally be overridden from the
//! environment (see [`Config::apply_env_overrides`]).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:80")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Try the next port when the configured one is already in use
    #[serde(default)]
    pub auto_increment_port: bool,
    /// Upper bound on ports tried when auto-increment is enabled
    #[serde(default = "default_max_port_attempts")]
    pub max_port_attempts: u16,
}

fn default_listen() -> String {
    "0.0.0.0:80".to_string()
}

fn default_max_port_attempts() -> u16 {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            auto_increment_port: false,
            max_port_attempts: default_max_port_attempts(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "./tokens.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Upstream vendor endpoints and transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL for chat completions, embeddings and models
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Credential exchange endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Identity lookup endpoint used for the best-effort label
    #[serde(default = "default_user_url")]
    pub user_url: String,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure_tls: bool,
    /// Extra PEM root certificate bundle
    #[serde(default)]
    pub ca_bundle: Option<PathBuf>,
    /// Bounded wait of the streaming consumer, in milliseconds
    #[serde(default = "default_stream_poll_ms")]
    pub stream_poll_ms: u64,
}

fn default_api_base() -> String {
    "https://api.individual.githubcopilot.com".to_string()
}

fn default_token_url() -> String {
    "https://api.github.com/copilot_internal/v2/token".to_string()
}

fn default_user_url() -> String {
    "https://api.github.com/user".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_stream_poll_ms() -> u64 {
    100
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_url: default_token_url(),
            user_url: default_user_url(),
            connect_timeout_secs: default_timeout_secs(),
            request_timeout_secs: default_timeout_secs(),
            insecure_tls: false,
            ca_bundle: None,
            stream_poll_ms: default_stream_poll_ms(),
        }
    }
}

impl UpstreamConfig {
    /// Join an API path onto `api_base`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn stream_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stream_poll_ms)
    }

    /// Build the shared upstream HTTP client.
    pub fn build_client(&self) -> Result<reqwest::Client, ConfigError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .timeout(Duration::from_secs(self.request_timeout_secs));

        if self.insecure_tls {
            tracing::warn!("TLS certificate verification is disabled for upstream requests");
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(path) = &self.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                ConfigError::Validation(format!(
                    "Invalid CA bundle '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|e| ConfigError::Validation(format!("Failed to build HTTP client: {}", e)))
    }
}

/// Vendor fingerprint constants sent with every upstream request.
///
/// Constructed once at startup and handed to the components that need it,
/// rather than looked up through a global.
#[derive(Debug, Clone, Deserialize)]
pub struct Fingerprint {
    #[serde(default = "default_editor_version")]
    pub editor_version: String,
    #[serde(default = "default_editor_plugin_version")]
    pub editor_plugin_version: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_github_api_version")]
    pub github_api_version: String,
    #[serde(default = "default_openai_organization")]
    pub openai_organization: String,
    /// Model name prefixes that cannot stream (matched case-sensitively)
    #[serde(default = "default_reasoning_prefixes")]
    pub reasoning_model_prefixes: Vec<String>,
}

fn default_editor_version() -> String {
    "vscode/1.98.0-insider".to_string()
}

fn default_editor_plugin_version() -> String {
    "copilot/1.270.0".to_string()
}

fn default_user_agent() -> String {
    "GitHubCopilotChat/0.23.2".to_string()
}

fn default_github_api_version() -> String {
    "2025-01-21".to_string()
}

fn default_openai_organization() -> String {
    "github-copilot".to_string()
}

fn default_reasoning_prefixes() -> Vec<String> {
    vec!["o1".to_string(), "o3".to_string()]
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self {
            editor_version: default_editor_version(),
            editor_plugin_version: default_editor_plugin_version(),
            user_agent: default_user_agent(),
            github_api_version: default_github_api_version(),
            openai_organization: default_openai_organization(),
            reasoning_model_prefixes: default_reasoning_prefixes(),
        }
    }
}

impl Fingerprint {
    /// Whether `model` belongs to a family that only supports whole responses.
    pub fn is_reasoning_model(&self, model: &str) -> bool {
        self.reasoning_model_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && model.starts_with(prefix.as_str()))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise start from defaults, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.api_base.trim().is_empty() {
            return Err(ConfigError::Validation(
                "upstream.api_base must not be empty".to_string(),
            ));
        }
        if self.upstream.token_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "upstream.token_url must not be empty".to_string(),
            ));
        }
        if self.upstream.stream_poll_ms == 0 {
            return Err(ConfigError::Validation(
                "upstream.stream_poll_ms must be greater than zero".to_string(),
            ));
        }
        if self.fingerprint.reasoning_model_prefixes.is_empty() {
            tracing::warn!("No reasoning model prefixes configured - every model may stream");
        }

        Ok(())
    }

    /// Apply transport overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_with(|name| std::env::var(name).ok());
    }

    /// Apply transport overrides using a custom lookup function.
    ///
    /// - `COPILOT_API_INSECURE_SSL=1` disables certificate verification
    /// - `CURL_CA_BUNDLE`, else `SSL_CERT_FILE`, sets the CA bundle
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("COPILOT_API_INSECURE_SSL").as_deref() == Some("1") {
            self.upstream.insecure_tls = true;
        }

        let bundle = lookup("CURL_CA_BUNDLE")
            .filter(|v| !v.is_empty())
            .or_else(|| lookup("SSL_CERT_FILE").filter(|v| !v.is_empty()));
        if let Some(bundle) = bundle {
            self.upstream.ca_bundle = Some(PathBuf::from(bundle));
        }
    }

    /// Replace the port of `server.listen`, keeping the host.
    pub fn set_port(&mut self, port: u16) {
        let host = self
            .server
            .listen
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        self.server.listen = format!("{}:{}", host, port);
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

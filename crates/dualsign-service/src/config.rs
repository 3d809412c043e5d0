//! Configuration for dualsignd.
//!
//! Sources are layered: built-in defaults, then an optional file, then
//! `DUALSIGN_`-prefixed environment variables using `__` as the section
//! separator (e.g. `DUALSIGN_STORAGE__URL`).

use crate::error::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub renderer: RendererConfig,

    #[serde(default)]
    pub countersign: CountersignConfig,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub finalize: FinalizeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Upper bound for a whole request; must exceed the finalization stage budget.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Signature images are inlined, so this must fit several of them.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
            request_timeout_secs: default_request_timeout(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        url: String,

        #[serde(default = "default_pool_size")]
        max_connections: u32,

        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

impl StorageConfig {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

/// Final document rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Canonical view; `/<document_id>` is appended.
    #[serde(default = "default_view_base_url")]
    pub view_base_url: String,

    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub engine: RenderEngine,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            view_base_url: default_view_base_url(),
            timeout_secs: default_render_timeout(),
            engine: RenderEngine::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RenderEngine {
    /// Fixed placeholder PDF
    #[default]
    Stub,

    /// Headless-browser render service
    Http { endpoint: String },
}

/// External countersigning over mutual TLS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountersignConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub client_cert_path: Option<PathBuf>,

    #[serde(default)]
    pub client_key_path: Option<PathBuf>,

    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,

    #[serde(default = "default_countersign_timeout")]
    pub timeout_secs: u64,
}

impl Default for CountersignConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            client_cert_path: None,
            client_key_path: None,
            ca_cert_path: None,
            timeout_secs: default_countersign_timeout(),
        }
    }
}

/// Outbound mail
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MailConfig {
    /// Log messages only
    #[default]
    Log,

    /// JSON mail relay
    Relay {
        endpoint: String,
        from: String,

        #[serde(default)]
        api_token: Option<String>,

        #[serde(default = "default_mail_timeout")]
        timeout_secs: u64,
    },
}

/// Message templates; `{document_id}` and (handoff only) `{view_url}` are substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeConfig {
    #[serde(default = "default_final_subject")]
    pub subject: String,

    #[serde(default = "default_final_body")]
    pub body: String,

    #[serde(default = "default_handoff_subject")]
    pub handoff_subject: String,

    #[serde(default = "default_handoff_body")]
    pub handoff_body: String,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            subject: default_final_subject(),
            body: default_final_body(),
            handoff_subject: default_handoff_subject(),
            handoff_body: default_handoff_body(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_request_timeout() -> u64 {
    240
}

fn default_max_body_size() -> usize {
    16 * 1024 * 1024
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_view_base_url() -> String {
    "http://localhost:3000/contracts/view".to_string()
}

fn default_render_timeout() -> u64 {
    60
}

fn default_countersign_timeout() -> u64 {
    90
}

fn default_mail_timeout() -> u64 {
    30
}

fn default_final_subject() -> String {
    dualsign_core::FinalizationSettings::default().subject
}

fn default_final_body() -> String {
    dualsign_core::FinalizationSettings::default().body
}

fn default_handoff_subject() -> String {
    dualsign_core::HandoffSettings::default().subject
}

fn default_handoff_body() -> String {
    dualsign_core::HandoffSettings::default().body
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&str>) -> ServiceResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&ServiceConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DUALSIGN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would only fail at the first finalization.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.countersign.enabled {
            let missing: Vec<&str> = [
                ("countersign.endpoint", self.countersign.endpoint.is_none()),
                (
                    "countersign.client_cert_path",
                    self.countersign.client_cert_path.is_none(),
                ),
                (
                    "countersign.client_key_path",
                    self.countersign.client_key_path.is_none(),
                ),
            ]
            .into_iter()
            .filter_map(|(field, absent)| absent.then_some(field))
            .collect();
            if !missing.is_empty() {
                return Err(ServiceError::Config(format!(
                    "countersigning is enabled but {} not set",
                    missing.join(", ")
                )));
            }
        }
        if let StorageConfig::Postgres { url, .. } = &self.storage {
            if url.trim().is_empty() {
                return Err(ServiceError::Config("storage.url must not be empty".to_string()));
            }
        }
        if self.renderer.timeout_secs == 0 || self.countersign.timeout_secs == 0 {
            return Err(ServiceError::Config(
                "render and countersign timeouts must be positive".to_string(),
            ));
        }
        let budget = self.finalization_budget_secs();
        if self.server.request_timeout_secs <= budget {
            return Err(ServiceError::Config(format!(
                "server.request_timeout_secs ({}) must exceed the finalization budget of {budget}s",
                self.server.request_timeout_secs
            )));
        }
        Ok(())
    }

    /// Worst-case time a company signature spends rendering, countersigning and mailing.
    pub fn finalization_budget_secs(&self) -> u64 {
        let countersign = if self.countersign.enabled {
            self.countersign.timeout_secs
        } else {
            0
        };
        let mail = match &self.mail {
            MailConfig::Log => 0,
            MailConfig::Relay { timeout_secs, .. } => *timeout_secs,
        };
        self.renderer.timeout_secs + countersign + mail
    }
}

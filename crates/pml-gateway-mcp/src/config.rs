// crates/pml-gateway-mcp/src/config.rs
// ============================================================================
// Module: Gateway Configuration
// Description: Configuration tree with fail-closed validation.
// Purpose: Load gateway settings from TOML with environment overrides.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! The configuration tree covers the server surface (bind address, CORS
//! domain), the runtime mode split, the SSE fan-out bounds, executor and
//! sandbox tuning, and the store path. Every field has a serde default so a
//! minimal file works; validation runs after load and fails closed with
//! precise messages. Environment variables `GATEWAY_MODE`, `DOMAIN`, and
//! `ADMIN_USERNAMES` override file values at the CLI boundary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File read failure.
    #[error("config read failed: {0}")]
    Read(String),
    /// TOML parse failure.
    #[error("config parse failed: {0}")]
    Parse(String),
    /// A field failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Mode
// ============================================================================

/// Runtime mode of the gateway.
///
/// # Invariants
/// - Local mode bypasses auth; cloud mode requires live API keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    /// Single-user local deployment; auth bypassed.
    #[default]
    Local,
    /// Multi-user cloud deployment; auth enforced.
    Cloud,
}

impl GatewayMode {
    /// Returns a stable label for logs and payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }

    /// Parses the `GATEWAY_MODE` environment value.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "cloud" => Some(Self::Cloud),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS origin domain for cloud mode (scheme added by the CORS layer).
    #[serde(default)]
    pub domain: Option<String>,
    /// Dashboard origin for the `/dashboard` redirect.
    #[serde(default = "default_dashboard_origin")]
    pub dashboard_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            domain: None,
            dashboard_origin: default_dashboard_origin(),
        }
    }
}

/// SSE fan-out settings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SseConfig {
    /// Maximum simultaneous SSE clients.
    #[serde(default = "default_sse_max_clients")]
    pub max_clients: usize,
    /// Heartbeat interval in seconds.
    #[serde(default = "default_sse_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Per-client bounded buffer; events drop on overflow.
    #[serde(default = "default_sse_buffer")]
    pub buffer: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            max_clients: default_sse_max_clients(),
            heartbeat_secs: default_sse_heartbeat_secs(),
            buffer: default_sse_buffer(),
        }
    }
}

/// Decision-gate settings shared by AIL and HIL.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GateConfig {
    /// Whether the gate is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Gate timeout in seconds.
    #[serde(default = "default_gate_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: default_gate_timeout_secs(),
        }
    }
}

/// Executor settings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExecutorSection {
    /// Parallel tasks per layer.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-task timeout in seconds.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// AIL gate settings.
    #[serde(default)]
    pub ail: GateConfig,
    /// HIL gate settings.
    #[serde(default)]
    pub hil: GateConfig,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            task_timeout_secs: default_task_timeout_secs(),
            ail: GateConfig::default(),
            hil: GateConfig::default(),
        }
    }
}

/// Sandbox settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSection {
    /// Worker runtime command (binary plus fixed args).
    #[serde(default)]
    pub worker_command: Vec<String>,
    /// Run timeout in seconds.
    #[serde(default = "default_sandbox_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Capability re-entry depth limit.
    #[serde(default = "default_capability_depth")]
    pub max_capability_depth: u32,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            worker_command: Vec::new(),
            run_timeout_secs: default_sandbox_run_timeout_secs(),
            max_capability_depth: default_capability_depth(),
        }
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PoolSection {
    /// Maximum pooled tool-server connections.
    #[serde(default = "default_pool_max")]
    pub max_connections: usize,
    /// Idle timeout in seconds.
    #[serde(default = "default_pool_idle_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_connections: default_pool_max(),
            idle_timeout_secs: default_pool_idle_secs(),
        }
    }
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root gateway configuration.
///
/// # Invariants
/// - Cloud mode requires a CORS domain.
/// - Bounded values are validated after load.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GatewayConfig {
    /// Runtime mode.
    #[serde(default)]
    pub mode: GatewayMode,
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// SSE settings.
    #[serde(default)]
    pub sse: SseConfig,
    /// Executor settings.
    #[serde(default)]
    pub executor: ExecutorSection,
    /// Sandbox settings.
    #[serde(default)]
    pub sandbox: SandboxSection,
    /// Connection pool settings.
    #[serde(default)]
    pub pool: PoolSection,
    /// Store database path; in-memory when absent.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Admin usernames (case-insensitive).
    #[serde(default)]
    pub admin_usernames: Vec<String>,
}

impl GatewayConfig {
    /// Parses a TOML document and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on parse or validation failure.
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(document).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on read, parse, or validation failure.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let document =
            std::fs::read_to_string(path).map_err(|err| ConfigError::Read(err.to_string()))?;
        Self::from_toml(&document)
    }

    /// Applies environment overrides (`GATEWAY_MODE`, `DOMAIN`,
    /// `ADMIN_USERNAMES`) and re-validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed values.
    pub fn apply_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup("GATEWAY_MODE") {
            self.mode = GatewayMode::parse(&raw)
                .ok_or_else(|| ConfigError::Invalid(format!("GATEWAY_MODE `{raw}`")))?;
        }
        if let Some(domain) = lookup("DOMAIN") {
            self.server.domain = Some(domain);
        }
        if let Some(admins) = lookup("ADMIN_USERNAMES") {
            self.admin_usernames = admins
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
        }
        self.validate()?;
        Ok(self)
    }

    /// Validates bounded fields. Fails closed on the first violation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] with the violating field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".to_string()));
        }
        if self.sse.max_clients == 0 {
            return Err(ConfigError::Invalid("sse.max_clients must be greater than zero".to_string()));
        }
        if self.sse.buffer == 0 {
            return Err(ConfigError::Invalid("sse.buffer must be greater than zero".to_string()));
        }
        if self.sse.heartbeat_secs == 0 {
            return Err(ConfigError::Invalid(
                "sse.heartbeat_secs must be greater than zero".to_string(),
            ));
        }
        if self.executor.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "executor.max_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.executor.task_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "executor.task_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.pool.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.mode == GatewayMode::Cloud && self.server.domain.is_none() {
            return Err(ConfigError::Invalid(
                "cloud mode requires server.domain (or the DOMAIN variable)".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default bind host.
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Returns the default bind port.
const fn default_port() -> u16 {
    8787
}

/// Returns the default dashboard origin.
fn default_dashboard_origin() -> String {
    "http://localhost:5173".to_string()
}

/// Returns the default SSE client cap.
const fn default_sse_max_clients() -> usize {
    100
}

/// Returns the default SSE heartbeat interval in seconds.
const fn default_sse_heartbeat_secs() -> u64 {
    30
}

/// Returns the default per-client SSE buffer.
const fn default_sse_buffer() -> usize {
    256
}

/// Returns the default decision-gate timeout in seconds.
const fn default_gate_timeout_secs() -> u64 {
    30
}

/// Returns the default per-layer concurrency cap.
const fn default_max_concurrency() -> usize {
    4
}

/// Returns the default per-task timeout in seconds.
const fn default_task_timeout_secs() -> u64 {
    10
}

/// Returns the default sandbox run timeout in seconds.
const fn default_sandbox_run_timeout_secs() -> u64 {
    30
}

/// Returns the default capability re-entry depth.
const fn default_capability_depth() -> u32 {
    3
}

/// Returns the default pool size.
const fn default_pool_max() -> usize {
    16
}

/// Returns the default pool idle timeout in seconds.
const fn default_pool_idle_secs() -> u64 {
    300
}

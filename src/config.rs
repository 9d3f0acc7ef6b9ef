//! Configuration system for the VPoW worker
//!
//! Supports multiple configuration sources with the following precedence
//! (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (VPOW_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::ViteAddress;

/// Main worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker identity settings
    pub node: NodeSettings,

    /// Coordinator connection settings
    pub coordinator: CoordinatorSettings,

    /// Local work-server gateway settings
    pub gateway: GatewaySettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Worker identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Vite address payouts go to; required to run, validated before connecting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// OpenCL device selector passed to the work server (platform:device)
    pub gpu: String,
}

/// Coordinator connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Coordinator WebSocket URL; the address is appended as a query parameter
    pub url: String,

    /// Fixed delay between reconnection attempts, in milliseconds
    pub reconnect_interval_ms: u64,

    /// Liveness deadline: force-close if no ping arrives within this bound
    pub liveness_timeout_ms: u64,
}

/// Which work-server protocol the gateway speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatewayBackendKind {
    /// Prebuilt pow-gpu binary: minimal JSON protocol with a cancel endpoint
    GpuServer,
    /// Python script service: JSON-RPC protocol, no cancel endpoint
    RpcServer,
}

/// Local work-server gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Backend protocol to use
    pub backend: GatewayBackendKind,

    /// Path to the work-server binary (gpu-server backend).
    /// Resolved from the platform binary name under `server_dir` if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_path: Option<String>,

    /// Directory holding the work server (binary install dir, or the
    /// rpc-server checkout containing `main.py`)
    pub server_dir: String,

    /// Loopback port for the work server (0 = derive a random port)
    pub port: u16,

    /// Request timeout for a single work exchange, in seconds (0 = none).
    /// PoW searches can legitimately run for minutes, hence no default cap.
    pub request_timeout_secs: u64,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings::default(),
            coordinator: CoordinatorSettings::default(),
            gateway: GatewaySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            address: None,
            gpu: "0:0".to_string(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            url: "wss://pow.vitamin.tips".to_string(),
            reconnect_interval_ms: 2000,
            liveness_timeout_ms: 45000,
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            backend: GatewayBackendKind::GpuServer,
            server_path: None,
            server_dir: "~/.vpow/work_server".to_string(),
            port: 0,
            request_timeout_secs: 0,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        let config_file = Self::find_config_file(config_path)?;
        if let Some(path) = config_file {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
            config = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let expanded = shellexpand::tilde(path);
            let path = PathBuf::from(expanded.as_ref());
            if path.exists() {
                return Ok(Some(path));
            } else {
                return Err(Error::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
        }

        // Search in standard locations
        let search_paths = [
            // Current directory
            PathBuf::from("vpow-worker.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("vpow").join("worker.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".vpow").join("worker.toml"))
                .unwrap_or_default(),
            // System config (Linux)
            PathBuf::from("/etc/vpow/worker.toml"),
        ];

        for path in &search_paths {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Node settings
        if let Ok(val) = std::env::var("VPOW_ADDRESS") {
            self.node.address = Some(val);
        }
        if let Ok(val) = std::env::var("VPOW_GPU") {
            self.node.gpu = val;
        }

        // Coordinator settings
        if let Ok(val) = std::env::var("VPOW_COORDINATOR_URL") {
            self.coordinator.url = val;
        }
        if let Ok(val) = std::env::var("VPOW_RECONNECT_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.coordinator.reconnect_interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("VPOW_LIVENESS_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.coordinator.liveness_timeout_ms = n;
            }
        }

        // Gateway settings
        if let Ok(val) = std::env::var("VPOW_GATEWAY_BACKEND") {
            match val.as_str() {
                "gpu-server" => self.gateway.backend = GatewayBackendKind::GpuServer,
                "rpc-server" => self.gateway.backend = GatewayBackendKind::RpcServer,
                _ => {}
            }
        }
        if let Ok(val) = std::env::var("VPOW_GATEWAY_SERVER_PATH") {
            self.gateway.server_path = Some(val);
        }
        if let Ok(val) = std::env::var("VPOW_GATEWAY_SERVER_DIR") {
            self.gateway.server_dir = val;
        }
        if let Ok(val) = std::env::var("VPOW_GATEWAY_PORT") {
            if let Ok(n) = val.parse() {
                self.gateway.port = n;
            }
        }

        // Logging settings
        if let Ok(val) = std::env::var("VPOW_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("VPOW_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("VPOW_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        self.gateway.server_dir = expand_path(&self.gateway.server_dir);

        if let Some(ref path) = self.gateway.server_path {
            self.gateway.server_path = Some(expand_path(path));
        }
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        // Validate coordinator URL
        if self.coordinator.url.is_empty() {
            return Err(Error::Config("Coordinator URL cannot be empty".to_string()));
        }
        if !self.coordinator.url.starts_with("ws://") && !self.coordinator.url.starts_with("wss://")
        {
            return Err(Error::Config(
                "Coordinator URL must start with ws:// or wss://".to_string(),
            ));
        }

        // Validate the address shape, if one is configured. This runs before
        // any connection attempt, so a bad address fails fast at startup.
        if let Some(ref address) = self.node.address {
            ViteAddress::parse(address)?;
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// The validated payout address, or an error if none is configured
    pub fn address(&self) -> Result<ViteAddress> {
        match self.node.address {
            Some(ref address) => ViteAddress::parse(address),
            None => Err(Error::Config(
                "No Vite address configured. Pass one on the command line or set node.address"
                    .to_string(),
            )),
        }
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<()> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".vpow")
                .join("worker.toml")
        });

    // Check if file exists
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    // Create parent directories
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
    }

    let config_content = generate_default_config();

    fs::write(&config_path, config_content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

    println!("Configuration file created: {}", config_path.display());
    Ok(())
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# VPoW Worker Configuration
# https://github.com/vpow/vpow-worker

[node]
# Vite address payouts go to (vite_ + 50 lowercase hex digits)
# address = "vite_..."

# OpenCL device selector passed to the work server (platform:device)
gpu = "0:0"

[coordinator]
# Coordinator WebSocket URL
url = "wss://pow.vitamin.tips"

# Fixed delay between reconnection attempts (milliseconds)
reconnect_interval_ms = 2000

# Force-close the connection if no ping arrives within this bound (milliseconds)
liveness_timeout_ms = 45000

[gateway]
# Work-server protocol: "gpu-server" (pow-gpu binary) or "rpc-server" (Python)
backend = "gpu-server"

# Directory holding the work server
server_dir = "~/.vpow/work_server"

# Explicit path to the work-server binary (gpu-server backend only).
# Defaults to the platform binary name under server_dir.
# server_path = "~/.vpow/work_server/linux-work-server-x64"

# Loopback port for the work server (0 = derive a random port)
port = 0

# Per-exchange request timeout in seconds (0 = none)
request_timeout_secs = 0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out for console-only logging)
# file = "~/.vpow/logs/worker.log"

# Number of rotated log files to keep
max_files = 5

# JSON formatted logs
json_format = false
"#
    .to_string()
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_address() -> String {
        format!("vite_{}", "0123456789".repeat(5))
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.coordinator.reconnect_interval_ms, 2000);
        assert_eq!(config.coordinator.liveness_timeout_ms, 45000);
        assert_eq!(config.gateway.backend, GatewayBackendKind::GpuServer);
    }

    #[test]
    fn test_default_config_has_no_address() {
        let config = WorkerConfig::default();
        assert!(config.address().is_err());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let mut config = WorkerConfig::default();
        config.coordinator.url = "http://pow.vitamin.tips".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_address_rejected() {
        let mut config = WorkerConfig::default();
        config.node.address = Some("vite_not-an-address".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_address_accepted() {
        let mut config = WorkerConfig::default();
        config.node.address = Some(valid_address());
        assert!(config.validate().is_ok());
        assert_eq!(config.address().unwrap().as_str(), valid_address());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = WorkerConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml_sections() {
        let config: WorkerConfig = toml::from_str(
            r#"
[node]
gpu = "1:0"

[coordinator]
url = "ws://localhost:9000"
reconnect_interval_ms = 500

[gateway]
backend = "rpc-server"
port = 52000
"#,
        )
        .unwrap();

        assert_eq!(config.node.gpu, "1:0");
        assert_eq!(config.coordinator.url, "ws://localhost:9000");
        assert_eq!(config.coordinator.reconnect_interval_ms, 500);
        // Unset sections fall back to defaults
        assert_eq!(config.coordinator.liveness_timeout_ms, 45000);
        assert_eq!(config.gateway.backend, GatewayBackendKind::RpcServer);
        assert_eq!(config.gateway.port, 52000);
    }

    #[test]
    fn test_backend_kind_kebab_case() {
        assert_eq!(
            serde_json::to_string(&GatewayBackendKind::GpuServer).unwrap(),
            "\"gpu-server\""
        );
        assert_eq!(
            serde_json::to_string(&GatewayBackendKind::RpcServer).unwrap(),
            "\"rpc-server\""
        );
    }

    #[test]
    fn test_generated_default_config_parses() {
        let config: WorkerConfig = toml::from_str(&generate_default_config()).unwrap();
        assert!(config.validate().is_ok());
    }
}

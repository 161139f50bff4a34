//! Configuration file management.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use neonmap_canvas::EngineSettings;
use neonmap_types::{CanvasGeometry, MS_PER_DAY};
use serde::{Deserialize, Serialize};

/// Startup configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("canvas: {0}")]
    Canvas(#[from] neonmap_types::GeometryError),

    #[error("{section}: {reason}")]
    Invalid { section: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(section: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            section,
            reason: reason.into(),
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// HTTP and WebSocket settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Canvas dimensions and pacing.
    #[serde(default)]
    pub canvas: CanvasConfig,
    /// Shield size and price table.
    #[serde(default)]
    pub shield: ShieldConfig,
    /// Stamp price table.
    #[serde(default)]
    pub stamp: StampConfig,
    /// Payment verification.
    #[serde(default)]
    pub payment: PaymentConfig,
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Allowed browser origin. Empty = any origin.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Seconds between WebSocket pings.
    #[serde(default = "default_ws_ping_interval")]
    pub ws_ping_interval_secs: u64,
    /// Largest accepted stamp upload.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Events buffered per viewer before it starts losing events.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// Canvas configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "default_canvas_edge")]
    pub width: u32,
    #[serde(default = "default_canvas_edge")]
    pub height: u32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    /// Minimum wait between pixel placements of one wallet.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Launch instant advertised to clients (Unix ms).
    #[serde(default = "default_launch_timestamp")]
    pub launch_timestamp_ms: u64,
    /// Length of the free placement phase after launch.
    #[serde(default = "default_free_phase_days")]
    pub free_phase_days: u64,
}

/// Shield configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShieldConfig {
    /// Edge of every shield region in pixels.
    #[serde(default = "default_shield_size")]
    pub size: u32,
    /// Duration in days → price in whole tokens.
    #[serde(default = "default_shield_prices")]
    pub prices: BTreeMap<String, u64>,
}

/// Stamp configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampConfig {
    /// Stamp edge in pixels → price in whole tokens.
    #[serde(default = "default_stamp_prices")]
    pub prices: BTreeMap<String, u64>,
}

/// Payment verifier selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    /// Verify transfers against a Solana JSON-RPC node.
    Rpc,
    /// Accept any signature. Development only.
    Dev,
}

/// Payment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "default_payment_mode")]
    pub mode: PaymentMode,
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Wallet receiving payments.
    #[serde(default)]
    pub treasury: String,
    /// SPL token mint accepted as payment.
    #[serde(default)]
    pub token_mint: String,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
    /// Upper bound on one verification, RPC round-trips included.
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_secs: u64,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_listen_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

fn default_ws_ping_interval() -> u64 {
    30
}

fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_event_buffer() -> usize {
    1024
}

fn default_canvas_edge() -> u32 {
    2048
}

fn default_chunk_size() -> u32 {
    256
}

fn default_cooldown_secs() -> u64 {
    60
}

/// 2025-01-08T00:00:00+01:00
fn default_launch_timestamp() -> u64 {
    1_736_290_800_000
}

fn default_free_phase_days() -> u64 {
    7
}

fn default_shield_size() -> u32 {
    64
}

fn default_shield_prices() -> BTreeMap<String, u64> {
    [("1", 50), ("3", 120), ("7", 200), ("30", 500)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn default_stamp_prices() -> BTreeMap<String, u64> {
    [("32", 100), ("64", 300), ("128", 800)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn default_payment_mode() -> PaymentMode {
    PaymentMode::Rpc
}

fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_token_decimals() -> u32 {
    6
}

fn default_verify_timeout() -> u64 {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cors_origin: default_cors_origin(),
            ws_ping_interval_secs: default_ws_ping_interval(),
            max_upload_bytes: default_max_upload_bytes(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_canvas_edge(),
            height: default_canvas_edge(),
            chunk_size: default_chunk_size(),
            cooldown_secs: default_cooldown_secs(),
            launch_timestamp_ms: default_launch_timestamp(),
            free_phase_days: default_free_phase_days(),
        }
    }
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            size: default_shield_size(),
            prices: default_shield_prices(),
        }
    }
}

impl Default for StampConfig {
    fn default() -> Self {
        Self {
            prices: default_stamp_prices(),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            mode: default_payment_mode(),
            rpc_url: default_rpc_url(),
            treasury: String::new(),
            token_mint: String::new(),
            token_decimals: default_token_decimals(),
            verify_timeout_secs: default_verify_timeout(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl CanvasConfig {
    /// End of the free placement phase (Unix ms).
    pub fn free_phase_end_ms(&self) -> u64 {
        self.launch_timestamp_ms
            .saturating_add(self.free_phase_days.saturating_mul(MS_PER_DAY))
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("NEONMAP_CONFIG") {
            return PathBuf::from(path);
        }
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("NEONMAP_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/NeonMap")
        }
        #[cfg(target_os = "windows")]
        {
            dirs_fallback("NeonMap")
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            dirs_fallback(".neonmap")
        }
    }

    /// Validate the canvas layout and price tables, producing engine settings.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        let geometry = CanvasGeometry::new(
            self.canvas.width,
            self.canvas.height,
            self.canvas.chunk_size,
        )?;

        let divides_canvas = |edge: u32| {
            edge > 0 && geometry.width % edge == 0 && geometry.height % edge == 0
        };

        if !divides_canvas(self.shield.size) {
            return Err(ConfigError::invalid(
                "shield",
                format!("size {} must divide the canvas dimensions", self.shield.size),
            ));
        }

        let shield_prices = parse_price_table("shield", &self.shield.prices)?;
        if shield_prices.contains_key(&0) {
            return Err(ConfigError::invalid("shield", "duration must be at least one day"));
        }

        let stamp_prices = parse_price_table("stamp", &self.stamp.prices)?;
        if let Some(size) = stamp_prices.keys().find(|&&size| !divides_canvas(size)) {
            return Err(ConfigError::invalid(
                "stamp",
                format!("size {size} must divide the canvas dimensions"),
            ));
        }

        if self.server.event_buffer == 0 {
            return Err(ConfigError::invalid("server", "event_buffer must be positive"));
        }

        Ok(EngineSettings {
            geometry,
            cooldown_secs: self.canvas.cooldown_secs,
            shield_size: self.shield.size,
            shield_prices,
            stamp_prices,
            verify_timeout: Duration::from_secs(self.payment.verify_timeout_secs),
            event_buffer: self.server.event_buffer,
        })
    }
}

/// Parse a `"key" = price` table with integer keys.
fn parse_price_table(
    section: &'static str,
    table: &BTreeMap<String, u64>,
) -> Result<BTreeMap<u32, u64>, ConfigError> {
    if table.is_empty() {
        return Err(ConfigError::invalid(section, "price table is empty"));
    }
    table
        .iter()
        .map(|(key, &price)| {
            key.trim()
                .parse::<u32>()
                .map(|k| (k, price))
                .map_err(|_| ConfigError::invalid(section, format!("price key {key:?} is not an integer")))
        })
        .collect()
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/neonmap"))
}

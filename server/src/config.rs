//! Server configuration
//!
//! Configuration is loaded from environment variables. See `.env.example` at the
//! repository root for documentation.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder secret used when `API_KEY` is not set
pub const DEFAULT_API_KEY: &str = "changeme";

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Shared secret expected in the `x-api-key` header
    pub api_key: String,
    /// Deployment environment name, reported by `/status`
    pub environment: String,
    /// Whether `/debug/*` routes are mounted
    pub debug_routes: bool,

    /// Session configuration
    pub session: SessionConfig,

    /// Messaging gateway configuration
    pub gateway: GatewayConfig,

    /// QR rendering configuration
    pub qr: QrConfig,
}

/// Session-related configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session name, also the credential sub-directory
    pub name: String,
    /// Root directory holding per-session credential directories
    pub auth_root: PathBuf,
    /// Delay before reconnecting after a non-logout close
    pub reconnect_delay: Duration,
    /// Delay before retrying a failed start
    pub start_retry_delay: Duration,
    /// Optional cap on consecutive failed starts (unbounded when `None`)
    pub max_start_attempts: Option<u32>,
    /// Multiplier applied per failed start; 1.0 keeps the delay fixed
    pub backoff_factor: f64,
    /// Ceiling for the start retry delay when backing off
    pub max_retry_delay: Duration,
}

/// Messaging gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway base URL
    pub url: String,
    /// Value for the gateway `apikey` header
    pub api_key: String,
    /// Connection-state poll interval
    pub poll_interval: Duration,
    /// How often a fresh pairing code is requested while awaiting a scan
    pub qr_refresh_interval: Duration,
    /// Per-request timeout
    pub connect_timeout: Duration,
}

/// QR rendering configuration
#[derive(Debug, Clone)]
pub struct QrConfig {
    /// Minimum width of the rendered PNG in pixels
    pub width: u32,
    /// Log pairing codes as terminal QR art
    pub print_in_terminal: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            api_key: DEFAULT_API_KEY.to_string(),
            environment: "production".to_string(),
            debug_routes: true,
            session: SessionConfig::default(),
            gateway: GatewayConfig::default(),
            qr: QrConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "pairlink-session".to_string(),
            auth_root: PathBuf::from("auth"),
            reconnect_delay: Duration::from_secs(3),
            start_retry_delay: Duration::from_secs(5),
            max_start_attempts: None,
            backoff_factor: 1.0,
            max_retry_delay: Duration::from_secs(300),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            api_key: String::new(),
            poll_interval: Duration::from_secs(5),
            qr_refresh_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            width: 300,
            print_in_terminal: true,
        }
    }
}

impl SessionConfig {
    /// Directory holding this session's credentials
    pub fn auth_dir(&self) -> PathBuf {
        self.auth_root.join(&self.name)
    }
}

fn parse_bool(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }
        if let Ok(key) = env::var("API_KEY")
            && !key.is_empty()
        {
            config.api_key = key;
        }
        if let Ok(val) = env::var("APP_ENV")
            && !val.is_empty()
        {
            config.environment = val;
        }
        if let Ok(val) = env::var("DEBUG_ROUTES") {
            config.debug_routes = parse_bool(&val);
        }

        // Session config
        if let Ok(name) = env::var("SESSION_NAME")
            && !name.is_empty()
        {
            config.session.name = name;
        }
        if let Ok(path) = env::var("AUTH_DIR")
            && !path.is_empty()
        {
            config.session.auth_root = PathBuf::from(path);
        }
        if let Ok(val) = env::var("RECONNECT_DELAY_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.session.reconnect_delay = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("START_RETRY_DELAY_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.session.start_retry_delay = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("START_RETRY_MAX_ATTEMPTS")
            && let Ok(attempts) = val.parse::<u32>()
        {
            config.session.max_start_attempts = Some(attempts);
        }
        if let Ok(val) = env::var("START_RETRY_BACKOFF")
            && let Ok(factor) = val.parse::<f64>()
            && factor >= 1.0
        {
            config.session.backoff_factor = factor;
        }
        if let Ok(val) = env::var("START_RETRY_MAX_DELAY_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.session.max_retry_delay = Duration::from_secs(secs);
        }

        // Gateway config
        if let Ok(url) = env::var("GATEWAY_URL")
            && !url.is_empty()
        {
            config.gateway.url = url.trim_end_matches('/').to_string();
        }
        if let Ok(key) = env::var("GATEWAY_API_KEY") {
            config.gateway.api_key = key;
        }
        if let Ok(val) = env::var("GATEWAY_POLL_INTERVAL_SECS")
            && let Ok(secs) = val.parse::<u64>()
            && secs > 0
        {
            config.gateway.poll_interval = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("GATEWAY_QR_REFRESH_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.gateway.qr_refresh_interval = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("CONNECT_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.gateway.connect_timeout = Duration::from_secs(secs);
        }

        // QR config
        if let Ok(val) = env::var("QR_WIDTH")
            && let Ok(width) = val.parse()
        {
            config.qr.width = width;
        }
        if let Ok(val) = env::var("PRINT_QR") {
            config.qr.print_in_terminal = parse_bool(&val);
        }

        config
    }

    /// Whether the shared secret is still the placeholder value
    pub fn uses_default_api_key(&self) -> bool {
        self.api_key == DEFAULT_API_KEY
    }
}

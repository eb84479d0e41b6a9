//! Process configuration.
//!
//! Built once in `main` from the environment and handed to each component.
//! Nothing below this module reads environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::credentials::Credentials;

pub const DEFAULT_PRODUCT_TYPE: &str = "USDT-FUTURES";

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub bitget: BitgetSettings,
    pub extraction: ExtractionSettings,
    pub discovery: DiscoverySettings,
    pub storage: StorageSettings,
    /// Credentials found directly in the environment (may be partial).
    pub env_credentials: Credentials,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub public_base_url: String,
    pub download_signing_key: String,
    pub download_ttl_secs: u64,
    pub max_concurrency: usize,
    /// How long finished executions stay in the in-memory status registry
    pub status_retention: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            download_signing_key: String::new(),
            download_ttl_secs: 600,
            max_concurrency: 8,
            status_retention: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BitgetSettings {
    pub base_url: String,
    pub orders_path: String,
    pub timeout: Duration,
    pub default_product_type: String,
}

impl Default for BitgetSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.bitget.com".to_string(),
            orders_path: "/api/v2/mix/order/orders-history".to_string(),
            timeout: Duration::from_secs(20),
            default_product_type: DEFAULT_PRODUCT_TYPE.to_string(),
        }
    }
}

/// Per-symbol extraction limits
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub page_limit: u32,
    pub max_orders: usize,
    pub max_attempts: u32,
    pub min_request_interval: Duration,
    pub spill_threshold_bytes: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            page_limit: 100,
            max_orders: 20_000,
            max_attempts: 5,
            min_request_interval: Duration::from_millis(800),
            spill_threshold_bytes: 250_000,
        }
    }
}

/// Symbol discovery caps
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub page_limit: u32,
    pub max_pages: usize,
    pub max_orders: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            page_limit: 100,
            max_pages: 100,
            max_orders: 2000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub database_url: Option<String>,
    pub blob_root: String,
    /// Blob bucket for per-symbol spills and final artifacts. Unset disables both.
    pub results_bucket: Option<String>,
    pub results_prefix: String,
    pub per_symbol_prefix: String,
    pub secrets_dir: String,
    pub credentials_secret_name: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            blob_root: "./data/blobs".to_string(),
            results_bucket: None,
            results_prefix: "bitget-orders/".to_string(),
            per_symbol_prefix: "per-symbol/".to_string(),
            secrets_dir: "./.secrets".to_string(),
            credentials_secret_name: None,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment. Call `dotenvy::dotenv()` first.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let server = ServerSettings {
            bind_addr: env_or("BIND_ADDR", defaults.server.bind_addr),
            public_base_url: env_or("PUBLIC_BASE_URL", defaults.server.public_base_url),
            download_signing_key: env_opt("DOWNLOAD_SIGNING_KEY")
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            download_ttl_secs: env_parse("DOWNLOAD_TTL_SECS", defaults.server.download_ttl_secs),
            max_concurrency: env_parse("MAX_CONCURRENCY", defaults.server.max_concurrency).max(1),
            status_retention: Duration::from_secs(env_parse(
                "STATUS_RETENTION_SECS",
                defaults.server.status_retention.as_secs(),
            )),
        };

        let bitget = BitgetSettings {
            base_url: env_or("BITGET_BASE_URL", defaults.bitget.base_url),
            orders_path: env_or("BITGET_ORDERS_PATH", defaults.bitget.orders_path),
            timeout: Duration::from_secs(env_parse("BITGET_TIMEOUT_SECS", 20u64)),
            default_product_type: env_or("DEFAULT_PRODUCT_TYPE", defaults.bitget.default_product_type),
        };

        let discovery = DiscoverySettings {
            page_limit: defaults.discovery.page_limit,
            max_pages: env_parse("MAX_DETECT_PAGES", defaults.discovery.max_pages),
            max_orders: env_parse("MAX_SCAN_ORDERS", defaults.discovery.max_orders),
        };

        let storage = StorageSettings {
            database_url: env_opt("DATABASE_URL"),
            blob_root: env_or("BLOB_ROOT", defaults.storage.blob_root),
            results_bucket: env_opt("RESULTS_BUCKET"),
            results_prefix: env_or("RESULTS_PREFIX", defaults.storage.results_prefix),
            per_symbol_prefix: env_or("PER_SYMBOL_PREFIX", defaults.storage.per_symbol_prefix),
            secrets_dir: env_or("SECRETS_DIR", defaults.storage.secrets_dir),
            credentials_secret_name: env_opt("CREDENTIALS_SECRET_NAME"),
        };

        let env_credentials = Credentials {
            api_key: env_opt("BITGET_API_KEY").unwrap_or_default(),
            secret_key: env_opt("BITGET_API_SECRET").unwrap_or_default(),
            passphrase: env_opt("BITGET_API_PASSPHRASE")
                .or_else(|| env_opt("BITGET_PASSPHRASE"))
                .unwrap_or_default(),
        };

        Self {
            server,
            bitget,
            extraction: ExtractionSettings::default(),
            discovery,
            storage,
            env_credentials,
        }
    }

    /// Log configuration problems the way startup validation should: missing pieces
    /// degrade features rather than abort.
    pub fn log_warnings(&self) {
        if self.storage.database_url.is_none() {
            tracing::warn!("DATABASE_URL not set; execution results and orders will not be persisted");
        }
        if self.storage.results_bucket.is_none() {
            tracing::warn!("RESULTS_BUCKET not set; no spills, artifacts or downloads");
        }
        if !self.env_credentials.is_complete() && self.storage.credentials_secret_name.is_none() {
            tracing::warn!("No Bitget credentials in environment and CREDENTIALS_SECRET_NAME not set");
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: String) -> String {
    env_opt(name).unwrap_or(default)
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    match env_opt(name) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparseable {}={}", name, raw);
            default
        }),
        None => default,
    }
}

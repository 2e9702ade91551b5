//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! The in-memory services in [`MessServices`] are authoritative while the
//! process runs. When a database pool is present every mutation is written
//! through to Postgres, and [`AppState::hydrate_from_db`] reloads the
//! services on startup.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

use mess_core::SystemClock;
use mess_crypto::{RandomTokenSource, Sha256CredentialHasher};
use mess_ledger::{MessServices, DEFAULT_SESSION_TTL_SECS};

use crate::middleware::metrics::ApiMetrics;

/// Default interval of the background expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

// -- Configuration -------------------------------------------------------------

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Application configuration, read once from the environment.
///
/// Custom `Debug` redacts the auth token and database URL.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Service bearer token. `None` disables authentication.
    pub auth_token: Option<String>,
    /// Postgres URL. `None` means in-memory only.
    pub database_url: Option<String>,
    pub session_ttl_secs: i64,
    /// `0` disables background sweeping.
    pub sweep_interval_secs: u64,
    /// Allowed CORS origins. Empty means permissive.
    pub cors_allowed_origins: Vec<String>,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// absent or unparseable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            port: non_empty("PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            auth_token: non_empty("AUTH_TOKEN"),
            database_url: non_empty("DATABASE_URL"),
            session_ttl_secs: non_empty("SESSION_TTL_SECS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|secs: &i64| *secs > 0)
                .unwrap_or(defaults.session_ttl_secs),
            sweep_interval_secs: non_empty("SWEEP_INTERVAL_SECS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
            cors_allowed_origins: non_empty("CORS_ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            log_format: match non_empty("LOG_FORMAT").as_deref().map(str::trim) {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            cors_allowed_origins: Vec::new(),
            log_format: LogFormat::Text,
        }
    }
}

// -- Application State ---------------------------------------------------------

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: MessServices,
    /// Postgres pool for write-through. `None` in in-memory mode.
    pub db_pool: Option<PgPool>,
    pub config: AppConfig,
    pub metrics: ApiMetrics,
    /// Prometheus recorder handle, installed once by the binary.
    pub prometheus: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("services", &self.services)
            .field("db_pool", &self.db_pool.is_some())
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .field("prometheus", &self.prometheus.is_some())
            .finish()
    }
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// Production wiring: wall clock, random tokens, the default hasher.
    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        let services = MessServices::with_parts(
            Arc::new(SystemClock),
            Arc::new(Sha256CredentialHasher::new()),
            Arc::new(RandomTokenSource),
            chrono::Duration::seconds(config.session_ttl_secs),
        );
        Self::with_services(services, config, db_pool)
    }

    /// State over explicitly wired services (tests inject a manual clock).
    pub fn with_services(services: MessServices, config: AppConfig, db_pool: Option<PgPool>) -> Self {
        Self {
            services,
            db_pool,
            config,
            metrics: ApiMetrics::new(),
            prometheus: None,
        }
    }

    /// Attach the Prometheus handle used by `/metrics`.
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Hydrate in-memory services from the database.
    ///
    /// Called once on startup when a database pool is available.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };
        let svc = &self.services;

        let principals = crate::db::principals::load_all(pool)
            .await
            .map_err(|e| format!("failed to load principals: {e}"))?;
        let principal_count = principals.len();
        for principal in principals {
            svc.identity.restore(principal);
        }

        let sheets = crate::db::price_sheets::load_all(pool)
            .await
            .map_err(|e| format!("failed to load price sheets: {e}"))?;
        let sheet_count = sheets.len();
        for sheet in sheets {
            svc.pricing.restore(sheet);
        }

        let entries = crate::db::menu::load_all(pool)
            .await
            .map_err(|e| format!("failed to load menu entries: {e}"))?;
        let menu_count = entries.len();
        for entry in entries {
            svc.menu.restore(entry);
        }

        let transactions = crate::db::transactions::load_all(pool)
            .await
            .map_err(|e| format!("failed to load transactions: {e}"))?;
        let transaction_count = transactions.len();
        for tx in transactions {
            svc.ledger.restore(tx);
        }

        let today = svc.clock.today();
        let redemptions = crate::db::redemptions::load_for_day(pool, today)
            .await
            .map_err(|e| format!("failed to load redemptions: {e}"))?;
        let redemption_count = redemptions.len();
        for record in redemptions {
            svc.redemptions.restore(record);
        }

        tracing::info!(
            principals = principal_count,
            price_sheets = sheet_count,
            menu_entries = menu_count,
            transactions = transaction_count,
            redemptions_today = redemption_count,
            "Hydrated in-memory stores from database"
        );

        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

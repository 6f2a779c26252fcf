//! Service configuration.

use serde::Deserialize;
use std::path::Path;
use usage_ledger_core::EmissionPackCatalog;

use crate::stripe::StripeClient;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL connection URL. Selects the PostgreSQL store when set.
    pub database_url: Option<String>,

    /// Path to `RocksDB` data directory (default: "/data/usage-ledger").
    pub data_dir: String,

    /// Service API key required on ledger routes.
    pub service_api_key: Option<String>,

    /// Stripe API key (optional).
    pub stripe_api_key: Option<String>,

    /// Stripe webhook secret (optional).
    pub stripe_webhook_secret: Option<String>,

    /// Stripe API base URL (default: `<https://api.stripe.com/v1>`).
    pub stripe_api_base: String,

    /// Frontend URL for checkout redirects.
    pub frontend_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Emission packs and their Stripe prices.
    pub emission_packs: EmissionPackCatalog,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    ///
    /// Stripe credentials in `.secrets/stripe.json` take precedence over
    /// `STRIPE_API_KEY` and `STRIPE_WEBHOOK_SECRET`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let (stripe_api_key, stripe_webhook_secret) = match find_stripe_secrets() {
            Some(secrets) => (Some(secrets.api_key), secrets.webhook_secret),
            None => (env("STRIPE_API_KEY"), env("STRIPE_WEBHOOK_SECRET")),
        };

        let mut emission_packs = defaults.emission_packs;
        if let Some(prices) = env("EMISSION_PACK_PRICES") {
            apply_pack_prices(&mut emission_packs, &prices);
        }

        Self {
            listen_addr: env("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: env("DATABASE_URL"),
            data_dir: env("DATA_DIR").unwrap_or(defaults.data_dir),
            service_api_key: env("SERVICE_API_KEY"),
            stripe_api_key,
            stripe_webhook_secret,
            stripe_api_base: env("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            frontend_url: env("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            cors_origins: env("CORS_ORIGINS").map_or(defaults.cors_origins, |origins| {
                origins.split(',').map(|o| o.trim().to_string()).collect()
            }),
            max_body_bytes: env_parsed("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parsed("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            emission_packs,
        }
    }
}

/// Non-empty environment variable.
fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env(name)?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(variable = name, value = %raw, "Ignoring unparsable configuration value");
    }
    parsed
}

/// Apply `packId=priceId` pairs separated by commas to the catalog.
fn apply_pack_prices(catalog: &mut EmissionPackCatalog, prices: &str) {
    for pair in prices.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((pack_id, price_id)) if !price_id.trim().is_empty() => {
                if !catalog.set_price(pack_id.trim(), price_id.trim()) {
                    tracing::warn!(pack_id = %pack_id, "Ignoring price for unknown emission pack");
                }
            }
            _ => tracing::warn!(entry = %pair, "Ignoring malformed EMISSION_PACK_PRICES entry"),
        }
    }
}

/// Candidate locations of the Stripe secrets file, relative to the working directory.
const STRIPE_SECRETS_PATHS: [&str; 4] = [
    ".secrets/stripe.json",
    "usage-ledger/.secrets/stripe.json",
    "crates/usage-ledger-service/.secrets/stripe.json",
    "../.secrets/stripe.json",
];

fn find_stripe_secrets() -> Option<StripeSecrets> {
    let found = STRIPE_SECRETS_PATHS.iter().find_map(|path| {
        let secrets = read_stripe_secrets(Path::new(path))?;
        tracing::info!(path = %path, "Loaded Stripe secrets from file");
        Some(secrets)
    });
    if found.is_none() {
        tracing::debug!("No Stripe secrets file, reading Stripe keys from the environment");
    }
    found
}

/// Parse a secrets file. A missing file yields `None`, a malformed one also logs a warning.
fn read_stripe_secrets(path: &Path) -> Option<StripeSecrets> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents)
        .map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed Stripe secrets file");
        })
        .ok()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            data_dir: "/data/usage-ledger".into(),
            service_api_key: None,
            stripe_api_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: StripeClient::DEFAULT_BASE_URL.into(),
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            emission_packs: EmissionPackCatalog::default(),
        }
    }
}

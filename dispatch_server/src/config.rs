use std::{env, fmt::Display, net::IpAddr, str::FromStr};

use chrono::Duration;
use dispatch_common::{
    helpers::{env_or_default, parse_boolean_flag, split_list},
    Secret,
};
use dispatch_engine::EngineConfig;
use dispatch_gateways::{InvoiceRendererConfig, PaystackConfig, WhatsAppConfig};
use log::*;
use rand::{distributions::Alphanumeric, thread_rng, Rng};

const DEFAULT_DSP_HOST: &str = "127.0.0.1";
const DEFAULT_DSP_PORT: u16 = 8470;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/dispatch.db";
const DEFAULT_PAYMENT_WINDOW_MINS: i64 = 30;
const DEFAULT_AUTO_RELEASE_HOURS: i64 = 48;
const DEFAULT_STUCK_ASSIGNMENT_MINS: i64 = 30;
const DEFAULT_RIDER_FEE_PERCENT: u8 = 80;
const DEFAULT_BROADCAST_DELAY_MS: u64 = 250;
const DEFAULT_ALERT_BATCH_SECS: u64 = 60;

/// Where webhook idempotency keys are kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdempotencyBackendKind {
    /// Shared by every instance that uses the same database
    #[default]
    Sqlite,
    /// Only safe when a single instance receives webhooks
    Memory,
}

impl FromStr for IdempotencyBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("'{other}' is not an idempotency backend. Use 'sqlite' or 'memory'")),
        }
    }
}

impl Display for IdempotencyBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => f.write_str("sqlite"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub paystack: PaystackConfig,
    pub whatsapp: WhatsAppConfig,
    pub invoices: InvoiceRendererConfig,
    /// If supplied, calls to the payment webhook are only accepted from these addresses.
    /// To explicitly disable the whitelist, set this to "false", "none", or "0".
    pub paystack_whitelist: Option<Vec<IpAddr>>,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the `for=` field of the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// Shared key for the `/api/admin` routes, sent in the `X-Admin-Key` header.
    pub admin_api_key: Secret<String>,
    /// Phone numbers that receive HIGH and CRITICAL alerts
    pub admin_alert_recipients: Vec<String>,
    /// Alerts are collected for this long and then sent to the recipients as one message.
    pub alert_batch_window: std::time::Duration,
    pub payment_window: Duration,
    pub auto_release_after: Duration,
    pub stuck_assignment_after: Duration,
    pub rider_fee_percent: u8,
    pub broadcast_delay: std::time::Duration,
    /// Whether this instance runs the reconciliation sweeps. Leases keep concurrent instances from doubling up.
    pub sweeps_enabled: bool,
    pub idempotency_backend: IdempotencyBackendKind,
    /// Identifies this instance when it takes sweep leases
    pub instance_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DSP_HOST.to_string(),
            port: DEFAULT_DSP_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            paystack: PaystackConfig::default(),
            whatsapp: WhatsAppConfig::default(),
            invoices: InvoiceRendererConfig::default(),
            paystack_whitelist: None,
            use_x_forwarded_for: false,
            use_forwarded: false,
            admin_api_key: Secret::default(),
            admin_alert_recipients: Vec::new(),
            alert_batch_window: std::time::Duration::from_secs(DEFAULT_ALERT_BATCH_SECS),
            payment_window: Duration::minutes(DEFAULT_PAYMENT_WINDOW_MINS),
            auto_release_after: Duration::hours(DEFAULT_AUTO_RELEASE_HOURS),
            stuck_assignment_after: Duration::minutes(DEFAULT_STUCK_ASSIGNMENT_MINS),
            rider_fee_percent: DEFAULT_RIDER_FEE_PERCENT,
            broadcast_delay: std::time::Duration::from_millis(DEFAULT_BROADCAST_DELAY_MS),
            sweeps_enabled: true,
            idempotency_backend: IdempotencyBackendKind::default(),
            instance_id: random_instance_id(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("DSP_HOST").ok().unwrap_or_else(|| DEFAULT_DSP_HOST.into());
        let port = env_or_default("DSP_PORT", DEFAULT_DSP_PORT);
        let database_url = env::var("DSP_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ DSP_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let paystack = PaystackConfig::new_from_env_or_default();
        let whatsapp = WhatsAppConfig::new_from_env_or_default();
        let invoices = InvoiceRendererConfig::new_from_env_or_default();
        let paystack_whitelist = configure_whitelist(env::var("DSP_PAYSTACK_IP_WHITELIST").ok());
        let use_x_forwarded_for = parse_boolean_flag(env::var("DSP_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("DSP_USE_FORWARDED").ok(), false);
        let admin_api_key = configure_admin_key(env::var("DSP_ADMIN_API_KEY").ok());
        let admin_alert_recipients =
            env::var("DSP_ADMIN_ALERT_RECIPIENTS").map(|s| split_list(&s)).unwrap_or_default();
        if admin_alert_recipients.is_empty() {
            info!("🪛️ DSP_ADMIN_ALERT_RECIPIENTS is empty. Alerts will only appear on the live feed.");
        }
        let alert_batch_window =
            std::time::Duration::from_secs(env_or_default("DSP_ALERT_BATCH_SECS", DEFAULT_ALERT_BATCH_SECS));
        let payment_window = Duration::minutes(env_or_default("DSP_PAYMENT_WINDOW_MINS", DEFAULT_PAYMENT_WINDOW_MINS));
        let auto_release_after = Duration::hours(env_or_default("DSP_AUTO_RELEASE_HOURS", DEFAULT_AUTO_RELEASE_HOURS));
        let stuck_assignment_after =
            Duration::minutes(env_or_default("DSP_STUCK_ASSIGNMENT_MINS", DEFAULT_STUCK_ASSIGNMENT_MINS));
        let rider_fee_percent = match env_or_default("DSP_RIDER_FEE_PERCENT", DEFAULT_RIDER_FEE_PERCENT) {
            p if p > 100 => {
                error!("🪛️ DSP_RIDER_FEE_PERCENT cannot be more than 100. Using {DEFAULT_RIDER_FEE_PERCENT}.");
                DEFAULT_RIDER_FEE_PERCENT
            },
            p => p,
        };
        let broadcast_delay =
            std::time::Duration::from_millis(env_or_default("DSP_BROADCAST_DELAY_MS", DEFAULT_BROADCAST_DELAY_MS));
        let sweeps_enabled = parse_boolean_flag(env::var("DSP_SWEEPS_ENABLED").ok(), true);
        if !sweeps_enabled {
            warn!("🪛️ Reconciliation sweeps are disabled on this instance. Make sure another instance runs them.");
        }
        let idempotency_backend = env_or_default("DSP_IDEMPOTENCY_BACKEND", IdempotencyBackendKind::Sqlite);
        let instance_id = env::var("DSP_INSTANCE_ID").ok().unwrap_or_else(random_instance_id);
        Self {
            host,
            port,
            database_url,
            paystack,
            whatsapp,
            invoices,
            paystack_whitelist,
            use_x_forwarded_for,
            use_forwarded,
            admin_api_key,
            admin_alert_recipients,
            alert_batch_window,
            payment_window,
            auto_release_after,
            stuck_assignment_after,
            rider_fee_percent,
            broadcast_delay,
            sweeps_enabled,
            idempotency_backend,
            instance_id,
        }
    }

    /// The engine knobs, with everything that is not configurable left at its default.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            payment_window: self.payment_window,
            auto_release_after: self.auto_release_after,
            stuck_assignment_after: self.stuck_assignment_after,
            rider_fee_percent: self.rider_fee_percent,
            broadcast_delay: self.broadcast_delay,
            ..EngineConfig::default()
        }
    }
}

fn configure_whitelist(value: Option<String>) -> Option<Vec<IpAddr>> {
    let whitelist = value.and_then(|s| {
        if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) {
            info!(
                "🪛️ Paystack IP whitelist is disabled. If this is not what you want, set DSP_PAYSTACK_IP_WHITELIST to \
                 a comma-separated list of IP addresses to enable it."
            );
            return None;
        }
        let ip_addrs = split_list(&s)
            .into_iter()
            .filter_map(|s| {
                s.parse::<IpAddr>()
                    .map_err(|e| warn!("🪛️ Ignoring invalid IP address ({s}) in DSP_PAYSTACK_IP_WHITELIST: {e}"))
                    .ok()
            })
            .collect::<Vec<IpAddr>>();
        Some(ip_addrs)
    });
    match &whitelist {
        Some(whitelist) if whitelist.is_empty() => {
            warn!(
                "🚨️ The Paystack IP whitelist was configured, but is empty. The server will run, but won't accept any \
                 payment webhooks."
            );
        },
        None => {
            info!("🪛️ No Paystack IP whitelist is set. Only signature validation will be used.");
        },
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ Paystack IP whitelist: {addrs}");
        },
    }
    whitelist
}

fn configure_admin_key(value: Option<String>) -> Secret<String> {
    match value.filter(|s| !s.trim().is_empty()) {
        Some(key) => Secret::new(key.trim().to_string()),
        None => {
            let key = thread_rng().sample_iter(&Alphanumeric).take(40).map(char::from).collect::<String>();
            warn!(
                "🚨️🚨️🚨️ DSP_ADMIN_API_KEY has not been set. I'm using a random value for this session, so the admin \
                 routes are effectively locked. Set DSP_ADMIN_API_KEY to use them. 🚨️🚨️🚨️"
            );
            Secret::new(key)
        },
    }
}

fn random_instance_id() -> String {
    format!("dsp-{:08x}", rand::random::<u32>())
}

use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub reminder: ReminderConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    pub vnpay: VnpayConfig,
    pub momo: MomoConfig,
    pub paypal: PaypalConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
    pub frontend_url: String,
    /// Public base URL of this API, used to build provider callback URLs
    pub api_url: String,
}

fn default_environment() -> String {
    "development".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Rate limiting is disabled when no URL is set.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Offset of the business' local clock; default slots are laid out in it
    pub slot_utc_offset_hours: i32,
    pub cancellation_window_hours: i64,
    pub default_slot_days: u32,
    pub default_slot_hours: Vec<u32>,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            slot_utc_offset_hours: 7,
            cancellation_window_hours: 2,
            default_slot_days: 30,
            default_slot_hours: vec![9, 14, 19],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReminderConfig {
    pub interval_seconds: u64,
    pub enabled: bool,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self { interval_seconds: 3600, enabled: true }
    }
}

/// Without a host, notifications are only logged.
#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    pub host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_smtp_from")]
    pub from: String,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_seconds: u64,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_from() -> String {
    "EasyBook <noreply@easybook.local>".to_string()
}

fn default_smtp_timeout() -> u64 {
    5
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: default_smtp_from(),
            timeout_seconds: default_smtp_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VnpayConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    /// Payment page the customer is redirected to
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MomoConfig {
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
    /// `create` endpoint the payload is POSTed to
    pub endpoint: String,
    /// Where Momo sends the IPN; filled from `server.api_url` when empty
    #[serde(default)]
    pub ipn_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaypalConfig {
    pub business: String,
    pub client_secret: String,
    pub url: String,
    #[serde(default = "default_paypal_currency")]
    pub currency: String,
}

fn default_paypal_currency() -> String {
    "VND".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SeedConfig {
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // EASYBOOK__AUTH__JWT_SECRET=... sets auth.jwt_secret
            .add_source(config::Environment::with_prefix("EASYBOOK").separator("__"))
            .build()?;

        let mut config: Config = s.try_deserialize()?;
        if config.momo.ipn_url.is_empty() {
            config.momo.ipn_url = format!(
                "{}/api/payment/callback/momo",
                config.server.api_url.trim_end_matches('/')
            );
        }
        Ok(config)
    }
}

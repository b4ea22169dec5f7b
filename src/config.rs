use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub notification_webhook_url: Option<String>,
    pub notification_webhook_secret: Option<String>,
    pub reschedule_policy: ReschedulePolicy,
    pub calendar: Option<CalendarConfig>,
}

/// Whether an `ACCEPTED` interview may be rescheduled. The detail view always
/// reports `reschedule_allowed = status != ACCEPTED`; this decides whether the
/// reschedule operation itself enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReschedulePolicy {
    #[default]
    AllowAccepted,
    DenyAccepted,
}

impl std::str::FromStr for ReschedulePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::AllowAccepted),
            "deny" => Ok(Self::DenyAccepted),
            other => Err(format!("expected 'allow' or 'deny', got '{}'", other)),
        }
    }
}

#[derive(Clone)]
pub struct CalendarConfig {
    pub client_id: String,
    pub client_secret: String,
    pub tenant: String,
    pub redirect_uri: String,
    pub notification_url: String,
    pub client_state: Option<String>,
    pub token_key: [u8; 32],
    pub graph_base_url: String,
    pub login_base_url: String,
    pub http_timeout_secs: u64,
    pub http_max_attempts: usize,
    pub subscription_renew_cron: String,
}

impl std::fmt::Debug for CalendarConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("tenant", &self.tenant)
            .field("redirect_uri", &self.redirect_uri)
            .field("notification_url", &self.notification_url)
            .field("token_key", &"[REDACTED]")
            .field("graph_base_url", &self.graph_base_url)
            .finish()
    }
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let reschedule_policy = match env::var("RESCHEDULE_ACCEPTED_POLICY") {
            Ok(_) => get_env_parse("RESCHEDULE_ACCEPTED_POLICY")?,
            Err(_) => ReschedulePolicy::default(),
        };

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            notification_webhook_url: get_optional_env("NOTIFICATION_WEBHOOK_URL"),
            notification_webhook_secret: get_optional_env("NOTIFICATION_WEBHOOK_SECRET"),
            reschedule_policy,
            calendar: CalendarConfig::from_env()?,
        })
    }
}

impl CalendarConfig {
    /// Calendar sync is enabled only when a client id is configured; once it
    /// is, every other credential (including the token key) is mandatory.
    pub fn from_env() -> Result<Option<Self>> {
        let Some(client_id) = get_optional_env("CALENDAR_CLIENT_ID") else {
            return Ok(None);
        };

        Ok(Some(Self {
            client_id,
            client_secret: get_env("CALENDAR_CLIENT_SECRET")?,
            tenant: get_optional_env("CALENDAR_TENANT").unwrap_or_else(|| "common".to_string()),
            redirect_uri: get_env("CALENDAR_REDIRECT_URI")?,
            notification_url: get_env("CALENDAR_NOTIFICATION_URL")?,
            client_state: get_optional_env("CALENDAR_CLIENT_STATE"),
            token_key: parse_token_key(&get_env("CALENDAR_TOKEN_KEY")?)?,
            graph_base_url: get_optional_env("CALENDAR_GRAPH_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
            login_base_url: get_optional_env("CALENDAR_LOGIN_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LOGIN_BASE_URL.to_string()),
            http_timeout_secs: get_env_parse_or("CALENDAR_HTTP_TIMEOUT_SECS", 15)?,
            http_max_attempts: get_env_parse_or("CALENDAR_HTTP_MAX_ATTEMPTS", 3)?,
            subscription_renew_cron: get_optional_env("CALENDAR_SUBSCRIPTION_RENEW_CRON")
                .unwrap_or_else(|| "0 */30 * * * *".to_string()),
        }))
    }
}

pub fn parse_token_key(raw: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(raw.trim())
        .map_err(|e| Error::Config(format!("CALENDAR_TOKEN_KEY is not valid hex: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| Error::Config("CALENDAR_TOKEN_KEY must decode to exactly 32 bytes".to_string()))
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_parse<T>(name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(name)?;
    raw.parse()
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional_env(name) {
        Some(_) => get_env_parse(name),
        None => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}

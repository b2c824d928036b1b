use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub crm: CrmConfig,
    pub voice: VoiceConfig,
    pub sms: SmsConfig,
    pub engagement: EngagementConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub location_id: String,
    pub webhook_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct VoiceConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub assistant_id: String,
    pub phone_number_id: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SmsConfig {
    pub base_url: String,
    pub account_sid: String,
    pub auth_token: SecretString,
    pub from_number: String,
    pub business_name: String,
    pub callback_number: String,
}

#[derive(Clone, Debug)]
pub struct EngagementConfig {
    /// Quiet period after call placement before the first status poll.
    pub grace_period_secs: u64,
    pub poll_interval_secs: u64,
    pub poll_backoff_multiplier: u32,
    /// Hard deadline for an outcome, measured from call placement.
    pub max_outcome_wait_secs: u64,
    pub campaign_window_hours: u32,
    pub dedup_retention_hours: u32,
    pub write_max_retries: u32,
    pub write_retry_base_delay_secs: u64,
    pub service_area_zip_codes: Vec<String>,
    pub service_area_cities: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub crm_api_key: Option<String>,
    pub crm_location_id: Option<String>,
    pub crm_webhook_secret: Option<String>,
    pub voice_api_key: Option<String>,
    pub voice_assistant_id: Option<String>,
    pub sms_account_sid: Option<String>,
    pub sms_auth_token: Option<String>,
    pub sms_from_number: Option<String>,
    pub sms_business_name: Option<String>,
    pub sms_callback_number: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://leadline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8090,
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            crm: CrmConfig {
                base_url: "https://services.leadconnectorhq.com".to_string(),
                api_key: String::new().into(),
                location_id: String::new(),
                webhook_secret: None,
            },
            voice: VoiceConfig {
                base_url: "https://api.vapi.ai".to_string(),
                api_key: String::new().into(),
                assistant_id: String::new(),
                phone_number_id: None,
                timeout_secs: 30,
            },
            sms: SmsConfig {
                base_url: "https://api.twilio.com".to_string(),
                account_sid: String::new(),
                auth_token: String::new().into(),
                from_number: String::new(),
                business_name: String::new(),
                callback_number: String::new(),
            },
            engagement: EngagementConfig {
                grace_period_secs: 30,
                poll_interval_secs: 10,
                poll_backoff_multiplier: 2,
                max_outcome_wait_secs: 120,
                campaign_window_hours: 24,
                dedup_retention_hours: 72,
                write_max_retries: 3,
                write_retry_base_delay_secs: 30,
                service_area_zip_codes: Vec::new(),
                service_area_cities: Vec::new(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leadline.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = base_url;
            }
            if let Some(api_key) = crm.api_key {
                self.crm.api_key = secret_value(api_key);
            }
            if let Some(location_id) = crm.location_id {
                self.crm.location_id = location_id;
            }
            if let Some(webhook_secret) = crm.webhook_secret {
                self.crm.webhook_secret = Some(secret_value(webhook_secret));
            }
        }

        if let Some(voice) = patch.voice {
            if let Some(base_url) = voice.base_url {
                self.voice.base_url = base_url;
            }
            if let Some(api_key) = voice.api_key {
                self.voice.api_key = secret_value(api_key);
            }
            if let Some(assistant_id) = voice.assistant_id {
                self.voice.assistant_id = assistant_id;
            }
            if let Some(phone_number_id) = voice.phone_number_id {
                self.voice.phone_number_id = Some(phone_number_id);
            }
            if let Some(timeout_secs) = voice.timeout_secs {
                self.voice.timeout_secs = timeout_secs;
            }
        }

        if let Some(sms) = patch.sms {
            if let Some(base_url) = sms.base_url {
                self.sms.base_url = base_url;
            }
            if let Some(account_sid) = sms.account_sid {
                self.sms.account_sid = account_sid;
            }
            if let Some(auth_token) = sms.auth_token {
                self.sms.auth_token = secret_value(auth_token);
            }
            if let Some(from_number) = sms.from_number {
                self.sms.from_number = from_number;
            }
            if let Some(business_name) = sms.business_name {
                self.sms.business_name = business_name;
            }
            if let Some(callback_number) = sms.callback_number {
                self.sms.callback_number = callback_number;
            }
        }

        if let Some(engagement) = patch.engagement {
            if let Some(grace_period_secs) = engagement.grace_period_secs {
                self.engagement.grace_period_secs = grace_period_secs;
            }
            if let Some(poll_interval_secs) = engagement.poll_interval_secs {
                self.engagement.poll_interval_secs = poll_interval_secs;
            }
            if let Some(poll_backoff_multiplier) = engagement.poll_backoff_multiplier {
                self.engagement.poll_backoff_multiplier = poll_backoff_multiplier;
            }
            if let Some(max_outcome_wait_secs) = engagement.max_outcome_wait_secs {
                self.engagement.max_outcome_wait_secs = max_outcome_wait_secs;
            }
            if let Some(campaign_window_hours) = engagement.campaign_window_hours {
                self.engagement.campaign_window_hours = campaign_window_hours;
            }
            if let Some(dedup_retention_hours) = engagement.dedup_retention_hours {
                self.engagement.dedup_retention_hours = dedup_retention_hours;
            }
            if let Some(write_max_retries) = engagement.write_max_retries {
                self.engagement.write_max_retries = write_max_retries;
            }
            if let Some(write_retry_base_delay_secs) = engagement.write_retry_base_delay_secs {
                self.engagement.write_retry_base_delay_secs = write_retry_base_delay_secs;
            }
            if let Some(service_area_zip_codes) = engagement.service_area_zip_codes {
                self.engagement.service_area_zip_codes = service_area_zip_codes;
            }
            if let Some(service_area_cities) = engagement.service_area_cities {
                self.engagement.service_area_cities = service_area_cities;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEADLINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LEADLINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("LEADLINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LEADLINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LEADLINE_SERVER_PORT") {
            self.server.port = parse_u16("LEADLINE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("LEADLINE_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("LEADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_CRM_BASE_URL") {
            self.crm.base_url = value;
        }
        if let Some(value) = read_env("LEADLINE_CRM_API_KEY") {
            self.crm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("LEADLINE_CRM_LOCATION_ID") {
            self.crm.location_id = value;
        }
        if let Some(value) = read_env("LEADLINE_CRM_WEBHOOK_SECRET") {
            self.crm.webhook_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("LEADLINE_VOICE_BASE_URL") {
            self.voice.base_url = value;
        }
        if let Some(value) = read_env("LEADLINE_VOICE_API_KEY") {
            self.voice.api_key = secret_value(value);
        }
        if let Some(value) = read_env("LEADLINE_VOICE_ASSISTANT_ID") {
            self.voice.assistant_id = value;
        }
        if let Some(value) = read_env("LEADLINE_VOICE_PHONE_NUMBER_ID") {
            self.voice.phone_number_id = Some(value);
        }
        if let Some(value) = read_env("LEADLINE_VOICE_TIMEOUT_SECS") {
            self.voice.timeout_secs = parse_u64("LEADLINE_VOICE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_SMS_BASE_URL") {
            self.sms.base_url = value;
        }
        if let Some(value) = read_env("LEADLINE_SMS_ACCOUNT_SID") {
            self.sms.account_sid = value;
        }
        if let Some(value) = read_env("LEADLINE_SMS_AUTH_TOKEN") {
            self.sms.auth_token = secret_value(value);
        }
        if let Some(value) = read_env("LEADLINE_SMS_FROM_NUMBER") {
            self.sms.from_number = value;
        }
        if let Some(value) = read_env("LEADLINE_SMS_BUSINESS_NAME") {
            self.sms.business_name = value;
        }
        if let Some(value) = read_env("LEADLINE_SMS_CALLBACK_NUMBER") {
            self.sms.callback_number = value;
        }

        if let Some(value) = read_env("LEADLINE_ENGAGEMENT_GRACE_PERIOD_SECS") {
            self.engagement.grace_period_secs =
                parse_u64("LEADLINE_ENGAGEMENT_GRACE_PERIOD_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_ENGAGEMENT_POLL_INTERVAL_SECS") {
            self.engagement.poll_interval_secs =
                parse_u64("LEADLINE_ENGAGEMENT_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_ENGAGEMENT_MAX_OUTCOME_WAIT_SECS") {
            self.engagement.max_outcome_wait_secs =
                parse_u64("LEADLINE_ENGAGEMENT_MAX_OUTCOME_WAIT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_ENGAGEMENT_CAMPAIGN_WINDOW_HOURS") {
            self.engagement.campaign_window_hours =
                parse_u32("LEADLINE_ENGAGEMENT_CAMPAIGN_WINDOW_HOURS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_ENGAGEMENT_DEDUP_RETENTION_HOURS") {
            self.engagement.dedup_retention_hours =
                parse_u32("LEADLINE_ENGAGEMENT_DEDUP_RETENTION_HOURS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_ENGAGEMENT_SERVICE_AREA_ZIP_CODES") {
            self.engagement.service_area_zip_codes = parse_list(&value);
        }
        if let Some(value) = read_env("LEADLINE_ENGAGEMENT_SERVICE_AREA_CITIES") {
            self.engagement.service_area_cities = parse_list(&value);
        }

        let log_level =
            read_env("LEADLINE_LOGGING_LEVEL").or_else(|| read_env("LEADLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEADLINE_LOGGING_FORMAT").or_else(|| read_env("LEADLINE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(crm_api_key) = overrides.crm_api_key {
            self.crm.api_key = secret_value(crm_api_key);
        }
        if let Some(crm_location_id) = overrides.crm_location_id {
            self.crm.location_id = crm_location_id;
        }
        if let Some(crm_webhook_secret) = overrides.crm_webhook_secret {
            self.crm.webhook_secret = Some(secret_value(crm_webhook_secret));
        }
        if let Some(voice_api_key) = overrides.voice_api_key {
            self.voice.api_key = secret_value(voice_api_key);
        }
        if let Some(voice_assistant_id) = overrides.voice_assistant_id {
            self.voice.assistant_id = voice_assistant_id;
        }
        if let Some(sms_account_sid) = overrides.sms_account_sid {
            self.sms.account_sid = sms_account_sid;
        }
        if let Some(sms_auth_token) = overrides.sms_auth_token {
            self.sms.auth_token = secret_value(sms_auth_token);
        }
        if let Some(sms_from_number) = overrides.sms_from_number {
            self.sms.from_number = sms_from_number;
        }
        if let Some(sms_business_name) = overrides.sms_business_name {
            self.sms.business_name = sms_business_name;
        }
        if let Some(sms_callback_number) = overrides.sms_callback_number {
            self.sms.callback_number = sms_callback_number;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_crm(&self.crm)?;
        validate_voice(&self.voice)?;
        validate_sms(&self.sms)?;
        validate_engagement(&self.engagement)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leadline.toml"), PathBuf::from("config/leadline.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if crm.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.api_key is required. Create a private integration token in the CRM settings"
                .to_string(),
        ));
    }

    if crm.location_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.location_id is required so foreign-location webhooks can be dropped".to_string(),
        ));
    }

    if !crm.base_url.starts_with("http://") && !crm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "crm.base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_voice(voice: &VoiceConfig) -> Result<(), ConfigError> {
    if voice.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation("voice.api_key is required".to_string()));
    }

    if voice.assistant_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "voice.assistant_id is required to place outbound calls".to_string(),
        ));
    }

    if voice.timeout_secs == 0 || voice.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "voice.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_sms(sms: &SmsConfig) -> Result<(), ConfigError> {
    if sms.account_sid.trim().is_empty() {
        return Err(ConfigError::Validation("sms.account_sid is required".to_string()));
    }

    if sms.auth_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation("sms.auth_token is required".to_string()));
    }

    if !sms.from_number.starts_with('+') {
        return Err(ConfigError::Validation(
            "sms.from_number must be an E.164 number starting with `+`".to_string(),
        ));
    }

    if sms.business_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "sms.business_name is required for the fallback message body".to_string(),
        ));
    }

    if !sms.callback_number.starts_with('+') {
        return Err(ConfigError::Validation(
            "sms.callback_number must be an E.164 number starting with `+`".to_string(),
        ));
    }

    Ok(())
}

fn validate_engagement(engagement: &EngagementConfig) -> Result<(), ConfigError> {
    if engagement.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "engagement.poll_interval_secs must be greater than zero".to_string(),
        ));
    }

    if engagement.poll_backoff_multiplier == 0 {
        return Err(ConfigError::Validation(
            "engagement.poll_backoff_multiplier must be greater than zero".to_string(),
        ));
    }

    if engagement.max_outcome_wait_secs <= engagement.grace_period_secs {
        return Err(ConfigError::Validation(
            "engagement.max_outcome_wait_secs must exceed grace_period_secs".to_string(),
        ));
    }

    if engagement.campaign_window_hours == 0 {
        return Err(ConfigError::Validation(
            "engagement.campaign_window_hours must be greater than zero".to_string(),
        ));
    }

    if engagement.dedup_retention_hours == 0 {
        return Err(ConfigError::Validation(
            "engagement.dedup_retention_hours must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    crm: Option<CrmPatch>,
    voice: Option<VoicePatch>,
    sms: Option<SmsPatch>,
    engagement: Option<EngagementPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    location_id: Option<String>,
    webhook_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VoicePatch {
    base_url: Option<String>,
    api_key: Option<String>,
    assistant_id: Option<String>,
    phone_number_id: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SmsPatch {
    base_url: Option<String>,
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
    business_name: Option<String>,
    callback_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EngagementPatch {
    grace_period_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    poll_backoff_multiplier: Option<u32>,
    max_outcome_wait_secs: Option<u64>,
    campaign_window_hours: Option<u32>,
    dedup_retention_hours: Option<u32>,
    write_max_retries: Option<u32>,
    write_retry_base_delay_secs: Option<u64>,
    service_area_zip_codes: Option<Vec<String>>,
    service_area_cities: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

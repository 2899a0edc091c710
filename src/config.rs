use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::ranking::MatchRule;

const DEFAULT_SERP_API_BASE: &str = "https://api.dataforseo.com";
const DEFAULT_AUDIT_LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_CHECKPOINT_EVERY: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Desktop,
    Mobile,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Desktop => "desktop",
            Device::Mobile => "mobile",
        }
    }

    pub fn default_os(&self) -> &'static str {
        match self {
            Device::Desktop => "windows",
            Device::Mobile => "android",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(Device::Desktop),
            "mobile" => Ok(Device::Mobile),
            _ => Err(AppError::Config(format!("invalid device: {value}"))),
        }
    }
}

/// Static parts of every task-creation payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestProfile {
    pub device: Device,
    pub os: String,
    pub language_code: String,
}

impl RequestProfile {
    pub fn desktop() -> Self {
        Self {
            device: Device::Desktop,
            os: Device::Desktop.default_os().to_string(),
            language_code: "en".to_string(),
        }
    }

    pub fn mobile() -> Self {
        Self {
            device: Device::Mobile,
            os: Device::Mobile.default_os().to_string(),
            language_code: "en".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

/// Everything that used to differ between deployment variants, as data.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub request: RequestProfile,
    pub match_rule: Option<MatchRule>,
    pub poll: PollPolicy,
    pub checkpoint_every: usize,
    pub settle: Duration,
    pub submit_rate_limit_qps: u32,
}

impl PipelineSettings {
    pub fn require_match_rule(&self) -> AppResult<&MatchRule> {
        self.match_rule.as_ref().ok_or_else(|| {
            AppError::Config(
                "RANK_MATCH_TARGET must be set when RANK_MATCH_MODE is domain or exact".into(),
            )
        })
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub serp_api_base: String,
    pub serp_api_login: Option<String>,
    pub serp_api_password: Option<SecretString>,
    pub device: Device,
    pub os: String,
    pub language_code: String,
    pub rank_match_mode: String,
    pub rank_match_target: Option<String>,
    pub poll_interval_secs: u64,
    pub poll_max_attempts: u32,
    pub checkpoint_every: usize,
    pub governor_settle_secs: u64,
    pub submit_rate_limit_qps: u32,
    pub http_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub input_dir: PathBuf,
    pub audit_log_max_bytes: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub serp_api_base: String,
    pub serp_api_login: Option<String>,
    pub has_serp_password: bool,
    pub device: Device,
    pub os: String,
    pub language_code: String,
    pub rank_match_mode: String,
    pub rank_match_target: Option<String>,
    pub poll_interval_secs: u64,
    pub poll_max_attempts: u32,
    pub checkpoint_every: usize,
    pub governor_settle_secs: u64,
    pub submit_rate_limit_qps: u32,
    pub data_dir: String,
    pub input_dir: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let device = env::var("SERP_DEVICE")
            .ok()
            .and_then(|v| Device::parse(&v).ok())
            .unwrap_or(Device::Desktop);
        Self {
            serp_api_base: env::var("SERP_API_BASE")
                .unwrap_or_else(|_| DEFAULT_SERP_API_BASE.to_string()),
            serp_api_login: non_empty_var("SERP_API_LOGIN"),
            serp_api_password: non_empty_var("SERP_API_PASSWORD").map(SecretString::from),
            device,
            os: non_empty_var("SERP_OS").unwrap_or_else(|| device.default_os().to_string()),
            language_code: non_empty_var("SERP_LANGUAGE_CODE").unwrap_or_else(|| "en".into()),
            rank_match_mode: non_empty_var("RANK_MATCH_MODE").unwrap_or_else(|| "domain".into()),
            rank_match_target: non_empty_var("RANK_MATCH_TARGET"),
            poll_interval_secs: parse_u64("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS),
            poll_max_attempts: parse_u32("POLL_MAX_ATTEMPTS", DEFAULT_POLL_MAX_ATTEMPTS).max(1),
            checkpoint_every: parse_usize("CHECKPOINT_EVERY", DEFAULT_CHECKPOINT_EVERY).max(1),
            governor_settle_secs: parse_u64("GOVERNOR_SETTLE_SECS", 300),
            submit_rate_limit_qps: parse_u32("SUBMIT_RATE_LIMIT_QPS", 5).max(1),
            http_timeout_secs: parse_u64("HTTP_TIMEOUT_SECS", 30).max(1),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            input_dir: env::var("INPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("input")),
            audit_log_max_bytes: parse_u64("AUDIT_LOG_MAX_BYTES", DEFAULT_AUDIT_LOG_MAX_BYTES),
        }
    }

    pub fn pipeline_settings(&self) -> AppResult<PipelineSettings> {
        let match_rule = match self.rank_match_target.as_deref() {
            Some(target) => Some(MatchRule::from_parts(&self.rank_match_mode, target)?),
            None => MatchRule::from_parts(&self.rank_match_mode, "").ok(),
        };
        Ok(PipelineSettings {
            request: RequestProfile {
                device: self.device,
                os: self.os.clone(),
                language_code: self.language_code.clone(),
            },
            match_rule,
            poll: PollPolicy {
                interval: Duration::from_secs(self.poll_interval_secs),
                max_attempts: self.poll_max_attempts,
            },
            checkpoint_every: self.checkpoint_every,
            settle: Duration::from_secs(self.governor_settle_secs),
            submit_rate_limit_qps: self.submit_rate_limit_qps,
        })
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            serp_api_base: self.serp_api_base.clone(),
            serp_api_login: self.serp_api_login.clone(),
            has_serp_password: self.serp_api_password.is_some(),
            device: self.device,
            os: self.os.clone(),
            language_code: self.language_code.clone(),
            rank_match_mode: self.rank_match_mode.clone(),
            rank_match_target: self.rank_match_target.clone(),
            poll_interval_secs: self.poll_interval_secs,
            poll_max_attempts: self.poll_max_attempts,
            checkpoint_every: self.checkpoint_every,
            governor_settle_secs: self.governor_settle_secs,
            submit_rate_limit_qps: self.submit_rate_limit_qps,
            data_dir: self.data_dir.to_string_lossy().to_string(),
            input_dir: self.input_dir.to_string_lossy().to_string(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

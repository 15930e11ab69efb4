/// Configuration module for managing environment variables and API keys
///
/// This module loads and validates all configuration values from environment
/// variables (typically from a .env file).

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::scheduler::ScheduleSlot;

/// Reply in the morning, afternoon and evening, each followed by a post
pub const DEFAULT_SCHEDULE: &str =
    "11:00=reply,11:20=post,14:00=reply,14:20=post,16:40=reply,16:50=post";

#[derive(Debug, Clone)]
pub struct Config {
    /// App-only bearer token, used for recent search
    pub twitter_bearer_token: String,

    /// OAuth 2.0 user access token, used to reply and post as the account
    pub twitter_user_access_token: String,

    /// Handle used in post URLs; looked up at startup when unset
    pub account_handle: Option<String>,

    pub gemini_api_key: String,

    /// Gemini model to use (e.g., "gemini-2.5-flash")
    pub gemini_model: String,

    pub gemini_temperature: f32,

    /// Where the action log is persisted
    pub action_log_path: String,

    /// Port for the control HTTP server
    pub http_port: u16,

    /// Bearer secret required by mutating control endpoints (optional)
    pub control_api_secret: Option<String>,

    /// Scheduled tasks to complete before the scheduler stops itself
    pub task_quota: u32,

    pub max_replies_per_pass: usize,
    pub max_posts_per_pass: usize,
    pub search_max_results: u32,

    /// Attempts per platform call before a pass gives up
    pub max_attempts: u32,

    pub retry_delay: Duration,
    pub reply_delay: Duration,
    pub post_delay: Duration,
    pub poll_interval: Duration,
    pub rate_limit_max_wait: Duration,

    /// Slots installed when a schedule request does not name its own
    pub default_schedule: Vec<ScheduleSlot>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if any required environment variable is missing or an
    /// optional one cannot be parsed
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let schedule_slots = env::var("SCHEDULE_SLOTS").unwrap_or_else(|_| DEFAULT_SCHEDULE.to_string());

        Ok(Config {
            twitter_bearer_token: env::var("TWITTER_BEARER_TOKEN")
                .context("TWITTER_BEARER_TOKEN must be set")?,

            twitter_user_access_token: env::var("TWITTER_USER_ACCESS_TOKEN")
                .context("TWITTER_USER_ACCESS_TOKEN must be set")?,

            account_handle: non_empty_var("TWITTER_ACCOUNT_HANDLE")
                .map(|h| h.trim_start_matches('@').to_string()),

            gemini_api_key: env::var("GEMINI_API_KEY").context("GEMINI_API_KEY must be set")?,

            gemini_model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string()),

            gemini_temperature: parsed_var("GEMINI_TEMPERATURE", 0.9)?,

            action_log_path: env::var("ACTION_LOG_PATH")
                .unwrap_or_else(|_| "action_log.json".to_string()),

            // HTTP_PORT wins, then PORT (Railway/Fly.io), then 8000
            http_port: match non_empty_var("HTTP_PORT") {
                Some(_) => parsed_var("HTTP_PORT", 8000)?,
                None => parsed_var("PORT", 8000)?,
            },

            control_api_secret: non_empty_var("CONTROL_API_SECRET"),

            task_quota: parsed_var("TASK_QUOTA", 6)?,
            max_replies_per_pass: parsed_var("MAX_REPLIES_PER_PASS", 3)?,
            max_posts_per_pass: parsed_var("MAX_POSTS_PER_PASS", 1)?,
            search_max_results: parsed_var("SEARCH_MAX_RESULTS", 10)?,
            max_attempts: parsed_var("MAX_ATTEMPTS", 3)?,

            retry_delay: Duration::from_secs(parsed_var("RETRY_DELAY_SECS", 10)?),
            reply_delay: Duration::from_secs(parsed_var("REPLY_DELAY_SECS", 30)?),
            post_delay: Duration::from_secs(parsed_var("POST_DELAY_SECS", 300)?),
            poll_interval: Duration::from_secs(parsed_var("POLL_INTERVAL_SECS", 60)?),
            rate_limit_max_wait: Duration::from_secs(parsed_var("RATE_LIMIT_MAX_WAIT_SECS", 960)?),

            default_schedule: parse_schedule_slots(&schedule_slots)
                .context("SCHEDULE_SLOTS is malformed")?,
        })
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        log::info!("Validating configuration...");

        if self.task_quota == 0 {
            anyhow::bail!("TASK_QUOTA must be at least 1");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("MAX_ATTEMPTS must be at least 1");
        }
        if self.max_replies_per_pass == 0 && self.max_posts_per_pass == 0 {
            anyhow::bail!("MAX_REPLIES_PER_PASS and MAX_POSTS_PER_PASS cannot both be 0");
        }
        if self.poll_interval.is_zero() {
            anyhow::bail!("POLL_INTERVAL_SECS must be at least 1");
        }
        if self.poll_interval > Duration::from_secs(60) {
            log::warn!(
                "POLL_INTERVAL_SECS is {}s; scheduled minutes may be missed",
                self.poll_interval.as_secs()
            );
        }
        if self.default_schedule.len() < self.task_quota as usize {
            log::warn!(
                "Default schedule has {} slots but TASK_QUOTA is {}; schedule requests must supply their own slots",
                self.default_schedule.len(),
                self.task_quota
            );
        }

        log::info!("Configuration validated successfully");
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", name, raw, e)),
        None => Ok(default),
    }
}

/// Parse `HH:MM=kind` pairs separated by commas
///
/// Times are kept as written; the scheduler validates them on install.
pub fn parse_schedule_slots(value: &str) -> Result<Vec<ScheduleSlot>> {
    value.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| -> Result<ScheduleSlot> {
            let (time, kind) = pair
                .split_once('=')
                .with_context(|| format!("expected HH:MM=kind, got '{}'", pair))?;
            Ok(ScheduleSlot {
                time: time.trim().to_string(),
                kind: kind.parse()?,
            })
        })
        .collect()
}

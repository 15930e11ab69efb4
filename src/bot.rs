/// Bot wiring module
///
/// Builds the platform client, text generator, action log, executor and
/// scheduler from configuration, then runs the scheduler loop next to the
/// control HTTP server until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::action_log::{ActionLog, JsonFileStore};
use crate::config::Config;
use crate::executor::{ExecutorSettings, TaskExecutor};
use crate::gemini::GeminiClient;
use crate::generator::ContentGenerator;
use crate::governor::RateLimitGovernor;
use crate::http_server::{start_server, AppState};
use crate::scheduler::{Scheduler, SchedulerSettings};
use crate::twitter::{PlatformError, TwitterClient};

/// Initialize and run the bot
pub async fn run_bot(mut config: Config) -> Result<()> {
    log::info!("Initializing bot...");

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .context("Failed to create HTTP client")?;

    let twitter = Arc::new(TwitterClient::new(
        http_client.clone(),
        &config.twitter_bearer_token,
        &config.twitter_user_access_token,
    ));

    let username = retry_verify_credentials(&twitter)
        .await
        .context("Failed to connect to Twitter API after multiple retries")?;
    log::info!("Authenticated as @{}", username);
    if config.account_handle.is_none() {
        config.account_handle = Some(username);
    }

    let completer = Arc::new(GeminiClient::new(
        http_client,
        &config.gemini_api_key,
        &config.gemini_model,
        config.gemini_temperature,
    ));
    let generator = Arc::new(ContentGenerator::new(completer));

    let store = Arc::new(JsonFileStore::new(&config.action_log_path));
    log::info!("Using action log at {}", store.path().display());
    let action_log = Arc::new(ActionLog::load(store));

    let executor = Arc::new(TaskExecutor::new(
        twitter,
        generator,
        action_log.clone(),
        RateLimitGovernor::new(config.rate_limit_max_wait),
        ExecutorSettings::from_config(&config),
    ));

    let scheduler = Arc::new(Scheduler::new(
        executor.clone(),
        action_log.clone(),
        SchedulerSettings::from_config(&config),
    ));

    let scheduler_task = tokio::spawn(scheduler.clone().run());

    let state = AppState {
        scheduler,
        executor,
        log: action_log,
        control_api_secret: config.control_api_secret.clone(),
        default_schedule: config.default_schedule.clone(),
        max_replies_per_pass: config.max_replies_per_pass,
        max_posts_per_pass: config.max_posts_per_pass,
    };

    log::info!("Bot is running. Press Ctrl+C to stop.");

    let result = start_server(state, config.http_port, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        log::info!("Shutting down...");
    })
    .await;

    scheduler_task.abort();
    result
}

/// Retry the credential check with exponential backoff
async fn retry_verify_credentials(twitter: &TwitterClient) -> Result<String> {
    let max_retries = 5;
    let mut delay = Duration::from_secs(2);

    log::info!("Attempting to connect to Twitter API...");

    for attempt in 1..=max_retries {
        match twitter.verify_credentials().await {
            Ok(username) => return Ok(username),
            Err(PlatformError::RateLimited { reset_at }) if attempt < max_retries => {
                log::warn!(
                    "Rate limited verifying credentials (attempt {}/{}), reset at {}. Retrying in {:?}...",
                    attempt,
                    max_retries,
                    reset_at,
                    delay
                );
            }
            Err(e) if attempt < max_retries => {
                log::warn!(
                    "Failed to connect to Twitter API (attempt {}/{}): {}\nRetrying in {:?}...",
                    attempt,
                    max_retries,
                    e,
                    delay
                );
            }
            Err(e) => {
                log::error!("Failed to connect to Twitter API after {} attempts.", max_retries);
                log::error!("Check TWITTER_USER_ACCESS_TOKEN and outbound network access");
                return Err(e.into());
            }
        }

        sleep(delay).await;
        delay *= 2;
    }

    unreachable!()
}

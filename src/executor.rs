/// Task executor
///
/// Runs one pass of work: either search-and-reply for a keyword or posting
/// about a topic. Passes never fail outward; whatever goes wrong is reported
/// in the returned `PassReport`.
///
/// All passes share a single lane. Whoever holds the `Lane` is the only one
/// talking to the platform, which keeps request volume predictable.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::sleep;

use crate::action_log::{ActionKind, ActionLog, LogEntry};
use crate::config::Config;
use crate::generator::ContentGenerator;
use crate::governor::RateLimitGovernor;
use crate::twitter::{PlatformClient, PlatformError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    Success,
    NoData,
    RateLimited,
    TransientError,
}

impl PassOutcome {
    fn from_error(error: &PlatformError) -> Self {
        match error {
            PlatformError::RateLimited { .. } => PassOutcome::RateLimited,
            PlatformError::Transient(_) => PassOutcome::TransientError,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub kind: ActionKind,
    pub subject: String,
    pub outcome: PassOutcome,
    /// Entries appended to the action log during this pass
    pub entries: Vec<LogEntry>,
}

impl PassReport {
    fn empty(kind: ActionKind, subject: &str, outcome: PassOutcome) -> Self {
        Self {
            kind,
            subject: subject.to_string(),
            outcome,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub search_max_results: u32,
    pub max_attempts: u32,
    /// Pause before retrying after a non-rate-limit failure
    pub retry_delay: Duration,
    /// Pause between successful replies within a pass
    pub reply_delay: Duration,
    /// Pause between successive posts within a pass
    pub post_delay: Duration,
    /// Handle used to build URLs for our own posts
    pub account_handle: String,
}

impl ExecutorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            search_max_results: config.search_max_results,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay,
            reply_delay: config.reply_delay,
            post_delay: config.post_delay,
            account_handle: config
                .account_handle
                .clone()
                .unwrap_or_else(|| "user".to_string()),
        }
    }
}

/// Exclusive access to the executor lane. A pass takes ownership of it and
/// keeps it until the pass itself ends, even if its caller goes away.
pub struct Lane {
    _guard: OwnedMutexGuard<()>,
}

pub struct TaskExecutor {
    platform: Arc<dyn PlatformClient>,
    generator: Arc<ContentGenerator>,
    log: Arc<ActionLog>,
    governor: RateLimitGovernor,
    settings: ExecutorSettings,
    lane: Arc<Mutex<()>>,
}

impl TaskExecutor {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        generator: Arc<ContentGenerator>,
        log: Arc<ActionLog>,
        governor: RateLimitGovernor,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            platform,
            generator,
            log,
            governor,
            settings,
            lane: Arc::new(Mutex::new(())),
        }
    }

    /// Wait for the lane
    pub async fn lane(&self) -> Lane {
        Lane {
            _guard: Arc::clone(&self.lane).lock_owned().await,
        }
    }

    /// Take the lane if nobody holds it
    pub fn try_lane(&self) -> Option<Lane> {
        Arc::clone(&self.lane)
            .try_lock_owned()
            .ok()
            .map(|guard| Lane { _guard: guard })
    }

    pub async fn run_reply_task(self: &Arc<Self>, keyword: &str, max_replies: usize) -> PassReport {
        let lane = self.lane().await;
        self.run_pass(lane, ActionKind::Reply, keyword, max_replies).await
    }

    pub async fn run_post_task(self: &Arc<Self>, topic: &str, max_posts: usize) -> PassReport {
        let lane = self.lane().await;
        self.run_pass(lane, ActionKind::Post, topic, max_posts).await
    }

    /// Run one pass while holding the lane.
    ///
    /// The pass runs on its own task so that a panic inside it is contained
    /// and reported as a transient error. The lane moves into that task, so
    /// dropping the returned future does not free the lane early.
    pub async fn run_pass(
        self: &Arc<Self>,
        lane: Lane,
        kind: ActionKind,
        subject: &str,
        limit: usize,
    ) -> PassReport {
        log::info!("Starting {} pass for '{}' (limit {})", kind, subject, limit);

        let executor = Arc::clone(self);
        let owned_subject = subject.to_string();
        let handle = tokio::spawn(async move {
            let _lane = lane;
            match kind {
                ActionKind::Reply => executor.reply_pass(&owned_subject, limit).await,
                ActionKind::Post => executor.post_pass(&owned_subject, limit).await,
            }
        });

        let report = match handle.await {
            Ok(report) => report,
            Err(e) => {
                log::error!("{} pass for '{}' aborted: {}", kind, subject, e);
                PassReport::empty(kind, subject, PassOutcome::TransientError)
            }
        };

        log::info!(
            "{} pass for '{}' finished: {:?}, {} action(s)",
            kind,
            subject,
            report.outcome,
            report.entries.len()
        );
        report
    }

    async fn reply_pass(&self, keyword: &str, max_replies: usize) -> PassReport {
        log::info!("Searching for: '{}'", keyword);

        let results = match self
            .with_retry("search", || {
                self.platform
                    .search(keyword, self.settings.search_max_results, true)
            })
            .await
        {
            Ok(results) => results,
            Err(e) => {
                log::error!("Search for '{}' gave up: {}", keyword, e);
                return PassReport::empty(ActionKind::Reply, keyword, PassOutcome::from_error(&e));
            }
        };

        if results.tweets.is_empty() {
            log::info!("No tweets found for '{}'", keyword);
            return PassReport::empty(ActionKind::Reply, keyword, PassOutcome::NoData);
        }

        let mut entries = Vec::new();

        for tweet in &results.tweets {
            if entries.len() >= max_replies {
                break;
            }

            if self.log.contains(ActionKind::Reply, &tweet.id).await {
                log::info!("Already replied to tweet: {}", tweet.id);
                continue;
            }

            let handle = results.handle_for(tweet.author_id.as_deref());
            let text = self.generator.generate_reply(&tweet.text, handle, keyword).await;
            log::debug!("Generated reply for {}: {}", tweet.id, text);

            if !entries.is_empty() {
                sleep(self.settings.reply_delay).await;
            }

            match self.platform.reply(&tweet.id, &text).await {
                Ok(reply_id) => {
                    log::info!("Replied to tweet {} (reply {})", tweet.id, reply_id);
                    let entry = LogEntry::reply(
                        &tweet.id,
                        tweet.author_id.as_deref(),
                        handle,
                        &tweet.text,
                        &text,
                        keyword,
                    );
                    self.record(&entry).await;
                    entries.push(entry);
                }
                Err(PlatformError::RateLimited { reset_at }) => {
                    log::warn!("Rate limited replying to {}; waiting before the next tweet", tweet.id);
                    self.governor.await_reset(reset_at).await;
                }
                Err(e) => {
                    log::warn!("Failed to reply to tweet {}: {}", tweet.id, e);
                }
            }
        }

        PassReport {
            kind: ActionKind::Reply,
            subject: keyword.to_string(),
            outcome: PassOutcome::Success,
            entries,
        }
    }

    async fn post_pass(&self, topic: &str, max_posts: usize) -> PassReport {
        let mut entries = Vec::new();
        let mut outcome = PassOutcome::Success;

        for n in 0..max_posts {
            if n > 0 {
                log::info!("Waiting {}s before next post...", self.settings.post_delay.as_secs());
                sleep(self.settings.post_delay).await;
            }

            let text = self.generator.generate_post(topic).await;
            log::debug!("Generated post: {}", text);

            match self.with_retry("post", || self.platform.post(&text)).await {
                Ok(tweet_id) => {
                    log::info!("Posted tweet: {}", tweet_id);
                    let entry = LogEntry::post(&tweet_id, &self.settings.account_handle, &text, topic);
                    self.record(&entry).await;
                    entries.push(entry);
                }
                Err(e) => {
                    log::error!("Failed to post about '{}', stopping pass: {}", topic, e);
                    outcome = PassOutcome::from_error(&e);
                    break;
                }
            }
        }

        PassReport {
            kind: ActionKind::Post,
            subject: topic.to_string(),
            outcome,
            entries,
        }
    }

    /// Append to the action log; a storage failure is logged, not propagated
    async fn record(&self, entry: &LogEntry) {
        match self.log.append(entry.clone()).await {
            Ok(true) => {}
            Ok(false) => log::warn!("Action log already had {} {}", entry.kind, entry.target_id),
            Err(e) => log::error!("{:#}", e),
        }
    }

    /// Retry `op` up to the attempt cap. Rate limits wait out the window via
    /// the governor; other failures wait the fixed retry delay.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, PlatformError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    log::error!("{} failed after {} attempts: {}", what, attempt, e);
                    return Err(e);
                }
                Err(PlatformError::RateLimited { reset_at }) => {
                    log::warn!("{} rate limited (attempt {}/{})", what, attempt, max_attempts);
                    self.governor.await_reset(reset_at).await;
                }
                Err(e) => {
                    log::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        what,
                        attempt,
                        max_attempts,
                        e,
                        self.settings.retry_delay
                    );
                    sleep(self.settings.retry_delay).await;
                }
            }
            attempt += 1;
        }
    }
}

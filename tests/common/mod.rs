#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use x_engagement_bot::action_log::{ActionLog, LogEntry, LogStore};
use x_engagement_bot::executor::{ExecutorSettings, TaskExecutor};
use x_engagement_bot::generator::{ContentGenerator, GenerationError, TextCompleter};
use x_engagement_bot::governor::RateLimitGovernor;
use x_engagement_bot::scheduler::{ScheduleSlot, Scheduler, SchedulerSettings};
use x_engagement_bot::twitter::{PlatformClient, PlatformError, SearchResults, Tweet};

/// Scripted platform: queued search results are served first, then the
/// default results; reply/post failures are consumed once each.
#[derive(Default)]
pub struct MockPlatform {
    scripted_searches: Mutex<VecDeque<Result<SearchResults, PlatformError>>>,
    default_search: SearchResults,
    reply_failures: Mutex<HashMap<String, PlatformError>>,
    post_failures: Mutex<VecDeque<PlatformError>>,
    panic_on_query: Option<String>,
    next_id: AtomicU64,
    pub search_queries: Mutex<Vec<String>>,
    pub replies: Mutex<Vec<(String, String)>>,
    pub posts: Mutex<Vec<String>>,
    pub post_attempts: AtomicU64,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            ..Default::default()
        }
    }

    pub fn with_default_search(mut self, results: SearchResults) -> Self {
        self.default_search = results;
        self
    }

    pub fn then_search(self, result: Result<SearchResults, PlatformError>) -> Self {
        self.scripted_searches.lock().unwrap().push_back(result);
        self
    }

    pub fn failing_reply(self, tweet_id: &str, error: PlatformError) -> Self {
        self.reply_failures
            .lock()
            .unwrap()
            .insert(tweet_id.to_string(), error);
        self
    }

    pub fn failing_post(self, error: PlatformError) -> Self {
        self.post_failures.lock().unwrap().push_back(error);
        self
    }

    pub fn panicking_on(mut self, query: &str) -> Self {
        self.panic_on_query = Some(query.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.search_queries.lock().unwrap().clone()
    }

    pub fn replied_to(&self) -> Vec<String> {
        self.replies
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn new_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    async fn search(
        &self,
        query: &str,
        _max_results: u32,
        _expand_authors: bool,
    ) -> Result<SearchResults, PlatformError> {
        self.search_queries.lock().unwrap().push(query.to_string());
        if self.panic_on_query.as_deref() == Some(query) {
            panic!("search blew up for {}", query);
        }

        let scripted = self.scripted_searches.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.default_search.clone()),
        }
    }

    async fn reply(&self, target_id: &str, text: &str) -> Result<String, PlatformError> {
        if let Some(error) = self.reply_failures.lock().unwrap().remove(target_id) {
            return Err(error);
        }
        self.replies
            .lock()
            .unwrap()
            .push((target_id.to_string(), text.to_string()));
        Ok(self.new_id())
    }

    async fn post(&self, text: &str) -> Result<String, PlatformError> {
        self.post_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.post_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.posts.lock().unwrap().push(text.to_string());
        Ok(self.new_id())
    }
}

/// Model stand-in returning a fixed string, or failing every call
pub struct MockCompleter {
    reply: Option<String>,
}

impl MockCompleter {
    pub fn answering(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { reply: None }
    }
}

#[async_trait]
impl TextCompleter for MockCompleter {
    async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
        self.reply.clone().ok_or(GenerationError::Api {
            status: 503,
            body: "model overloaded".to_string(),
        })
    }
}

/// In-memory `LogStore` whose writes can be made to fail
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Vec<LogEntry>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn with_entries(entries: Vec<LogEntry>) -> Self {
        Self {
            saved: Mutex::new(Some(entries)),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Option<Vec<LogEntry>> {
        self.saved.lock().unwrap().clone()
    }
}

impl LogStore for MemoryStore {
    fn read_all(&self) -> anyhow::Result<Option<Vec<LogEntry>>> {
        Ok(self.saved.lock().unwrap().clone())
    }

    fn write_all(&self, entries: &[LogEntry]) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        *self.saved.lock().unwrap() = Some(entries.to_vec());
        Ok(())
    }
}

pub fn tweet(id: &str, author_id: &str, text: &str) -> Tweet {
    Tweet {
        id: id.to_string(),
        author_id: Some(author_id.to_string()),
        text: text.to_string(),
    }
}

/// Search results whose authors are named `user<author_id>`
pub fn results(tweets: Vec<Tweet>) -> SearchResults {
    let users = tweets
        .iter()
        .filter_map(|t| t.author_id.clone())
        .map(|id| (id.clone(), format!("user{}", id)))
        .collect();
    SearchResults { tweets, users }
}

pub fn three_tweets() -> SearchResults {
    results(vec![
        tweet("1", "10", "first tweet"),
        tweet("2", "20", "second tweet"),
        tweet("3", "30", "third tweet"),
    ])
}

pub fn settings() -> ExecutorSettings {
    ExecutorSettings {
        search_max_results: 10,
        max_attempts: 3,
        retry_delay: Duration::ZERO,
        reply_delay: Duration::ZERO,
        post_delay: Duration::ZERO,
        account_handle: "me".to_string(),
    }
}

pub struct Harness {
    pub platform: Arc<MockPlatform>,
    pub store: Arc<MemoryStore>,
    pub log: Arc<ActionLog>,
    pub executor: Arc<TaskExecutor>,
}

pub fn harness(platform: MockPlatform) -> Harness {
    build(platform, MockCompleter::answering("generated text"), MemoryStore::default(), settings())
}

pub fn build(
    platform: MockPlatform,
    completer: MockCompleter,
    store: MemoryStore,
    settings: ExecutorSettings,
) -> Harness {
    let platform = Arc::new(platform);
    let store = Arc::new(store);
    let log = Arc::new(ActionLog::load(store.clone()));
    let generator = Arc::new(ContentGenerator::new(Arc::new(completer)));
    let executor = Arc::new(TaskExecutor::new(
        platform.clone(),
        generator,
        log.clone(),
        RateLimitGovernor::default(),
        settings,
    ));

    Harness {
        platform,
        store,
        log,
        executor,
    }
}

pub fn scheduler(h: &Harness, task_quota: u32) -> Scheduler {
    Scheduler::new(
        h.executor.clone(),
        h.log.clone(),
        SchedulerSettings {
            task_quota,
            max_replies_per_pass: 3,
            max_posts_per_pass: 1,
            poll_interval: Duration::from_secs(60),
        },
    )
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn slot(time: &str, kind: x_engagement_bot::action_log::ActionKind) -> ScheduleSlot {
    ScheduleSlot {
        time: time.to_string(),
        kind,
    }
}

/// A fixed day at `hour:minute:05`
pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(hour, minute, 5)
        .unwrap()
}

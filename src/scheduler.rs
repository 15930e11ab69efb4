/// Scheduler Module
///
/// Runs reply and post passes at fixed times of day. A schedule is installed
/// with keywords, topics and a list of (time, kind) slots; every matching
/// minute dispatches one pass, rotating through the keywords or topics, until
/// the task quota has been completed and the scheduler stops itself.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};

use crate::action_log::{ActionKind, ActionLog, LogEntry};
use crate::config::Config;
use crate::executor::{PassReport, TaskExecutor};

/// A requested slot, as it arrives from configuration or the control API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub time: String,
    pub kind: ActionKind,
}

/// A validated slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    #[serde(serialize_with = "serialize_hhmm")]
    pub fire_time: NaiveTime,
    pub kind: ActionKind,
}

impl ScheduleEntry {
    fn matches(&self, now: NaiveDateTime) -> bool {
        self.fire_time.hour() == now.hour() && self.fire_time.minute() == now.minute()
    }
}

fn serialize_hhmm<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.format("%H:%M").to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("keywords must not be empty")]
    NoKeywords,

    #[error("topics must not be empty")]
    NoTopics,

    #[error("schedule must contain at least one time")]
    NoSlots,

    #[error("{0} must not contain blank values")]
    BlankValue(&'static str),

    #[error("'{0}' is not a valid HH:MM time of day")]
    InvalidTime(String),

    #[error("{0} is scheduled more than once")]
    DuplicateTime(String),

    #[error("schedule has {slots} slot(s) but the task quota is {quota}")]
    BelowQuota { slots: usize, quota: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleState {
    pub keywords: Vec<String>,
    pub topics: Vec<String>,
    pub reply_cursor: usize,
    pub post_cursor: usize,
    pub completed_task_count: u32,
    pub task_quota: u32,
    pub running: bool,
}

impl ScheduleState {
    fn fresh(keywords: Vec<String>, topics: Vec<String>, task_quota: u32) -> Self {
        Self {
            keywords,
            topics,
            reply_cursor: 0,
            post_cursor: 0,
            completed_task_count: 0,
            task_quota,
            running: true,
        }
    }

    /// Pick the keyword or topic under the cursor and advance it
    fn next_subject(&mut self, kind: ActionKind) -> Option<String> {
        let (list, cursor) = match kind {
            ActionKind::Reply => (&self.keywords, &mut self.reply_cursor),
            ActionKind::Post => (&self.topics, &mut self.post_cursor),
        };
        if list.is_empty() {
            return None;
        }
        let subject = list[*cursor % list.len()].clone();
        *cursor += 1;
        Some(subject)
    }
}

/// What `get_status` reports to the control surface
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleStatus {
    pub running: bool,
    pub completed_count: u32,
    pub quota: u32,
    pub keywords: Vec<String>,
    pub topics: Vec<String>,
    pub reply_cursor: usize,
    pub post_cursor: usize,
    pub schedule: Vec<ScheduleEntry>,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub task_quota: u32,
    pub max_replies_per_pass: usize,
    pub max_posts_per_pass: usize,
    pub poll_interval: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            task_quota: config.task_quota,
            max_replies_per_pass: config.max_replies_per_pass,
            max_posts_per_pass: config.max_posts_per_pass,
            poll_interval: config.poll_interval,
        }
    }
}

/// Validate an install request into schedule entries
pub fn validate_install(
    keywords: &[String],
    topics: &[String],
    slots: &[ScheduleSlot],
    task_quota: u32,
) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    if keywords.is_empty() {
        return Err(ScheduleError::NoKeywords);
    }
    if topics.is_empty() {
        return Err(ScheduleError::NoTopics);
    }
    if slots.is_empty() {
        return Err(ScheduleError::NoSlots);
    }
    if keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ScheduleError::BlankValue("keywords"));
    }
    if topics.iter().any(|t| t.trim().is_empty()) {
        return Err(ScheduleError::BlankValue("topics"));
    }

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(slots.len());
    for slot in slots {
        let fire_time = NaiveTime::parse_from_str(slot.time.trim(), "%H:%M")
            .map_err(|_| ScheduleError::InvalidTime(slot.time.clone()))?;
        if !seen.insert(fire_time) {
            return Err(ScheduleError::DuplicateTime(slot.time.clone()));
        }
        entries.push(ScheduleEntry {
            fire_time,
            kind: slot.kind,
        });
    }

    if entries.len() < task_quota as usize {
        return Err(ScheduleError::BelowQuota {
            slots: entries.len(),
            quota: task_quota,
        });
    }

    Ok(entries)
}

#[derive(Debug, Default)]
struct Inner {
    state: ScheduleState,
    entries: Vec<ScheduleEntry>,
    /// Day each entry last fired, parallel to `entries`
    fired_on: Vec<Option<NaiveDate>>,
    /// Bumped on every install and stop so stale passes are not counted
    generation: u64,
}

struct Dispatch {
    kind: ActionKind,
    subject: String,
    generation: u64,
}

impl Inner {
    fn due_index(&self, now: NaiveDateTime) -> Option<usize> {
        if !self.state.running {
            return None;
        }
        let today = now.date();
        self.entries
            .iter()
            .zip(&self.fired_on)
            .position(|(entry, fired)| entry.matches(now) && *fired != Some(today))
    }

    fn claim(&mut self, now: NaiveDateTime) -> Option<Dispatch> {
        let index = self.due_index(now)?;
        self.fired_on[index] = Some(now.date());
        let kind = self.entries[index].kind;
        let subject = self.state.next_subject(kind)?;
        Some(Dispatch {
            kind,
            subject,
            generation: self.generation,
        })
    }

    fn disarm(&mut self) {
        self.entries.clear();
        self.fired_on.clear();
        self.state.running = false;
        self.generation += 1;
    }
}

pub struct Scheduler {
    executor: Arc<TaskExecutor>,
    log: Arc<ActionLog>,
    settings: SchedulerSettings,
    inner: Mutex<Inner>,
}

impl Scheduler {
    pub fn new(executor: Arc<TaskExecutor>, log: Arc<ActionLog>, settings: SchedulerSettings) -> Self {
        Self {
            executor,
            log,
            settings,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Replace any existing schedule and start a fresh run.
    ///
    /// Installing clears the action log. A rejected request changes nothing.
    /// A pass still running from the previous schedule is not counted toward
    /// the new quota, but the replies and posts it makes are still logged,
    /// since they exist on the platform and must not be repeated.
    pub async fn install(
        &self,
        keywords: Vec<String>,
        topics: Vec<String>,
        slots: &[ScheduleSlot],
    ) -> Result<ScheduleStatus, ScheduleError> {
        let entries = validate_install(&keywords, &topics, slots, self.settings.task_quota)?;

        {
            let mut inner = self.inner.lock().await;

            if let Err(e) = self.log.clear().await {
                log::warn!("{:#}", e);
            }

            log::info!(
                "Scheduled {} tasks for keywords {:?} and topics {:?}",
                entries.len(),
                keywords,
                topics
            );

            inner.generation += 1;
            inner.fired_on = vec![None; entries.len()];
            inner.entries = entries;
            inner.state = ScheduleState::fresh(keywords, topics, self.settings.task_quota);
        }

        Ok(self.status().await)
    }

    /// Drop the schedule. Does not interrupt a pass already running.
    ///
    /// Returns whether a schedule was active.
    pub async fn stop(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let was_running = inner.state.running;
        inner.disarm();
        inner.state.completed_task_count = 0;

        if was_running {
            log::info!("Scheduler stopped");
        }
        was_running
    }

    pub async fn clear_log(&self) -> anyhow::Result<()> {
        self.log.clear().await
    }

    pub async fn state(&self) -> ScheduleState {
        self.inner.lock().await.state.clone()
    }

    pub async fn status(&self) -> ScheduleStatus {
        let inner = self.inner.lock().await;
        ScheduleStatus {
            running: inner.state.running,
            completed_count: inner.state.completed_task_count,
            quota: inner.state.task_quota,
            keywords: inner.state.keywords.clone(),
            topics: inner.state.topics.clone(),
            reply_cursor: inner.state.reply_cursor,
            post_cursor: inner.state.post_cursor,
            schedule: inner.entries.clone(),
            entries: self.log.entries().await,
        }
    }

    /// Evaluate the schedule at wall-clock time `now` and run the due task,
    /// if any. Returns the report of the pass that ran.
    pub async fn tick(&self, now: NaiveDateTime) -> Option<PassReport> {
        let Some(lane) = self.executor.try_lane() else {
            if self.inner.lock().await.due_index(now).is_some() {
                log::warn!(
                    "Task due at {} dropped: another pass is still running",
                    now.format("%H:%M")
                );
            }
            return None;
        };

        let dispatch = self.inner.lock().await.claim(now)?;
        let limit = match dispatch.kind {
            ActionKind::Reply => self.settings.max_replies_per_pass,
            ActionKind::Post => self.settings.max_posts_per_pass,
        };

        log::info!(
            "Executing scheduled {} task at {} using '{}'",
            dispatch.kind,
            now.format("%H:%M"),
            dispatch.subject
        );

        let report = self
            .executor
            .run_pass(lane, dispatch.kind, &dispatch.subject, limit)
            .await;

        self.complete(&dispatch).await;
        Some(report)
    }

    async fn complete(&self, dispatch: &Dispatch) {
        let mut inner = self.inner.lock().await;
        if inner.generation != dispatch.generation || !inner.state.running {
            log::info!("Schedule changed while the {} pass ran; not counted", dispatch.kind);
            return;
        }

        inner.state.completed_task_count += 1;
        log::info!(
            "Completed {}/{} scheduled tasks",
            inner.state.completed_task_count,
            inner.state.task_quota
        );

        if inner.state.completed_task_count >= inner.state.task_quota {
            inner.disarm();
            log::info!("All scheduled tasks completed! Scheduler stopped automatically");
        }
    }

    /// Poll the schedule forever on the configured interval.
    ///
    /// Passes run inline, so polls that fall inside a running pass are
    /// skipped rather than queued.
    pub async fn run(self: Arc<Self>) {
        log::info!(
            "Starting scheduler (checking every {}s)",
            self.settings.poll_interval.as_secs()
        );

        let mut interval = time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let now = Local::now().naive_local();
            if let Some(report) = self.tick(now).await {
                log::info!(
                    "Scheduled {} task for '{}' done: {:?}, {} action(s)",
                    report.kind,
                    report.subject,
                    report.outcome,
                    report.entries.len()
                );
            }
        }
    }
}

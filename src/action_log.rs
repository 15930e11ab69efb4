/// Action log module
///
/// Append-only record of every reply and post the bot has made. The log is
/// the source of truth for duplicate suppression: a source tweet that shows up
/// here as a reply target is never replied to again until the log is cleared.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// What kind of action a log entry (or a scheduled task) stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    #[serde(alias = "tweet")]
    Reply,
    Post,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Reply => f.write_str("reply"),
            ActionKind::Post => f.write_str("post"),
        }
    }
}

impl FromStr for ActionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reply" => Ok(ActionKind::Reply),
            "post" => Ok(ActionKind::Post),
            other => anyhow::bail!("unknown task kind '{}' (expected 'reply' or 'post')", other),
        }
    }
}

/// One successful reply or post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: ActionKind,

    /// Source tweet for replies, the newly created tweet for posts
    #[serde(rename = "id", deserialize_with = "string_or_number")]
    pub target_id: String,

    #[serde(default, deserialize_with = "opt_string_or_number", skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,

    #[serde(rename = "author_username", default, skip_serializing_if = "Option::is_none")]
    pub author_handle: Option<String>,

    #[serde(rename = "original_tweet_text", default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,

    #[serde(alias = "generated_comment", alias = "content")]
    pub generated_text: String,

    /// Keyword for replies, topic for posts
    #[serde(alias = "keyword", alias = "topic")]
    pub subject: String,

    pub url: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn reply(
        target_id: &str,
        author_id: Option<&str>,
        author_handle: &str,
        source_text: &str,
        generated_text: &str,
        keyword: &str,
    ) -> Self {
        Self {
            kind: ActionKind::Reply,
            target_id: target_id.to_string(),
            author_id: author_id.map(str::to_string),
            author_handle: Some(author_handle.to_string()),
            source_text: Some(source_text.to_string()),
            generated_text: generated_text.to_string(),
            subject: keyword.to_string(),
            url: crate::twitter::status_url(author_handle, target_id),
            timestamp: Utc::now(),
        }
    }

    pub fn post(new_id: &str, account_handle: &str, generated_text: &str, topic: &str) -> Self {
        Self {
            kind: ActionKind::Post,
            target_id: new_id.to_string(),
            author_id: None,
            author_handle: None,
            source_text: None,
            generated_text: generated_text.to_string(),
            subject: topic.to_string(),
            url: crate::twitter::status_url(account_handle, new_id),
            timestamp: Utc::now(),
        }
    }
}

// Older log files stored tweet ids as JSON numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or numeric id, got {}",
            other
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or numeric id, got {}",
            other
        ))),
    }
}

/// Durable backing for the action log (whole-file overwrite semantics)
pub trait LogStore: Send + Sync {
    /// Returns `None` when nothing has been stored yet
    fn read_all(&self) -> Result<Option<Vec<LogEntry>>>;

    fn write_all(&self, entries: &[LogEntry]) -> Result<()>;
}

/// Pretty-printed JSON array on disk
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogStore for JsonFileStore {
    fn read_all(&self) -> Result<Option<Vec<LogEntry>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        if raw.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }

        let entries = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        Ok(Some(entries))
    }

    fn write_all(&self, entries: &[LogEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory {}", parent.display())
                })?;
            }
        }

        let json = serde_json::to_string_pretty(entries).context("Failed to serialize action log")?;

        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        log::debug!("Saved {} log entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

/// In-memory action log mirrored to a `LogStore`
///
/// Writers persist the full log while holding the write lock, so readers
/// always see a complete snapshot and never a half-applied append.
pub struct ActionLog {
    entries: RwLock<Vec<LogEntry>>,
    store: Arc<dyn LogStore>,
}

impl ActionLog {
    /// Rebuild the log from storage. Missing or unreadable storage yields an
    /// empty log.
    pub fn load(store: Arc<dyn LogStore>) -> Self {
        let entries = match store.read_all() {
            Ok(Some(entries)) => {
                log::info!("Loaded {} action log entries", entries.len());
                entries
            }
            Ok(None) => {
                log::info!("No action log found, starting empty");
                Vec::new()
            }
            Err(e) => {
                log::warn!("Action log unreadable, starting empty: {:#}", e);
                Vec::new()
            }
        };

        Self {
            entries: RwLock::new(entries),
            store,
        }
    }

    /// Record an entry and persist the log.
    ///
    /// Returns `Ok(false)` when the entry would be a second reply to the same
    /// target. A storage error is returned to the caller but the entry stays
    /// recorded in memory.
    pub async fn append(&self, entry: LogEntry) -> Result<bool> {
        let mut entries = self.entries.write().await;

        if entry.kind == ActionKind::Reply
            && entries
                .iter()
                .any(|e| e.kind == ActionKind::Reply && e.target_id == entry.target_id)
        {
            log::warn!("Refusing duplicate reply entry for tweet {}", entry.target_id);
            return Ok(false);
        }

        entries.push(entry);
        self.persist(entries.clone())
            .await
            .context("Action recorded in memory but not persisted")?;

        Ok(true)
    }

    pub async fn contains(&self, kind: ActionKind, target_id: &str) -> bool {
        self.entries
            .read()
            .await
            .iter()
            .any(|e| e.kind == kind && e.target_id == target_id)
    }

    /// Empty both the in-memory and the durable log
    pub async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.clear();
        self.persist(Vec::new())
            .await
            .context("Action log cleared in memory but not in storage")?;

        log::info!("Action log cleared");
        Ok(())
    }

    /// Write a snapshot on the blocking pool. Callers hold the write lock
    /// until this returns, so snapshots reach the store in order.
    async fn persist(&self, snapshot: Vec<LogEntry>) -> Result<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.write_all(&snapshot))
            .await
            .context("Action log writer task failed")?
    }

    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.read().await.clone()
    }

    pub async fn entries_of(&self, kind: ActionKind) -> Vec<LogEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_entry(id: &str) -> LogEntry {
        LogEntry::reply(id, Some("42"), "alice", "source", "nice one", "rust")
    }

    fn file_log(dir: &tempfile::TempDir) -> (ActionLog, PathBuf) {
        let path = dir.path().join("logs").join("action_log.json");
        let log = ActionLog::load(Arc::new(JsonFileStore::new(&path)));
        (log, path)
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (log, path) = file_log(&dir);
        assert!(log.is_empty().await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("action_log.json");
        std::fs::write(&path, "{ not json").unwrap();

        let log = ActionLog::load(Arc::new(JsonFileStore::new(&path)));
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn test_append_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let (log, path) = file_log(&dir);

        assert!(log.append(reply_entry("1")).await.unwrap());
        assert!(log
            .append(LogEntry::post("99", "me", "hello world", "geo"))
            .await
            .unwrap());

        let reloaded = ActionLog::load(Arc::new(JsonFileStore::new(&path)));
        let entries = reloaded.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, ActionKind::Reply);
        assert_eq!(entries[1].url, "https://twitter.com/me/status/99");
        assert!(reloaded.contains(ActionKind::Reply, "1").await);
        assert!(!reloaded.contains(ActionKind::Post, "1").await);
    }

    #[tokio::test]
    async fn test_duplicate_reply_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (log, _) = file_log(&dir);

        assert!(log.append(reply_entry("7")).await.unwrap());
        assert!(!log.append(reply_entry("7")).await.unwrap());
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_clear_empties_file() {
        let dir = tempfile::tempdir().unwrap();
        let (log, path) = file_log(&dir);
        log.append(reply_entry("1")).await.unwrap();

        log.clear().await.unwrap();

        assert!(log.is_empty().await);
        let raw = std::fs::read_to_string(&path).unwrap();
        let on_disk: Vec<LogEntry> = serde_json::from_str(&raw).unwrap();
        assert!(on_disk.is_empty());
    }

    /// Records the thread each write ran on
    #[derive(Default)]
    struct ThreadRecordingStore {
        writer_threads: std::sync::Mutex<Vec<std::thread::ThreadId>>,
    }

    impl LogStore for ThreadRecordingStore {
        fn read_all(&self) -> Result<Option<Vec<LogEntry>>> {
            Ok(None)
        }

        fn write_all(&self, _entries: &[LogEntry]) -> Result<()> {
            self.writer_threads.lock().unwrap().push(std::thread::current().id());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_writes_run_off_the_runtime_thread() {
        let store = Arc::new(ThreadRecordingStore::default());
        let log = ActionLog::load(store.clone());

        log.append(reply_entry("1")).await.unwrap();
        log.clear().await.unwrap();

        let runtime_thread = std::thread::current().id();
        let writers = store.writer_threads.lock().unwrap().clone();
        assert_eq!(writers.len(), 2);
        assert!(writers.iter().all(|id| *id != runtime_thread));
    }

    #[test]
    fn test_reads_legacy_entries() {
        let raw = r#"[
            {"type": "tweet", "id": 1790000000000000001, "author_id": 12,
             "author_username": "bob", "original_tweet_text": "hi",
             "generated_comment": "hey", "keyword": "geo",
             "url": "https://twitter.com/bob/status/1790000000000000001",
             "timestamp": "2025-06-01T11:00:03.512345Z"},
            {"type": "post", "id": "555", "content": "thoughts", "topic": "ai",
             "url": "https://twitter.com/user/status/555",
             "timestamp": "2025-06-01T11:20:00Z"}
        ]"#;

        let entries: Vec<LogEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries[0].kind, ActionKind::Reply);
        assert_eq!(entries[0].target_id, "1790000000000000001");
        assert_eq!(entries[0].author_id.as_deref(), Some("12"));
        assert_eq!(entries[0].generated_text, "hey");
        assert_eq!(entries[1].subject, "ai");
        assert_eq!(entries[1].source_text, None);
    }

    #[test]
    fn test_action_kind_parsing() {
        assert_eq!("Reply".parse::<ActionKind>().unwrap(), ActionKind::Reply);
        assert_eq!(" post ".parse::<ActionKind>().unwrap(), ActionKind::Post);
        assert!("retweet".parse::<ActionKind>().is_err());
    }
}

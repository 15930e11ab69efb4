/// X Engagement Bot Library
///
/// Searches X (Twitter) for keywords, replies with model-generated comments,
/// publishes original posts on a daily schedule, and keeps an action log that
/// guarantees a tweet is never replied to twice.

pub mod action_log;
pub mod bot;
pub mod config;
pub mod executor;
pub mod gemini;
pub mod generator;
pub mod governor;
pub mod http_server;
pub mod prompts;
pub mod scheduler;
pub mod twitter;

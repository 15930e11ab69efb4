/// X Engagement Bot
///
/// Replies to tweets matching scheduled keywords and posts original tweets on
/// scheduled topics, using Gemini to write the text.
///
/// The bot:
/// - Runs reply and post passes at fixed times of day
/// - Rotates through the configured keywords and topics
/// - Never replies to the same tweet twice (see the action log)
/// - Waits out rate limits instead of failing
/// - Stops on its own once the daily task quota is done

use anyhow::Result;
use x_engagement_bot::{bot, config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    pretty_env_logger::init();

    log::info!("Starting X Engagement Bot...");

    // Load configuration from environment
    let cfg = config::Config::from_env()?;
    cfg.validate()?;

    // Run the bot
    bot::run_bot(cfg).await?;

    Ok(())
}

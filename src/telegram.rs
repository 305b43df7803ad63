//! Telegram command dispatch
//!
//! Parses user commands, submits generation jobs to the provider, and
//! records them with the job engine before acking the user. Progress and
//! results arrive later through the webhook ingress, not here.
//!
//! Uses explicit Dispatcher pattern for reliable message polling.

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use teloxide::{
    dispatching::UpdateFilterExt, dptree, error_handlers::LoggingErrorHandler, prelude::*,
    types::Update,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::jobs::JobEngine;
use crate::providers::ProviderClient;

const HELP_TEXT: &str = "Commands:\n\
    /video <prompt> - generate a video\n\
    /image <prompt> - generate an image\n\
    /help - show this message\n\n\
    Jobs run remotely; progress and results are posted back here as they\n\
    come in.";

/// Shared handler state.
pub struct BotData {
    allowed_users: Vec<i64>,
    engine: Arc<JobEngine>,
    provider: ProviderClient,
    video_model_version: String,
    image_model_version: String,
}

impl BotData {
    pub fn new(config: &Config, engine: Arc<JobEngine>, provider: ProviderClient) -> Self {
        Self {
            allowed_users: config.allowed_users.clone(),
            engine,
            provider,
            video_model_version: config.video_model_version.clone(),
            image_model_version: config.image_model_version.clone(),
        }
    }

    fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user_id)
    }
}

/// Run the bot with an explicit dispatcher until shutdown.
pub async fn run_bot(bot: Bot, data: Arc<BotData>) -> Result<()> {
    // Verify the token before dispatching.
    match bot.get_me().await {
        Ok(me) => info!(
            "Bot authenticated: @{} (ID: {})",
            me.username.as_deref().unwrap_or("unknown"),
            me.id
        ),
        Err(e) => anyhow::bail!("Bot authentication failed: {}", e),
    }

    // Polling and an inbound webhook on the same token conflict.
    if let Err(e) = bot.delete_webhook().await {
        warn!("Failed to delete Telegram webhook: {} (continuing)", e);
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(message_handler));

    info!("Starting dispatcher with long polling...");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![data])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in message handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    warn!("Dispatcher stopped");
    Ok(())
}

/// Message handler endpoint for the dispatcher
async fn message_handler(bot: Bot, msg: Message, data: Arc<BotData>) -> ResponseResult<()> {
    let user_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or(0);
    let chat_id = msg.chat.id.0;

    if let Err(e) = handle_message(&bot, &msg, &data, user_id, chat_id).await {
        tracing::error!("Error handling message from {}: {}", user_id, e);
    }

    Ok(())
}

async fn handle_message(
    bot: &Bot,
    msg: &Message,
    data: &BotData,
    user_id: i64,
    chat_id: i64,
) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if !text.starts_with('/') {
        return Ok(());
    }

    if !data.is_allowed(user_id) {
        warn!("Unauthorized user {} in chat {}", user_id, chat_id);
        bot.send_message(msg.chat.id, "You are not authorized to use this bot.")
            .await?;
        return Ok(());
    }

    let parts: Vec<&str> = text.splitn(2, ' ').collect();
    let command = parts[0];
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match command {
        "/start" | "/help" => {
            bot.send_message(msg.chat.id, HELP_TEXT).await?;
        }
        "/video" => {
            submit_job(bot, data, chat_id, &data.video_model_version, args).await?;
        }
        "/image" => {
            submit_job(bot, data, chat_id, &data.image_model_version, args).await?;
        }
        other => {
            bot.send_message(msg.chat.id, format!("Unknown command: {}", other))
                .await?;
        }
    }

    Ok(())
}

/// Submit a generation job and start tracking it. The record must exist
/// before the first callback can arrive, so `track` runs before the ack.
async fn submit_job(
    bot: &Bot,
    data: &BotData,
    chat_id: i64,
    model_version: &str,
    prompt: &str,
) -> Result<()> {
    if prompt.is_empty() {
        bot.send_message(ChatId(chat_id), "Give me a prompt, e.g. /video a cat surfing")
            .await?;
        return Ok(());
    }
    if model_version.is_empty() {
        bot.send_message(ChatId(chat_id), "This generation type is not configured.")
            .await?;
        return Ok(());
    }

    // chat_id and caption ride along in the input block so a callback can
    // be correlated even if the local record goes missing.
    let input = json!({
        "prompt": prompt,
        "chat_id": chat_id,
        "caption": prompt,
    });

    match data.provider.create_job(model_version, &input).await {
        Ok(job_id) => {
            data.engine.track(&job_id, chat_id, prompt).await?;
            info!("Tracking job {} for chat {}", job_id, chat_id);
            bot.send_message(ChatId(chat_id), "Job submitted. I'll post updates here.")
                .await?;
        }
        Err(e) => {
            warn!("Job submission failed for chat {}: {}", chat_id, e);
            bot.send_message(ChatId(chat_id), "Could not start the job, try again later.")
                .await?;
        }
    }

    Ok(())
}

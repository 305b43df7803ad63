//! Notifier capability
//!
//! Interface to the chat transport: send a new message/photo/video/
//! document/voice, or edit the text/caption of a previously sent message.
//! The job engine only talks to this trait; the Telegram implementation
//! applies the branding prefix so the engine never has to.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId};
use url::Url;

/// Errors from chat transport operations.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Edit failed: {0}")]
    EditFailed(String),

    #[error("Invalid media URL: {0}")]
    InvalidUrl(String),
}

/// Chat transport capability. Every send returns the new message's id so
/// callers can edit it later.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i32, NotifyError>;
    async fn send_photo(&self, chat_id: i64, url: &str, caption: &str) -> Result<i32, NotifyError>;
    async fn send_video(&self, chat_id: i64, url: &str, caption: &str) -> Result<i32, NotifyError>;
    async fn send_document(&self, chat_id: i64, url: &str, caption: &str)
        -> Result<i32, NotifyError>;
    async fn send_voice(&self, chat_id: i64, url: &str) -> Result<i32, NotifyError>;
    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str)
        -> Result<(), NotifyError>;
    async fn edit_caption(
        &self,
        chat_id: i64,
        message_id: i32,
        caption: &str,
    ) -> Result<(), NotifyError>;
}

/// Telegram implementation over a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    prefix: String,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, prefix: &str) -> Self {
        Self {
            bot,
            prefix: prefix.to_string(),
        }
    }

    /// Uniform branding prefix on all outgoing text and captions.
    fn brand(&self, text: &str) -> String {
        if self.prefix.is_empty() {
            text.to_string()
        } else {
            format!("{} {}", self.prefix, text)
        }
    }

    fn media_url(url: &str) -> Result<Url, NotifyError> {
        Url::parse(url).map_err(|e| NotifyError::InvalidUrl(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i32, NotifyError> {
        let msg = self
            .bot
            .send_message(ChatId(chat_id), self.brand(text))
            .await
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;
        Ok(msg.id.0)
    }

    async fn send_photo(&self, chat_id: i64, url: &str, caption: &str) -> Result<i32, NotifyError> {
        let msg = self
            .bot
            .send_photo(ChatId(chat_id), InputFile::url(Self::media_url(url)?))
            .caption(self.brand(caption))
            .await
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;
        Ok(msg.id.0)
    }

    async fn send_video(&self, chat_id: i64, url: &str, caption: &str) -> Result<i32, NotifyError> {
        let msg = self
            .bot
            .send_video(ChatId(chat_id), InputFile::url(Self::media_url(url)?))
            .caption(self.brand(caption))
            .await
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;
        Ok(msg.id.0)
    }

    async fn send_document(
        &self,
        chat_id: i64,
        url: &str,
        caption: &str,
    ) -> Result<i32, NotifyError> {
        let msg = self
            .bot
            .send_document(ChatId(chat_id), InputFile::url(Self::media_url(url)?))
            .caption(self.brand(caption))
            .await
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;
        Ok(msg.id.0)
    }

    async fn send_voice(&self, chat_id: i64, url: &str) -> Result<i32, NotifyError> {
        let msg = self
            .bot
            .send_voice(ChatId(chat_id), InputFile::url(Self::media_url(url)?))
            .await
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;
        Ok(msg.id.0)
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
    ) -> Result<(), NotifyError> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), self.brand(text))
            .await
            .map_err(|e| NotifyError::EditFailed(e.to_string()))?;
        Ok(())
    }

    async fn edit_caption(
        &self,
        chat_id: i64,
        message_id: i32,
        caption: &str,
    ) -> Result<(), NotifyError> {
        self.bot
            .edit_message_caption(ChatId(chat_id), MessageId(message_id))
            .caption(self.brand(caption))
            .await
            .map_err(|e| NotifyError::EditFailed(e.to_string()))?;
        Ok(())
    }
}

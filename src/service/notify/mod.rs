mod broadcast;

pub use broadcast::broadcast;

use async_trait::async_trait;
use teloxide::{
    adaptors::Throttle,
    payloads::SendMessageSetters,
    prelude::Requester,
    types::{ChatId, InlineKeyboardMarkup, MessageId, ParseMode},
    Bot, RequestError,
};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Telegram error: {0}")]
    Telegram(String),
}

impl From<RequestError> for NotifyError {
    fn from(error: RequestError) -> Self {
        NotifyError::Telegram(error.to_string())
    }
}

/// Outbound chat messages. All texts are sent as HTML.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<InlineKeyboardMarkup>) -> Result<i32, NotifyError>;
    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<(), NotifyError>;
}

#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Throttle<Bot>,
}

impl TelegramNotifier {
    pub fn new(bot: Throttle<Bot>) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<InlineKeyboardMarkup>) -> Result<i32, NotifyError> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard);
        }

        let message = request.await?;
        Ok(message.id.0)
    }

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<(), NotifyError> {
        self.bot.delete_message(ChatId(chat_id), MessageId(message_id)).await?;
        Ok(())
    }
}

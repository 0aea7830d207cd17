use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{BotCommand, InlineKeyboard, Media, TextFormat},
    Result,
};

/// Outbound transport port.
///
/// Telegram is the only implementation; flow managers and the dispatcher depend on
/// this trait so they can be driven by a recording fake in tests.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<MessageRef>;

    /// Send a photo/video/document/sticker by file reference.
    ///
    /// Stickers carry no caption; implementations ignore `caption` for them.
    async fn send_media(
        &self,
        chat_id: ChatId,
        media: &Media,
        caption: Option<&str>,
        format: TextFormat,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<MessageRef>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    /// Install a command menu visible only in `chat_id`.
    async fn set_command_menu(&self, chat_id: ChatId, commands: &[BotCommand]) -> Result<()>;

    async fn send_plain(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.send_text(chat_id, text, TextFormat::Plain, None).await
    }
}

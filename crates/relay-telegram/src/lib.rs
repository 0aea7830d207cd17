//! Telegram adapter (teloxide).
//!
//! This crate implements the `relay-core` MessagingPort over Telegram Bot API and
//! feeds Telegram updates into the core dispatcher.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{
        BotCommandScope, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode,
        Recipient,
    },
    ApiError, RequestError,
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use relay_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{BotCommand, ButtonAction, InlineKeyboard, Media, MediaKind, TextFormat},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn parse_mode(format: TextFormat) -> Option<ParseMode> {
        match format {
            TextFormat::Plain => None,
            TextFormat::Html => Some(ParseMode::Html),
        }
    }

    fn map_err(e: RequestError) -> Error {
        match e {
            RequestError::Api(
                ApiError::BotBlocked
                | ApiError::BotKicked
                | ApiError::UserDeactivated
                | ApiError::ChatNotFound
                | ApiError::CantInitiateConversation,
            ) => Error::RecipientUnavailable(e.to_string()),
            other => Error::External(format!("telegram error: {other}")),
        }
    }

    fn markup(keyboard: Option<InlineKeyboard>) -> Result<Option<InlineKeyboardMarkup>> {
        let Some(keyboard) = keyboard else {
            return Ok(None);
        };
        let mut rows = Vec::with_capacity(keyboard.rows.len());
        for row in keyboard.rows {
            let mut buttons = Vec::with_capacity(row.len());
            for b in row {
                buttons.push(match b.action {
                    ButtonAction::Callback(data) => InlineKeyboardButton::callback(b.label, data),
                    ButtonAction::Url(url) => {
                        let parsed = reqwest::Url::parse(&url).map_err(|e| {
                            Error::Validation(format!("invalid button url {url}: {e}"))
                        })?;
                        InlineKeyboardButton::url(b.label, parsed)
                    }
                });
            }
            rows.push(buttons);
        }
        Ok(Some(InlineKeyboardMarkup::new(rows)))
    }

    fn message_ref(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::debug!(wait = ?d, "telegram flood limit hit, retrying");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<MessageRef> {
        let markup = Self::markup(keyboard)?;
        let mode = Self::parse_mode(format);
        let msg = self
            .with_retry(|| {
                let mut req = self.bot.send_message(Self::tg_chat(chat_id), text.to_string());
                if let Some(mode) = mode {
                    req = req.parse_mode(mode);
                }
                if let Some(markup) = &markup {
                    req = req.reply_markup(markup.clone());
                }
                req
            })
            .await?;
        Ok(Self::message_ref(chat_id, &msg))
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        media: &Media,
        caption: Option<&str>,
        format: TextFormat,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<MessageRef> {
        let markup = Self::markup(keyboard)?;
        let mode = Self::parse_mode(format);
        let chat = Self::tg_chat(chat_id);
        let file = || InputFile::file_id(media.file_id.0.clone());

        // Each request builder is its own type, so the optional fields are applied per kind.
        macro_rules! captioned {
            ($req:expr) => {{
                let mut req = $req;
                if let Some(c) = caption {
                    req = req.caption(c.to_string());
                }
                if let Some(mode) = mode {
                    req = req.parse_mode(mode);
                }
                if let Some(markup) = &markup {
                    req = req.reply_markup(markup.clone());
                }
                req
            }};
        }

        let msg = match media.kind {
            MediaKind::Photo => {
                self.with_retry(|| captioned!(self.bot.send_photo(chat, file())))
                    .await?
            }
            MediaKind::Video => {
                self.with_retry(|| captioned!(self.bot.send_video(chat, file())))
                    .await?
            }
            MediaKind::Document => {
                self.with_retry(|| captioned!(self.bot.send_document(chat, file())))
                    .await?
            }
            MediaKind::Sticker => {
                self.with_retry(|| {
                    let mut req = self.bot.send_sticker(chat, file());
                    if let Some(markup) = &markup {
                        req = req.reply_markup(markup.clone());
                    }
                    req
                })
                .await?
            }
        };
        Ok(Self::message_ref(chat_id, &msg))
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn set_command_menu(&self, chat_id: ChatId, commands: &[BotCommand]) -> Result<()> {
        let commands: Vec<teloxide::types::BotCommand> = commands
            .iter()
            .map(|c| teloxide::types::BotCommand::new(c.command.clone(), c.description.clone()))
            .collect();
        self.with_retry(|| {
            self.bot
                .set_my_commands(commands.clone())
                .scope(BotCommandScope::Chat {
                    chat_id: Recipient::Id(Self::tg_chat(chat_id)),
                })
        })
        .await?;
        Ok(())
    }
}

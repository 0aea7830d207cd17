//! Test doubles shared by the core's unit tests.

use std::{collections::HashSet, sync::Mutex};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, FileId, MessageId, MessageRef, UserId},
    errors::Error,
    formatting::{telegram_len, CAPTION_LIMIT, TEXT_LIMIT},
    messaging::{
        port::MessagingPort,
        types::{
            BotCommand, ButtonAction, CallbackQuery, IncomingMessage, InlineKeyboard, Media,
            MessageContent, RepliedMessage, Sender, TextFormat,
        },
    },
    Result,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Text {
        chat_id: ChatId,
        text: String,
        format: TextFormat,
        keyboard: Option<InlineKeyboard>,
    },
    Media {
        chat_id: ChatId,
        media: Media,
        caption: Option<String>,
        keyboard: Option<InlineKeyboard>,
    },
}

impl Outbound {
    pub fn chat_id(&self) -> ChatId {
        match self {
            Outbound::Text { chat_id, .. } | Outbound::Media { chat_id, .. } => *chat_id,
        }
    }

    /// Text, or caption for media.
    pub fn body(&self) -> &str {
        match self {
            Outbound::Text { text, .. } => text,
            Outbound::Media { caption, .. } => caption.as_deref().unwrap_or(""),
        }
    }

    pub fn keyboard(&self) -> Option<&InlineKeyboard> {
        match self {
            Outbound::Text { keyboard, .. } | Outbound::Media { keyboard, .. } => {
                keyboard.as_ref()
            }
        }
    }

    pub fn callback_payloads(&self) -> Vec<String> {
        self.keyboard()
            .map(|kb| {
                kb.rows
                    .iter()
                    .flatten()
                    .filter_map(|b| match &b.action {
                        ButtonAction::Callback(d) => Some(d.clone()),
                        ButtonAction::Url(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Records every outbound call. Chats registered with `block_bot` fail with
/// `RecipientUnavailable`; chats registered with `fail_chat` fail with a generic error.
#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    attempts: Mutex<Vec<ChatId>>,
    sent: Mutex<Vec<Outbound>>,
    deletes: Mutex<Vec<MessageRef>>,
    answers: Mutex<Vec<(String, Option<String>)>>,
    menus: Mutex<Vec<(ChatId, Vec<BotCommand>)>>,
    blocked_by: Mutex<HashSet<i64>>,
    failing: Mutex<HashSet<i64>>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(100),
            ..Default::default()
        }
    }

    pub fn block_bot(&self, chat_id: ChatId) {
        self.blocked_by.lock().unwrap().insert(chat_id.0);
    }

    pub fn fail_chat(&self, chat_id: ChatId) {
        self.failing.lock().unwrap().insert(chat_id.0);
    }

    pub fn heal_chat(&self, chat_id: ChatId) {
        self.failing.lock().unwrap().remove(&chat_id.0);
    }

    fn deliver(&self, out: Outbound) -> Result<MessageRef> {
        let chat_id = out.chat_id();
        self.attempts.lock().unwrap().push(chat_id);
        if self.blocked_by.lock().unwrap().contains(&chat_id.0) {
            return Err(Error::RecipientUnavailable(
                "Forbidden: bot was blocked by the user".to_string(),
            ));
        }
        if self.failing.lock().unwrap().contains(&chat_id.0) {
            return Err(Error::External("Bad Request: something broke".to_string()));
        }
        let too_long = match &out {
            Outbound::Text { text, .. } => telegram_len(text) > TEXT_LIMIT,
            Outbound::Media { caption, .. } => {
                caption.as_deref().map_or(0, telegram_len) > CAPTION_LIMIT
            }
        };
        if too_long {
            return Err(Error::External("Bad Request: message is too long".to_string()));
        }
        self.sent.lock().unwrap().push(out);
        let mut guard = self.next_id.lock().unwrap();
        let id = *guard;
        *guard += 1;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(id),
        })
    }

    pub fn attempts(&self) -> Vec<ChatId> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<Outbound> {
        self.sent()
            .into_iter()
            .filter(|o| o.chat_id() == chat_id)
            .collect()
    }

    pub fn texts(&self) -> Vec<(ChatId, String)> {
        self.sent()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Text { chat_id, text, .. } => Some((chat_id, text)),
                Outbound::Media { .. } => None,
            })
            .collect()
    }

    pub fn bodies_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent_to(chat_id)
            .iter()
            .map(|o| o.body().to_string())
            .collect()
    }

    pub fn last_to(&self, chat_id: ChatId) -> Option<Outbound> {
        self.sent_to(chat_id).pop()
    }

    pub fn deletes(&self) -> Vec<MessageRef> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn callback_answers(&self) -> Vec<(String, Option<String>)> {
        self.answers.lock().unwrap().clone()
    }

    pub fn command_menus(&self) -> Vec<(ChatId, Vec<BotCommand>)> {
        self.menus.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.attempts.lock().unwrap().clear();
        self.sent.lock().unwrap().clear();
        self.deletes.lock().unwrap().clear();
        self.answers.lock().unwrap().clear();
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<MessageRef> {
        self.deliver(Outbound::Text {
            chat_id,
            text: text.to_string(),
            format,
            keyboard,
        })
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        media: &Media,
        caption: Option<&str>,
        _format: TextFormat,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<MessageRef> {
        self.deliver(Outbound::Media {
            chat_id,
            media: media.clone(),
            caption: caption.map(str::to_string),
            keyboard,
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deletes.lock().unwrap().push(msg);
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }

    async fn set_command_menu(&self, chat_id: ChatId, commands: &[BotCommand]) -> Result<()> {
        self.menus
            .lock()
            .unwrap()
            .push((chat_id, commands.to_vec()));
        Ok(())
    }
}

pub fn sender(id: i64) -> Sender {
    Sender {
        user_id: UserId(id),
        first_name: format!("User{id}"),
        last_name: None,
        username: None,
    }
}

pub fn message(chat: i64, from: i64, content: MessageContent) -> IncomingMessage {
    IncomingMessage {
        chat_id: ChatId(chat),
        message_id: MessageId(1),
        sender: sender(from),
        content,
        caption: None,
        reply_to: None,
    }
}

pub fn text(chat: i64, from: i64, body: &str) -> IncomingMessage {
    message(chat, from, MessageContent::Text(body.to_string()))
}

pub fn photo(chat: i64, from: i64, file: &str) -> IncomingMessage {
    message(chat, from, MessageContent::Photo(FileId(file.to_string())))
}

pub fn reply(mut msg: IncomingMessage, replied_text: &str) -> IncomingMessage {
    msg.reply_to = Some(RepliedMessage {
        text: Some(replied_text.to_string()),
        caption: None,
        from_bot: true,
    });
    msg
}

pub fn callback(chat: i64, from: i64, data: &str) -> CallbackQuery {
    CallbackQuery {
        callback_id: format!("cb-{data}"),
        chat_id: ChatId(chat),
        user_id: UserId(from),
        data: data.to_string(),
        message: Some(MessageRef {
            chat_id: ChatId(chat),
            message_id: MessageId(9),
        }),
    }
}

//! Telegram update handlers.
//!
//! Each handler converts the teloxide update into the core's transport-neutral
//! model and hands it to the dispatcher. Errors are logged here; the update is
//! always acknowledged so Telegram does not redeliver it.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery as TgCallbackQuery, Message, User, UserId as TgUserId},
};

use relay_core::{
    domain::{ChatId, FileId, MessageId, MessageRef, UserId},
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, IncomingMessage, MessageContent, RepliedMessage, Sender},
    },
};

use crate::router::AppState;

pub async fn handle_callback(q: TgCallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(query) = convert_callback(&q) else {
        // Inline-mode callbacks carry no message; nothing here can act on them.
        ack_callback(state.messenger.as_ref(), &q.id, q.from.id.0).await;
        return Ok(());
    };

    let chat_id = query.chat_id.0;
    if let Err(e) = state.dispatcher.handle_callback(query).await {
        tracing::error!(chat_id, error = %e, "callback handling failed");
    }
    Ok(())
}

/// Clear the client's spinner; failures are logged, never propagated.
async fn ack_callback(messenger: &dyn MessagingPort, callback_id: &str, user_id: u64) -> bool {
    match messenger.answer_callback_query(callback_id, None).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "failed to answer callback");
            false
        }
    }
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(incoming) = convert_message(&msg, state.bot_id) else {
        tracing::debug!(chat_id = msg.chat.id.0, "ignoring message without sender");
        return Ok(());
    };

    let chat_id = incoming.chat_id.0;
    if let Err(e) = state.dispatcher.handle_message(incoming).await {
        tracing::error!(chat_id, error = %e, "message handling failed");
    }
    Ok(())
}

fn sender(user: &User) -> Sender {
    Sender {
        user_id: UserId(user.id.0 as i64),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
    }
}

/// First matching kind wins; the largest photo size is used.
fn content(msg: &Message) -> MessageContent {
    if let Some(text) = msg.text() {
        return MessageContent::Text(text.to_string());
    }
    if let Some(sticker) = msg.sticker() {
        return MessageContent::Sticker(FileId(sticker.file.id.clone()));
    }
    if let Some(best) = msg.photo().and_then(|sizes| sizes.last()) {
        return MessageContent::Photo(FileId(best.file.id.clone()));
    }
    if let Some(video) = msg.video() {
        return MessageContent::Video(FileId(video.file.id.clone()));
    }
    if let Some(doc) = msg.document() {
        return MessageContent::Document(FileId(doc.file.id.clone()));
    }
    MessageContent::Unsupported
}

/// Whether a replied-to message was sent by this bot, not merely by some bot.
fn sent_by(from: Option<&User>, bot_id: TgUserId) -> bool {
    from.is_some_and(|u| u.is_bot && u.id == bot_id)
}

/// `None` for messages without a user sender (channel posts).
pub fn convert_message(msg: &Message, bot_id: TgUserId) -> Option<IncomingMessage> {
    let from = msg.from()?;
    let reply_to = msg.reply_to_message().map(|r| RepliedMessage {
        text: r.text().map(str::to_string),
        caption: r.caption().map(str::to_string),
        from_bot: sent_by(r.from(), bot_id),
    });

    Some(IncomingMessage {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
        sender: sender(from),
        content: content(msg),
        caption: msg.caption().map(str::to_string),
        reply_to,
    })
}

/// `None` when the pressed keyboard's message is not available.
pub fn convert_callback(q: &TgCallbackQuery) -> Option<CallbackQuery> {
    let message = q.message.as_ref()?;
    let chat_id = ChatId(message.chat.id.0);
    Some(CallbackQuery {
        callback_id: q.id.clone(),
        chat_id,
        user_id: UserId(q.from.id.0 as i64),
        data: q.data.clone().unwrap_or_default(),
        message: Some(MessageRef {
            chat_id,
            message_id: MessageId(message.id.0),
        }),
    })
}

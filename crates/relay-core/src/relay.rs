//! Two-way relay between users and the admin forwarding chat.
//!
//! Forwarded messages carry the sender's id as a `(<digits>)` token ahead of any
//! user-controlled text. An admin reply to such a message is routed back by
//! re-reading that token; nothing else maps forwarded messages to users.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::{
    actions::CallbackAction,
    directory::UserDirectory,
    domain::{ChatId, FileId, MessageRef, UserId},
    formatting::{
        escape_html, escape_html_within, telegram_len, user_deep_link, CAPTION_LIMIT,
        TEXT_LIMIT,
    },
    messaging::{
        port::MessagingPort,
        types::{
            IncomingMessage, InlineButton, InlineKeyboard, Media, MediaKind, MessageContent,
            Sender, TextFormat,
        },
    },
    Result,
};

/// `header` + blank line + as much of the user's `body` as fits in `limit`.
fn with_header(header: &str, body: &str, limit: usize) -> String {
    let budget = limit.saturating_sub(telegram_len(header) + 2);
    format!("{header}\n\n{}", escape_html_within(body, budget))
}

/// First parenthesised integer in `text`.
pub fn extract_user_id(text: &str) -> Option<UserId> {
    static USER_ID_RE: OnceLock<Regex> = OnceLock::new();
    let re = USER_ID_RE.get_or_init(|| Regex::new(r"\((\d+)\)").expect("valid regex"));
    re.captures(text)?
        .get(1)?
        .as_str()
        .parse::<i64>()
        .ok()
        .filter(|id| *id != 0)
        .map(UserId)
}

fn sender_name(sender: &Sender) -> String {
    let full = match &sender.last_name {
        Some(last) if !last.is_empty() => format!("{} {last}", sender.first_name),
        _ => sender.first_name.clone(),
    };
    let full = full.trim();
    if !full.is_empty() {
        return full.to_string();
    }
    sender
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .map(|u| format!("@{u}"))
        .unwrap_or_else(|| "User".to_string())
}

/// Header placed on everything forwarded to the admin chat.
pub fn forward_header(sender: &Sender) -> String {
    let id = sender.user_id;
    format!(
        "📩 New message ({id}) from <a href=\"{}\">{}</a>",
        user_deep_link(id),
        escape_html(&sender_name(sender))
    )
}

/// DM link plus a block (or unblock) toggle for `user_id`.
pub fn moderation_keyboard(user_id: UserId, blocked: bool) -> InlineKeyboard {
    let toggle = if blocked {
        InlineButton::callback("✅ Unblock user", CallbackAction::Unblock(user_id).encode())
    } else {
        InlineButton::callback("🚫 Block user", CallbackAction::Block(user_id).encode())
    };
    InlineKeyboard::new(vec![vec![
        InlineButton::url("💬 Message user", user_deep_link(user_id)),
        toggle,
    ]])
}

pub struct Relay {
    directory: UserDirectory,
    messenger: Arc<dyn MessagingPort>,
    forward_chat: Option<ChatId>,
}

impl Relay {
    pub fn new(
        directory: UserDirectory,
        messenger: Arc<dyn MessagingPort>,
        forward_chat: Option<ChatId>,
    ) -> Self {
        Self {
            directory,
            messenger,
            forward_chat,
        }
    }

    /// Whether `msg` answers something the bot posted into the forwarding chat.
    pub fn is_admin_reply(&self, msg: &IncomingMessage) -> bool {
        self.forward_chat == Some(msg.chat_id)
            && msg.reply_to.as_ref().is_some_and(|r| r.from_bot)
    }

    /// Relay an admin's reply to the user named in the replied-to message. The
    /// outcome is reported back into the forwarding chat.
    pub async fn reply_to_user(&self, msg: &IncomingMessage) -> Result<()> {
        let ack_chat = msg.chat_id;
        let target = msg
            .reply_to
            .as_ref()
            .and_then(|r| r.body())
            .and_then(extract_user_id);

        let Some(user_id) = target else {
            tracing::info!(chat_id = ack_chat.0, "admin reply without a user id");
            self.messenger
                .send_plain(
                    ack_chat,
                    "❌ Reply failed: no user ID could be found in that message.",
                )
                .await?;
            return Ok(());
        };

        let to = ChatId::from(user_id);
        let caption = msg.caption.as_deref();
        let sent = match &msg.content {
            MessageContent::Text(text) => {
                self.messenger.send_text(to, text, TextFormat::Plain, None).await
            }
            MessageContent::Sticker(f) => {
                self.messenger
                    .send_media(to, &Media::new(MediaKind::Sticker, f.clone()), None, TextFormat::Plain, None)
                    .await
            }
            MessageContent::Photo(f) => {
                self.messenger
                    .send_media(to, &Media::new(MediaKind::Photo, f.clone()), caption, TextFormat::Plain, None)
                    .await
            }
            MessageContent::Video(f) => {
                self.messenger
                    .send_media(to, &Media::new(MediaKind::Video, f.clone()), caption, TextFormat::Plain, None)
                    .await
            }
            MessageContent::Document(f) => {
                self.messenger
                    .send_media(to, &Media::new(MediaKind::Document, f.clone()), caption, TextFormat::Plain, None)
                    .await
            }
            MessageContent::Unsupported => {
                self.messenger
                    .send_plain(
                        ack_chat,
                        "❌ Reply failed: this message type cannot be relayed.",
                    )
                    .await?;
                return Ok(());
            }
        };

        let ack = match sent {
            Ok(_) => {
                tracing::info!(user_id = user_id.0, admin_id = msg.sender.user_id.0, "admin reply relayed");
                "✅ Reply sent to the user.".to_string()
            }
            Err(e) if e.is_recipient_unavailable() => {
                tracing::info!(user_id = user_id.0, error = %e, "reply target unavailable");
                format!("❌ Failed to reply to user {user_id}: the user blocked the bot or no longer exists.")
            }
            Err(e) => {
                tracing::warn!(user_id = user_id.0, error = %e, "admin reply failed");
                format!("❌ Failed to reply to user {user_id}.")
            }
        };
        self.messenger.send_plain(ack_chat, &ack).await?;
        Ok(())
    }

    /// Forward a user's message into the admin chat and acknowledge it.
    pub async fn forward_to_admins(&self, msg: &IncomingMessage) -> Result<()> {
        let Some(admin_chat) = self.forward_chat else {
            tracing::warn!(
                chat_id = msg.chat_id.0,
                user_id = msg.sender.user_id.0,
                "no forwarding chat configured; message dropped"
            );
            self.messenger
                .send_plain(
                    msg.chat_id,
                    "Sorry, your message cannot be handled right now. Please try again later or contact an administrator.",
                )
                .await?;
            return Ok(());
        };

        let user_id = msg.sender.user_id;
        let blocked = self.directory.is_blocked(user_id).await.unwrap_or(false);
        let keyboard = moderation_keyboard(user_id, blocked);
        let header = forward_header(&msg.sender);
        let media_caption = match msg.caption.as_deref().filter(|c| !c.is_empty()) {
            Some(c) => with_header(&header, c, CAPTION_LIMIT),
            None => header.clone(),
        };

        let forwarded = match &msg.content {
            MessageContent::Text(text) => {
                self.messenger
                    .send_text(
                        admin_chat,
                        &with_header(&header, text, TEXT_LIMIT),
                        TextFormat::Html,
                        Some(keyboard),
                    )
                    .await
            }
            MessageContent::Photo(f) => {
                self.forward_media(admin_chat, MediaKind::Photo, f.clone(), &media_caption, keyboard)
                    .await
            }
            MessageContent::Video(f) => {
                self.forward_media(admin_chat, MediaKind::Video, f.clone(), &media_caption, keyboard)
                    .await
            }
            MessageContent::Document(f) => {
                self.forward_media(admin_chat, MediaKind::Document, f.clone(), &media_caption, keyboard)
                    .await
            }
            MessageContent::Sticker(f) => {
                // Stickers cannot carry a caption, so the header follows as its own message.
                match self
                    .messenger
                    .send_media(
                        admin_chat,
                        &Media::new(MediaKind::Sticker, f.clone()),
                        None,
                        TextFormat::Plain,
                        None,
                    )
                    .await
                {
                    Ok(_) => {
                        self.messenger
                            .send_text(admin_chat, &header, TextFormat::Html, Some(keyboard))
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            MessageContent::Unsupported => {
                self.messenger
                    .send_text(
                        admin_chat,
                        &format!("{header}\n\n[unsupported message type]"),
                        TextFormat::Html,
                        Some(keyboard),
                    )
                    .await
            }
        };

        let ack = match forwarded {
            Ok(_) => {
                tracing::debug!(user_id = user_id.0, "user message forwarded");
                "✅ Message received. We will get back to you soon."
            }
            Err(e) => {
                tracing::error!(user_id = user_id.0, error = %e, "failed to forward user message");
                "❌ Sorry, your message could not be delivered. Please try again later."
            }
        };
        self.messenger.send_plain(msg.chat_id, ack).await?;
        Ok(())
    }

    async fn forward_media(
        &self,
        admin_chat: ChatId,
        kind: MediaKind,
        file_id: FileId,
        caption: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.messenger
            .send_media(
                admin_chat,
                &Media::new(kind, file_id),
                Some(caption),
                TextFormat::Html,
                Some(keyboard),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{self, FakeMessenger, Outbound};

    const ADMIN_CHAT: i64 = -500;
    const ADMIN: i64 = 1;
    const USER: i64 = 77;

    fn relay(forward: Option<i64>) -> (Relay, Arc<FakeMessenger>) {
        let messenger = Arc::new(FakeMessenger::new());
        let relay = Relay::new(
            UserDirectory::new(Arc::new(MemoryStore::new())),
            messenger.clone(),
            forward.map(ChatId),
        );
        (relay, messenger)
    }

    #[test]
    fn extracts_first_parenthesised_integer() {
        assert_eq!(extract_user_id("📩 New message (123) from x"), Some(UserId(123)));
        assert_eq!(extract_user_id("(5) then (6)"), Some(UserId(5)));
        assert_eq!(extract_user_id("no id (abc) here"), None);
        assert_eq!(extract_user_id("(-4)"), None);
        assert_eq!(extract_user_id(""), None);
    }

    #[test]
    fn header_puts_id_before_user_controlled_name() {
        let mut sender = testing::sender(42);
        sender.first_name = "Eve (999) <b>".to_string();
        let header = forward_header(&sender);
        assert!(header.starts_with("📩 New message (42) from "));
        assert!(header.contains("Eve (999) &lt;b&gt;"));
        assert_eq!(extract_user_id(&header), Some(UserId(42)));
    }

    #[tokio::test]
    async fn forwards_text_with_moderation_buttons_and_acks() {
        let (relay, messenger) = relay(Some(ADMIN_CHAT));
        relay
            .forward_to_admins(&testing::text(USER, USER, "hi <there>"))
            .await
            .unwrap();

        let forwarded = messenger.last_to(ChatId(ADMIN_CHAT)).unwrap();
        assert!(forwarded.body().contains("(77)"));
        assert!(forwarded.body().ends_with("hi &lt;there&gt;"));
        assert_eq!(forwarded.callback_payloads(), vec!["block_77".to_string()]);
        assert!(messenger.bodies_to(ChatId(USER))[0].starts_with("✅"));
    }

    #[tokio::test]
    async fn long_text_is_cut_to_fit_after_escaping() {
        let (relay, messenger) = relay(Some(ADMIN_CHAT));
        let body = "<&>".repeat(1300);
        relay
            .forward_to_admins(&testing::text(USER, USER, &body))
            .await
            .unwrap();

        let forwarded = messenger.last_to(ChatId(ADMIN_CHAT)).unwrap();
        assert!(telegram_len(forwarded.body()) <= TEXT_LIMIT);
        assert!(forwarded.body().contains("(77)"));
        assert!(forwarded.body().ends_with("..."));
        assert!(messenger.bodies_to(ChatId(USER))[0].starts_with("✅"));
    }

    #[tokio::test]
    async fn long_media_caption_fits_caption_limit() {
        let (relay, messenger) = relay(Some(ADMIN_CHAT));
        let mut msg = testing::photo(USER, USER, "ph");
        msg.caption = Some("\"quoted\" ".repeat(200));
        relay.forward_to_admins(&msg).await.unwrap();

        let forwarded = messenger.last_to(ChatId(ADMIN_CHAT)).unwrap();
        assert!(matches!(forwarded, Outbound::Media { .. }));
        assert!(telegram_len(forwarded.body()) <= CAPTION_LIMIT);
        assert!(forwarded.body().contains("&quot;quoted&quot;"));
        assert!(messenger.bodies_to(ChatId(USER))[0].starts_with("✅"));
    }

    #[tokio::test]
    async fn sticker_is_followed_by_header_message() {
        let (relay, messenger) = relay(Some(ADMIN_CHAT));
        relay
            .forward_to_admins(&testing::message(
                USER,
                USER,
                MessageContent::Sticker(FileId("stk".into())),
            ))
            .await
            .unwrap();

        let sent = messenger.sent_to(ChatId(ADMIN_CHAT));
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[0], Outbound::Media { media, .. } if media.kind == MediaKind::Sticker));
        assert!(sent[1].body().contains("(77)"));
        assert!(sent[1].keyboard().is_some());
    }

    #[tokio::test]
    async fn unsupported_content_still_produces_placeholder() {
        let (relay, messenger) = relay(Some(ADMIN_CHAT));
        relay
            .forward_to_admins(&testing::message(USER, USER, MessageContent::Unsupported))
            .await
            .unwrap();
        assert!(messenger
            .last_to(ChatId(ADMIN_CHAT))
            .unwrap()
            .body()
            .contains("[unsupported message type]"));
    }

    #[tokio::test]
    async fn without_forward_chat_user_gets_apology() {
        let (relay, messenger) = relay(None);
        relay
            .forward_to_admins(&testing::text(USER, USER, "hello"))
            .await
            .unwrap();
        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id(), ChatId(USER));
        assert!(sent[0].body().starts_with("Sorry"));
    }

    #[tokio::test]
    async fn forward_failure_tells_the_user() {
        let (relay, messenger) = relay(Some(ADMIN_CHAT));
        messenger.fail_chat(ChatId(ADMIN_CHAT));
        relay
            .forward_to_admins(&testing::text(USER, USER, "hello"))
            .await
            .unwrap();
        assert!(messenger.bodies_to(ChatId(USER))[0].starts_with("❌"));
    }

    #[tokio::test]
    async fn admin_reply_routes_by_parsed_id() {
        let (relay, messenger) = relay(Some(ADMIN_CHAT));
        let msg = testing::reply(
            testing::text(ADMIN_CHAT, ADMIN, "Thanks!"),
            "📩 New message (77) from Bob\n\nhelp (12)",
        );
        assert!(relay.is_admin_reply(&msg));

        relay.reply_to_user(&msg).await.unwrap();

        assert_eq!(messenger.bodies_to(ChatId(USER)), vec!["Thanks!".to_string()]);
        assert_eq!(
            messenger.last_to(ChatId(ADMIN_CHAT)).unwrap().body(),
            "✅ Reply sent to the user."
        );
    }

    #[tokio::test]
    async fn admin_photo_reply_keeps_caption() {
        let (relay, messenger) = relay(Some(ADMIN_CHAT));
        let mut photo = testing::photo(ADMIN_CHAT, ADMIN, "ph");
        photo.caption = Some("look".into());
        relay
            .reply_to_user(&testing::reply(photo, "(77)"))
            .await
            .unwrap();
        match messenger.last_to(ChatId(USER)).unwrap() {
            Outbound::Media { media, caption, .. } => {
                assert_eq!(media.kind, MediaKind::Photo);
                assert_eq!(caption.as_deref(), Some("look"));
            }
            other => panic!("expected media, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn admin_reply_failures_are_specific() {
        let (relay, messenger) = relay(Some(ADMIN_CHAT));

        relay
            .reply_to_user(&testing::reply(testing::text(ADMIN_CHAT, ADMIN, "x"), "no id"))
            .await
            .unwrap();
        assert!(messenger.last_to(ChatId(ADMIN_CHAT)).unwrap().body().contains("no user ID"));

        relay
            .reply_to_user(&testing::reply(
                testing::message(ADMIN_CHAT, ADMIN, MessageContent::Unsupported),
                "(77)",
            ))
            .await
            .unwrap();
        assert!(messenger
            .last_to(ChatId(ADMIN_CHAT))
            .unwrap()
            .body()
            .contains("cannot be relayed"));

        messenger.block_bot(ChatId(USER));
        relay
            .reply_to_user(&testing::reply(testing::text(ADMIN_CHAT, ADMIN, "x"), "(77)"))
            .await
            .unwrap();
        assert!(messenger
            .last_to(ChatId(ADMIN_CHAT))
            .unwrap()
            .body()
            .contains("blocked the bot"));
    }

    #[test]
    fn reply_outside_forward_chat_is_not_an_admin_reply() {
        let (relay, _) = relay(Some(ADMIN_CHAT));
        let elsewhere = testing::reply(testing::text(ADMIN, ADMIN, "x"), "(77)");
        assert!(!relay.is_admin_reply(&elsewhere));
        let mut not_bot = testing::reply(testing::text(ADMIN_CHAT, ADMIN, "x"), "(77)");
        if let Some(r) = not_bot.reply_to.as_mut() {
            r.from_bot = false;
        }
        assert!(!relay.is_admin_reply(&not_bot));
    }
}

use crate::domain::{ChatId, FileId, MessageId, MessageRef, UserId};

/// Who sent an inbound message, as reported by the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

/// Payload of an inbound message. First matching kind wins when the transport
/// reports several (e.g. a photo with a caption is `Photo`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Photo(FileId),
    Video(FileId),
    Document(FileId),
    Sticker(FileId),
    Unsupported,
}

/// The message an inbound message replies to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepliedMessage {
    pub text: Option<String>,
    pub caption: Option<String>,
    pub from_bot: bool,
}

impl RepliedMessage {
    /// Text if present, otherwise caption.
    pub fn body(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.caption.as_deref().filter(|c| !c.is_empty()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: Sender,
    pub content: MessageContent,
    pub caption: Option<String>,
    pub reply_to: Option<RepliedMessage>,
}

impl IncomingMessage {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Parse `/cmd@botname args` into lowercase `cmd` and trimmed args.
    pub fn command(&self) -> Option<(String, String)> {
        let text = self.text()?.trim();
        if !text.starts_with('/') {
            return None;
        }
        let mut parts = text.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or("").trim();
        let rest = parts.next().unwrap_or("").trim().to_string();

        let cmd = first
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();
        if cmd.is_empty() {
            return None;
        }
        Some((cmd, rest))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackQuery {
    pub callback_id: String,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub data: String,
    /// The message carrying the pressed keyboard.
    pub message: Option<MessageRef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Html,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Sticker,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Media {
    pub kind: MediaKind,
    pub file_id: FileId,
}

impl Media {
    pub fn new(kind: MediaKind, file_id: FileId) -> Self {
        Self { kind, file_id }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ButtonAction {
    Callback(String),
    Url(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

impl InlineButton {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

/// Inline keyboard, row-major.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    pub fn single(button: InlineButton) -> Self {
        Self {
            rows: vec![vec![button]],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }

    /// `None` for an empty keyboard so callers never attach an empty markup.
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

impl BotCommand {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

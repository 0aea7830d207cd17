use crate::{
    buttons::ButtonRows,
    domain::{ChatId, MessageRef},
    formatting::{telegram_len, CAPTION_LIMIT, TEXT_LIMIT},
    messaging::{
        port::MessagingPort,
        types::{Media, MediaKind, TextFormat},
    },
    Result,
};

/// Marker prepended to every pushed broadcast.
pub const BROADCAST_PREFIX: &str = "📢 ";

/// Longest broadcast text that still composes into a deliverable message: a caption
/// when media is attached, a plain message otherwise.
pub fn max_text_len(with_media: bool) -> usize {
    let limit = if with_media { CAPTION_LIMIT } else { TEXT_LIMIT };
    limit - telegram_len(BROADCAST_PREFIX)
}

/// Broadcast under construction for one admin chat.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastDraft {
    pub text: String,
    /// Photo or video only.
    pub media: Option<Media>,
    pub buttons: ButtonRows,
}

impl BroadcastDraft {
    /// Neither text nor media: never eligible for preview or send.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.media.is_none()
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        self.media.as_ref().map(|m| m.kind)
    }

    pub fn composed_text(&self) -> String {
        format!("{BROADCAST_PREFIX}{}", self.text)
    }

    /// Deliver the composed message to `chat_id`: media with caption when media is
    /// set, otherwise text. Buttons ride along on either.
    pub async fn deliver(
        &self,
        messenger: &dyn MessagingPort,
        chat_id: ChatId,
    ) -> Result<MessageRef> {
        let keyboard = self.buttons.to_keyboard().non_empty();
        let text = self.composed_text();
        match &self.media {
            Some(media) => {
                messenger
                    .send_media(chat_id, media, Some(&text), TextFormat::Plain, keyboard)
                    .await
            }
            None => {
                messenger
                    .send_text(chat_id, &text, TextFormat::Plain, keyboard)
                    .await
            }
        }
    }
}

pub(crate) fn media_label(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Photo => "photo",
        MediaKind::Video => "video",
        MediaKind::Document => "document",
        MediaKind::Sticker => "sticker",
    }
}

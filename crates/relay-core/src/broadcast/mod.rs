//! Three-step broadcast builder with preview and background fan-out.

mod draft;
mod fanout;

pub use draft::{max_text_len, BroadcastDraft, BROADCAST_PREFIX};
pub use fanout::{fan_out, FanoutReport};

use std::{collections::HashMap, sync::Arc, sync::Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    actions::{BuilderAction, CallbackAction},
    buttons::parse_strict,
    directory::UserDirectory,
    domain::{ChatId, MessageRef},
    formatting::{escape_html, telegram_len, truncate_chars},
    messaging::{
        port::MessagingPort,
        types::{
            CallbackQuery, IncomingMessage, InlineButton, InlineKeyboard, Media, MediaKind,
            MessageContent, TextFormat,
        },
    },
    state::{BroadcastStep, ConversationStates, FlowState},
    Result,
};

const TEXT_PROMPT: &str = "Send the text of the broadcast, or press cancel:";
const MEDIA_PROMPT: &str =
    "Send one photo or one video to attach to the broadcast, or press skip:";
const BUTTONS_PROMPT: &str = "Send the broadcast buttons, one per line, as:\n<code>Button text | link</code>\n\nFor example:\n<code>Our channel | https://t.me/channel</code>\n<code>Store | https://t.me/store</code>\n\nOr press skip to clear the buttons:";
const MENU_TEXT_PREVIEW_CHARS: usize = 200;

fn builder_button(label: &str, action: BuilderAction) -> InlineButton {
    InlineButton::callback(label, CallbackAction::Builder(action).encode())
}

fn cancel_keyboard() -> InlineKeyboard {
    InlineKeyboard::single(builder_button("❌ Cancel broadcast", BuilderAction::Cancel))
}

fn skip_media_keyboard() -> InlineKeyboard {
    InlineKeyboard::single(builder_button("⏭️ Skip media", BuilderAction::SkipMedia))
}

fn skip_buttons_keyboard() -> InlineKeyboard {
    InlineKeyboard::single(builder_button("⏭️ Skip buttons", BuilderAction::SkipButtons))
}

/// Owns per-chat drafts and builder-menu handles; shares the state table with the
/// welcome flow.
pub struct BroadcastFlow {
    directory: UserDirectory,
    messenger: Arc<dyn MessagingPort>,
    states: Arc<ConversationStates>,
    drafts: Mutex<HashMap<ChatId, BroadcastDraft>>,
    menus: Mutex<HashMap<ChatId, MessageRef>>,
    shutdown: CancellationToken,
}

impl BroadcastFlow {
    pub fn new(
        directory: UserDirectory,
        messenger: Arc<dyn MessagingPort>,
        states: Arc<ConversationStates>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            directory,
            messenger,
            states,
            drafts: Mutex::new(HashMap::new()),
            menus: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    pub fn draft(&self, chat_id: ChatId) -> Option<BroadcastDraft> {
        lock(&self.drafts).get(&chat_id).cloned()
    }

    fn update_draft(&self, chat_id: ChatId, f: impl FnOnce(&mut BroadcastDraft)) {
        f(lock(&self.drafts).entry(chat_id).or_default());
    }

    fn discard(&self, chat_id: ChatId) -> Option<MessageRef> {
        self.states.clear(chat_id);
        lock(&self.drafts).remove(&chat_id);
        lock(&self.menus).remove(&chat_id)
    }

    async fn delete_quietly(&self, msg: MessageRef) {
        if let Err(e) = self.messenger.delete_message(msg).await {
            tracing::debug!(chat_id = msg.chat_id.0, error = %e, "failed to delete message");
        }
    }

    /// `/broadcast`: start a fresh draft and ask for the text.
    pub async fn start_builder(&self, chat_id: ChatId) -> Result<()> {
        self.messenger
            .send_text(chat_id, TEXT_PROMPT, TextFormat::Plain, Some(cancel_keyboard()))
            .await?;
        if let Some(stale) = self.discard(chat_id) {
            self.delete_quietly(stale).await;
        }
        lock(&self.drafts).insert(chat_id, BroadcastDraft::default());
        self.states
            .set(chat_id, FlowState::Broadcast(BroadcastStep::AwaitText));
        tracing::info!(chat_id = chat_id.0, "broadcast builder started");
        Ok(())
    }

    /// Consume admin input if a broadcast step is pending for this chat.
    pub async fn handle_input(&self, msg: &IncomingMessage) -> Result<bool> {
        let chat_id = msg.chat_id;
        let Some(step) = self.states.broadcast_step(chat_id) else {
            return Ok(false);
        };
        tracing::debug!(chat_id = chat_id.0, ?step, "broadcast input");

        match step {
            BroadcastStep::AwaitText => {
                let Some(text) = msg.text().filter(|t| !t.trim().is_empty()) else {
                    self.messenger
                        .send_text(
                            chat_id,
                            "Please send non-empty text, or press cancel.",
                            TextFormat::Plain,
                            Some(cancel_keyboard()),
                        )
                        .await?;
                    return Ok(true);
                };
                let with_media = self.draft(chat_id).is_some_and(|d| d.media.is_some());
                let limit = max_text_len(with_media);
                let len = telegram_len(text);
                if len > limit {
                    tracing::info!(chat_id = chat_id.0, len, limit, "rejected broadcast text: too long");
                    let what = if with_media { "a media caption" } else { "a message" };
                    self.messenger
                        .send_text(
                            chat_id,
                            &format!("❌ The text is too long for {what}: {len} characters, the limit is {limit}. Send a shorter text, or press cancel."),
                            TextFormat::Plain,
                            Some(cancel_keyboard()),
                        )
                        .await?;
                    return Ok(true);
                }
                self.messenger
                    .send_text(
                        chat_id,
                        &format!("Text saved! {MEDIA_PROMPT}"),
                        TextFormat::Plain,
                        Some(skip_media_keyboard()),
                    )
                    .await?;
                self.update_draft(chat_id, |d| d.text = text.to_string());
                self.states
                    .set(chat_id, FlowState::Broadcast(BroadcastStep::AwaitMedia));
                self.delete_quietly(msg.message_ref()).await;
            }
            BroadcastStep::AwaitMedia => {
                let media = match &msg.content {
                    MessageContent::Photo(f) => Media::new(MediaKind::Photo, f.clone()),
                    MessageContent::Video(f) => Media::new(MediaKind::Video, f.clone()),
                    _ => {
                        self.messenger
                            .send_text(
                                chat_id,
                                "❌ Invalid input. Send a photo or a video, or press skip.",
                                TextFormat::Plain,
                                Some(skip_media_keyboard()),
                            )
                            .await?;
                        return Ok(true);
                    }
                };
                let len = self.draft(chat_id).map_or(0, |d| telegram_len(&d.text));
                let limit = max_text_len(true);
                if len > limit {
                    tracing::info!(chat_id = chat_id.0, len, limit, "rejected broadcast media: text exceeds caption");
                    self.messenger
                        .send_text(
                            chat_id,
                            &format!("❌ A caption holds at most {limit} characters but the text has {len}. Press skip to send without media, or edit the text first."),
                            TextFormat::Plain,
                            Some(skip_media_keyboard()),
                        )
                        .await?;
                    return Ok(true);
                }
                self.prompt_buttons(chat_id, "Media saved! ").await?;
                self.update_draft(chat_id, |d| d.media = Some(media));
                self.states
                    .set(chat_id, FlowState::Broadcast(BroadcastStep::AwaitButtons));
                self.delete_quietly(msg.message_ref()).await;
            }
            BroadcastStep::AwaitButtons => {
                let Some(spec) = msg.text() else {
                    self.prompt_buttons(chat_id, "Please send the buttons as text. ")
                        .await?;
                    return Ok(true);
                };
                let rows = match parse_strict(spec) {
                    Ok(rows) => rows,
                    Err(e) => {
                        tracing::info!(chat_id = chat_id.0, line = e.line_no, "rejected broadcast buttons");
                        self.messenger
                            .send_text(
                                chat_id,
                                &e.to_string(),
                                TextFormat::Plain,
                                Some(skip_buttons_keyboard()),
                            )
                            .await?;
                        return Ok(true);
                    }
                };
                self.update_draft(chat_id, |d| d.buttons = rows);
                self.states.clear(chat_id);
                self.delete_quietly(msg.message_ref()).await;
                self.show_menu(chat_id).await?;
            }
        }
        Ok(true)
    }

    /// Returns the fan-out task when `Send` started one.
    pub async fn handle_action(
        &self,
        q: &CallbackQuery,
        action: BuilderAction,
    ) -> Result<Option<JoinHandle<FanoutReport>>> {
        let chat_id = q.chat_id;
        tracing::debug!(chat_id = chat_id.0, ?action, "broadcast builder action");

        let toast = match action {
            BuilderAction::SkipMedia => Some("✅ Media skipped"),
            BuilderAction::SkipButtons => Some("✅ Buttons skipped"),
            _ => None,
        };
        if let Err(e) = self.messenger.answer_callback_query(&q.callback_id, toast).await {
            tracing::warn!(chat_id = chat_id.0, error = %e, "failed to answer callback");
        }

        match action {
            BuilderAction::SetText => {
                self.messenger
                    .send_text(chat_id, TEXT_PROMPT, TextFormat::Plain, Some(cancel_keyboard()))
                    .await?;
                self.update_draft(chat_id, |_| {});
                self.states
                    .set(chat_id, FlowState::Broadcast(BroadcastStep::AwaitText));
            }
            BuilderAction::SetMedia => {
                self.messenger
                    .send_text(
                        chat_id,
                        MEDIA_PROMPT,
                        TextFormat::Plain,
                        Some(skip_media_keyboard()),
                    )
                    .await?;
                self.update_draft(chat_id, |_| {});
                self.states
                    .set(chat_id, FlowState::Broadcast(BroadcastStep::AwaitMedia));
            }
            BuilderAction::SkipMedia => {
                self.prompt_buttons(chat_id, "Media skipped! ").await?;
                self.update_draft(chat_id, |d| d.media = None);
                self.states
                    .set(chat_id, FlowState::Broadcast(BroadcastStep::AwaitButtons));
            }
            BuilderAction::SetButtons => {
                self.prompt_buttons(chat_id, "").await?;
                self.update_draft(chat_id, |_| {});
                self.states
                    .set(chat_id, FlowState::Broadcast(BroadcastStep::AwaitButtons));
            }
            BuilderAction::SkipButtons => {
                self.update_draft(chat_id, |d| d.buttons = Default::default());
                self.states.clear(chat_id);
                self.show_menu(chat_id).await?;
            }
            BuilderAction::Preview => self.preview(chat_id).await?,
            BuilderAction::Cancel => {
                let menu = self.discard(chat_id);
                if let Some(pressed) = q.message {
                    self.delete_quietly(pressed).await;
                }
                if let Some(menu) = menu.filter(|m| Some(*m) != q.message) {
                    self.delete_quietly(menu).await;
                }
                tracing::info!(chat_id = chat_id.0, "broadcast cancelled");
                self.messenger
                    .send_plain(chat_id, "Broadcast cancelled.")
                    .await?;
            }
            BuilderAction::Send => {
                let handle = self.send(chat_id).await?;
                if handle.is_some() {
                    if let Some(pressed) = q.message {
                        self.delete_quietly(pressed).await;
                    }
                }
                return Ok(handle);
            }
        }
        Ok(None)
    }

    async fn prompt_buttons(&self, chat_id: ChatId, lead: &str) -> Result<()> {
        self.messenger
            .send_text(
                chat_id,
                &format!("{lead}{BUTTONS_PROMPT}"),
                TextFormat::Html,
                Some(skip_buttons_keyboard()),
            )
            .await?;
        Ok(())
    }

    /// Replace the builder menu: drop the previous one, send a fresh one and
    /// remember its handle.
    pub async fn show_menu(&self, chat_id: ChatId) -> Result<()> {
        let draft = self.draft(chat_id).unwrap_or_default();

        let previous = lock(&self.menus).remove(&chat_id);
        if let Some(previous) = previous {
            self.delete_quietly(previous).await;
        }

        let sent = self
            .messenger
            .send_text(
                chat_id,
                &render_menu(&draft),
                TextFormat::Html,
                Some(menu_keyboard(&draft)),
            )
            .await?;
        lock(&self.menus).insert(chat_id, sent);
        Ok(())
    }

    pub async fn preview(&self, chat_id: ChatId) -> Result<()> {
        let draft = self.draft(chat_id).unwrap_or_default();
        if draft.is_empty() {
            tracing::info!(chat_id = chat_id.0, "preview refused: empty draft");
            self.messenger
                .send_plain(chat_id, "Cannot preview: the broadcast is empty.")
                .await?;
            return Ok(());
        }
        self.messenger.send_plain(chat_id, "--- preview ---").await?;
        draft.deliver(self.messenger.as_ref(), chat_id).await?;
        Ok(())
    }

    /// Snapshot the known users, discard the draft and start fan-out in the
    /// background. The summary is sent to `chat_id` when the task finishes.
    pub async fn send(&self, chat_id: ChatId) -> Result<Option<JoinHandle<FanoutReport>>> {
        let draft = self.draft(chat_id).unwrap_or_default();
        if draft.is_empty() {
            tracing::info!(chat_id = chat_id.0, "send refused: empty draft");
            self.messenger
                .send_plain(chat_id, "Cannot send: the broadcast is empty.")
                .await?;
            return Ok(None);
        }

        let recipients = match self.directory.known_users().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(chat_id = chat_id.0, error = %e, "failed to load broadcast recipients");
                self.messenger
                    .send_plain(chat_id, "Broadcast failed: could not load the user list.")
                    .await?;
                return Ok(None);
            }
        };

        self.discard(chat_id);
        tracing::info!(chat_id = chat_id.0, recipients = recipients.len(), "broadcast started");

        let messenger = Arc::clone(&self.messenger);
        let cancel = self.shutdown.child_token();
        Ok(Some(tokio::spawn(async move {
            let report = fan_out(Arc::clone(&messenger), &recipients, &draft, &cancel).await;
            if let Err(e) = messenger
                .send_plain(chat_id, &report.summary(recipients.len()))
                .await
            {
                tracing::warn!(chat_id = chat_id.0, error = %e, "failed to send broadcast summary");
            }
            report
        })))
    }
}

fn render_menu(draft: &BroadcastDraft) -> String {
    let mut text = String::from("📢 <b>Broadcast builder</b>\n\nReview your broadcast:\n\n");

    text.push_str("1️⃣ <b>Text:</b> ");
    if draft.text.is_empty() {
        text.push_str("❌ (not set)\n");
    } else {
        text.push_str(&format!(
            "✅ {}\n",
            escape_html(&truncate_chars(&draft.text, MENU_TEXT_PREVIEW_CHARS))
        ));
    }

    text.push_str("2️⃣ <b>Media (photo/video):</b> ");
    match draft.media_kind() {
        Some(kind) => text.push_str(&format!("✅ ({} set)\n", draft::media_label(kind))),
        None => text.push_str("❌ (not set)\n"),
    }

    text.push_str("3️⃣ <b>Buttons:</b> ");
    if draft.buttons.is_empty() {
        text.push_str("❌ (not set)\n\n");
    } else {
        text.push_str(&format!("✅ ({} set)\n\n", draft.buttons.len()));
    }

    if draft.is_empty() {
        text.push_str("Set at least the text or the media to continue.");
    } else {
        text.push_str("Press <b>Preview</b> to see the result.\nPress <b>Send</b> to push it to every user.");
    }
    text
}

fn menu_keyboard(draft: &BroadcastDraft) -> InlineKeyboard {
    let mut rows = vec![
        vec![
            builder_button("1️⃣ Edit text", BuilderAction::SetText),
            builder_button("2️⃣ Edit media", BuilderAction::SetMedia),
        ],
        vec![builder_button("3️⃣ Edit buttons", BuilderAction::SetButtons)],
    ];
    if !draft.is_empty() {
        rows.push(vec![builder_button("👀 Preview", BuilderAction::Preview)]);
        rows.push(vec![builder_button("🚀 Send", BuilderAction::Send)]);
    }
    rows.push(vec![builder_button("❌ Cancel", BuilderAction::Cancel)]);
    InlineKeyboard::new(rows)
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

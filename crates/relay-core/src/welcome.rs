//! Greeting shown on `/start`, and the two admin flows that edit it.

use std::sync::Arc;

use crate::{
    buttons::{parse_lenient, parse_strict},
    domain::ChatId,
    formatting::escape_html,
    messaging::{
        port::MessagingPort,
        types::{IncomingMessage, TextFormat},
    },
    state::{ConversationStates, FlowState, WelcomeStep},
    store::KvStore,
    Result,
};

pub const WELCOME_TEXT_KEY: &str = "config:welcome_message";
pub const WELCOME_BUTTONS_KEY: &str = "config:welcome_buttons";

/// Input that removes every welcome button.
const CLEAR_BUTTONS_INPUT: &str = "-";

pub struct WelcomeFlow {
    store: Arc<dyn KvStore>,
    messenger: Arc<dyn MessagingPort>,
    states: Arc<ConversationStates>,
    default_text: String,
}

impl WelcomeFlow {
    pub fn new(
        store: Arc<dyn KvStore>,
        messenger: Arc<dyn MessagingPort>,
        states: Arc<ConversationStates>,
        default_text: impl Into<String>,
    ) -> Self {
        Self {
            store,
            messenger,
            states,
            default_text: default_text.into(),
        }
    }

    /// Send the stored greeting (or the default) with its buttons, if any.
    pub async fn handle_start(&self, chat_id: ChatId) -> Result<()> {
        let text = match self.store.get_string(WELCOME_TEXT_KEY).await {
            Ok(Some(t)) if !t.trim().is_empty() => t,
            Ok(_) => self.default_text.clone(),
            Err(e) => {
                tracing::warn!(chat_id = chat_id.0, error = %e, "failed to load welcome text");
                self.default_text.clone()
            }
        };

        let keyboard = match self.store.get_string(WELCOME_BUTTONS_KEY).await {
            Ok(Some(raw)) => parse_lenient(&raw).to_keyboard().non_empty(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(chat_id = chat_id.0, error = %e, "failed to load welcome buttons");
                None
            }
        };

        self.messenger
            .send_text(chat_id, &text, TextFormat::Plain, keyboard)
            .await?;
        Ok(())
    }

    pub async fn start_set_message(&self, chat_id: ChatId) -> Result<()> {
        let current = self
            .current_value(WELCOME_TEXT_KEY, "(no welcome text set)", "(could not load the current welcome text)")
            .await;
        let prompt = format!(
            "Current welcome text:\n{current}\n\nSend the new welcome text (you can copy and edit the current one):"
        );
        self.messenger.send_plain(chat_id, &prompt).await?;
        self.states
            .set(chat_id, FlowState::Welcome(WelcomeStep::AwaitingMessage));
        Ok(())
    }

    pub async fn start_set_buttons(&self, chat_id: ChatId) -> Result<()> {
        let current = self
            .current_value(WELCOME_BUTTONS_KEY, "(no buttons set)", "(could not load the current buttons)")
            .await;
        let prompt = format!(
            "Current welcome buttons:\n{}\n\nSend the new buttons, one per line, as:\n<code>Button text | link</code>\n\nFor example:\n<code>Our channel | https://t.me/channel</code>\n<code>Store | https://t.me/store</code>\n\nSend <code>{CLEAR_BUTTONS_INPUT}</code> to remove all buttons.",
            escape_html(&current)
        );
        self.messenger
            .send_text(chat_id, &prompt, TextFormat::Html, None)
            .await?;
        self.states
            .set(chat_id, FlowState::Welcome(WelcomeStep::AwaitingButtons));
        Ok(())
    }

    /// Consume admin input if a welcome edit is pending for this chat.
    ///
    /// Returns `false` when no welcome flow is active so the caller can try other
    /// handlers.
    pub async fn handle_admin_input(&self, msg: &IncomingMessage) -> Result<bool> {
        let chat_id = msg.chat_id;
        let Some(step) = self.states.welcome_step(chat_id) else {
            return Ok(false);
        };

        let Some(input) = msg.text() else {
            self.messenger
                .send_plain(chat_id, "Please send this as a text message.")
                .await?;
            return Ok(true);
        };

        match step {
            WelcomeStep::AwaitingMessage => {
                self.save(chat_id, WELCOME_TEXT_KEY, input, "welcome text")
                    .await?;
            }
            WelcomeStep::AwaitingButtons => {
                let value = if input.trim() == CLEAR_BUTTONS_INPUT {
                    ""
                } else if let Err(e) = parse_strict(input) {
                    tracing::info!(chat_id = chat_id.0, line = e.line_no, "rejected welcome buttons");
                    self.messenger.send_plain(chat_id, &e.to_string()).await?;
                    return Ok(true);
                } else {
                    input
                };
                self.save(chat_id, WELCOME_BUTTONS_KEY, value, "welcome buttons")
                    .await?;
            }
        }
        Ok(true)
    }

    async fn save(&self, chat_id: ChatId, key: &str, value: &str, what: &str) -> Result<()> {
        if let Err(e) = self.store.set_string(key, value).await {
            tracing::error!(chat_id = chat_id.0, error = %e, "failed to save {what}");
            self.messenger
                .send_plain(chat_id, &format!("❌ Failed to save the {what}: {e}"))
                .await?;
            return Ok(());
        }
        self.states.clear(chat_id);
        tracing::info!(chat_id = chat_id.0, "{what} updated");
        self.messenger
            .send_plain(chat_id, &format!("✅ The {what} has been updated."))
            .await?;
        self.handle_start(chat_id).await
    }

    async fn current_value(&self, key: &str, empty: &str, unreadable: &str) -> String {
        match self.store.get_string(key).await {
            Ok(Some(v)) if !v.is_empty() => v,
            Ok(_) => empty.to_string(),
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read current value");
                unreadable.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_WELCOME_TEXT;
    use crate::messaging::types::{ButtonAction, MessageContent};
    use crate::store::MemoryStore;
    use crate::testing::{self, FakeMessenger, Outbound};

    struct Harness {
        store: Arc<MemoryStore>,
        messenger: Arc<FakeMessenger>,
        states: Arc<ConversationStates>,
        flow: WelcomeFlow,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(FakeMessenger::new());
        let states = Arc::new(ConversationStates::new());
        let flow = WelcomeFlow::new(
            store.clone(),
            messenger.clone(),
            states.clone(),
            DEFAULT_WELCOME_TEXT,
        );
        Harness {
            store,
            messenger,
            states,
            flow,
        }
    }

    const ADMIN: i64 = 1;

    #[tokio::test]
    async fn start_falls_back_to_default_without_keyboard() {
        let h = harness();
        h.flow.handle_start(ChatId(9)).await.unwrap();

        let sent = h.messenger.last_to(ChatId(9)).unwrap();
        assert_eq!(sent.body(), DEFAULT_WELCOME_TEXT);
        assert!(sent.keyboard().is_none());
    }

    #[tokio::test]
    async fn start_renders_stored_text_and_buttons_dropping_bad_lines() {
        let h = harness();
        h.store.set_string(WELCOME_TEXT_KEY, "Hi there").await.unwrap();
        h.store
            .set_string(WELCOME_BUTTONS_KEY, "A | https://a.test\nbroken line\nB | https://b.test")
            .await
            .unwrap();

        h.flow.handle_start(ChatId(9)).await.unwrap();

        let sent = h.messenger.last_to(ChatId(9)).unwrap();
        assert_eq!(sent.body(), "Hi there");
        let kb = sent.keyboard().unwrap();
        assert_eq!(kb.rows.len(), 1);
        assert_eq!(kb.rows[0].len(), 2);
        assert_eq!(kb.rows[0][1].action, ButtonAction::Url("https://b.test".to_string()));
    }

    #[tokio::test]
    async fn start_skips_stored_buttons_with_unusable_links() {
        let h = harness();
        h.store
            .set_string(WELCOME_BUTTONS_KEY, "Shop | shop.test\nSite | https://site.test")
            .await
            .unwrap();

        h.flow.handle_start(ChatId(9)).await.unwrap();

        let kb = h.messenger.last_to(ChatId(9)).unwrap().keyboard().cloned().unwrap();
        assert_eq!(kb.rows.len(), 1);
        assert_eq!(kb.rows[0].len(), 1);
        assert_eq!(kb.rows[0][0].action, ButtonAction::Url("https://site.test".to_string()));
    }

    #[tokio::test]
    async fn set_message_flow_stores_verbatim_and_previews() {
        let h = harness();
        let chat = ChatId(ADMIN);
        h.flow.start_set_message(chat).await.unwrap();
        assert_eq!(
            h.states.get(chat),
            Some(FlowState::Welcome(WelcomeStep::AwaitingMessage))
        );
        assert!(h.messenger.bodies_to(chat)[0].contains("(no welcome text set)"));

        let handled = h
            .flow
            .handle_admin_input(&testing::text(ADMIN, ADMIN, "  Hello <world>  "))
            .await
            .unwrap();
        assert!(handled);
        assert_eq!(h.states.get(chat), None);
        assert_eq!(
            h.store.get_string(WELCOME_TEXT_KEY).await.unwrap().as_deref(),
            Some("  Hello <world>  ")
        );
        let bodies = h.messenger.bodies_to(chat);
        assert!(bodies.iter().any(|b| b.contains("updated")));
        assert_eq!(bodies.last().map(String::as_str), Some("  Hello <world>  "));
    }

    #[tokio::test]
    async fn set_buttons_rejects_invalid_lines_and_keeps_state() {
        let h = harness();
        let chat = ChatId(ADMIN);
        h.flow.start_set_buttons(chat).await.unwrap();

        h.flow
            .handle_admin_input(&testing::text(ADMIN, ADMIN, "Good | https://ok.test\nBad | ftp://x"))
            .await
            .unwrap();

        assert_eq!(
            h.states.get(chat),
            Some(FlowState::Welcome(WelcomeStep::AwaitingButtons))
        );
        assert_eq!(h.store.get_string(WELCOME_BUTTONS_KEY).await.unwrap(), None);
        assert!(h
            .messenger
            .bodies_to(chat)
            .last()
            .unwrap()
            .contains("Line 2"));

        h.flow
            .handle_admin_input(&testing::text(ADMIN, ADMIN, "Good | https://ok.test"))
            .await
            .unwrap();
        assert_eq!(h.states.get(chat), None);
        assert_eq!(
            h.store.get_string(WELCOME_BUTTONS_KEY).await.unwrap().as_deref(),
            Some("Good | https://ok.test")
        );
    }

    #[tokio::test]
    async fn dash_clears_buttons() {
        let h = harness();
        h.store
            .set_string(WELCOME_BUTTONS_KEY, "A | https://a.test")
            .await
            .unwrap();
        h.flow.start_set_buttons(ChatId(ADMIN)).await.unwrap();
        h.flow
            .handle_admin_input(&testing::text(ADMIN, ADMIN, " - "))
            .await
            .unwrap();

        assert_eq!(
            h.store.get_string(WELCOME_BUTTONS_KEY).await.unwrap().as_deref(),
            Some("")
        );
        let last = h.messenger.last_to(ChatId(ADMIN)).unwrap();
        assert!(last.keyboard().is_none());
    }

    #[tokio::test]
    async fn input_without_pending_flow_is_not_handled() {
        let h = harness();
        let handled = h
            .flow
            .handle_admin_input(&testing::text(ADMIN, ADMIN, "hello"))
            .await
            .unwrap();
        assert!(!handled);
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn non_text_input_reprompts() {
        let h = harness();
        h.flow.start_set_message(ChatId(ADMIN)).await.unwrap();
        let handled = h
            .flow
            .handle_admin_input(&testing::message(ADMIN, ADMIN, MessageContent::Unsupported))
            .await
            .unwrap();
        assert!(handled);
        assert_eq!(
            h.states.get(ChatId(ADMIN)),
            Some(FlowState::Welcome(WelcomeStep::AwaitingMessage))
        );
    }

    #[tokio::test]
    async fn store_failure_reports_and_keeps_state() {
        let h = harness();
        h.flow.start_set_message(ChatId(ADMIN)).await.unwrap();
        h.store.fail_all(true);

        h.flow
            .handle_admin_input(&testing::text(ADMIN, ADMIN, "new"))
            .await
            .unwrap();

        assert_eq!(
            h.states.get(ChatId(ADMIN)),
            Some(FlowState::Welcome(WelcomeStep::AwaitingMessage))
        );
        assert!(matches!(
            h.messenger.last_to(ChatId(ADMIN)),
            Some(Outbound::Text { ref text, .. }) if text.starts_with("❌")
        ));
    }
}

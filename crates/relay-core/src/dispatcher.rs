//! Entry point for every inbound event.
//!
//! Events for one chat are processed one at a time: each handler runs under that
//! chat's lock, so flow state never sees interleaved input. Broadcast fan-out is
//! the exception and runs as a detached task outside any lock.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    actions::CallbackAction,
    blocklist::BlockList,
    broadcast::{BroadcastFlow, FanoutReport},
    commands::{self, AdminCommand},
    config::Config,
    directory::UserDirectory,
    domain::{ChatId, UserId},
    messaging::{
        port::MessagingPort,
        types::{BotCommand, CallbackQuery, IncomingMessage},
    },
    relay::Relay,
    state::ConversationStates,
    store::KvStore,
    welcome::WelcomeFlow,
    Result,
};

pub const BLOCKED_NOTICE: &str = "You have been blocked and cannot use this bot.";

/// Size at which idle per-chat locks are swept before a new chat is added.
const CHAT_LOCKS_SWEEP_AT: usize = 1024;

#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: ChatId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            if map.len() >= CHAT_LOCKS_SWEEP_AT && !map.contains_key(&chat_id.0) {
                // A lock referenced only by the map is neither held nor awaited.
                map.retain(|_, l| Arc::strong_count(l) > 1);
            }
            map.entry(chat_id.0)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }

    #[cfg(test)]
    async fn is_tracked(&self, chat_id: ChatId) -> bool {
        self.inner.lock().await.contains_key(&chat_id.0)
    }
}

pub struct Dispatcher {
    admins: HashSet<i64>,
    directory: UserDirectory,
    messenger: Arc<dyn MessagingPort>,
    states: Arc<ConversationStates>,
    welcome: WelcomeFlow,
    broadcast: BroadcastFlow,
    blocklist: BlockList,
    relay: Relay,
    chat_locks: ChatLocks,
    fanouts: std::sync::Mutex<Vec<JoinHandle<FanoutReport>>>,
}

impl Dispatcher {
    /// `shutdown` is observed by every fan-out task this dispatcher starts.
    pub fn new(
        cfg: &Config,
        store: Arc<dyn KvStore>,
        messenger: Arc<dyn MessagingPort>,
        shutdown: CancellationToken,
    ) -> Self {
        let directory = UserDirectory::new(store.clone());
        let states = Arc::new(ConversationStates::new());
        Self {
            admins: cfg.admin_ids.clone(),
            welcome: WelcomeFlow::new(
                store,
                messenger.clone(),
                states.clone(),
                cfg.welcome_default_text.clone(),
            ),
            broadcast: BroadcastFlow::new(
                directory.clone(),
                messenger.clone(),
                states.clone(),
                shutdown,
            ),
            blocklist: BlockList::new(directory.clone(), messenger.clone(), cfg.blocked_page_size),
            relay: Relay::new(
                directory.clone(),
                messenger.clone(),
                cfg.forward_chat_id.map(ChatId),
            ),
            directory,
            messenger,
            states,
            chat_locks: ChatLocks::default(),
            fanouts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admins.contains(&user_id.0)
    }

    pub fn states(&self) -> &ConversationStates {
        &self.states
    }

    pub fn broadcast(&self) -> &BroadcastFlow {
        &self.broadcast
    }

    pub async fn handle_message(&self, msg: IncomingMessage) -> Result<()> {
        let _guard = self.chat_locks.lock_chat(msg.chat_id).await;

        if let Err(e) = self.directory.observe(&msg.sender).await {
            tracing::warn!(user_id = msg.sender.user_id.0, error = %e, "failed to record sender");
        }

        if self.is_admin(msg.sender.user_id) {
            self.handle_admin_message(&msg).await
        } else {
            self.handle_user_message(&msg).await
        }
    }

    async fn handle_admin_message(&self, msg: &IncomingMessage) -> Result<()> {
        if self.relay.is_admin_reply(msg) {
            return self.relay.reply_to_user(msg).await;
        }

        if let Some(cmd) = AdminCommand::parse(msg) {
            tracing::info!(chat_id = msg.chat_id.0, ?cmd, "admin command");
            return self.run_command(cmd, msg.chat_id).await;
        }

        if self.welcome.handle_admin_input(msg).await? {
            return Ok(());
        }
        if self.broadcast.handle_input(msg).await? {
            return Ok(());
        }

        tracing::debug!(
            chat_id = msg.chat_id.0,
            user_id = msg.sender.user_id.0,
            "admin message matched no handler"
        );
        Ok(())
    }

    async fn run_command(&self, cmd: AdminCommand, chat_id: ChatId) -> Result<()> {
        match cmd {
            AdminCommand::Start => {
                self.install_menu(chat_id, &commands::admin_menu()).await;
                self.welcome.handle_start(chat_id).await
            }
            AdminCommand::SetWelcome => self.welcome.start_set_message(chat_id).await,
            AdminCommand::SetButtons => self.welcome.start_set_buttons(chat_id).await,
            AdminCommand::Broadcast => self.broadcast.start_builder(chat_id).await,
            AdminCommand::ListBlocked => self.blocklist.show_page(chat_id, 1).await,
            AdminCommand::Stats => self.blocklist.show_stats(chat_id).await,
        }
    }

    async fn handle_user_message(&self, msg: &IncomingMessage) -> Result<()> {
        let user_id = msg.sender.user_id;
        match self.directory.is_blocked(user_id).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::debug!(user_id = user_id.0, "message from blocked user");
                self.messenger.send_plain(msg.chat_id, BLOCKED_NOTICE).await?;
                return Ok(());
            }
            Err(e) => {
                tracing::error!(user_id = user_id.0, error = %e, "block check failed; dropping message");
                return Ok(());
            }
        }

        if commands::is_start(msg) {
            self.install_menu(msg.chat_id, &commands::user_menu()).await;
            return self.welcome.handle_start(msg.chat_id).await;
        }

        self.relay.forward_to_admins(msg).await
    }

    async fn install_menu(&self, chat_id: ChatId, menu: &[BotCommand]) {
        if let Err(e) = self.messenger.set_command_menu(chat_id, menu).await {
            tracing::warn!(chat_id = chat_id.0, error = %e, "failed to set command menu");
        }
    }

    pub async fn handle_callback(&self, q: CallbackQuery) -> Result<()> {
        let _guard = self.chat_locks.lock_chat(q.chat_id).await;

        let action = CallbackAction::parse(&q.data);
        if action == CallbackAction::Unrecognized {
            tracing::debug!(chat_id = q.chat_id.0, data = %q.data, "unrecognized callback");
            return self.messenger.answer_callback_query(&q.callback_id, None).await;
        }
        if !self.is_admin(q.user_id) {
            tracing::warn!(user_id = q.user_id.0, data = %q.data, "callback from non-admin ignored");
            return self.messenger.answer_callback_query(&q.callback_id, None).await;
        }

        match action {
            CallbackAction::Unblock(user_id) => self.blocklist.unblock(&q, user_id).await,
            CallbackAction::Block(user_id) => self.blocklist.block(&q, user_id).await,
            CallbackAction::PageNav { page, .. } => self.blocklist.paginate(&q, page).await,
            CallbackAction::Builder(builder) => {
                if let Some(handle) = self.broadcast.handle_action(&q, builder).await? {
                    let mut fanouts = self
                        .fanouts
                        .lock()
                        .unwrap_or_else(|e| e.into_inner());
                    fanouts.retain(|h| !h.is_finished());
                    fanouts.push(handle);
                }
                Ok(())
            }
            CallbackAction::Unrecognized => Ok(()),
        }
    }

    /// Wait for every fan-out started so far.
    pub async fn join_broadcasts(&self) -> Vec<FanoutReport> {
        let handles: Vec<_> = {
            let mut fanouts = self.fanouts.lock().unwrap_or_else(|e| e.into_inner());
            fanouts.drain(..).collect()
        };
        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(error = %e, "broadcast task failed"),
            }
        }
        reports
    }
}

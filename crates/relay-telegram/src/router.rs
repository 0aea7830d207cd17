use std::sync::Arc;

use teloxide::{dispatching::Dispatcher as TgDispatcher, dptree, prelude::*, types::UserId};
use tokio_util::sync::CancellationToken;

use relay_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use relay_core::{
    config::Config, dispatcher::Dispatcher, messaging::port::MessagingPort, store::KvStore,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub messenger: Arc<dyn MessagingPort>,
    /// Admin replies only count when they answer one of this bot's messages.
    pub bot_id: UserId,
}

/// Long-poll Telegram until `shutdown` fires, then wait for in-flight broadcasts
/// to stop and report.
pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<dyn KvStore>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    tracing::info!(
        username = me.username(),
        admins = cfg.admin_ids.len(),
        forward_chat = ?cfg.forward_chat_id,
        "relay bot started"
    );
    if cfg.forward_chat_id.is_none() {
        tracing::warn!("FORWARD_TO_ADMIN_ID is not set; user messages cannot be relayed");
    }

    // Throttle outbound calls so broadcast fan-out stays under Telegram flood limits.
    // The adapter still retries once on RetryAfter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        &cfg,
        store,
        messenger.clone(),
        shutdown.clone(),
    ));
    let state = Arc::new(AppState {
        dispatcher: dispatcher.clone(),
        messenger,
        bot_id: me.id,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut tg = TgDispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();

    let stop = tg.shutdown_token();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        tracing::info!("shutting down");
        if let Ok(done) = stop.shutdown() {
            done.await;
        }
    });

    tg.dispatch().await;

    let reports = dispatcher.join_broadcasts().await;
    if !reports.is_empty() {
        tracing::info!(broadcasts = reports.len(), "in-flight broadcasts finished");
    }
    Ok(())
}

//! Admin-facing block/unblock actions, the paginated blocked list and `/stats`.

use std::sync::Arc;

use crate::{
    actions::{CallbackAction, PageDirection},
    directory::{UserDirectory, UserProfile},
    domain::{ChatId, UserId},
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, InlineButton, InlineKeyboard, TextFormat},
    },
    Result,
};

/// One rendered page of the blocked list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockedPage {
    pub page: usize,
    pub total_pages: usize,
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

/// Pages needed for `total` entries; at least one so an empty list still renders.
pub fn total_pages(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1)).max(1)
}

/// Out-of-range pages clamp to page 1.
pub fn clamp_page(page: usize, total_pages: usize) -> usize {
    if page < 1 || page > total_pages {
        1
    } else {
        page
    }
}

fn unblock_label(user_id: UserId, profile: &UserProfile) -> String {
    if !profile.username.is_empty() {
        format!("Unblock @{} ({user_id})", profile.username)
    } else if !profile.first_name.is_empty() {
        format!("Unblock {} ({user_id})", profile.full_name())
    } else {
        format!("Unblock {user_id}")
    }
}

pub struct BlockList {
    directory: UserDirectory,
    messenger: Arc<dyn MessagingPort>,
    page_size: usize,
}

impl BlockList {
    pub fn new(directory: UserDirectory, messenger: Arc<dyn MessagingPort>, page_size: usize) -> Self {
        Self {
            directory,
            messenger,
            page_size: page_size.max(1),
        }
    }

    /// Render `page` (1-based) of the blocked list.
    pub async fn render_page(&self, page: usize) -> Result<BlockedPage> {
        let blocked = self.directory.blocked_users().await?;
        if blocked.is_empty() {
            return Ok(BlockedPage {
                page: 1,
                total_pages: 1,
                text: "No users are blocked.".to_string(),
                keyboard: None,
            });
        }

        let total_pages = total_pages(blocked.len(), self.page_size);
        let page = clamp_page(page, total_pages);
        let start = (page - 1) * self.page_size;
        let end = (start + self.page_size).min(blocked.len());

        let mut text = format!("Blocked users (page {page}/{total_pages}):\n");
        let mut rows = Vec::with_capacity(end - start + 1);
        for (offset, &user_id) in blocked[start..end].iter().enumerate() {
            // A missing profile only degrades the label.
            let profile = match self.directory.profile(user_id).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(user_id = user_id.0, error = %e, "failed to load user profile");
                    UserProfile::default()
                }
            };
            text.push_str(&format!(
                "{}. {} - ID: {user_id}\n",
                start + offset + 1,
                profile.display_name()
            ));
            rows.push(vec![InlineButton::callback(
                unblock_label(user_id, &profile),
                CallbackAction::Unblock(user_id).encode(),
            )]);
        }

        if total_pages > 1 {
            let mut nav = Vec::new();
            if page > 1 {
                nav.push(InlineButton::callback(
                    "⬅️ Previous",
                    CallbackAction::PageNav {
                        direction: PageDirection::Prev,
                        page: page - 1,
                    }
                    .encode(),
                ));
            }
            if page < total_pages {
                nav.push(InlineButton::callback(
                    "Next ➡️",
                    CallbackAction::PageNav {
                        direction: PageDirection::Next,
                        page: page + 1,
                    }
                    .encode(),
                ));
            }
            rows.push(nav);
        }

        Ok(BlockedPage {
            page,
            total_pages,
            text,
            keyboard: InlineKeyboard::new(rows).non_empty(),
        })
    }

    pub async fn show_page(&self, chat_id: ChatId, page: usize) -> Result<()> {
        match self.render_page(page).await {
            Ok(rendered) => {
                self.messenger
                    .send_text(
                        chat_id,
                        &rendered.text,
                        TextFormat::Plain,
                        rendered.keyboard,
                    )
                    .await?;
            }
            Err(e) => {
                tracing::error!(chat_id = chat_id.0, error = %e, "failed to load blocked users");
                self.messenger
                    .send_plain(chat_id, "❌ Failed to load the blocked users.")
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn show_stats(&self, chat_id: ChatId) -> Result<()> {
        let text = match self.directory.stats().await {
            Ok(s) => format!(
                "User statistics:\n- Total users: {}\n- Active users: {}\n- Blocked users: {}",
                s.total, s.active, s.blocked
            ),
            Err(e) => {
                tracing::error!(chat_id = chat_id.0, error = %e, "failed to load user statistics");
                "❌ Failed to load user statistics.".to_string()
            }
        };
        self.messenger.send_plain(chat_id, &text).await?;
        Ok(())
    }

    /// Unblock from a list button, then show page 1 again.
    pub async fn unblock(&self, q: &CallbackQuery, user_id: UserId) -> Result<()> {
        if let Err(e) = self.directory.unblock(user_id).await {
            tracing::error!(user_id = user_id.0, error = %e, "failed to unblock user");
            self.messenger
                .answer_callback_query(&q.callback_id, Some("❌ Failed to unblock the user"))
                .await?;
            return Ok(());
        }
        tracing::info!(user_id = user_id.0, admin_id = q.user_id.0, "user unblocked");
        self.messenger
            .answer_callback_query(&q.callback_id, Some("✅ User unblocked"))
            .await?;
        self.show_page(q.chat_id, 1).await
    }

    pub async fn block(&self, q: &CallbackQuery, user_id: UserId) -> Result<()> {
        let toast = match self.directory.block(user_id).await {
            Ok(()) => {
                tracing::info!(user_id = user_id.0, admin_id = q.user_id.0, "user blocked");
                "✅ User blocked"
            }
            Err(e) => {
                tracing::error!(user_id = user_id.0, error = %e, "failed to block user");
                "❌ Failed to block the user"
            }
        };
        self.messenger
            .answer_callback_query(&q.callback_id, Some(toast))
            .await
    }

    pub async fn paginate(&self, q: &CallbackQuery, page: usize) -> Result<()> {
        self.show_page(q.chat_id, page).await?;
        self.messenger.answer_callback_query(&q.callback_id, None).await
    }
}

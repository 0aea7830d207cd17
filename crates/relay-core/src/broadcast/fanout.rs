//! Best-effort delivery of one draft to a snapshot of recipients.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{domain::UserId, messaging::port::MessagingPort};

use super::draft::BroadcastDraft;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub attempted: usize,
    pub delivered: usize,
    /// Recipients that blocked the bot or no longer exist.
    pub unavailable: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl FanoutReport {
    pub fn summary(&self, total: usize) -> String {
        if self.cancelled {
            format!(
                "⚠️ Broadcast interrupted: delivered to {} of {total} users before shutdown.",
                self.delivered
            )
        } else {
            format!(
                "✅ Broadcast finished: delivered to {} of {total} users.",
                self.delivered
            )
        }
    }
}

/// Send `draft` to every recipient in order. A failed recipient is logged and
/// skipped; nothing is retried. Stops early once `cancel` fires.
pub async fn fan_out(
    messenger: Arc<dyn MessagingPort>,
    recipients: &[UserId],
    draft: &BroadcastDraft,
    cancel: &CancellationToken,
) -> FanoutReport {
    let mut report = FanoutReport::default();

    for &user_id in recipients {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        report.attempted += 1;

        match draft.deliver(messenger.as_ref(), user_id.into()).await {
            Ok(_) => report.delivered += 1,
            Err(e) if e.is_recipient_unavailable() => {
                report.unavailable += 1;
                tracing::info!(user_id = user_id.0, "broadcast recipient unavailable, skipping");
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(user_id = user_id.0, error = %e, "broadcast delivery failed");
            }
        }
    }

    tracing::info!(
        attempted = report.attempted,
        delivered = report.delivered,
        unavailable = report.unavailable,
        failed = report.failed,
        cancelled = report.cancelled,
        "broadcast fan-out done"
    );
    report
}

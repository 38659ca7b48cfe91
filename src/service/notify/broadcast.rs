use super::Notifier;
use crate::utils::mask_id;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

/// Sends `text` to every recipient; a failed delivery is counted and skipped.
pub async fn broadcast(notifier: &dyn Notifier, recipients: &[i64], text: &str) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for chat_id in recipients {
        match notifier.send(*chat_id, text, None).await {
            Ok(_) => report.sent += 1,
            Err(e) => {
                warn!("Broadcast to {} failed: {}", mask_id(*chat_id), e);
                report.failed += 1;
            }
        }
    }
    info!("Broadcast finished: {} sent, {} failed", report.sent, report.failed);
    report
}

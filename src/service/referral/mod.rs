mod model;
mod repository;

pub use model::Referral;
pub use repository::{ReferralRepository, TursoReferralRepository};

use std::sync::Arc;

use crate::storage::StorageError;
use crate::utils::mask_id;

const PAYLOAD_PREFIX: &str = "ref_";

/// Extracts the referrer's telegram id from a `/start ref_<id>` payload.
pub fn parse_referral_payload(payload: &str) -> Option<i64> {
    payload
        .trim()
        .strip_prefix(PAYLOAD_PREFIX)
        .and_then(|id| id.parse::<i64>().ok())
        .filter(|id| *id > 0)
}

pub fn referral_link(bot_username: &str, telegram_id: i64) -> String {
    format!("https://t.me/{}?start={}{}", bot_username, PAYLOAD_PREFIX, telegram_id)
}

#[derive(Clone)]
pub struct ReferralService {
    referrals: Arc<dyn ReferralRepository>,
}

impl ReferralService {
    pub fn new(referrals: Arc<dyn ReferralRepository>) -> Self {
        info!("Initializing ReferralService...");
        info!("ReferralService initialized");
        Self { referrals }
    }

    /// Links a new customer to the one who invited them. Self-referrals are ignored.
    pub async fn attribute(&self, referrer_telegram_id: i64, referee_telegram_id: i64) -> Result<Option<Referral>, StorageError> {
        if referrer_telegram_id == referee_telegram_id {
            warn!("Ignoring self-referral from {}", mask_id(referee_telegram_id));
            return Ok(None);
        }

        if let Some(existing) = self.referrals.find_by_referee(referee_telegram_id).await? {
            return Ok(Some(existing));
        }

        let referral = self.referrals.create(referrer_telegram_id, referee_telegram_id).await?;
        info!(
            "Referral recorded: {} invited {}",
            mask_id(referral.referrer_telegram_id),
            mask_id(referral.referee_telegram_id)
        );
        Ok(Some(referral))
    }

    pub async fn invited_count(&self, referrer_telegram_id: i64) -> Result<i64, StorageError> {
        self.referrals.count_by_referrer(referrer_telegram_id).await
    }
}

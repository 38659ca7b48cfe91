use async_trait::async_trait;
use chrono::Utc;
use libsql::{params, Row};

use crate::service::subscription::{insert_subscription, NewSubscription, Subscription};
use crate::storage::{encode_time, row_required_time, StorageError, TursoClient};

use super::model::Referral;

#[async_trait]
pub trait ReferralRepository: Send + Sync {
    /// Records the pair unless the referee already has a referrer; returns the stored row.
    async fn create(&self, referrer_telegram_id: i64, referee_telegram_id: i64) -> Result<Referral, StorageError>;
    async fn find_by_referee(&self, referee_telegram_id: i64) -> Result<Option<Referral>, StorageError>;
    /// Flips `bonus_granted` and stores the referrer's bonus subscription in one transaction.
    /// Returns `None`, writing nothing, when the bonus was already granted.
    async fn grant_bonus(&self, id: i64, subscription: NewSubscription) -> Result<Option<Subscription>, StorageError>;
    async fn count_by_referrer(&self, referrer_telegram_id: i64) -> Result<i64, StorageError>;
}

fn referral_from_row(row: &Row) -> Result<Referral, StorageError> {
    Ok(Referral {
        id: row.get::<i64>(0)?,
        referrer_telegram_id: row.get::<i64>(1)?,
        referee_telegram_id: row.get::<i64>(2)?,
        bonus_granted: row.get::<i64>(3)? != 0,
        used_at: row_required_time(row, 4)?,
    })
}

#[derive(Clone)]
pub struct TursoReferralRepository {
    turso: TursoClient,
}

impl TursoReferralRepository {
    pub fn new(turso: TursoClient) -> Self {
        Self { turso }
    }
}

#[async_trait]
impl ReferralRepository for TursoReferralRepository {
    async fn create(&self, referrer_telegram_id: i64, referee_telegram_id: i64) -> Result<Referral, StorageError> {
        let conn = self.turso.get_connection().await?;
        conn.execute(
            "INSERT INTO referral (referrer_telegram_id, referee_telegram_id, bonus_granted, used_at) \
             VALUES (?1, ?2, 0, ?3) ON CONFLICT(referee_telegram_id) DO NOTHING",
            params![referrer_telegram_id, referee_telegram_id, encode_time(&Utc::now())],
        )
        .await?;

        self.find_by_referee(referee_telegram_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("referral for {}", referee_telegram_id)))
    }

    async fn find_by_referee(&self, referee_telegram_id: i64) -> Result<Option<Referral>, StorageError> {
        let conn = self.turso.get_connection().await?;
        let mut rows = conn
            .query(
                "SELECT id, referrer_telegram_id, referee_telegram_id, bonus_granted, used_at \
                 FROM referral WHERE referee_telegram_id = ?1",
                params![referee_telegram_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(referral_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn grant_bonus(&self, id: i64, subscription: NewSubscription) -> Result<Option<Subscription>, StorageError> {
        let conn = self.turso.get_connection().await?;
        let tx = conn.transaction().await?;

        let changed = tx
            .execute(
                "UPDATE referral SET bonus_granted = 1 WHERE id = ?1 AND bonus_granted = 0",
                params![id],
            )
            .await?;
        if changed != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        let subscription = insert_subscription(&tx, &subscription).await?;
        tx.commit().await?;
        Ok(Some(subscription))
    }

    async fn count_by_referrer(&self, referrer_telegram_id: i64) -> Result<i64, StorageError> {
        let conn = self.turso.get_connection().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM referral WHERE referrer_telegram_id = ?1",
                params![referrer_telegram_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }
}

use async_trait::async_trait;
use chrono::Utc;
use libsql::{params, params::Params, Row, Value};

use crate::service::subscription::{insert_subscription, NewSubscription, Subscription};
use crate::storage::{encode_time, optional_text, row_required_time, row_text, row_time, StorageError, TursoClient};

use super::model::{InvoiceKind, NewPurchase, Purchase, PurchaseStatus};

#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    async fn create(&self, new: NewPurchase) -> Result<Purchase, StorageError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Purchase>, StorageError>;
    async fn find_by_external_id(&self, kind: InvoiceKind, external_id: &str) -> Result<Option<Purchase>, StorageError>;
    /// New -> Pending, recording the backend's correlation id and payment url.
    async fn mark_pending(
        &self,
        id: i64,
        external_id: Option<&str>,
        payment_url: Option<&str>,
    ) -> Result<bool, StorageError>;
    /// New/Pending -> Cancelled. Returns whether this call changed the row.
    async fn mark_cancelled(&self, id: i64) -> Result<bool, StorageError>;
    /// Pending -> Paid together with the subscription it pays for, atomically.
    /// Returns `None` when the purchase was no longer Pending, in which case nothing is written.
    async fn settle(&self, id: i64, subscription: NewSubscription) -> Result<Option<Subscription>, StorageError>;
    /// Latest paid recurring purchase per customer that the platform still renews.
    async fn find_latest_active_recurring(&self, customer_ids: &[i64]) -> Result<Vec<Purchase>, StorageError>;
    /// Stops renewal for every recurring purchase of the customer. Returns the number of rows touched.
    async fn stop_auto_renew(&self, customer_id: i64) -> Result<u64, StorageError>;
}

const PURCHASE_COLUMNS: &str = "id, customer_id, invoice_kind, status, amount, currency, months, \
     external_id, payment_url, auto_renew, created_at, paid_at";

fn purchase_from_row(row: &Row) -> Result<Purchase, StorageError> {
    let kind = row_text(row, 2)?.unwrap_or_default();
    let status = row_text(row, 3)?.unwrap_or_default();

    Ok(Purchase {
        id: row.get::<i64>(0)?,
        customer_id: row.get::<i64>(1)?,
        invoice_kind: kind
            .parse::<InvoiceKind>()
            .map_err(|e| StorageError::Decode(e.to_string()))?,
        status: status.parse::<PurchaseStatus>().map_err(StorageError::Decode)?,
        amount: row.get::<f64>(4)?,
        currency: row_text(row, 5)?.unwrap_or_default(),
        months: row.get::<i64>(6)?,
        external_id: row_text(row, 7)?,
        payment_url: row_text(row, 8)?,
        auto_renew: row.get::<i64>(9)? != 0,
        created_at: row_required_time(row, 10)?,
        paid_at: row_time(row, 11)?,
    })
}

#[derive(Clone)]
pub struct TursoPurchaseRepository {
    turso: TursoClient,
}

impl TursoPurchaseRepository {
    pub fn new(turso: TursoClient) -> Self {
        Self { turso }
    }
}

#[async_trait]
impl PurchaseRepository for TursoPurchaseRepository {
    async fn create(&self, new: NewPurchase) -> Result<Purchase, StorageError> {
        let conn = self.turso.get_connection().await?;
        let now = Utc::now();
        let auto_renew = new.invoice_kind.is_recurring();
        conn.execute(
            "INSERT INTO purchase (customer_id, invoice_kind, status, amount, currency, months, auto_renew, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.customer_id,
                new.invoice_kind.as_str(),
                PurchaseStatus::New.as_str(),
                new.amount,
                new.currency.as_str(),
                new.months,
                auto_renew as i64,
                encode_time(&now)
            ],
        )
        .await?;

        Ok(Purchase {
            id: conn.last_insert_rowid(),
            customer_id: new.customer_id,
            invoice_kind: new.invoice_kind,
            status: PurchaseStatus::New,
            amount: new.amount,
            currency: new.currency,
            months: new.months,
            external_id: None,
            payment_url: None,
            auto_renew,
            created_at: now,
            paid_at: None,
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Purchase>, StorageError> {
        let conn = self.turso.get_connection().await?;
        let sql = format!("SELECT {} FROM purchase WHERE id = ?1", PURCHASE_COLUMNS);
        let mut rows = conn.query(&sql, params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(purchase_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_by_external_id(&self, kind: InvoiceKind, external_id: &str) -> Result<Option<Purchase>, StorageError> {
        let conn = self.turso.get_connection().await?;
        let sql = format!(
            "SELECT {} FROM purchase WHERE invoice_kind = ?1 AND external_id = ?2 ORDER BY id DESC LIMIT 1",
            PURCHASE_COLUMNS
        );
        let mut rows = conn.query(&sql, params![kind.as_str(), external_id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(purchase_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn mark_pending(
        &self,
        id: i64,
        external_id: Option<&str>,
        payment_url: Option<&str>,
    ) -> Result<bool, StorageError> {
        let conn = self.turso.get_connection().await?;
        let changed = conn
            .execute(
                "UPDATE purchase SET status = 'pending', external_id = ?1, payment_url = ?2 \
                 WHERE id = ?3 AND status = 'new'",
                params![optional_text(external_id), optional_text(payment_url), id],
            )
            .await?;
        Ok(changed == 1)
    }

    async fn mark_cancelled(&self, id: i64) -> Result<bool, StorageError> {
        let conn = self.turso.get_connection().await?;
        let changed = conn
            .execute(
                "UPDATE purchase SET status = 'cancelled' WHERE id = ?1 AND status IN ('new', 'pending')",
                params![id],
            )
            .await?;
        Ok(changed == 1)
    }

    async fn settle(&self, id: i64, subscription: NewSubscription) -> Result<Option<Subscription>, StorageError> {
        let conn = self.turso.get_connection().await?;
        let tx = conn.transaction().await?;

        let changed = tx
            .execute(
                "UPDATE purchase SET status = 'paid', paid_at = ?1 WHERE id = ?2 AND status = 'pending'",
                params![encode_time(&Utc::now()), id],
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

    async fn find_latest_active_recurring(&self, customer_ids: &[i64]) -> Result<Vec<Purchase>, StorageError> {
        if customer_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.turso.get_connection().await?;
        let placeholders = (1..=customer_ids.len())
            .map(|i| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM purchase WHERE invoice_kind = ?1 AND status = 'paid' AND customer_id IN ({}) \
             ORDER BY customer_id, created_at DESC, id DESC",
            PURCHASE_COLUMNS, placeholders
        );

        let mut values = vec![Value::Text(InvoiceKind::SubscriptionPlatform.as_str().to_string())];
        values.extend(customer_ids.iter().map(|id| Value::Integer(*id)));
        let mut rows = conn.query(&sql, Params::Positional(values)).await?;

        let mut latest: Vec<Purchase> = Vec::new();
        while let Some(row) = rows.next().await? {
            let purchase = purchase_from_row(&row)?;
            if latest.last().map(|p| p.customer_id) != Some(purchase.customer_id) {
                latest.push(purchase);
            }
        }

        Ok(latest
            .into_iter()
            .filter(|p| p.auto_renew)
            .collect())
    }

    async fn stop_auto_renew(&self, customer_id: i64) -> Result<u64, StorageError> {
        let conn = self.turso.get_connection().await?;
        let changed = conn
            .execute(
                "UPDATE purchase SET auto_renew = 0 WHERE customer_id = ?1 AND invoice_kind = ?2 AND auto_renew = 1",
                params![customer_id, InvoiceKind::SubscriptionPlatform.as_str()],
            )
            .await?;
        Ok(changed)
    }
}

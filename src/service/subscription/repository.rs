use async_trait::async_trait;
use chrono::Utc;
use libsql::{params, Connection, Row};

use crate::storage::{encode_time, row_required_time, row_text, StorageError, TursoClient};

use super::model::{next_sequence, NewSubscription, Subscription};

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Inserts the subscription and refreshes the customer's link/expiry projection in one transaction.
    async fn create(&self, new: NewSubscription) -> Result<Subscription, StorageError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Subscription>, StorageError>;
    /// Active subscriptions, newest first.
    async fn find_active(&self, customer_id: i64) -> Result<Vec<Subscription>, StorageError>;
    async fn next_sequence(&self, customer_id: i64) -> Result<i64, StorageError>;
    async fn rename(&self, id: i64, name: &str) -> Result<bool, StorageError>;
    async fn deactivate(&self, id: i64) -> Result<bool, StorageError>;
}

const SUBSCRIPTION_COLUMNS: &str =
    "id, customer_id, sequence, link, expire_at, name, description, is_active, created_at";

pub(crate) fn subscription_from_row(row: &Row) -> Result<Subscription, StorageError> {
    Ok(Subscription {
        id: row.get::<i64>(0)?,
        customer_id: row.get::<i64>(1)?,
        sequence: row.get::<i64>(2)?,
        link: row_text(row, 3)?.unwrap_or_default(),
        expire_at: row_required_time(row, 4)?,
        name: row_text(row, 5)?.unwrap_or_default(),
        description: row_text(row, 6)?.unwrap_or_default(),
        is_active: row.get::<i64>(7)? != 0,
        created_at: row_required_time(row, 8)?,
    })
}

/// Runs the insert and the projection update on `conn`, which may be inside a transaction.
pub(crate) async fn insert_subscription(conn: &Connection, new: &NewSubscription) -> Result<Subscription, StorageError> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO subscription (customer_id, sequence, link, expire_at, name, description, is_active, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
        params![
            new.customer_id,
            new.sequence,
            new.link.as_str(),
            encode_time(&new.expire_at),
            new.name.as_str(),
            new.description.as_str(),
            encode_time(&now)
        ],
    )
    .await?;
    let id = conn.last_insert_rowid();

    conn.execute(
        "UPDATE customer SET subscription_link = ?1, expire_at = ?2 WHERE id = ?3",
        params![new.link.as_str(), encode_time(&new.expire_at), new.customer_id],
    )
    .await?;

    Ok(Subscription {
        id,
        customer_id: new.customer_id,
        sequence: new.sequence,
        link: new.link.clone(),
        expire_at: new.expire_at,
        name: new.name.clone(),
        description: new.description.clone(),
        is_active: true,
        created_at: now,
    })
}

#[derive(Clone)]
pub struct TursoSubscriptionRepository {
    turso: TursoClient,
}

impl TursoSubscriptionRepository {
    pub fn new(turso: TursoClient) -> Self {
        Self { turso }
    }
}

#[async_trait]
impl SubscriptionRepository for TursoSubscriptionRepository {
    async fn create(&self, new: NewSubscription) -> Result<Subscription, StorageError> {
        let conn = self.turso.get_connection().await?;
        let tx = conn.transaction().await?;
        let subscription = insert_subscription(&tx, &new).await?;
        tx.commit().await?;
        Ok(subscription)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Subscription>, StorageError> {
        let conn = self.turso.get_connection().await?;
        let sql = format!("SELECT {} FROM subscription WHERE id = ?1", SUBSCRIPTION_COLUMNS);
        let mut rows = conn.query(&sql, params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(subscription_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_active(&self, customer_id: i64) -> Result<Vec<Subscription>, StorageError> {
        let conn = self.turso.get_connection().await?;
        let sql = format!(
            "SELECT {} FROM subscription WHERE customer_id = ?1 AND is_active = 1 ORDER BY created_at DESC, id DESC",
            SUBSCRIPTION_COLUMNS
        );
        let mut rows = conn.query(&sql, params![customer_id]).await?;

        let mut subscriptions = Vec::new();
        while let Some(row) = rows.next().await? {
            subscriptions.push(subscription_from_row(&row)?);
        }
        Ok(subscriptions)
    }

    async fn next_sequence(&self, customer_id: i64) -> Result<i64, StorageError> {
        let conn = self.turso.get_connection().await?;
        let mut rows = conn
            .query(
                "SELECT \
                 (SELECT COUNT(*) FROM subscription WHERE customer_id = ?1 AND is_active = 1), \
                 (SELECT COALESCE(MAX(sequence), 0) FROM subscription WHERE customer_id = ?1)",
                params![customer_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(next_sequence(row.get::<i64>(0)?, row.get::<i64>(1)?)),
            None => Ok(1),
        }
    }

    async fn rename(&self, id: i64, name: &str) -> Result<bool, StorageError> {
        let conn = self.turso.get_connection().await?;
        let changed = conn
            .execute("UPDATE subscription SET name = ?1 WHERE id = ?2", params![name, id])
            .await?;
        Ok(changed == 1)
    }

    async fn deactivate(&self, id: i64) -> Result<bool, StorageError> {
        let conn = self.turso.get_connection().await?;
        let changed = conn
            .execute(
                "UPDATE subscription SET is_active = 0 WHERE id = ?1 AND is_active = 1",
                params![id],
            )
            .await?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::customer::{CustomerRepository, TursoCustomerRepository};
    use crate::testing::{new_subscription, TempDatabase};
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_create_updates_customer_projection() {
        let db = TempDatabase::new().await;
        let customers = TursoCustomerRepository::new(db.turso.clone());
        let repo = TursoSubscriptionRepository::new(db.turso.clone());
        let customer = customers.create(100, "en").await.unwrap();
        let expire_at = Utc.with_ymd_and_hms(2026, 11, 1, 12, 0, 0).unwrap();

        let created = repo.create(new_subscription(customer.id, 1, expire_at)).await.unwrap();

        let stored = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.sequence, 1);
        assert_eq!(stored.expire_at, expire_at);
        assert_eq!(stored.link, created.link);
        assert!(stored.is_active);
        let customer = customers.find_by_id(customer.id).await.unwrap().unwrap();
        assert_eq!(customer.subscription_link.as_deref(), Some(created.link.as_str()));
        assert_eq!(customer.expire_at, Some(expire_at));
    }

    #[tokio::test]
    async fn test_next_sequence_never_reuses_ordinals() {
        let db = TempDatabase::new().await;
        let customers = TursoCustomerRepository::new(db.turso.clone());
        let repo = TursoSubscriptionRepository::new(db.turso.clone());
        let customer = customers.create(100, "en").await.unwrap();
        let expire_at = Utc.with_ymd_and_hms(2026, 11, 1, 12, 0, 0).unwrap();

        assert_eq!(repo.next_sequence(customer.id).await.unwrap(), 1);
        let first = repo.create(new_subscription(customer.id, 1, expire_at)).await.unwrap();
        repo.create(new_subscription(customer.id, 2, expire_at)).await.unwrap();
        assert_eq!(repo.next_sequence(customer.id).await.unwrap(), 3);

        assert!(repo.deactivate(first.id).await.unwrap());
        assert!(!repo.deactivate(first.id).await.unwrap());
        assert_eq!(repo.next_sequence(customer.id).await.unwrap(), 3);

        let other = customers.create(200, "en").await.unwrap();
        assert_eq!(repo.next_sequence(other.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_active_newest_first_and_rename() {
        let db = TempDatabase::new().await;
        let customers = TursoCustomerRepository::new(db.turso.clone());
        let repo = TursoSubscriptionRepository::new(db.turso.clone());
        let customer = customers.create(100, "en").await.unwrap();
        let expire_at = Utc.with_ymd_and_hms(2026, 11, 1, 12, 0, 0).unwrap();

        let first = repo.create(new_subscription(customer.id, 1, expire_at)).await.unwrap();
        let second = repo
            .create(new_subscription(customer.id, 2, expire_at + Duration::days(30)))
            .await
            .unwrap();
        let third = repo.create(new_subscription(customer.id, 3, expire_at)).await.unwrap();
        repo.deactivate(second.id).await.unwrap();

        let active: Vec<i64> = repo
            .find_active(customer.id)
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(active, vec![third.id, first.id]);

        assert!(repo.rename(first.id, "Laptop").await.unwrap());
        assert!(!repo.rename(9999, "Nothing").await.unwrap());
        assert_eq!(repo.find_by_id(first.id).await.unwrap().unwrap().name, "Laptop");
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Row};

use crate::storage::{encode_time, row_required_time, row_text, row_time, StorageError, TursoClient};

use super::model::{Customer, ExpiringCustomer};

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Customer>, StorageError>;
    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<Customer>, StorageError>;
    async fn create(&self, telegram_id: i64, language: &str) -> Result<Customer, StorageError>;
    async fn update_language(&self, id: i64, language: &str) -> Result<(), StorageError>;
    /// Customers whose earliest unexpired active subscription ends within `[start, end]`.
    async fn find_expiring_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExpiringCustomer>, StorageError>;
    async fn all_telegram_ids(&self) -> Result<Vec<i64>, StorageError>;
}

const CUSTOMER_COLUMNS: &str = "c.id, c.telegram_id, c.language, c.subscription_link, c.expire_at, c.created_at";

fn customer_from_row(row: &Row) -> Result<Customer, StorageError> {
    Ok(Customer {
        id: row.get::<i64>(0)?,
        telegram_id: row.get::<i64>(1)?,
        language: row_text(row, 2)?.unwrap_or_else(|| "en".to_string()),
        subscription_link: row_text(row, 3)?,
        expire_at: row_time(row, 4)?,
        created_at: row_required_time(row, 5)?,
    })
}

#[derive(Clone)]
pub struct TursoCustomerRepository {
    turso: TursoClient,
}

impl TursoCustomerRepository {
    pub fn new(turso: TursoClient) -> Self {
        Self { turso }
    }

    async fn find_one(&self, column: &str, value: i64) -> Result<Option<Customer>, StorageError> {
        let conn = self.turso.get_connection().await?;
        let sql = format!("SELECT {} FROM customer c WHERE c.{} = ?1", CUSTOMER_COLUMNS, column);
        let mut rows = conn.query(&sql, params![value]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(customer_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CustomerRepository for TursoCustomerRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Customer>, StorageError> {
        self.find_one("id", id).await
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<Customer>, StorageError> {
        self.find_one("telegram_id", telegram_id).await
    }

    async fn create(&self, telegram_id: i64, language: &str) -> Result<Customer, StorageError> {
        let conn = self.turso.get_connection().await?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO customer (telegram_id, language, created_at) VALUES (?1, ?2, ?3)",
            params![telegram_id, language, encode_time(&now)],
        )
        .await?;

        self.find_by_telegram_id(telegram_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("customer {}", telegram_id)))
    }

    async fn update_language(&self, id: i64, language: &str) -> Result<(), StorageError> {
        let conn = self.turso.get_connection().await?;
        conn.execute("UPDATE customer SET language = ?1 WHERE id = ?2", params![language, id])
            .await?;
        Ok(())
    }

    async fn find_expiring_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExpiringCustomer>, StorageError> {
        let conn = self.turso.get_connection().await?;
        let sql = format!(
            "SELECT {}, MIN(s.expire_at) AS earliest FROM customer c \
             JOIN subscription s ON s.customer_id = c.id \
             WHERE s.is_active = 1 AND s.expire_at >= ?1 \
             GROUP BY c.id HAVING earliest <= ?2",
            CUSTOMER_COLUMNS
        );
        let mut rows = conn
            .query(&sql, params![encode_time(&start), encode_time(&end)])
            .await?;

        let mut customers = Vec::new();
        while let Some(row) = rows.next().await? {
            customers.push(ExpiringCustomer {
                customer: customer_from_row(&row)?,
                expire_at: row_required_time(&row, 6)?,
            });
        }
        Ok(customers)
    }

    async fn all_telegram_ids(&self) -> Result<Vec<i64>, StorageError> {
        let conn = self.turso.get_connection().await?;
        let mut rows = conn.query("SELECT telegram_id FROM customer ORDER BY id", ()).await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<i64>(0)?);
        }
        Ok(ids)
    }
}

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Database, Row, Value};
use std::sync::Arc;

use super::{schema, StorageError};

#[derive(Clone)]
pub struct TursoClient {
    inner: Arc<Database>,
}

impl TursoClient {
    /// Opens a remote database, or a local file when the url uses the `file:` scheme.
    pub async fn new(url: &str, token: &str) -> Result<Self, StorageError> {
        info!("Initializing TursoClient...");
        let db = match url.strip_prefix("file:") {
            Some(path) => Builder::new_local(path).build().await?,
            None => Builder::new_remote(url.to_string(), token.to_string()).build().await?,
        };

        let client = Self { inner: Arc::new(db) };
        client.migrate().await?;

        info!("TursoClient initialized");
        Ok(client)
    }

    pub async fn get_connection(&self) -> Result<Connection, StorageError> {
        let conn = self.inner.connect().map_err(StorageError::Turso)?;
        Ok(conn)
    }

    pub async fn ping(&self) -> Result<(), StorageError> {
        let conn = self.get_connection().await?;
        let mut rows = conn.query("SELECT 1", ()).await?;
        match rows.next().await? {
            Some(_) => Ok(()),
            None => Err(StorageError::Other("Turso ping returned no rows".to_string())),
        }
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        let conn = self.get_connection().await?;
        for statement in schema::STATEMENTS {
            conn.execute(statement, ()).await?;
        }
        info!("Database schema is up to date");
        Ok(())
    }
}

pub(crate) fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn decode_time(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

pub(crate) fn optional_text(value: Option<&str>) -> Value {
    match value {
        Some(text) => Value::Text(text.to_string()),
        None => Value::Null,
    }
}

pub(crate) fn row_text(row: &Row, idx: i32) -> Result<Option<String>, StorageError> {
    match row.get_value(idx)? {
        Value::Text(text) => Ok(Some(text)),
        Value::Null => Ok(None),
        other => Err(StorageError::Decode(format!("column {} is not text: {:?}", idx, other))),
    }
}

pub(crate) fn row_time(row: &Row, idx: i32) -> Result<Option<DateTime<Utc>>, StorageError> {
    row_text(row, idx)?.as_deref().map(decode_time).transpose()
}

pub(crate) fn row_required_time(row: &Row, idx: i32) -> Result<DateTime<Utc>, StorageError> {
    row_time(row, idx)?.ok_or_else(|| StorageError::Decode(format!("column {} is null", idx)))
}

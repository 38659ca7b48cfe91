use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub telegram_id: i64,
    pub language: String,
    /// Link and expiry of the most recently created subscription.
    pub subscription_link: Option<String>,
    pub expire_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A customer together with the expiry of their earliest still-running subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiringCustomer {
    pub customer: Customer,
    pub expire_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub customer: Customer,
    pub created: bool,
    pub referred_by: Option<i64>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub customer_id: i64,
    /// 1-based ordinal among every subscription issued to the customer.
    pub sequence: i64,
    pub link: String,
    pub expire_at: DateTime<Utc>,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub customer_id: i64,
    pub sequence: i64,
    pub link: String,
    pub expire_at: DateTime<Utc>,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Expiring,
    Expired,
}

impl Subscription {
    pub fn state_at(&self, now: DateTime<Utc>) -> SubscriptionState {
        if self.expire_at <= now {
            SubscriptionState::Expired
        } else if self.expire_at - now <= chrono::Duration::hours(24) {
            SubscriptionState::Expiring
        } else {
            SubscriptionState::Active
        }
    }
}

/// Next ordinal: one past whichever is larger, the active count or the highest ordinal ever issued.
pub fn next_sequence(active_count: i64, max_issued: i64) -> i64 {
    active_count.max(max_issued) + 1
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A referrer/referee pair keyed by telegram ids. A referee has at most one referrer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: i64,
    pub referrer_telegram_id: i64,
    pub referee_telegram_id: i64,
    pub bonus_granted: bool,
    pub used_at: DateTime<Utc>,
}

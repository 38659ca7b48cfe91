use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastAudience {
    All,
    Admins,
}

impl BroadcastAudience {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastAudience::All => "all",
            BroadcastAudience::Admins => "admins",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "all" => Some(BroadcastAudience::All),
            "admins" => Some(BroadcastAudience::Admins),
            _ => None,
        }
    }
}

/// What the next plain text message from a chat should be treated as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PendingAction {
    Rename { subscription_id: i64 },
    BroadcastText { audience: BroadcastAudience },
    BroadcastConfirm { audience: BroadcastAudience, text: String },
}

/// The "awaiting payment" message shown for a purchase, removed once it is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMessage {
    pub chat_id: i64,
    pub message_id: i32,
}

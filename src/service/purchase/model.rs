use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::PaymentError;
use crate::service::subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    Crypto,
    HostedCheckout,
    Stars,
    SubscriptionPlatform,
}

impl InvoiceKind {
    pub const ALL: [InvoiceKind; 4] = [
        InvoiceKind::Crypto,
        InvoiceKind::HostedCheckout,
        InvoiceKind::Stars,
        InvoiceKind::SubscriptionPlatform,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceKind::Crypto => "crypto",
            InvoiceKind::HostedCheckout => "checkout",
            InvoiceKind::Stars => "stars",
            InvoiceKind::SubscriptionPlatform => "tribute",
        }
    }

    /// Subscription-platform purchases renew on the platform side until cancelled there.
    pub fn is_recurring(&self) -> bool {
        matches!(self, InvoiceKind::SubscriptionPlatform)
    }
}

impl fmt::Display for InvoiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceKind {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PaymentError::UnsupportedInvoiceKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    New,
    Pending,
    Paid,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::New => "new",
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Paid => "paid",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(PurchaseStatus::New),
            "pending" => Ok(PurchaseStatus::Pending),
            "paid" => Ok(PurchaseStatus::Paid),
            "cancelled" => Ok(PurchaseStatus::Cancelled),
            other => Err(format!("unknown purchase status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: i64,
    pub customer_id: i64,
    pub invoice_kind: InvoiceKind,
    pub status: PurchaseStatus,
    pub amount: f64,
    pub currency: String,
    pub months: i64,
    /// Provider-side invoice/payment id used to match webhooks.
    pub external_id: Option<String>,
    pub payment_url: Option<String>,
    /// Whether the platform will keep charging; cleared when the platform reports a cancellation.
    pub auto_renew: bool,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPurchase {
    pub customer_id: i64,
    pub invoice_kind: InvoiceKind,
    pub amount: f64,
    pub currency: String,
    pub months: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedPurchase {
    pub purchase_id: i64,
    pub payment_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReferralOutcome {
    NoReferral,
    AlreadyGranted,
    Granted { referrer_telegram_id: i64, subscription: Subscription },
    /// The purchase itself stays completed; only the bonus step failed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    AlreadyProcessed,
    Completed {
        subscription: Subscription,
        referral: ReferralOutcome,
    },
}

impl ProcessOutcome {
    pub fn subscription(&self) -> Option<&Subscription> {
        match self {
            ProcessOutcome::Completed { subscription, .. } => Some(subscription),
            ProcessOutcome::AlreadyProcessed => None,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            ProcessOutcome::Completed {
                referral: ReferralOutcome::Failed(_),
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_kind_from_str() {
        for kind in InvoiceKind::ALL {
            assert_eq!(kind.as_str().parse::<InvoiceKind>().unwrap(), kind);
        }
        let err = "paypal".parse::<InvoiceKind>().unwrap_err();
        assert!(matches!(err, PaymentError::UnsupportedInvoiceKind(ref s) if s == "paypal"));
    }

    #[test]
    fn test_only_platform_kind_is_recurring() {
        let recurring: Vec<_> = InvoiceKind::ALL.into_iter().filter(InvoiceKind::is_recurring).collect();
        assert_eq!(recurring, vec![InvoiceKind::SubscriptionPlatform]);
    }
}

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::{GatewayError, Invoice, PaymentBackend};
use crate::service::customer::Customer;
use crate::service::purchase::{InvoiceKind, Purchase};

type HmacSha256 = Hmac<Sha256>;

/// Webhook event from the subscription platform.
#[derive(Debug, Clone, Deserialize)]
pub struct TributeEvent {
    pub name: String,
    pub payload: TributePayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TributePayload {
    pub telegram_user_id: i64,
    #[serde(default)]
    pub subscription_id: Option<i64>,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl TributePayload {
    /// Amounts arrive in minor units.
    pub fn amount(&self) -> f64 {
        self.amount as f64 / 100.0
    }

    /// Identifies one billing of one platform subscription, so redelivered events map to
    /// the same purchase while each renewal gets its own.
    pub fn reference(&self) -> Option<String> {
        let subscription_id = self.subscription_id?;
        let period = self.expires_at.as_deref().unwrap_or(self.period.as_str());
        Some(format!("{}:{}", subscription_id, period))
    }
}

pub fn months_for_period(period: &str) -> i64 {
    match period {
        "quarterly" => 3,
        "halfyearly" => 6,
        "yearly" | "annual" => 12,
        _ => 1,
    }
}

/// The platform signs the raw body with HMAC-SHA256 keyed by the API key.
pub fn verify_tribute_signature(api_key: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(api_key.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Customers subscribe on the platform itself, so there is no invoice to create here.
pub struct TributeBackend {
    currency: String,
}

impl TributeBackend {
    pub fn new(currency: String) -> Self {
        Self { currency }
    }
}

#[async_trait]
impl PaymentBackend for TributeBackend {
    fn kind(&self) -> InvoiceKind {
        InvoiceKind::SubscriptionPlatform
    }

    fn currency(&self) -> &str {
        &self.currency
    }

    async fn create_invoice(&self, _purchase: &Purchase, _customer: &Customer) -> Result<Invoice, GatewayError> {
        Ok(Invoice::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_months_for_period() {
        assert_eq!(months_for_period("monthly"), 1);
        assert_eq!(months_for_period("quarterly"), 3);
        assert_eq!(months_for_period("halfyearly"), 6);
        assert_eq!(months_for_period("yearly"), 12);
        assert_eq!(months_for_period("weird"), 1);
    }

    #[test]
    fn test_signature() {
        let body = br#"{"name":"new_subscription"}"#;
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(verify_tribute_signature("secret", body, &signature));
        assert!(!verify_tribute_signature("other", body, &signature));
    }

    #[test]
    fn test_event_parsing() {
        let raw = r#"{
            "name": "new_subscription",
            "created_at": "2026-10-18T10:00:00Z",
            "sent_at": "2026-10-18T10:00:01Z",
            "payload": {"subscription_id": 9, "period": "quarterly", "amount": 89900,
                        "currency": "rub", "telegram_user_id": 555, "expires_at": "2027-01-18T10:00:00Z"}
        }"#;
        let event: TributeEvent = serde_json::from_str(raw).unwrap();

        assert_eq!(event.payload.telegram_user_id, 555);
        assert_eq!(months_for_period(&event.payload.period), 3);
        assert!((event.payload.amount() - 899.0).abs() < f64::EPSILON);
        assert_eq!(event.payload.reference().as_deref(), Some("9:2027-01-18T10:00:00Z"));
    }

    #[test]
    fn test_reference_requires_subscription_id() {
        let event: TributeEvent =
            serde_json::from_str(r#"{"name": "new_subscription", "payload": {"telegram_user_id": 1, "period": "monthly"}}"#)
                .unwrap();
        assert_eq!(event.payload.reference(), None);

        let event: TributeEvent = serde_json::from_str(
            r#"{"name": "new_subscription", "payload": {"telegram_user_id": 1, "subscription_id": 4, "period": "monthly"}}"#,
        )
        .unwrap();
        assert_eq!(event.payload.reference().as_deref(), Some("4:monthly"));
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::{invoice_description, GatewayError, Invoice, PaymentBackend};
use crate::config::YookassaConfig;
use crate::service::customer::Customer;
use crate::service::purchase::{InvoiceKind, Purchase};

#[derive(Debug, Clone, Deserialize)]
pub struct YookassaPayment {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub confirmation: Option<Confirmation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Confirmation {
    pub confirmation_url: Option<String>,
}

/// Body of a YooKassa HTTP notification.
#[derive(Debug, Clone, Deserialize)]
pub struct YookassaNotification {
    pub event: String,
    pub object: YookassaPayment,
}

impl YookassaPayment {
    pub fn purchase_id(&self) -> Option<i64> {
        self.metadata.get("purchase_id").and_then(|id| id.parse().ok())
    }
}

pub struct YookassaBackend {
    client: Client,
    config: YookassaConfig,
}

impl YookassaBackend {
    pub fn new(config: YookassaConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// Re-reads a payment from the API; notifications carry no signature.
    pub async fn fetch_payment(&self, payment_id: &str) -> Result<YookassaPayment, GatewayError> {
        let response = self
            .client
            .get(self.endpoint(&format!("payments/{}", payment_id)))
            .basic_auth(&self.config.shop_id, Some(&self.config.secret_key))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::ApiError(format!(
                "Failed to fetch payment {}: {}",
                payment_id,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentBackend for YookassaBackend {
    fn kind(&self) -> InvoiceKind {
        InvoiceKind::HostedCheckout
    }

    fn currency(&self) -> &str {
        "RUB"
    }

    async fn create_invoice(&self, purchase: &Purchase, customer: &Customer) -> Result<Invoice, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("payments"))
            .basic_auth(&self.config.shop_id, Some(&self.config.secret_key))
            .header("Idempotence-Key", Uuid::new_v4().to_string())
            .json(&serde_json::json!({
                "amount": {
                    "value": format!("{:.2}", purchase.amount),
                    "currency": purchase.currency,
                },
                "capture": true,
                "confirmation": {
                    "type": "redirect",
                    "return_url": self.config.return_url,
                },
                "description": invoice_description(purchase, customer),
                "metadata": {
                    "purchase_id": purchase.id.to_string(),
                    "customer_id": customer.id.to_string(),
                },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::ApiError(format!(
                "Failed to create checkout payment: {}",
                response.status()
            )));
        }

        let payment: YookassaPayment = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let url = payment
            .confirmation
            .and_then(|c| c.confirmation_url)
            .ok_or_else(|| GatewayError::InvalidResponse("Confirmation URL not found".into()))?;

        Ok(Invoice {
            url: Some(url),
            external_id: Some(payment.id),
        })
    }
}

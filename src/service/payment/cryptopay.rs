use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{invoice_description, GatewayError, Invoice, PaymentBackend};
use crate::config::CryptoPayConfig;
use crate::service::customer::Customer;
use crate::service::purchase::{InvoiceKind, Purchase};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CreatedInvoice {
    invoice_id: i64,
    bot_invoice_url: Option<String>,
    pay_url: Option<String>,
}

/// Body of a Crypto Pay webhook call.
#[derive(Debug, Clone, Deserialize)]
pub struct CryptoPayUpdate {
    pub update_type: String,
    pub payload: CryptoPayInvoice,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoPayInvoice {
    pub invoice_id: i64,
    pub status: String,
    /// Our purchase id, echoed back.
    pub payload: Option<String>,
}

impl CryptoPayUpdate {
    pub fn is_paid(&self) -> bool {
        self.update_type == "invoice_paid" && self.payload.status == "paid"
    }
}

/// Crypto Pay signs the raw body with HMAC-SHA256 keyed by SHA256(token).
pub fn verify_cryptopay_signature(token: &str, body: &[u8], signature: &str) -> bool {
    let secret = Sha256::digest(token.as_bytes());
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(&secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub struct CryptoPayBackend {
    client: Client,
    config: CryptoPayConfig,
}

impl CryptoPayBackend {
    pub fn new(config: CryptoPayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PaymentBackend for CryptoPayBackend {
    fn kind(&self) -> InvoiceKind {
        InvoiceKind::Crypto
    }

    fn currency(&self) -> &str {
        &self.config.fiat
    }

    async fn create_invoice(&self, purchase: &Purchase, customer: &Customer) -> Result<Invoice, GatewayError> {
        let response = self
            .client
            .post(format!("{}/api/createInvoice", self.config.api_url.trim_end_matches('/')))
            .header("Crypto-Pay-API-Token", &self.config.token)
            .json(&serde_json::json!({
                "currency_type": "fiat",
                "fiat": self.config.fiat,
                "amount": format!("{:.2}", purchase.amount),
                "description": invoice_description(purchase, customer),
                "payload": purchase.id.to_string(),
                "paid_btn_name": "callback",
                "paid_btn_url": self.config.bot_url,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::ApiError(format!(
                "Failed to create crypto invoice: {}",
                response.status()
            )));
        }

        let body: ApiResponse<CreatedInvoice> = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let invoice = match (body.ok, body.result) {
            (true, Some(invoice)) => invoice,
            (_, _) => {
                return Err(GatewayError::ApiError(format!(
                    "Crypto Pay rejected invoice: {}",
                    body.error.unwrap_or_default()
                )))
            }
        };

        Ok(Invoice {
            url: invoice.bot_invoice_url.or(invoice.pay_url),
            external_id: Some(invoice.invoice_id.to_string()),
        })
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{invoice_description, GatewayError, Invoice, PaymentBackend};
use crate::service::customer::Customer;
use crate::service::purchase::{InvoiceKind, Purchase};

const TELEGRAM_API: &str = "https://api.telegram.org";
const STARS_CURRENCY: &str = "XTR";

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    result: Option<String>,
    description: Option<String>,
}

/// In-chat payment with Telegram Stars. Paid purchases arrive as `successful_payment`
/// messages whose payload is the purchase id.
pub struct StarsBackend {
    client: Client,
    token: String,
}

impl StarsBackend {
    pub fn new(token: String) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client, token })
    }
}

#[async_trait]
impl PaymentBackend for StarsBackend {
    fn kind(&self) -> InvoiceKind {
        InvoiceKind::Stars
    }

    fn currency(&self) -> &str {
        STARS_CURRENCY
    }

    async fn create_invoice(&self, purchase: &Purchase, customer: &Customer) -> Result<Invoice, GatewayError> {
        let description = invoice_description(purchase, customer);
        let stars = purchase.amount.round() as i64;

        let response = self
            .client
            .post(format!("{}/bot{}/createInvoiceLink", TELEGRAM_API, self.token))
            .json(&serde_json::json!({
                "title": description,
                "description": description,
                "payload": purchase.id.to_string(),
                "currency": STARS_CURRENCY,
                "prices": [{"label": description, "amount": stars}],
            }))
            .send()
            .await?;

        let body: BotApiResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        match (body.ok, body.result) {
            (true, Some(link)) => Ok(Invoice {
                url: Some(link),
                external_id: None,
            }),
            _ => Err(GatewayError::ApiError(format!(
                "Failed to create stars invoice: {}",
                body.description.unwrap_or_default()
            ))),
        }
    }
}

mod cryptopay;
mod stars;
mod tribute;
mod yookassa;

pub use cryptopay::{verify_cryptopay_signature, CryptoPayBackend, CryptoPayUpdate};
pub use stars::StarsBackend;
pub use tribute::{months_for_period, verify_tribute_signature, TributeBackend, TributeEvent};
pub use yookassa::{YookassaBackend, YookassaNotification};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::customer::Customer;
use super::purchase::{InvoiceKind, Purchase};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        GatewayError::ApiError(error.to_string())
    }
}

/// Result of asking a backend to bill a purchase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invoice {
    pub url: Option<String>,
    pub external_id: Option<String>,
}

#[async_trait]
pub trait PaymentBackend: Send + Sync {
    fn kind(&self) -> InvoiceKind;
    fn currency(&self) -> &str;
    async fn create_invoice(&self, purchase: &Purchase, customer: &Customer) -> Result<Invoice, GatewayError>;
}

pub(crate) fn invoice_description(purchase: &Purchase, customer: &Customer) -> String {
    t!(
        "invoice.description",
        locale = customer.language.as_str(),
        months = purchase.months
    )
    .to_string()
}

#[derive(Clone, Default)]
pub struct PaymentBackends {
    backends: Arc<DashMap<InvoiceKind, Arc<dyn PaymentBackend>>>,
}

impl PaymentBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, backend: Arc<dyn PaymentBackend>) {
        info!("Registering payment backend: {}", backend.kind());
        self.backends.insert(backend.kind(), backend);
    }

    pub fn get(&self, kind: InvoiceKind) -> Option<Arc<dyn PaymentBackend>> {
        self.backends.get(&kind).map(|backend| Arc::clone(backend.value()))
    }

    /// Enabled kinds in display order.
    pub fn enabled(&self) -> Vec<InvoiceKind> {
        InvoiceKind::ALL
            .into_iter()
            .filter(|kind| self.backends.contains_key(kind))
            .collect()
    }
}

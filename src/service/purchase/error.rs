use crate::service::payment::GatewayError;
use crate::service::provision::ProvisionError;
use crate::storage::StorageError;

use super::PurchaseStatus;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Purchase not found: {0}")]
    PurchaseNotFound(i64),
    #[error("Customer not found: {0}")]
    CustomerNotFound(i64),
    #[error("Unsupported invoice kind: {0}")]
    UnsupportedInvoiceKind(String),
    #[error("Purchase {id} cannot be paid from status {status}")]
    InvalidStatus { id: i64, status: PurchaseStatus },
    #[error("Trial is not available for {0}")]
    TrialUnavailable(i64),
    #[error("No price configured for {months} month(s) via {kind}")]
    NoPrice { months: i64, kind: String },
    #[error("Provisioning error: {0}")]
    Provisioning(#[from] ProvisionError),
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

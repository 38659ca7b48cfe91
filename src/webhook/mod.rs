use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};

use crate::config::AppConfig;
use crate::error::{BotError, BotResult};
use crate::service::payment::{
    months_for_period, verify_cryptopay_signature, verify_tribute_signature, CryptoPayUpdate, TributeEvent,
    YookassaBackend, YookassaNotification,
};
use crate::service::provision::VpnProvisioner;
use crate::service::purchase::{InvoiceKind, Purchase, PurchaseProcessor, PurchaseService, PurchaseStatus};
use crate::service::{Repositories, ServiceRegistry};
use crate::storage::{StorageError, StorageManager, TursoClient};
use crate::utils::mask_id;

const CRYPTOPAY_SIGNATURE_HEADER: &str = "crypto-pay-api-signature";
const TRIBUTE_SIGNATURE_HEADER: &str = "trbt-signature";

#[derive(Clone)]
pub struct WebhookState {
    pub purchase: Arc<PurchaseService>,
    pub repositories: Repositories,
    pub provisioner: Arc<dyn VpnProvisioner>,
    pub turso: Option<TursoClient>,
    pub crypto_pay_token: Option<String>,
    pub yookassa: Option<Arc<YookassaBackend>>,
    pub tribute_api_key: Option<String>,
}

impl WebhookState {
    pub fn new(config: &AppConfig, storage: &StorageManager, services: &ServiceRegistry) -> Self {
        Self {
            purchase: services.purchase.clone(),
            repositories: services.repositories.clone(),
            provisioner: services.provisioner.clone(),
            turso: Some(storage.turso().clone()),
            crypto_pay_token: config.crypto_pay.as_ref().map(|c| c.token.clone()),
            yookassa: services.yookassa.clone(),
            tribute_api_key: config.tribute.as_ref().map(|t| t.api_key.clone()),
        }
    }
}

pub fn router(state: WebhookState, prefix: &str) -> Router {
    let prefix = prefix.trim_end_matches('/');
    Router::new()
        .route(&format!("{}/cryptopay", prefix), post(handle_cryptopay))
        .route(&format!("{}/yookassa", prefix), post(handle_yookassa))
        .route(&format!("{}/tribute", prefix), post(handle_tribute))
        .route("/healthcheck", get(handle_healthcheck))
        .with_state(state)
}

pub async fn serve(router: Router, addr: SocketAddr) -> BotResult<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| BotError::Handler(format!("Failed to bind webhook listener on {}: {}", addr, e)))?;
    info!("Webhook server listening on {}", addr);
    axum::serve(listener, router)
        .await
        .map_err(|e| BotError::Handler(format!("Webhook server stopped: {}", e)))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn storage_failure(e: StorageError) -> StatusCode {
    error!("Webhook storage lookup failed: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Runs the purchase through the orchestrator. Unknown purchases are acknowledged so the
/// provider stops retrying; processing failures are not, so it retries later.
async fn settle(state: &WebhookState, source: &str, purchase: Option<Purchase>) -> StatusCode {
    let Some(purchase) = purchase else {
        warn!("{} webhook for an unknown purchase, acknowledging", source);
        return StatusCode::OK;
    };

    match state.purchase.process_purchase(purchase.id).await {
        Ok(outcome) => {
            if outcome.is_partial() {
                warn!("{} purchase {} completed without the referral bonus", source, purchase.id);
            }
            StatusCode::OK
        }
        Err(e) => {
            error!("Failed to process {} purchase {}: {}", source, purchase.id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn handle_cryptopay(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let Some(token) = state.crypto_pay_token.as_deref() else {
        return StatusCode::OK;
    };
    let Some(signature) = header(&headers, CRYPTOPAY_SIGNATURE_HEADER) else {
        return StatusCode::BAD_REQUEST;
    };
    if !verify_cryptopay_signature(token, &body, signature) {
        warn!("Crypto Pay webhook with an invalid signature");
        return StatusCode::UNAUTHORIZED;
    }

    let update: CryptoPayUpdate = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Malformed Crypto Pay webhook: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    if !update.is_paid() {
        debug!("Ignoring Crypto Pay update {}", update.update_type);
        return StatusCode::OK;
    }

    let purchases = &state.repositories.purchases;
    let lookup = match update.payload.payload.as_deref().and_then(|p| p.parse::<i64>().ok()) {
        Some(purchase_id) => purchases.find_by_id(purchase_id).await,
        None => {
            purchases
                .find_by_external_id(InvoiceKind::Crypto, &update.payload.invoice_id.to_string())
                .await
        }
    };
    match lookup {
        Ok(purchase) => settle(&state, "Crypto Pay", purchase).await,
        Err(e) => storage_failure(e),
    }
}

async fn handle_yookassa(State(state): State<WebhookState>, body: Bytes) -> StatusCode {
    let Some(backend) = state.yookassa.as_ref() else {
        return StatusCode::OK;
    };

    let notification: YookassaNotification = match serde_json::from_slice(&body) {
        Ok(notification) => notification,
        Err(e) => {
            warn!("Malformed YooKassa notification: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    // notifications are unsigned, so the payment state comes from the API
    let payment = match backend.fetch_payment(&notification.object.id).await {
        Ok(payment) => payment,
        Err(e) => {
            error!("Failed to verify YooKassa payment {}: {}", notification.object.id, e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let purchases = &state.repositories.purchases;
    let lookup = match payment.purchase_id() {
        Some(purchase_id) => purchases.find_by_id(purchase_id).await,
        None => purchases.find_by_external_id(InvoiceKind::HostedCheckout, &payment.id).await,
    };
    let purchase = match lookup {
        Ok(purchase) => purchase,
        Err(e) => return storage_failure(e),
    };

    match payment.status.as_str() {
        "succeeded" => settle(&state, "YooKassa", purchase).await,
        "canceled" => {
            if let Some(purchase) = purchase {
                if let Err(e) = state.purchase.cancel_purchase(purchase.id).await {
                    error!("Failed to cancel purchase {}: {}", purchase.id, e);
                    return StatusCode::INTERNAL_SERVER_ERROR;
                }
            }
            StatusCode::OK
        }
        other => {
            debug!("Ignoring YooKassa payment {} in status {}", payment.id, other);
            StatusCode::OK
        }
    }
}

async fn handle_tribute(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let Some(api_key) = state.tribute_api_key.as_deref() else {
        return StatusCode::OK;
    };
    let Some(signature) = header(&headers, TRIBUTE_SIGNATURE_HEADER) else {
        return StatusCode::BAD_REQUEST;
    };
    if !verify_tribute_signature(api_key, &body, signature) {
        warn!("Tribute webhook with an invalid signature");
        return StatusCode::UNAUTHORIZED;
    }

    let event: TributeEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("Malformed Tribute webhook: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    let telegram_id = event.payload.telegram_user_id;
    let customer = match state.repositories.customers.find_by_telegram_id(telegram_id).await {
        Ok(Some(customer)) => customer,
        Ok(None) => {
            warn!("Tribute event {} for unknown customer {}", event.name, mask_id(telegram_id));
            return StatusCode::OK;
        }
        Err(e) => return storage_failure(e),
    };

    match event.name.as_str() {
        "new_subscription" => {
            let Some(reference) = event.payload.reference() else {
                warn!("Tribute subscription event for {} without a subscription id", mask_id(telegram_id));
                return StatusCode::BAD_REQUEST;
            };
            let months = months_for_period(&event.payload.period);
            let purchase = match state
                .purchase
                .record_platform_purchase(event.payload.amount(), months, &customer, &reference)
                .await
            {
                Ok(purchase) => purchase,
                Err(e) => {
                    error!("Failed to record Tribute purchase for {}: {}", mask_id(telegram_id), e);
                    return StatusCode::INTERNAL_SERVER_ERROR;
                }
            };
            if purchase.status == PurchaseStatus::Cancelled {
                warn!("Tribute billing {} maps to cancelled purchase {}", reference, purchase.id);
                return StatusCode::OK;
            }
            settle(&state, "Tribute", Some(purchase)).await
        }
        "cancelled_subscription" => match state.repositories.purchases.stop_auto_renew(customer.id).await {
            Ok(stopped) => {
                info!(
                    "Tribute subscription of {} cancelled, auto-renew stopped on {} purchase(s)",
                    mask_id(telegram_id),
                    stopped
                );
                StatusCode::OK
            }
            Err(e) => storage_failure(e),
        },
        other => {
            debug!("Acknowledging Tribute event {}", other);
            StatusCode::OK
        }
    }
}

async fn handle_healthcheck(State(state): State<WebhookState>) -> (StatusCode, &'static str) {
    if let Some(turso) = &state.turso {
        if let Err(e) = turso.ping().await {
            error!("Healthcheck: database unavailable: {}", e);
            return (StatusCode::SERVICE_UNAVAILABLE, "database unavailable");
        }
    }
    if let Err(e) = state.provisioner.health().await {
        error!("Healthcheck: VPN panel unavailable: {}", e);
        return (StatusCode::SERVICE_UNAVAILABLE, "vpn panel unavailable");
    }
    (StatusCode::OK, "ok")
}

use teloxide::adaptors::Throttle;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{PreCheckoutQuery, SuccessfulPayment};

use crate::error::HandlerResult;
use crate::service::purchase::{InvoiceKind, ProcessOutcome, PurchaseProcessor, PurchaseStatus};
use crate::state::AppState;
use crate::utils::mask_id;

use super::{telegram_id, user_language};

/// Telegram asks for a final go-ahead before charging Stars; only a pending Stars purchase
/// of the paying customer is accepted.
async fn handle_pre_checkout(bot: Throttle<Bot>, q: PreCheckoutQuery, state: AppState) -> HandlerResult<()> {
    let payer = telegram_id(&q.from);
    let mut acceptable = false;

    if let Ok(purchase_id) = q.invoice_payload.parse::<i64>() {
        if let Some(purchase) = state.services.repositories.purchases.find_by_id(purchase_id).await? {
            let customer = state.services.repositories.customers.find_by_id(purchase.customer_id).await?;
            acceptable = purchase.status == PurchaseStatus::Pending
                && purchase.invoice_kind == InvoiceKind::Stars
                && customer.is_some_and(|c| c.telegram_id == payer);
        }
    }

    if acceptable {
        bot.answer_pre_checkout_query(q.id, true).await?;
    } else {
        warn!(
            "Rejecting pre-checkout from {} for payload '{}'",
            mask_id(payer),
            q.invoice_payload
        );
        bot.answer_pre_checkout_query(q.id, false)
            .error_message(t!("messages.payment_expired", locale = user_language(&q.from).as_str()))
            .await?;
    }

    Ok(())
}

pub(super) async fn handle_successful_payment(
    bot: Throttle<Bot>,
    msg: Message,
    payment: SuccessfulPayment,
    state: AppState,
) -> HandlerResult<()> {
    let Ok(purchase_id) = payment.invoice_payload.parse::<i64>() else {
        error!("Successful payment with unexpected payload '{}'", payment.invoice_payload);
        return Ok(());
    };

    match state.services.purchase.process_purchase(purchase_id).await {
        Ok(ProcessOutcome::AlreadyProcessed) => {
            info!("Stars payment for purchase {} was already processed", purchase_id)
        }
        Ok(outcome) => {
            if outcome.is_partial() {
                warn!("Stars purchase {} completed without the referral bonus", purchase_id);
            }
        }
        Err(e) => {
            error!("Failed to process Stars purchase {}: {}", purchase_id, e);
            let language = msg.from.as_ref().map(user_language).unwrap_or_else(|| "en".to_string());
            bot.send_message(msg.chat.id, t!("messages.processing_failed", locale = language.as_str()))
                .await?;
        }
    }

    Ok(())
}

pub fn get_pre_checkout_handler() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    Update::filter_pre_checkout_query().endpoint(handle_pre_checkout)
}

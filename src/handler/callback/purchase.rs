use std::str::FromStr;

use teloxide::prelude::*;

use super::CallbackContext;
use crate::error::HandlerResult;
use crate::handler::{
    edit_or_send, get_back_to_main_menu_keyboard, get_invoice_kinds_keyboard, get_months_keyboard,
    get_payment_keyboard, main_menu,
};
use crate::service::interaction::PaymentMessage;
use crate::service::purchase::{InvoiceKind, PaymentError, PurchaseProcessor};
use crate::utils::mask_id;

pub async fn handle_callback_buy(ctx: &CallbackContext) -> HandlerResult<()> {
    edit_or_send(
        &ctx.bot,
        &ctx.message,
        t!("messages.choose_months", locale = ctx.language()).to_string(),
        get_months_keyboard(ctx.language(), &ctx.state.config.pricing),
    )
    .await
}

pub async fn handle_callback_sell(ctx: &CallbackContext) -> HandlerResult<()> {
    let months: i64 = ctx.param("month")?;
    let kinds = ctx.state.services.purchase.backends().enabled();
    let platform_url = ctx
        .state
        .config
        .tribute
        .as_ref()
        .and_then(|t| t.payment_url.as_deref());

    edit_or_send(
        &ctx.bot,
        &ctx.message,
        t!("messages.choose_payment", locale = ctx.language(), months = months).to_string(),
        get_invoice_kinds_keyboard(ctx.language(), months, &kinds, &ctx.state.config.pricing, platform_url),
    )
    .await
}

pub async fn handle_callback_payment(ctx: &CallbackContext) -> HandlerResult<()> {
    let months: i64 = ctx.param("month")?;
    let raw_kind: String = ctx.param("kind")?;
    let kind = InvoiceKind::from_str(&raw_kind)?;
    let amount = ctx
        .state
        .config
        .pricing
        .amount_for(months, kind)
        .ok_or_else(|| PaymentError::NoPrice {
            months,
            kind: kind.to_string(),
        })?;

    let created = match ctx
        .state
        .services
        .purchase
        .create_purchase(amount, months, &ctx.customer, kind)
        .await
    {
        Ok(created) => created,
        Err(e) => {
            error!(
                "Failed to create {} purchase for {}: {}",
                kind,
                mask_id(ctx.customer.telegram_id),
                e
            );
            edit_or_send(
                &ctx.bot,
                &ctx.message,
                t!("messages.payment_unavailable", locale = ctx.language()).to_string(),
                get_back_to_main_menu_keyboard(ctx.language()),
            )
            .await?;
            return Ok(());
        }
    };

    edit_or_send(
        &ctx.bot,
        &ctx.message,
        t!(
            "messages.awaiting_payment",
            locale = ctx.language(),
            months = months,
            amount = amount
        )
        .to_string(),
        get_payment_keyboard(ctx.language(), created.payment_url.as_deref(), created.purchase_id),
    )
    .await?;

    ctx.state
        .services
        .interaction
        .remember_payment_message(
            created.purchase_id,
            PaymentMessage {
                chat_id: ctx.chat_id().0,
                message_id: ctx.message.id().0,
            },
        )
        .await?;

    Ok(())
}

pub async fn handle_callback_cancel_purchase(ctx: &CallbackContext) -> HandlerResult<()> {
    let purchase_id: i64 = ctx.param("id")?;

    let owned = ctx
        .state
        .services
        .repositories
        .purchases
        .find_by_id(purchase_id)
        .await?
        .is_some_and(|p| p.customer_id == ctx.customer.id);
    if !owned {
        warn!(
            "{} tried to cancel purchase {} they do not own",
            mask_id(ctx.customer.telegram_id),
            purchase_id
        );
        return Ok(());
    }

    let cancelled = ctx.state.services.purchase.cancel_purchase(purchase_id).await?;
    if let Err(e) = ctx.bot.delete_message(ctx.chat_id(), ctx.message.id()).await {
        debug!("Payment message for purchase {} already gone: {}", purchase_id, e);
    }
    if !cancelled {
        return Ok(());
    }

    let keyboard = main_menu(&ctx.state, &ctx.customer).await?;
    ctx.bot
        .send_message(ctx.chat_id(), t!("messages.purchase_cancelled", locale = ctx.language()))
        .reply_markup(keyboard)
        .await?;

    Ok(())
}

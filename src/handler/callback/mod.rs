mod broadcast;
mod purchase;
mod referral;
mod subscription;
mod trial;

pub(crate) use subscription::render_subscriptions;

use std::collections::HashMap;

use crate::{
    error::{BotError, HandlerResult},
    service::customer::Customer,
    state::AppState,
    utils::{mask_id, parse_callback_data},
};

use teloxide::{
    adaptors::Throttle,
    dispatching::UpdateHandler,
    prelude::*,
    types::{CallbackQuery, MaybeInaccessibleMessage},
};

use super::{edit_or_send, main_menu, telegram_id, user_language};

/// Everything a callback branch needs about the tap that triggered it.
pub(super) struct CallbackContext {
    pub bot: Throttle<Bot>,
    pub state: AppState,
    pub message: MaybeInaccessibleMessage,
    pub customer: Customer,
    pub params: HashMap<String, String>,
}

impl CallbackContext {
    pub fn language(&self) -> &str {
        &self.customer.language
    }

    pub fn chat_id(&self) -> ChatId {
        self.message.chat().id
    }

    pub fn param<T: std::str::FromStr>(&self, key: &str) -> Result<T, BotError> {
        self.params
            .get(key)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| BotError::Handler(format!("missing or invalid callback parameter '{}'", key)))
    }
}

async fn handle_start_menu(ctx: &CallbackContext) -> HandlerResult<()> {
    let keyboard = main_menu(&ctx.state, &ctx.customer).await?;
    edit_or_send(
        &ctx.bot,
        &ctx.message,
        t!("messages.greeting", locale = ctx.language()).to_string(),
        keyboard,
    )
    .await
}

async fn handle_callback(bot: Throttle<Bot>, q: CallbackQuery, state: AppState) -> HandlerResult<()> {
    let data = q
        .data
        .clone()
        .ok_or_else(|| BotError::Handler("No callback data".into()))?;

    let message = q
        .message
        .clone()
        .ok_or_else(|| BotError::Handler("No message".into()))?;

    let customer = match state.services.customer.find(telegram_id(&q.from)).await? {
        Some(customer) => customer,
        None => {
            bot.answer_callback_query(q.id.clone())
                .text(t!("messages.press_start", locale = user_language(&q.from).as_str()))
                .await?;
            return Ok(());
        }
    };

    let (action, params) = parse_callback_data(&data);
    let action = action.to_string();
    let ctx = CallbackContext {
        bot: bot.clone(),
        state,
        message,
        customer,
        params,
    };

    match action.as_str() {
        "start" => handle_start_menu(&ctx).await?,

        // purchase
        "buy" => purchase::handle_callback_buy(&ctx).await?,
        "sell" => purchase::handle_callback_sell(&ctx).await?,
        "payment" => purchase::handle_callback_payment(&ctx).await?,
        "cancel_purchase" => purchase::handle_callback_cancel_purchase(&ctx).await?,

        // subscriptions
        "trial" => trial::handle_callback_trial(&ctx).await?,
        "my_subscriptions" | "connect" => subscription::handle_callback_my_subscriptions(&ctx).await?,
        "rename_subscription" => subscription::handle_callback_rename(&ctx).await?,
        "rename_cancel" => subscription::handle_callback_rename_cancel(&ctx).await?,
        "deactivate_subscription" => subscription::handle_callback_deactivate(&ctx).await?,

        "referral" => referral::handle_callback_referral(&ctx).await?,

        // broadcast
        "broadcast_menu" | "broadcast_audience" | "broadcast_confirm" | "broadcast_cancel"
            if ctx.state.is_admin(ctx.customer.telegram_id) =>
        {
            broadcast::handle_callback_broadcast(&ctx, &action).await?
        }

        other => warn!(
            "Unhandled callback '{}' from {}",
            other,
            mask_id(ctx.customer.telegram_id)
        ),
    }

    bot.answer_callback_query(q.id).await?;

    Ok(())
}

pub fn get_callback_handler() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    Update::filter_callback_query().endpoint(handle_callback)
}

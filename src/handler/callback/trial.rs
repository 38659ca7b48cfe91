use super::CallbackContext;
use crate::error::HandlerResult;
use crate::handler::{edit_or_send, get_back_to_main_menu_keyboard};
use crate::service::purchase::{subscriptions_keyboard, PaymentError};

pub async fn handle_callback_trial(ctx: &CallbackContext) -> HandlerResult<()> {
    let language = ctx.language();

    let (text, keyboard) = match ctx
        .state
        .services
        .purchase
        .activate_trial(ctx.customer.telegram_id)
        .await
    {
        Ok(Some(subscription)) => (
            t!(
                "messages.trial_activated",
                locale = language,
                name = subscription.name.as_str(),
                link = subscription.link.as_str()
            ),
            subscriptions_keyboard(language),
        ),
        Ok(None) => (
            t!("messages.trial_disabled", locale = language),
            get_back_to_main_menu_keyboard(language),
        ),
        Err(PaymentError::TrialUnavailable(_)) => (
            t!("messages.trial_used", locale = language),
            get_back_to_main_menu_keyboard(language),
        ),
        Err(e) => {
            error!("Failed to activate trial: {}", e);
            (
                t!("messages.trial_failed", locale = language),
                get_back_to_main_menu_keyboard(language),
            )
        }
    };

    edit_or_send(&ctx.bot, &ctx.message, text.to_string(), keyboard).await
}

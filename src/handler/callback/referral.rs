use teloxide::prelude::*;

use super::CallbackContext;
use crate::error::HandlerResult;
use crate::handler::{edit_or_send, get_back_to_main_menu_keyboard};
use crate::service::referral::referral_link;

pub async fn handle_callback_referral(ctx: &CallbackContext) -> HandlerResult<()> {
    let me = ctx.bot.get_me().await?;
    let link = referral_link(me.username(), ctx.customer.telegram_id);
    let invited = ctx
        .state
        .services
        .referral
        .invited_count(ctx.customer.telegram_id)
        .await?;

    edit_or_send(
        &ctx.bot,
        &ctx.message,
        t!(
            "messages.referral",
            locale = ctx.language(),
            link = link.as_str(),
            days = ctx.state.config.plan.referral_days,
            count = invited
        )
        .to_string(),
        get_back_to_main_menu_keyboard(ctx.language()),
    )
    .await
}

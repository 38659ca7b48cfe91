use chrono::{DateTime, Utc};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use super::CallbackContext;
use crate::error::HandlerResult;
use crate::handler::{edit_or_send, get_cancel_keyboard};
use crate::service::interaction::PendingAction;
use crate::service::subscription::{Subscription, SubscriptionError, SubscriptionState};
use crate::utils::{callback_data, mask_id};

/// Text and keyboard for the "my subscriptions" screen.
pub(crate) fn render_subscriptions(
    subscriptions: &[Subscription],
    language: &str,
    now: DateTime<Utc>,
) -> (String, InlineKeyboardMarkup) {
    let mut keyboard = Vec::new();

    let text = if subscriptions.is_empty() {
        t!("messages.no_subscriptions", locale = language).to_string()
    } else {
        let mut text = format!("{}\n\n", t!("messages.subscriptions_header", locale = language));

        for subscription in subscriptions {
            let state = subscription.state_at(now);
            let (marker, label) = match state {
                SubscriptionState::Active => ("✅", t!("subscription.state_active", locale = language)),
                SubscriptionState::Expiring => ("⚠️", t!("subscription.state_expiring", locale = language)),
                SubscriptionState::Expired => ("❌", t!("subscription.state_expired", locale = language)),
            };
            text.push_str(&format!(
                "{} <b>{}</b>\n📅 {}\n{}\n\n",
                marker,
                subscription.name,
                subscription.expire_at.format("%d.%m.%Y %H:%M"),
                label
            ));

            let mut row = Vec::new();
            if let Ok(link) = subscription.link.parse::<url::Url>() {
                row.push(InlineKeyboardButton::url(format!("🔗 {}", subscription.name), link));
            }
            if state != SubscriptionState::Expired {
                let id = subscription.id.to_string();
                row.push(InlineKeyboardButton::callback(
                    format!("✏️ {}", t!("buttons.rename", locale = language)),
                    callback_data("rename_subscription", &[("id", id.as_str())]),
                ));
                row.push(InlineKeyboardButton::callback(
                    format!("🗑 {}", t!("buttons.deactivate", locale = language)),
                    callback_data("deactivate_subscription", &[("id", id.as_str())]),
                ));
            }
            keyboard.push(row);
        }
        text
    };

    keyboard.push(vec![InlineKeyboardButton::callback(
        t!("buttons.buy", locale = language),
        "buy",
    )]);
    keyboard.push(vec![InlineKeyboardButton::callback(
        t!("buttons.back", locale = language),
        "start",
    )]);

    (text, InlineKeyboardMarkup::new(keyboard))
}

pub async fn handle_callback_my_subscriptions(ctx: &CallbackContext) -> HandlerResult<()> {
    let subscriptions = ctx
        .state
        .services
        .subscription
        .list_active(ctx.customer.telegram_id)
        .await?;
    let (text, keyboard) = render_subscriptions(&subscriptions, ctx.language(), Utc::now());
    edit_or_send(&ctx.bot, &ctx.message, text, keyboard).await
}

pub async fn handle_callback_rename(ctx: &CallbackContext) -> HandlerResult<()> {
    let subscription_id: i64 = ctx.param("id")?;

    let subscription = match ctx
        .state
        .services
        .subscription
        .find_owned(ctx.customer.telegram_id, subscription_id)
        .await
    {
        Ok(subscription) => subscription,
        Err(SubscriptionError::NotFound(_) | SubscriptionError::NotOwner(_)) => {
            warn!(
                "{} asked to rename subscription {} they do not own",
                mask_id(ctx.customer.telegram_id),
                subscription_id
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    ctx.state
        .services
        .interaction
        .set_pending(
            ctx.chat_id().0,
            &PendingAction::Rename {
                subscription_id: subscription.id,
            },
        )
        .await?;

    edit_or_send(
        &ctx.bot,
        &ctx.message,
        t!(
            "messages.rename_prompt",
            locale = ctx.language(),
            name = subscription.name.as_str()
        )
        .to_string(),
        get_cancel_keyboard(ctx.language(), "rename_cancel"),
    )
    .await
}

pub async fn handle_callback_rename_cancel(ctx: &CallbackContext) -> HandlerResult<()> {
    ctx.state.services.interaction.clear_pending(ctx.chat_id().0).await?;
    handle_callback_my_subscriptions(ctx).await
}

pub async fn handle_callback_deactivate(ctx: &CallbackContext) -> HandlerResult<()> {
    let subscription_id: i64 = ctx.param("id")?;

    match ctx
        .state
        .services
        .subscription
        .deactivate(ctx.customer.telegram_id, subscription_id)
        .await
    {
        Ok(_) => {}
        Err(SubscriptionError::NotFound(_) | SubscriptionError::NotOwner(_)) => {
            warn!(
                "{} asked to deactivate subscription {} they do not own",
                mask_id(ctx.customer.telegram_id),
                subscription_id
            );
        }
        Err(e) => return Err(e.into()),
    }

    handle_callback_my_subscriptions(ctx).await
}

use teloxide::{
    adaptors::Throttle,
    dispatching::{MessageFilterExt, UpdateFilterExt, UpdateHandler},
    payloads::SendMessageSetters,
    prelude::Requester,
    types::{Message, ParseMode, Update},
    Bot,
};

use crate::{
    error::HandlerResult,
    service::{
        customer::Customer,
        interaction::{BroadcastAudience, PendingAction},
        purchase::subscriptions_keyboard,
        subscription::SubscriptionError,
    },
    state::AppState,
    utils::mask_id,
};

use super::{get_broadcast_confirm_keyboard, main_menu, payment::handle_successful_payment, telegram_id};

pub fn get_message_handler() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    Update::filter_message()
        .branch(Message::filter_successful_payment().endpoint(handle_successful_payment))
        .branch(Message::filter_text().endpoint(handle_message_text))
}

async fn handle_message_text(bot: Throttle<Bot>, msg: Message, text: String, state: AppState) -> HandlerResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(customer) = state.services.customer.find(telegram_id(user)).await? else {
        bot.send_message(msg.chat.id, t!("messages.press_start", locale = super::user_language(user).as_str()))
            .await?;
        return Ok(());
    };

    match state.services.interaction.pending(msg.chat.id.0).await? {
        Some(PendingAction::Rename { subscription_id }) => {
            handle_message_rename(&bot, &msg, &state, &customer, subscription_id, &text).await
        }
        Some(PendingAction::BroadcastText { audience } | PendingAction::BroadcastConfirm { audience, .. })
            if state.is_admin(customer.telegram_id) =>
        {
            let language = customer.language.as_str();
            let audience_label = match audience {
                BroadcastAudience::All => t!("buttons.broadcast_all", locale = language),
                BroadcastAudience::Admins => t!("buttons.broadcast_admins", locale = language),
            };
            state
                .services
                .interaction
                .set_pending(
                    msg.chat.id.0,
                    &PendingAction::BroadcastConfirm {
                        audience,
                        text: text.clone(),
                    },
                )
                .await?;
            bot.send_message(
                msg.chat.id,
                t!(
                    "messages.broadcast_preview",
                    locale = language,
                    audience = audience_label,
                    text = text.as_str()
                ),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(get_broadcast_confirm_keyboard(language))
            .await?;
            Ok(())
        }
        _ => handle_message_unknown(&bot, &msg, &state, &customer).await,
    }
}

async fn handle_message_rename(
    bot: &Throttle<Bot>,
    msg: &Message,
    state: &AppState,
    customer: &Customer,
    subscription_id: i64,
    text: &str,
) -> HandlerResult<()> {
    let language = customer.language.as_str();
    let chat_id = msg.chat.id;

    match state
        .services
        .subscription
        .rename(customer.telegram_id, subscription_id, text)
        .await
    {
        Ok(subscription) => {
            state.services.interaction.clear_pending(chat_id.0).await?;
            bot.send_message(
                chat_id,
                t!("messages.renamed", locale = language, name = subscription.name.as_str()),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(subscriptions_keyboard(language))
            .await?;
        }
        // the prompt stays open so the customer can try another name
        Err(SubscriptionError::InvalidName(_)) => {
            bot.send_message(chat_id, t!("messages.invalid_name", locale = language))
                .await?;
        }
        Err(SubscriptionError::NotFound(_) | SubscriptionError::NotOwner(_)) => {
            warn!(
                "{} tried to rename subscription {} they do not own",
                mask_id(customer.telegram_id),
                subscription_id
            );
            state.services.interaction.clear_pending(chat_id.0).await?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

async fn handle_message_unknown(
    bot: &Throttle<Bot>,
    msg: &Message,
    state: &AppState,
    customer: &Customer,
) -> HandlerResult<()> {
    bot.send_message(msg.chat.id, t!("messages.unknown_message", locale = customer.language.as_str()))
        .reply_markup(main_menu(state, customer).await?)
        .await?;
    Ok(())
}

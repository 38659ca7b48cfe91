mod callback;
mod command;
mod keyboard;
mod message;
mod payment;

use callback::get_callback_handler;

pub use keyboard::*;

use command::get_command_handler;
use message::get_message_handler;
use payment::get_pre_checkout_handler;
use teloxide::{
    adaptors::Throttle,
    dispatching::UpdateHandler,
    dptree,
    payloads::{EditMessageTextSetters, SendMessageSetters},
    prelude::Requester,
    types::{InlineKeyboardMarkup, MaybeInaccessibleMessage, ParseMode, User},
    Bot,
};

use crate::{
    error::{BotResult, HandlerResult},
    service::customer::{normalize_language, Customer},
    state::AppState,
};

pub fn get_handler() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    dptree::entry()
        .branch(get_command_handler())
        .branch(get_pre_checkout_handler())
        .branch(get_message_handler())
        .branch(get_callback_handler())
}

pub(crate) fn user_language(user: &User) -> String {
    normalize_language(user.language_code.as_deref())
}

pub(crate) fn telegram_id(user: &User) -> i64 {
    user.id.0 as i64
}

/// Replaces the message behind a callback, or sends a new one when it is no longer accessible.
pub(crate) async fn edit_or_send(
    bot: &Throttle<Bot>,
    message: &MaybeInaccessibleMessage,
    text: String,
    keyboard: InlineKeyboardMarkup,
) -> HandlerResult<()> {
    match message {
        MaybeInaccessibleMessage::Regular(msg) => {
            bot.edit_message_text(msg.chat.id, msg.id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard)
                .await?;
        }
        MaybeInaccessibleMessage::Inaccessible(_) => {
            bot.send_message(message.chat().id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard)
                .await?;
        }
    }
    Ok(())
}

pub(crate) async fn main_menu(state: &AppState, customer: &Customer) -> BotResult<InlineKeyboardMarkup> {
    let active = state.services.repositories.subscriptions.find_active(customer.id).await?;
    Ok(get_main_menu_keyboard(
        &customer.language,
        MainMenu {
            has_subscriptions: !active.is_empty(),
            trial_enabled: state.services.purchase.trial_enabled(),
            referral_enabled: state.config.plan.referral_days > 0,
            is_admin: state.is_admin(customer.telegram_id),
        },
    ))
}

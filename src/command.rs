use teloxide::{
    adaptors::Throttle,
    macros::BotCommands,
    payloads::SetMyCommandsSetters,
    prelude::Requester,
    types::BotCommand,
    Bot,
};

use crate::error::HandlerResult;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    /// Optional argument is the deep-link payload, e.g. `ref_12345`.
    Start(String),
    Connect,
    Help,
}

impl Command {
    pub fn user_commands(language: &str) -> Vec<BotCommand> {
        vec![
            BotCommand::new("start", t!("commands.description.start", locale = language)),
            BotCommand::new("connect", t!("commands.description.connect", locale = language)),
            BotCommand::new("help", t!("commands.description.help", locale = language)),
        ]
    }
}

pub async fn setup_user_commands(bot: &Throttle<Bot>) -> HandlerResult<()> {
    bot.delete_my_commands().await?;
    bot.set_my_commands(Command::user_commands("en")).await?;
    bot.set_my_commands(Command::user_commands("ru"))
        .language_code("ru")
        .await?;
    Ok(())
}

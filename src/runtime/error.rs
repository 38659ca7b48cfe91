use crate::error::BotError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("job error: {0}")]
    Job(String),
    #[error("other error: {0}")]
    Other(String),
}

impl From<BotError> for RuntimeError {
    fn from(error: BotError) -> Self {
        match error {
            BotError::RuntimeError(e) => e,
            _ => RuntimeError::Other(error.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("VPN API error: {0}")]
    Api(String),
    #[error("Unexpected VPN API status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid VPN API response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ProvisionError {
    fn from(error: reqwest::Error) -> Self {
        ProvisionError::Api(error.to_string())
    }
}

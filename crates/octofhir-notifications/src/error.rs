use octofhir_ciba::CibaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Endpoint answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        Self::SendFailed(err.to_string())
    }
}

impl From<NotificationError> for CibaError {
    fn from(err: NotificationError) -> Self {
        CibaError::notification(err.to_string())
    }
}

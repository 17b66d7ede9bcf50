use thiserror::Error;

#[derive(Error, Debug)]
pub enum VcdError {
    #[error("API request failed: {0} - {1}")]
    Api(reqwest::StatusCode, String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Network/Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl VcdError {
    pub fn status(&self) -> Option<u16> {
        match self {
            VcdError::Api(status, _) => Some(status.as_u16()),
            VcdError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, VcdError>;

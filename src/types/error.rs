use thiserror::Error;

/// Raised while turning a raw JSON payload into a typed catalog value.
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("payload does not match schema: {0}")]
    Schema(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("card {card_id} belongs to set {actual}, expected {expected}")]
    SetMismatch {
        card_id: String,
        expected: String,
        actual: String,
    },
}

impl From<serde_json::Error> for PayloadError {
    fn from(value: serde_json::Error) -> Self {
        PayloadError::Schema(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unauthorized by catalog source (status {0})")]
    Unauthorized(u16),
    #[error("catalog source returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("cancelled")]
    Cancelled,
}

impl SourceError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SourceError::Unauthorized(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            return SourceError::Decode(value.to_string());
        }
        match value.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                SourceError::Unauthorized(status.as_u16())
            }
            _ => SourceError::Http(value.to_string()),
        }
    }
}

/// A single card that could not be turned into canonical records.
#[derive(Debug, Error, PartialEq)]
pub enum CardError {
    #[error("malformed card payload: {0}")]
    Malformed(#[from] PayloadError),
    #[error("image {uri} for card {card_id}: {reason}")]
    Image {
        card_id: String,
        uri: String,
        reason: String,
    },
}

/// Conditions that abort a whole ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to fetch manifest: {0}")]
    Manifest(#[source] SourceError),
    #[error("catalog source rejected credentials: {0}")]
    Unauthorized(#[source] SourceError),
}

/// Returned by suspension points when the run's cancellation token fires.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

use thiserror::Error;

/// Failures of the remote generation API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// No API key is configured; nothing was sent.
    #[error("API key not found")]
    CredentialMissing,
    #[error("Failed to reach the video generation service: {0}")]
    Transport(String),
    #[error("Failed to decode API response: {0}")]
    Decode(String),
    #[error("{message}")]
    RemoteRejection { status: u16, message: String },
}

impl ApiError {
    /// Errors that must reach the user instead of being folded into a retry.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::CredentialMissing | Self::RemoteRejection { .. })
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize value: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Rejected generation parameters or credentials.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Please enter a prompt to generate a video")]
    PromptRequired,
    #[error("Unsupported frame count {0} (allowed: 17, 33, 49, 65, 81)")]
    InvalidFrames(u32),
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange { field: &'static str, min: f64, max: f64, value: f64 },
    #[error("API key must be at least 10 characters")]
    InvalidApiKey,
}

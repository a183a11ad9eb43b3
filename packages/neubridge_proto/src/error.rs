#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// The frame is not JSON at all.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON, wrong shape for the message it claims to be.
    #[error("malformed frame: {0}")]
    InvalidFrame(#[source] serde_json::Error),

    #[error("invalid payload for announceSelf: missing {0}")]
    MissingAnnounceField(&'static str),

    #[error("invalid payload for announceSelf: {0}")]
    InvalidAnnounceField(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),
}

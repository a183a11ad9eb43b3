use neubridge_proto::ProtoError;

pub type Result<T> = std::result::Result<T, HostError>;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error("unauthorized announce for window {0:?}: no spawn is pending under that name")]
    UnauthorizedAnnounce(String),

    #[error("Unsupported platform or architecture: {os} {arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("failed to spawn window process {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No connection found by name: {0}")]
    NoConnection(String),

    #[error("connection to window {0:?} was dropped")]
    ConnectionDropped(String),

    #[error("window {name:?} exited before registering (exit code {exit_code:?})")]
    ChildExited { name: String, exit_code: Option<i32> },

    #[error("{0}")]
    Rpc(String),

    #[error("call to {method} timed out")]
    RpcTimeout { method: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out connecting to window on port {port}")]
    ConnectTimeout { port: u16 },

    #[error("window name {0:?} is already in use")]
    NameInUse(String),

    #[error("invalid method name {0:?}")]
    InvalidMethod(String),

    #[error("method {0:?} is already registered")]
    MethodAlreadyRegistered(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HostError {
    pub fn from_tungstenite(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }

    /// Whether this error came from a malformed or unauthorized announce.
    pub fn is_announce_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnauthorizedAnnounce(_)
                | Self::Proto(ProtoError::MissingAnnounceField(_))
                | Self::Proto(ProtoError::InvalidAnnounceField(_))
                | Self::Proto(ProtoError::InvalidToken(_))
        )
    }
}

impl From<figment::Error> for HostError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ChatError {
    /// Input only a modified client can produce. The connection is terminated.
    #[error("Protocol violation: '{0}'")]
    ProtocolViolation(String),

    #[error("Profile store error: '{0}'")]
    ProfileStore(#[from] ProfileError),

    #[error("Profanity filter error: '{0}'")]
    Filter(String),

    #[error("Identity '{0}' is already logged in")]
    AlreadyLoggedIn(String),

    #[error("Unknown connection {0}")]
    UnknownConnection(usize),
}

#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ProfileError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt '{key}' record for {identity}: {reason}")]
    CorruptRecord {
        identity: String,
        key: &'static str,
        reason: String,
    },

    #[error("snapshot i/o failed: {0}")]
    Io(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

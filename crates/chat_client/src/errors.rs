use chat_server::errors::ProfileError;
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Profile store error: '{0}'")]
    ProfileStore(#[from] ProfileError),

    #[error("Connection to the chat server is closed")]
    Disconnected,

    #[error("Login rejected: '{0}'")]
    LoginRejected(String),

    #[error("Wire error: '{0}'")]
    Wire(#[from] serde_json::Error),

    #[error("I/O error: '{0}'")]
    Io(#[from] std::io::Error),
}

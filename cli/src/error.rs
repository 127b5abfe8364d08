use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Error using canopy lib: {0}")]
    Lib(#[from] canopy_core::error::Error),

    #[error("Error initializing logger: {0}")]
    Logger(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Error joining tokio tasks: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO Error: {0}")]
    IO(#[from] std::io::Error),

    #[error("Error connecting to socket {socket_path}: {source}")]
    ConnectingSocket {
        socket_path: String,
        source: std::io::Error,
    },

    #[error("Error sending {op} request: {source}")]
    SendRequest {
        op: &'static str,
        source: canopy_core::error::Error,
    },

    #[error("Unknown command {0:?}, try `help`")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

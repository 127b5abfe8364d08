use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::broker::error::WindowTreeError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Another canopy daemon already owns {socket_path}: {source}")]
    DuplicateProcess {
        socket_path: PathBuf,
        source: canopy_core::error::Error,
    },

    #[error("Error using canopy lib: {0}")]
    Lib(#[from] canopy_core::error::Error),

    #[error("IO Error: {0}")]
    IO(#[from] std::io::Error),

    #[error("Window tree error: {0}")]
    Tree(#[from] WindowTreeError),

    #[error("Error initializing logger: {0}")]
    Logger(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Join Error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Actor channel closed: {0}")]
    ChannelClosed(String),

    #[error("Actor dropped the reply: {0}")]
    ReplyDropped(#[from] oneshot::error::RecvError),
}

// every actor handle funnels its send failures through here
impl<T> From<mpsc::error::SendError<T>> for Error {
    fn from(e: mpsc::error::SendError<T>) -> Self {
        Self::ChannelClosed(e.to_string())
    }
}

use std::path::PathBuf;

use canopy_core::{ids::ClientToken, messages::ConnectKind};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "canopy", about = "Drive a canopy broker by hand")]
pub struct Args {
    /// daemon socket, defaults to $XDG_RUNTIME_DIR/canopy.sock
    #[arg(long, env = "CANOPY_SOCKET", global = true)]
    pub socket: Option<PathBuf>,

    #[arg(long, env = "CANOPY_LOG_DIR", default_value = "logs", global = true)]
    pub log_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a session and read commands from stdin
    Connect {
        #[arg(long, value_enum, default_value_t = Mode::Client)]
        mode: Mode,

        /// token to wait under as an embeddable, a fresh one is printed otherwise
        #[arg(long)]
        token: Option<ClientToken>,
    },
    /// Report whether a daemon owns the socket
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Client,
    WindowManager,
    Embeddable,
}

impl Mode {
    pub fn connect_kind(self, token: Option<ClientToken>) -> ConnectKind {
        match self {
            Self::Client => ConnectKind::Client,
            Self::WindowManager => ConnectKind::WindowManager,
            Self::Embeddable => ConnectKind::Embeddable {
                token: token.unwrap_or_else(ClientToken::generate),
            },
        }
    }
}

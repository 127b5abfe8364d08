mod args;
mod client;
mod command_parser;
mod error;
mod prelude;
mod render;

use std::path::{Path, PathBuf};

use canopy_core::{
    daemon_utils::{get_sock_path, is_daemon_running},
    messages::ConnectKind,
};
use clap::Parser;
use tokio::{io::BufReader, net::UnixStream};

use crate::{
    args::{Args, Commands},
    client::Client,
    error::{Error, Result},
    prelude::*,
};

#[tokio::main]
async fn main() {
    let cli = Args::parse();

    match setup_logging(&cli.log_dir) {
        Ok(_guard) => {
            if let Err(e) = run(cli).await {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
}

fn setup_logging(log_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_appender::{non_blocking, rolling};
    use tracing_subscriber::{EnvFilter, fmt};

    let file_appender = rolling::daily(log_dir, "canopy-cli.log");
    let (non_blocking, guard) = non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = fmt().with_writer(non_blocking).with_env_filter(env_filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(guard)
}

#[instrument]
async fn connect(socket_path: &Path) -> Result<UnixStream> {
    debug!("Connecting to {:?}", socket_path);
    UnixStream::connect(socket_path)
        .await
        .map_err(|source| Error::ConnectingSocket {
            socket_path: socket_path.to_string_lossy().into_owned(),
            source,
        })
}

#[instrument(skip(cli))]
async fn run(cli: Args) -> Result<()> {
    let socket_path: PathBuf = match cli.socket {
        Some(path) => path,
        None => get_sock_path()?,
    };
    debug!("Running command: {:?}", cli.command);
    match cli.command {
        Commands::Status => {
            if is_daemon_running(&socket_path) {
                println!("daemon running at {}", socket_path.display());
            } else {
                println!("no daemon at {}", socket_path.display());
            }
            Ok(())
        }
        Commands::Connect { mode, token } => {
            let kind = mode.connect_kind(token);
            if let ConnectKind::Embeddable { token } = kind {
                println!("embed token {token}");
            }
            let stream = connect(&socket_path).await?;
            let input = BufReader::new(tokio::io::stdin());
            Client::new(stream, input, tokio::io::stdout()).run(kind).await
        }
    }
}

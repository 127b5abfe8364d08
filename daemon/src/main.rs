mod actors;
mod args;
mod broker;
mod daemon;
mod error;
mod prelude;

use clap::Parser;

use crate::{args::Args, daemon::CanopyDaemon, prelude::*};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let _guard = setup_logging(&args)?;

    info!(?args, "Starting canopy daemon");
    CanopyDaemon::new(&args)?.listen().await?;
    Ok(())
}

fn setup_logging(args: &Args) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_appender::{non_blocking, rolling};
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

    let file_appender = rolling::daily(&args.log_dir, "canopy-daemon.log");
    let (non_blocking, guard) = non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_filter));

    let subscriber = fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .finish()
        .with(ErrorLayer::default());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(guard)
}

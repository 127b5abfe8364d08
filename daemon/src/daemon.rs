use std::{
    fs::{File, remove_file},
    path::PathBuf,
};

use canopy_core::daemon_utils::{get_sock_path, lock_daemon_file, lock_path_for};
use tokio::{net::UnixListener, sync::watch, task::JoinSet};

use crate::{
    actors::{Broker, BrokerHandle, ClientConnection},
    args::Args,
    broker::{
        ConnectionId, WindowBroker,
        backend::{HeadlessBackend, HeadlessFrameSinkHost, PolicyDelegate},
    },
    prelude::*,
};

pub struct CanopyDaemon {
    _lock_file: File, // held for as long as the daemon owns the socket
    socket_path: PathBuf,
    broker: BrokerHandle,
    next_connection: u64,
}

impl CanopyDaemon {
    /// Takes the lock next to the socket so only one daemon serves it.
    pub fn new(args: &Args) -> Result<Self> {
        let socket_path = match &args.socket {
            Some(path) => path.clone(),
            None => get_sock_path()?,
        };
        let lock_file = lock_daemon_file(&lock_path_for(&socket_path)).map_err(|source| Error::DuplicateProcess {
            socket_path: socket_path.clone(),
            source,
        })?;

        let broker = WindowBroker::new(
            &args.displays,
            Box::new(HeadlessBackend::new()),
            Box::new(PolicyDelegate::new(args.bounds_policy)),
            Box::new(HeadlessFrameSinkHost::new()),
        )?;
        info!(displays = broker.displays().len(), policy = %args.bounds_policy, "Broker created");
        Ok(Self {
            _lock_file: lock_file,
            socket_path,
            broker: Broker::spawn(broker)?,
            next_connection: 0,
        })
    }

    #[instrument(skip(self), name = "Daemon")]
    pub async fn listen(mut self) -> Result<()> {
        if self.socket_path.exists() {
            remove_file(&self.socket_path)?;
        }
        info!(path = ?self.socket_path, "Listening on unix socket");
        let listener = UnixListener::bind(&self.socket_path)?;
        let (shutdown, _) = watch::channel(false);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        self.next_connection += 1;
                        let connection_id = ConnectionId(self.next_connection);
                        info!(%connection_id, "Accepting connection");
                        connections.spawn(ClientConnection::serve(
                            connection_id,
                            stream,
                            self.broker.clone(),
                            shutdown.subscribe(),
                        ));
                    }
                    Err(e) => error!(%e, "accept failed"),
                },
                Some(joined) = connections.join_next() => log_connection_exit(joined),
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    info!("Shutting down");
                    break;
                }
            }
        }

        drop(listener);
        let _ = shutdown.send(true);
        self.broker.shutdown().await?;
        while let Some(joined) = connections.join_next().await {
            log_connection_exit(joined);
        }
        remove_file(&self.socket_path)?;
        Ok(())
    }
}

fn log_connection_exit(joined: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => trace!("connection finished"),
        Ok(Err(e)) => warn!(%e, "connection ended with an error"),
        Err(e) => error!(%e, "connection task failed"),
    }
}

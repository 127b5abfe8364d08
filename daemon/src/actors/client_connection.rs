use canopy_core::{
    comm,
    messages::{Hello, Notification, RequestMessage},
};
use handle_macro::Handle;
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf},
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::Instrument;

use crate::{
    actors::broker::BrokerHandle,
    broker::ConnectionId,
    prelude::*,
};

#[allow(unused)]
#[derive(Handle)]
pub enum ClientConnectionEvent {
    /// the reader stopped, `error` is `None` when the peer simply hung up
    ReaderClosed { error: Option<String> },
}
use ClientConnectionEvent::*;

/// One socket. The actor writes notifications from the broker outbox while
/// a reader task decodes requests and forwards them to the broker.
pub struct ClientConnection<S> {
    connection_id: ConnectionId,
    writer: WriteHalf<S>,
    rx: mpsc::Receiver<ClientConnectionEvent>,
    notifications: mpsc::UnboundedReceiver<Notification>,
    broker: BrokerHandle,
    reader: JoinHandle<()>,
}

impl<S> ClientConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Runs the connection until either side is done. Returns early without
    /// a handshake once `shutdown` changes.
    #[instrument(skip(stream, broker, shutdown))]
    pub async fn serve(
        connection_id: ConnectionId,
        stream: S,
        broker: BrokerHandle,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        match Self::handshake(connection_id, stream, broker, shutdown).await? {
            Some(connection) => connection.run().await,
            None => Ok(()),
        }
    }

    async fn handshake(
        connection_id: ConnectionId,
        stream: S,
        broker: BrokerHandle,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<Option<Self>> {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let Hello { kind } = tokio::select! {
            hello = comm::read_message::<_, Hello>(&mut reader) => hello?,
            Ok(()) = shutdown.changed() => {
                debug!("ClientConnection: shutdown before hello");
                return Ok(None);
            }
        };
        debug!(?kind, "ClientConnection: Hello");

        let (outbox, mut notifications) = mpsc::unbounded_channel();
        if !broker.client_connect(connection_id, kind, outbox).await? {
            // the broker dropped its end, this drains the ConnectFailed
            while let Some(notification) = notifications.recv().await {
                comm::write_message(&mut writer, &notification).await?;
            }
            return Ok(None);
        }

        let (tx, rx) = mpsc::channel(1);
        let reader = tokio::spawn(
            forward_requests(connection_id, reader, broker.clone(), ClientConnectionHandle { tx })
                .instrument(tracing::Span::current()),
        );
        Ok(Some(Self {
            connection_id,
            writer,
            rx,
            notifications,
            broker,
            reader,
        }))
    }

    async fn run(mut self) -> Result<()> {
        let result = self.pump().await;
        self.reader.abort();
        debug!("ClientConnection: closed");
        result
    }

    async fn pump(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                notification = self.notifications.recv() => {
                    let Some(notification) = notification else {
                        // the broker forgot this connection
                        return Ok(());
                    };
                    let terminal = notification.is_terminal();
                    if let Err(e) = comm::write_message(&mut self.writer, &notification).await {
                        warn!(%e, "ClientConnection: write failed");
                        self.broker.client_disconnect(self.connection_id).await?;
                        return Ok(());
                    }
                    if terminal {
                        return Ok(());
                    }
                },
                Some(event) = self.rx.recv() => match event {
                    ReaderClosed { error } => {
                        match error {
                            Some(e) => error!(%e, "ClientConnection: ReaderClosed"),
                            None => debug!("ClientConnection: ReaderClosed"),
                        }
                        // keep writing until the broker drops the outbox
                        self.broker.client_disconnect(self.connection_id).await?;
                    }
                },
            }
        }
    }
}

async fn forward_requests<R>(
    connection_id: ConnectionId,
    mut reader: ReadHalf<R>,
    broker: BrokerHandle,
    connection: ClientConnectionHandle,
) where
    R: AsyncRead,
{
    loop {
        match comm::read_message::<_, RequestMessage>(&mut reader).await {
            Ok(request) => {
                trace!(change_id = request.change_id, op = request.body.name(), "request");
                if broker.client_request(connection_id, request).await.is_err() {
                    debug!("broker gone, dropping request");
                    return;
                }
            }
            Err(e) => {
                let error = (!comm::is_disconnect(&e)).then(|| e.to_string());
                let _ = connection.reader_closed(error).await;
                return;
            }
        }
    }
}

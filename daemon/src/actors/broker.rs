use canopy_core::{
    ids::FrameSinkId,
    messages::{ConnectKind, RequestMessage},
};
use handle_macro::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use crate::{
    broker::{ConnectionId, Outbox, WindowBroker, backend::SurfaceInfo},
    prelude::*,
};

const BROKER_QUEUE_DEPTH: usize = 64;

#[allow(unused)]
#[derive(Handle)]
pub enum BrokerEvent {
    /// replies whether the broker accepted the connection, the outbox
    /// already holds `Connected` or `ConnectFailed` by then
    ClientConnect {
        connection_id: ConnectionId,
        kind: ConnectKind,
        outbox: Outbox,
        reply: oneshot::Sender<bool>,
    },
    ClientRequest {
        connection_id: ConnectionId,
        request: RequestMessage,
    },
    ClientDisconnect {
        connection_id: ConnectionId,
    },
    SurfaceActivated {
        frame_sink_id: FrameSinkId,
        info: SurfaceInfo,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
use BrokerEvent::*;

/// Single owner of the [`WindowBroker`]. Every event is handled to
/// completion before the next one is received.
pub struct Broker {
    rx: mpsc::Receiver<BrokerEvent>,
    broker: WindowBroker,
}

impl Broker {
    #[instrument(skip(broker))]
    pub fn spawn(broker: WindowBroker) -> Result<BrokerHandle> {
        let (tx, rx) = mpsc::channel(BROKER_QUEUE_DEPTH);
        Self { rx, broker }.run()?;
        Ok(BrokerHandle { tx })
    }

    #[instrument(skip(self), name = "Broker")]
    fn run(mut self) -> Result<()> {
        let span = tracing::Span::current();
        let _task = tokio::spawn(
            async move {
                while let Some(event) = self.rx.recv().await {
                    match event {
                        ClientConnect {
                            connection_id,
                            kind,
                            outbox,
                            reply,
                        } => {
                            debug!(%connection_id, "Broker: ClientConnect");
                            let accepted = self.broker.connect(connection_id, kind, outbox).is_ok();
                            let _ = reply.send(accepted);
                        }
                        ClientRequest { connection_id, request } => {
                            trace!(%connection_id, "Broker: ClientRequest");
                            self.broker.dispatch(connection_id, request);
                        }
                        ClientDisconnect { connection_id } => {
                            debug!(%connection_id, "Broker: ClientDisconnect");
                            self.broker.disconnect(connection_id);
                        }
                        SurfaceActivated { frame_sink_id, info } => {
                            trace!(%frame_sink_id, "Broker: SurfaceActivated");
                            self.broker.on_first_surface_activation(frame_sink_id, info);
                        }
                        Shutdown { reply } => {
                            debug!(
                                sessions = self.broker.session_count(),
                                nodes = self.broker.node_count(),
                                "Broker: Shutdown"
                            );
                            self.broker.shutdown();
                            self.rx.close();
                            let _ = reply.send(());
                            break;
                        }
                    }
                }
                debug!("Broker: stopped");
            }
            .instrument(span),
        );
        Ok(())
    }
}

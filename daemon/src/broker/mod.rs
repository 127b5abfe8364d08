//! The window-tree broker.
//!
//! [`WindowBroker`] owns the node store and every client session. It is
//! driven by a single actor, so every entry point runs to completion without
//! awaiting and notifications leave through unbounded outboxes.
pub mod backend;
mod client_session;
pub mod embedding;
pub mod error;
mod frame_sink;
pub mod namespace;
pub mod node_store;
mod operations;
#[cfg(test)]
mod tests;

use std::collections::HashMap;

use canopy_core::{
    geometry::Rect,
    ids::{ClientId, ClientToken, DisplayId, FrameSinkId, TransportId},
    messages::{ConnectKind, EmbedFlags, Notification, Properties, RequestBody, RequestMessage},
};
use derive_more::Display;
use itertools::Itertools;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

use crate::broker::{
    backend::{BrokerDelegate, Display as BrokerDisplay, FrameSinkHost, NativeKind, SurfaceInfo, WindowingBackend},
    client_session::ClientSession,
    embedding::{EmbeddingManager, UnembedReason},
    error::{TreeResult, WindowTreeError},
    frame_sink::FrameSinkBridge,
    namespace::IdRegistry,
    node_store::{NodeChange, NodeId, NodeStore},
};

pub type Outbox = mpsc::UnboundedSender<Notification>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("conn#{_0}")]
pub struct ConnectionId(pub u64);

#[derive(Clone, Copy, Debug)]
enum ClientLink {
    Parked(ClientToken),
    Session(ClientId),
}

#[derive(Debug)]
struct ParkedClient {
    connection: ConnectionId,
    outbox: Outbox,
}

#[derive(Debug)]
struct DeferredBounds {
    node: NodeId,
    proposed: Rect,
}

pub struct WindowBroker {
    store: NodeStore,
    ids: IdRegistry,
    sessions: HashMap<ClientId, ClientSession>,
    connections: HashMap<ConnectionId, ClientLink>,
    parked: HashMap<ClientToken, ParkedClient>,
    embeddings: EmbeddingManager,
    frame_sinks: FrameSinkBridge,
    displays: Vec<BrokerDisplay>,
    window_manager: Option<ClientId>,
    backend: Box<dyn WindowingBackend>,
    delegate: Box<dyn BrokerDelegate>,
    deferred: Vec<DeferredBounds>,
}

impl WindowBroker {
    /// Creates one visible root per display, ids `(0, 1..)`.
    pub fn new(
        displays: &[Rect],
        mut backend: Box<dyn WindowingBackend>,
        delegate: Box<dyn BrokerDelegate>,
        frame_sink_host: Box<dyn FrameSinkHost>,
    ) -> TreeResult<Self> {
        let mut store = NodeStore::new();
        let mut ids = IdRegistry::default();
        let mut roots = Vec::with_capacity(displays.len());
        for (i, bounds) in displays.iter().enumerate() {
            let id = ids.allocate_root_id()?;
            let display = DisplayId(i as i64 + 1);
            let native = backend.create_native_node(NativeKind::DisplayRoot, &Properties::new());
            if let Some(handle) = native {
                backend.set_bounds(handle, *bounds);
            }
            let root = store.create_root(id, display, *bounds, native);
            roots.push(BrokerDisplay {
                id: display,
                root,
                bounds: *bounds,
            });
        }
        info!(displays = %roots.iter().map(|d| format!("{}={}", d.id, d.bounds)).join(", "), "broker ready");

        Ok(Self {
            store,
            ids,
            sessions: HashMap::new(),
            connections: HashMap::new(),
            parked: HashMap::new(),
            embeddings: EmbeddingManager::default(),
            frame_sinks: FrameSinkBridge::new(frame_sink_host),
            displays: roots,
            window_manager: None,
            backend,
            delegate,
            deferred: Vec::new(),
        })
    }

    pub fn displays(&self) -> &[BrokerDisplay] {
        &self.displays
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn node_count(&self) -> usize {
        self.store.len()
    }

    // --------- connections ---------  //

    /// Registers a new connection. The outbox receives `Connected` (or
    /// `ConnectFailed`) before anything else. Returns the client id, `None`
    /// for parked embeddables.
    #[instrument(skip_all, fields(%connection))]
    pub fn connect(&mut self, connection: ConnectionId, kind: ConnectKind, outbox: Outbox) -> TreeResult<Option<ClientId>> {
        let result = match kind {
            ConnectKind::Embeddable { token } => self.park(connection, token, outbox.clone()),
            ConnectKind::Client | ConnectKind::WindowManager => self.open_session(connection, kind, outbox.clone()).map(Some),
        };
        match &result {
            Ok(client_id) => debug!(?client_id, ?kind, "client connected"),
            Err(e) => {
                warn!(%e, "rejecting connection");
                let _ = outbox.send(Notification::ConnectFailed { reason: e.to_string() });
            }
        }
        result
    }

    fn park(&mut self, connection: ConnectionId, token: ClientToken, outbox: Outbox) -> TreeResult<Option<ClientId>> {
        if self.parked.contains_key(&token) {
            return Err(WindowTreeError::InvalidArgument("embed token already in use"));
        }
        let _ = outbox.send(Notification::Connected { client_id: None });
        self.parked.insert(token, ParkedClient { connection, outbox });
        self.connections.insert(connection, ClientLink::Parked(token));
        Ok(None)
    }

    fn open_session(&mut self, connection: ConnectionId, kind: ConnectKind, outbox: Outbox) -> TreeResult<ClientId> {
        let client_id = self.ids.allocate_client_id()?;
        let session = ClientSession::new(client_id, connection, kind, outbox);
        session.notify(Notification::Connected {
            client_id: Some(client_id.0),
        });
        self.sessions.insert(client_id, session);
        self.connections.insert(connection, ClientLink::Session(client_id));

        if kind == ConnectKind::WindowManager {
            if let Some(previous) = self.window_manager.replace(client_id) {
                info!(%previous, "window manager superseded");
            }
            for root in self.displays.iter().map(|d| d.root).collect_vec() {
                self.create_embedding(root, client_id, None, EmbedFlags::empty(), false)?;
            }
            self.process_changes(None);
        }
        Ok(client_id)
    }

    #[instrument(skip_all, fields(%connection))]
    pub fn disconnect(&mut self, connection: ConnectionId) {
        match self.connections.remove(&connection) {
            Some(ClientLink::Parked(token)) => {
                self.parked.remove(&token);
                debug!("parked client left");
            }
            Some(ClientLink::Session(client_id)) => {
                self.teardown_session(client_id);
                self.process_changes(None);
                debug!(%client_id, "session torn down");
            }
            None => trace!("unknown connection"),
        }
    }

    /// Drops a session and everything hanging off it. The session itself
    /// receives nothing further.
    fn teardown_session(&mut self, client_id: ClientId) {
        let Some(session) = self.sessions.remove(&client_id) else {
            return;
        };
        trace!(%client_id, kind = ?session.kind, nodes = session.created_nodes.len(), "tearing down session");

        for child in &session.embedded_sessions {
            if let Some(child_session) = self.sessions.get(child) {
                child_session.notify(Notification::Disconnected);
                self.connections.remove(&child_session.connection);
            }
            self.teardown_session(*child);
        }

        for root in self.embeddings.roots_of(client_id) {
            self.destroy_embedding(root, UnembedReason::SessionTornDown);
        }

        for node in session.created_nodes.iter().copied().collect_vec() {
            if self.store.contains_node(node) {
                let _ = self.store.destroy(node);
            }
        }

        if self.window_manager == Some(client_id) {
            self.window_manager = None;
        }
        // the embedder keeps its window, it just loses the app
        if let Some(embedder) = session.embedder
            && let Some(e) = self.sessions.get_mut(&embedder)
        {
            e.embedded_sessions.retain(|c| *c != client_id);
        }
    }

    /// Tears down every session, telling each connection it is gone.
    pub fn shutdown(&mut self) {
        for client_id in self.sessions.keys().copied().sorted().collect_vec() {
            if let Some(session) = self.sessions.get(&client_id) {
                session.notify(Notification::Disconnected);
            }
            self.teardown_session(client_id);
        }
        for (_, parked) in self.parked.drain() {
            let _ = parked.outbox.send(Notification::Disconnected);
        }
        self.connections.clear();
        self.process_changes(None);
        info!(nodes = self.store.len(), "broker shut down");
    }

    // --------- dispatch ---------  //

    /// Runs one request to completion: the operation, the change fan-out,
    /// the reply, then any delegate work the operation deferred.
    #[instrument(skip_all, fields(%connection, change_id = request.change_id, op = request.body.name()))]
    pub fn dispatch(&mut self, connection: ConnectionId, request: RequestMessage) {
        let Some(ClientLink::Session(caller)) = self.connections.get(&connection).copied() else {
            debug!("dropping request from connection without a session");
            return;
        };
        let change_id = request.change_id;

        let reply = match request.body {
            RequestBody::NewTopLevelWindow { window_id, properties } => {
                match self.new_top_level_window(caller, window_id, properties) {
                    Ok(created) => Notification::OnTopLevelCreated {
                        change_id,
                        window: created.window,
                        display_id: created.display_id,
                        drawn: created.drawn,
                        local_surface_id: created.local_surface_id,
                    },
                    Err(e) => self.completion(caller, change_id, Err(e)),
                }
            }
            RequestBody::GetWindowTree { window_id } => {
                let windows = match self.get_window_tree(caller, window_id) {
                    Ok(windows) => windows,
                    Err(e) => {
                        self.log_failure(caller, &e);
                        Vec::new()
                    }
                };
                Notification::WindowTree { change_id, windows }
            }
            body => {
                let result = self.apply_mutation(caller, body);
                self.completion(caller, change_id, result)
            }
        };

        self.process_changes(Some(caller));
        if let Some(session) = self.sessions.get(&caller) {
            session.notify(reply);
        }
        self.run_deferred();
    }

    fn apply_mutation(&mut self, caller: ClientId, body: RequestBody) -> TreeResult<()> {
        match body {
            RequestBody::NewWindow { window_id, properties } => self.new_window(caller, window_id, properties),
            RequestBody::DeleteWindow { window_id } => self.delete_window(caller, window_id),
            RequestBody::AddWindow { parent_id, child_id } => self.add_window(caller, parent_id, child_id),
            RequestBody::RemoveWindowFromParent { window_id } => self.remove_window_from_parent(caller, window_id),
            RequestBody::SetWindowVisibility { window_id, visible } => {
                self.set_window_visibility(caller, window_id, visible)
            }
            RequestBody::SetWindowOpacity { window_id, opacity } => self.set_window_opacity(caller, window_id, opacity),
            RequestBody::SetWindowBounds {
                window_id,
                bounds,
                local_surface_id,
            } => self.set_window_bounds(caller, window_id, bounds, local_surface_id),
            RequestBody::SetWindowProperty { window_id, name, value } => {
                self.set_window_property(caller, window_id, &name, value)
            }
            RequestBody::Embed {
                window_id,
                client,
                flags,
            } => self.embed(caller, window_id, client, flags),
            RequestBody::AttachFrameSink { window_id } => self.attach_frame_sink(caller, window_id),
            RequestBody::NewTopLevelWindow { .. } | RequestBody::GetWindowTree { .. } => {
                Err(WindowTreeError::InvalidArgument("request has a dedicated reply"))
            }
        }
    }

    fn completion(&mut self, caller: ClientId, change_id: u32, result: TreeResult<()>) -> Notification {
        if let Err(e) = &result {
            self.log_failure(caller, e);
        }
        Notification::OnChangeCompleted {
            change_id,
            success: result.is_ok(),
        }
    }

    fn log_failure(&mut self, caller: ClientId, err: &WindowTreeError) {
        match err {
            WindowTreeError::AccessDenied { .. } => {
                if let Some(session) = self.sessions.get_mut(&caller) {
                    session.record_access_denied(err);
                }
            }
            e if e.is_expected() => trace!(%caller, %e, "request not applied"),
            e => debug!(%caller, %e, "request failed"),
        }
    }

    /// Asks the delegate about every bounds change queued by the last request
    /// and reports the outcome to everyone, the requester included.
    fn run_deferred(&mut self) {
        for DeferredBounds { node, proposed } in std::mem::take(&mut self.deferred) {
            let Some(n) = self.store.get(node) else {
                continue;
            };
            let (window, current) = (n.id, n.bounds());
            let display = self
                .store
                .display_of(node)
                .and_then(|id| self.displays.iter().find(|d| d.id == id));
            if let Some(bounds) = self.delegate.on_bounds_change_requested(window, current, proposed, display) {
                let _ = self.store.set_bounds(node, bounds);
            }
        }
        self.process_changes(None);
    }

    /// Forwards a compositor activation to the backend node behind the sink.
    pub fn on_first_surface_activation(&mut self, frame_sink_id: FrameSinkId, info: SurfaceInfo) {
        let native = self
            .frame_sinks
            .node_for_sink(frame_sink_id)
            .and_then(|node| self.store.get(node))
            .and_then(|n| n.native);
        match native {
            Some(handle) => self.backend.on_first_surface_activation(handle, &info),
            None => warn!(%frame_sink_id, "activation for unknown frame sink"),
        }
    }

    // --------- change fan-out ---------  //

    /// Drains the store's change queue until it stays empty, reacting to and
    /// fanning out every change. `originator` is skipped, it already knows.
    fn process_changes(&mut self, originator: Option<ClientId>) {
        loop {
            let changes = self.store.drain_changes();
            if changes.is_empty() {
                break;
            }
            for change in changes {
                self.handle_change(change, originator);
            }
        }
    }

    fn handle_change(&mut self, change: NodeChange, originator: Option<ClientId>) {
        trace!(?change, "node change");
        match change {
            NodeChange::Deleted { node, id, native } => {
                self.destroy_embedding(node, UnembedReason::NodeDeleted);
                self.frame_sinks.detach(node);
                if let Some(handle) = native {
                    self.backend.destroy_native_node(handle);
                }
                self.fan_out(node, originator, |_, window_id| Notification::OnWindowDeleted { window_id });
                for session in self.sessions.values_mut() {
                    session.namespace.unregister(node);
                    session.created_nodes.remove(&node);
                }
                debug!(%id, "window deleted");
            }
            NodeChange::HierarchyChanged {
                node,
                old_parent,
                new_parent,
            } => {
                for session in self.sessions.values() {
                    if Some(session.client_id) == originator {
                        continue;
                    }
                    let Some(window_id) = session.transport_id(node) else {
                        continue;
                    };
                    let old_parent_id = old_parent.and_then(|p| session.transport_id(p));
                    let new_parent_id = new_parent.and_then(|p| session.transport_id(p));
                    // a move between parents the client cannot see is no news to it
                    if old_parent_id.is_none() && new_parent_id.is_none() {
                        continue;
                    }
                    session.notify(Notification::OnWindowHierarchyChanged {
                        window_id,
                        old_parent_id,
                        new_parent_id,
                    });
                }
            }
            NodeChange::BoundsChanged {
                node,
                old_bounds,
                new_bounds,
            } => {
                if let Some(handle) = self.store.get(node).and_then(|n| n.native) {
                    self.backend.set_bounds(handle, new_bounds);
                }
                let embedded = self
                    .embeddings
                    .get_mut(node)
                    .map(|e| (e.child, e.surfaces.for_size(new_bounds.size())));
                self.fan_out(node, originator, |session, window_id| {
                    Notification::OnWindowBoundsChanged {
                        window_id,
                        old_bounds,
                        new_bounds,
                        local_surface_id: embedded
                            .filter(|(child, _)| *child == session.client_id)
                            .map(|(_, id)| id),
                    }
                });
            }
            NodeChange::VisibilityChanged { node, visible } => {
                self.fan_out(node, originator, |_, window_id| Notification::OnWindowVisibilityChanged {
                    window_id,
                    visible,
                });
            }
            NodeChange::OpacityChanged {
                node,
                old_opacity,
                new_opacity,
            } => {
                self.fan_out(node, originator, |_, window_id| Notification::OnWindowOpacityChanged {
                    window_id,
                    old_opacity,
                    new_opacity,
                });
            }
            NodeChange::PropertyChanged { node, name, value } => {
                self.fan_out(node, originator, |_, window_id| {
                    Notification::OnWindowSharedPropertyChanged {
                        window_id,
                        name: name.clone(),
                        value: value.clone(),
                    }
                });
            }
        }
    }

    fn fan_out<F>(&self, node: NodeId, originator: Option<ClientId>, make: F)
    where
        F: Fn(&ClientSession, TransportId) -> Notification,
    {
        for session in self.sessions.values() {
            if Some(session.client_id) == originator {
                continue;
            }
            if let Some(window_id) = session.transport_id(node) {
                session.notify(make(session, window_id));
            }
        }
    }
}

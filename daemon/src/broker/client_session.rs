use std::collections::HashSet;

use canopy_core::{
    ids::{ClientId, TransportId},
    messages::{ConnectKind, Notification, WindowData},
};
use tracing::{error, trace, warn};

use crate::broker::{
    ConnectionId, Outbox,
    error::{TreeResult, WindowTreeError},
    namespace::Namespace,
    node_store::{NodeId, NodeStore},
};

/// denials past this count get the session reported as misbehaving
pub const ACCESS_DENIED_THRESHOLD: u32 = 16;

/// Broker side state of one connected client.
#[derive(Debug)]
pub struct ClientSession {
    pub client_id: ClientId,
    pub connection: ConnectionId,
    pub kind: ConnectKind,
    pub namespace: Namespace,
    /// destroyed with the session
    pub created_nodes: HashSet<NodeId>,
    /// sessions spawned by this session's `Embed` calls, torn down with it
    pub embedded_sessions: Vec<ClientId>,
    pub embedder: Option<ClientId>,
    pub intercepts_events: bool,
    pub can_change_root_visibility: bool,
    outbox: Outbox,
    access_denials: u32,
}

impl ClientSession {
    pub fn new(client_id: ClientId, connection: ConnectionId, kind: ConnectKind, outbox: Outbox) -> Self {
        Self {
            client_id,
            connection,
            kind,
            namespace: Namespace::new(client_id),
            created_nodes: HashSet::new(),
            embedded_sessions: Vec::new(),
            embedder: None,
            intercepts_events: false,
            can_change_root_visibility: true,
            outbox,
            access_denials: 0,
        }
    }

    /// a closed outbox means the connection is already gone, its disconnect
    /// is on the way
    pub fn notify(&self, notification: Notification) {
        if self.outbox.send(notification).is_err() {
            trace!(client_id = %self.client_id, "outbox closed, dropping notification");
        }
    }

    pub fn did_create(&self, node: NodeId) -> bool {
        self.created_nodes.contains(&node)
    }

    pub fn transport_id(&self, node: NodeId) -> Option<TransportId> {
        self.namespace.alias_for(node).map(|alias| self.namespace.to_transport(alias))
    }

    pub fn resolve(&self, raw: TransportId) -> TreeResult<NodeId> {
        let alias = self.namespace.from_transport(raw);
        self.namespace.node_for(alias).ok_or(WindowTreeError::NotFound(alias))
    }

    /// the node as this client sees it, parents it does not know are left out
    pub fn window_data(&self, store: &NodeStore, node: NodeId) -> Option<WindowData> {
        let window_id = self.transport_id(node)?;
        let n = store.get(node)?;
        Some(WindowData {
            window_id,
            parent_id: n.parent().and_then(|p| self.transport_id(p)),
            bounds: n.bounds(),
            visible: n.visible(),
            opacity: n.opacity(),
            properties: n.properties().clone(),
        })
    }

    /// pre-order walk from `node` that prunes every subtree this client does not know
    pub fn known_subtree(&self, store: &NodeStore, node: NodeId) -> Vec<WindowData> {
        let mut out = Vec::new();
        self.collect_known(store, node, &mut out);
        out
    }

    fn collect_known(&self, store: &NodeStore, node: NodeId, out: &mut Vec<WindowData>) {
        let Some(data) = self.window_data(store, node) else {
            return;
        };
        out.push(data);
        for &child in store.children(node) {
            self.collect_known(store, child, out);
        }
    }

    pub fn record_access_denied(&mut self, err: &WindowTreeError) -> u32 {
        self.access_denials += 1;
        if self.access_denials > ACCESS_DENIED_THRESHOLD {
            error!(client_id = %self.client_id, denials = self.access_denials, %err, "client keeps violating access policy");
        } else {
            warn!(client_id = %self.client_id, denials = self.access_denials, %err, "access denied");
        }
        self.access_denials
    }

    #[cfg(test)]
    pub fn access_denials(&self) -> u32 {
        self.access_denials
    }
}

//! Embeddings: one client's root living inside another client's tree.
use std::collections::HashMap;

use canopy_core::{
    geometry::Size,
    ids::{ClientId, FrameSinkId, LocalSurfaceId, WindowId},
    messages::{EmbedFlags, Notification},
};
use derive_more::Display;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::broker::{
    WindowBroker,
    client_session::ClientSession,
    error::{TreeResult, WindowTreeError},
    node_store::{NodeId, NodeStore},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum UnembedReason {
    /// the root node was destroyed
    NodeDeleted,
    /// another client was embedded at the same root
    ReEmbedded,
    /// the embedded client deleted its own root
    ExplicitUnembed,
    /// the embedded client's session went away
    SessionTornDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingState {
    Active,
    TornDown(UnembedReason),
}

/// Hands out a new [`LocalSurfaceId`] whenever the embedded surface changes size.
#[derive(Debug)]
pub struct LocalSurfaceAllocator {
    embed_token: Uuid,
    parent_sequence: u32,
    last_size: Option<Size>,
}

impl LocalSurfaceAllocator {
    fn new() -> Self {
        Self {
            embed_token: Uuid::new_v4(),
            parent_sequence: 0,
            last_size: None,
        }
    }

    pub fn current(&self) -> LocalSurfaceId {
        LocalSurfaceId {
            parent_sequence: self.parent_sequence,
            embed_token: self.embed_token,
        }
    }

    pub fn for_size(&mut self, size: Size) -> LocalSurfaceId {
        if self.last_size != Some(size) {
            self.parent_sequence += 1;
            self.last_size = Some(size);
        }
        self.current()
    }
}

#[derive(Debug)]
pub struct Embedding {
    pub root: NodeId,
    pub child: ClientId,
    /// `None` for display roots
    pub embedder: Option<ClientId>,
    pub top_level: bool,
    pub flags: EmbedFlags,
    pub surfaces: LocalSurfaceAllocator,
    state: EmbeddingState,
}

impl Embedding {
    fn new(root: NodeId, child: ClientId, embedder: Option<ClientId>, flags: EmbedFlags, top_level: bool) -> Self {
        Self {
            root,
            child,
            embedder,
            top_level,
            flags,
            surfaces: LocalSurfaceAllocator::new(),
            state: EmbeddingState::Active,
        }
    }

    pub fn state(&self) -> EmbeddingState {
        self.state
    }
}

/// Active embeddings keyed by root, at most one per node.
#[derive(Debug, Default)]
pub struct EmbeddingManager {
    active: HashMap<NodeId, Embedding>,
}

impl EmbeddingManager {
    pub fn get(&self, root: NodeId) -> Option<&Embedding> {
        self.active.get(&root)
    }

    pub fn get_mut(&mut self, root: NodeId) -> Option<&mut Embedding> {
        self.active.get_mut(&root)
    }

    pub fn insert(&mut self, embedding: Embedding, root_id: WindowId) -> TreeResult<()> {
        if self.active.contains_key(&embedding.root) {
            return Err(WindowTreeError::AlreadyEmbedded(root_id));
        }
        self.active.insert(embedding.root, embedding);
        Ok(())
    }

    fn take(&mut self, root: NodeId, reason: UnembedReason) -> Option<Embedding> {
        let mut embedding = self.active.remove(&root)?;
        embedding.state = EmbeddingState::TornDown(reason);
        Some(embedding)
    }

    pub fn is_root_of(&self, node: NodeId, client: ClientId) -> bool {
        self.active.get(&node).is_some_and(|e| e.child == client)
    }

    /// roots the client was embedded at, top-levels included
    pub fn roots_of(&self, client: ClientId) -> Vec<NodeId> {
        self.active.values().filter(|e| e.child == client).map(|e| e.root).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.active.len()
    }
}

impl WindowBroker {
    /// Makes `child` the client embedded at `root`, replacing any previous
    /// embedding. Top-level self embeddings skip the `OnEmbed` handshake.
    pub(super) fn create_embedding(
        &mut self,
        root: NodeId,
        child: ClientId,
        embedder: Option<ClientId>,
        flags: EmbedFlags,
        top_level: bool,
    ) -> TreeResult<LocalSurfaceId> {
        // display roots keep their top-levels when a window manager arrives
        let display_root = self.store.get(root).is_some_and(|n| n.is_display_root());
        if !display_root {
            for c in self.store.children(root).to_vec() {
                self.store.remove_from_parent(c)?;
            }
        }
        if self.embeddings.get(root).is_some() {
            self.destroy_embedding(root, UnembedReason::ReEmbedded);
        }

        let node = self.store.get_mut(root).ok_or(WindowTreeError::NotFound(WindowId::NULL))?;
        node.embedded_client = Some(child);
        let alias = node.client_window_id;
        let size = node.bounds().size();

        let session = self.sessions.get_mut(&child).ok_or(WindowTreeError::NotFound(alias))?;
        session.namespace.register(alias, root);

        let mut embedding = Embedding::new(root, child, embedder, flags, top_level);
        let local_surface_id = embedding.surfaces.for_size(size);

        if !top_level && let Some(session) = self.sessions.get(&child) {
            if let Some(root_data) = session.window_data(&self.store, root) {
                session.notify(Notification::OnEmbed {
                    client_id: child.0,
                    root: root_data,
                    tree: session.known_subtree(&self.store, root),
                    display_id: self.store.display_of(root),
                    focused_window_id: None,
                    drawn: self.store.is_drawn(root),
                    local_surface_id,
                });
            }
            if let Some(node) = self.store.get_mut(root) {
                node.frame_sink_id = FrameSinkId::new(child, 0);
            }
        }

        let frame_sink_id = self
            .store
            .get(root)
            .map(|n| n.frame_sink_id)
            .unwrap_or_else(|| FrameSinkId::from(alias));
        self.frame_sinks.frame_sink_id_changed(root, frame_sink_id);

        if !top_level && let Some(embedder) = embedder.and_then(|e| self.sessions.get(&e)) {
            if let Some(window_id) = embedder.transport_id(root) {
                embedder.notify(Notification::OnFrameSinkIdAllocated {
                    window_id,
                    frame_sink_id,
                });
            }
        }

        debug!(%alias, %child, ?embedder, top_level, "created embedding");
        self.embeddings.insert(embedding, alias)?;
        Ok(local_surface_id)
    }

    /// Tears down the embedding at `root`, if there is one.
    pub(super) fn destroy_embedding(&mut self, root: NodeId, reason: UnembedReason) {
        let Some(embedding) = self.embeddings.take(root, reason) else {
            return;
        };
        let child = embedding.child;
        if let Some(node) = self.store.get_mut(root)
            && node.embedded_client == Some(child)
        {
            node.embedded_client = None;
        }

        let mut created = Vec::new();
        if let Some(session) = self.sessions.get_mut(&child) {
            if let Some(window_id) = session.transport_id(root)
                && !embedding.top_level
                && matches!(reason, UnembedReason::NodeDeleted | UnembedReason::ReEmbedded)
            {
                session.notify(Notification::OnUnembed { window_id });
                session.notify(Notification::OnWindowDeleted { window_id });
            }
            unregister_recursive(&self.store, session, root, &mut created);
        }
        // the child keeps seeing its own windows, they just lose their parent
        for node in created {
            if self.store.parent(node).is_some() {
                let _ = self.store.remove_from_parent(node);
            }
        }

        if reason == UnembedReason::ExplicitUnembed
            && let Some(owner) = self.store.get(root).and_then(|n| n.owning_client)
            && owner != child
            && let Some(owner_session) = self.sessions.get(&owner)
            && let Some(window_id) = owner_session.transport_id(root)
        {
            owner_session.notify(Notification::OnEmbeddedAppDisconnected { window_id });
        }
        trace!(
            ?root,
            %child,
            embedder = ?embedding.embedder,
            flags = ?embedding.flags,
            state = ?embedding.state(),
            "embedding torn down"
        );
    }
}

fn unregister_recursive(store: &NodeStore, session: &mut ClientSession, node: NodeId, created: &mut Vec<NodeId>) {
    if session.did_create(node) {
        created.push(node);
        return;
    }
    session.namespace.unregister(node);
    for &child in store.children(node) {
        unregister_recursive(store, session, child, created);
    }
}

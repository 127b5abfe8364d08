//! Client entry points. Every one resolves the caller's ids, checks access
//! and mutates the store. Fan-out and replies are left to the dispatcher.
use bytes::Bytes;
use canopy_core::{
    geometry::Rect,
    ids::{ClientId, ClientToken, DisplayId, LocalSurfaceId, TransportId, WindowId},
    messages::{ConnectKind, EmbedFlags, Properties, WindowData},
};
use tracing::{debug, trace};

use crate::broker::{
    ClientLink, DeferredBounds, WindowBroker,
    backend::NativeKind,
    client_session::ClientSession,
    embedding::UnembedReason,
    error::{TreeResult, WindowTreeError},
    node_store::NodeId,
};

#[derive(Debug, Clone, PartialEq)]
pub struct TopLevelCreated {
    pub window: WindowData,
    pub display_id: Option<DisplayId>,
    pub drawn: bool,
    pub local_surface_id: LocalSurfaceId,
}

impl WindowBroker {
    fn session(&self, caller: ClientId) -> TreeResult<&ClientSession> {
        self.sessions.get(&caller).ok_or(WindowTreeError::NotFound(WindowId::NULL))
    }

    fn session_mut(&mut self, caller: ClientId) -> TreeResult<&mut ClientSession> {
        self.sessions.get_mut(&caller).ok_or(WindowTreeError::NotFound(WindowId::NULL))
    }

    fn resolve(&self, caller: ClientId, raw: TransportId) -> TreeResult<NodeId> {
        self.session(caller)?.resolve(raw)
    }

    fn did_create(&self, caller: ClientId, node: NodeId) -> bool {
        self.sessions.get(&caller).is_some_and(|s| s.did_create(node))
    }

    fn is_root(&self, caller: ClientId, node: NodeId) -> bool {
        self.embeddings.is_root_of(node, caller)
    }

    fn is_root_of_another(&self, caller: ClientId, node: NodeId) -> bool {
        self.store
            .get(node)
            .and_then(|n| n.embedded_client)
            .is_some_and(|client| client != caller)
    }

    fn denied(&self, op: &'static str, node: NodeId) -> WindowTreeError {
        WindowTreeError::AccessDenied {
            op,
            window: self.store.get(node).map_or(WindowId::NULL, |n| n.id),
        }
    }

    pub fn new_window(&mut self, caller: ClientId, window_id: TransportId, properties: Properties) -> TreeResult<()> {
        let session = self.sessions.get_mut(&caller).ok_or(WindowTreeError::NotFound(WindowId::NULL))?;
        let alias = session.namespace.from_transport(window_id);
        session.namespace.is_valid_for_new_window(alias)?;
        let id = session.namespace.allocate_local_id()?;
        let native = self
            .backend
            .create_native_node(NativeKind::Window, &properties)
            .ok_or(WindowTreeError::BackendRefused("native window"))?;
        let node = self.store.create(id, alias, Some(caller), Some(native), properties);
        session.namespace.register(alias, node);
        session.created_nodes.insert(node);
        trace!(%alias, %id, "new window");
        Ok(())
    }

    pub fn new_top_level_window(
        &mut self,
        caller: ClientId,
        window_id: TransportId,
        properties: Properties,
    ) -> TreeResult<TopLevelCreated> {
        let (alias, id) = {
            let session = self.session_mut(caller)?;
            let alias = session.namespace.from_transport(window_id);
            session.namespace.is_valid_for_new_window(alias)?;
            (alias, session.namespace.allocate_local_id()?)
        };
        let placement = self
            .delegate
            .new_top_level(&properties, &self.displays)
            .ok_or(WindowTreeError::BackendRefused("delegate declined the top-level"))?;
        let display = *self
            .displays
            .iter()
            .find(|d| d.id == placement.display)
            .ok_or(WindowTreeError::BackendRefused("delegate picked an unknown display"))?;
        let native = self
            .backend
            .create_native_node(NativeKind::TopLevel, &properties)
            .ok_or(WindowTreeError::BackendRefused("native top-level"))?;

        let session = self.sessions.get_mut(&caller).ok_or(WindowTreeError::NotFound(alias))?;
        // placement belongs to the delegate, so nobody owns a top-level
        let node = self.store.create(id, alias, None, Some(native), properties);
        session.namespace.register(alias, node);
        session.created_nodes.insert(node);

        self.store.set_bounds(node, placement.bounds)?;
        self.store.reparent(node, display.root)?;
        let local_surface_id = self.create_embedding(node, caller, None, EmbedFlags::empty(), true)?;

        let window = self
            .session(caller)?
            .window_data(&self.store, node)
            .ok_or(WindowTreeError::NotFound(alias))?;
        let display_id = display.id;
        debug!(%alias, %display_id, bounds = %placement.bounds, "new top-level");
        Ok(TopLevelCreated {
            window,
            display_id: Some(display.id),
            drawn: self.store.is_drawn(node),
            local_surface_id,
        })
    }

    /// Deleting a root the caller was embedded at only unembeds it, the
    /// node belongs to someone else.
    pub fn delete_window(&mut self, caller: ClientId, window_id: TransportId) -> TreeResult<()> {
        let node = self.resolve(caller, window_id)?;
        if self
            .embeddings
            .get(node)
            .is_some_and(|e| e.child == caller && !e.top_level)
        {
            self.destroy_embedding(node, UnembedReason::ExplicitUnembed);
            return Ok(());
        }
        if !self.did_create(caller, node) {
            return Err(self.denied("DeleteWindow", node));
        }
        self.store.destroy(node)
    }

    pub fn add_window(&mut self, caller: ClientId, parent_id: TransportId, child_id: TransportId) -> TreeResult<()> {
        let parent = self.resolve(caller, parent_id)?;
        let child = self.resolve(caller, child_id)?;
        if self.store.parent(child) == Some(parent) {
            return Err(WindowTreeError::HierarchyUnchanged);
        }
        if self.store.contains(child, parent) {
            let id = |n| self.store.get(n).map_or(WindowId::NULL, |w| w.id);
            return Err(WindowTreeError::CycleDetected {
                parent: id(parent),
                child: id(child),
            });
        }
        let parent_allowed = self.is_root(caller, parent)
            || (self.did_create(caller, parent) && !self.is_root_of_another(caller, parent));
        if !self.did_create(caller, child) || !parent_allowed {
            return Err(self.denied("AddWindow", child));
        }
        self.store.reparent(child, parent)
    }

    pub fn remove_window_from_parent(&mut self, caller: ClientId, window_id: TransportId) -> TreeResult<()> {
        let node = self.resolve(caller, window_id)?;
        if self.store.parent(node).is_none() {
            return Err(WindowTreeError::HierarchyUnchanged);
        }
        if !self.did_create(caller, node) && !self.is_root(caller, node) {
            return Err(self.denied("RemoveWindowFromParent", node));
        }
        self.store.remove_from_parent(node)
    }

    pub fn set_window_visibility(&mut self, caller: ClientId, window_id: TransportId, visible: bool) -> TreeResult<()> {
        let node = self.resolve(caller, window_id)?;
        let is_root = self.is_root(caller, node);
        let can_change_root = self.session(caller)?.can_change_root_visibility;
        if !(self.did_create(caller, node) || is_root) || (is_root && !can_change_root) {
            return Err(self.denied("SetWindowVisibility", node));
        }
        self.store.set_visible(node, visible)?;
        Ok(())
    }

    pub fn set_window_opacity(&mut self, caller: ClientId, window_id: TransportId, opacity: f32) -> TreeResult<()> {
        let node = self.resolve(caller, window_id)?;
        if !self.did_create(caller, node) && !self.is_root(caller, node) {
            return Err(self.denied("SetWindowOpacity", node));
        }
        self.store.set_opacity(node, opacity)?;
        Ok(())
    }

    /// Only the owner moves a window directly. Anything else goes to the
    /// delegate after the reply and the caller is told `false` now.
    pub fn set_window_bounds(
        &mut self,
        caller: ClientId,
        window_id: TransportId,
        bounds: Rect,
        local_surface_id: Option<LocalSurfaceId>,
    ) -> TreeResult<()> {
        let node = self.resolve(caller, window_id)?;
        if bounds.width < 0 || bounds.height < 0 {
            return Err(WindowTreeError::InvalidArgument("negative size"));
        }
        let (owner, display_root) = self
            .store
            .get(node)
            .map_or((None, false), |n| (n.owning_client, n.is_display_root()));
        // display geometry comes from the command line, not from clients
        if display_root {
            return Err(self.denied("SetWindowBounds", node));
        }
        if owner != Some(caller) {
            self.deferred.push(DeferredBounds { node, proposed: bounds });
            return Err(WindowTreeError::RoutedToDelegate);
        }
        if let Some(surface) = local_surface_id {
            trace!(%surface, "client supplied surface id");
        }
        self.store.set_bounds(node, bounds)?;
        Ok(())
    }

    pub fn set_window_property(
        &mut self,
        caller: ClientId,
        window_id: TransportId,
        name: &str,
        value: Option<Bytes>,
    ) -> TreeResult<()> {
        let node = self.resolve(caller, window_id)?;
        if !self.did_create(caller, node) && !self.is_root(caller, node) {
            return Err(self.denied("SetWindowProperty", node));
        }
        self.store.set_property(node, name, value)?;
        Ok(())
    }

    /// Embeds the parked client holding `token` at one of the caller's windows.
    pub fn embed(&mut self, caller: ClientId, window_id: TransportId, token: ClientToken, flags: EmbedFlags) -> TreeResult<()> {
        let node = self.resolve(caller, window_id)?;
        if !self.did_create(caller, node) {
            return Err(self.denied("Embed", node));
        }
        let parked = self
            .parked
            .remove(&token)
            .ok_or(WindowTreeError::UnknownEmbedToken(token))?;
        let client_id = match self.ids.allocate_client_id() {
            Ok(id) => id,
            Err(e) => {
                self.parked.insert(token, parked);
                return Err(e);
            }
        };

        // inherited so an embedder cannot shed interception by embedding itself
        let intercepts_events =
            self.session(caller)?.intercepts_events || flags.contains(EmbedFlags::EMBEDDER_INTERCEPTS_EVENTS);
        let mut session = ClientSession::new(
            client_id,
            parked.connection,
            ConnectKind::Embeddable { token },
            parked.outbox,
        );
        session.embedder = Some(caller);
        session.intercepts_events = intercepts_events;
        session.can_change_root_visibility = !flags.contains(EmbedFlags::EMBEDDER_CONTROLS_VISIBILITY);

        self.connections.insert(parked.connection, ClientLink::Session(client_id));
        self.sessions.insert(client_id, session);
        self.session_mut(caller)?.embedded_sessions.push(client_id);
        self.create_embedding(node, client_id, Some(caller), flags, false)?;
        debug!(%client_id, %token, ?flags, "embedded client");
        Ok(())
    }

    pub fn get_window_tree(&self, caller: ClientId, window_id: TransportId) -> TreeResult<Vec<WindowData>> {
        let node = self.resolve(caller, window_id)?;
        Ok(self.session(caller)?.known_subtree(&self.store, node))
    }

    pub fn attach_frame_sink(&mut self, caller: ClientId, window_id: TransportId) -> TreeResult<()> {
        let node = self.resolve(caller, window_id)?;
        let embedded_elsewhere = self.is_root_of_another(caller, node);
        if !self.is_root(caller, node) && !(self.did_create(caller, node) && !embedded_elsewhere) {
            return Err(self.denied("AttachFrameSink", node));
        }
        let frame_sink_id = self
            .store
            .get(node)
            .map(|n| n.frame_sink_id)
            .ok_or(WindowTreeError::NotFound(WindowId::NULL))?;
        let pair = self.frame_sinks.attach(node, frame_sink_id);
        debug!(%frame_sink_id, sink = pair.sink, "frame sink attached");
        Ok(())
    }
}

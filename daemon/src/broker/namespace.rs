//! Per-client identifier namespaces and the broker wide id registry.
use std::collections::HashMap;

use canopy_core::{
    constants::{FIRST_CLIENT_ID, LAST_CLIENT_ID},
    ids::{ClientId, TransportId, WindowId},
};

use crate::broker::{
    error::{TreeResult, WindowTreeError},
    node_store::NodeId,
};

/// Hands out client ids and the ids of broker owned display roots.
#[derive(Debug)]
pub struct IdRegistry {
    next_client_id: u16,
    next_root_id: u16,
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self {
            next_client_id: FIRST_CLIENT_ID,
            next_root_id: 1,
        }
    }
}

impl IdRegistry {
    /// client ids are never reused within one broker lifetime
    pub fn allocate_client_id(&mut self) -> TreeResult<ClientId> {
        if self.next_client_id > LAST_CLIENT_ID {
            return Err(WindowTreeError::NamespaceExhausted);
        }
        let id = ClientId(self.next_client_id);
        self.next_client_id += 1;
        Ok(id)
    }

    pub fn allocate_root_id(&mut self) -> TreeResult<WindowId> {
        let local_id = self.next_root_id;
        self.next_root_id = local_id.checked_add(1).ok_or(WindowTreeError::NamespaceExhausted)?;
        Ok(WindowId::new(ClientId::BROKER, local_id))
    }
}

/// One client's view of the tree: the aliases it uses for every node it
/// knows about.
#[derive(Debug)]
pub struct Namespace {
    client_id: ClientId,
    next_local_id: u16,
    by_alias: HashMap<WindowId, NodeId>,
    by_node: HashMap<NodeId, WindowId>,
}

impl Namespace {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            next_local_id: 1,
            by_alias: HashMap::new(),
            by_node: HashMap::new(),
        }
    }

    /// next global id in this client's prefix
    pub fn allocate_local_id(&mut self) -> TreeResult<WindowId> {
        let local_id = self.next_local_id;
        if local_id == 0 {
            return Err(WindowTreeError::NamespaceExhausted);
        }
        // wrapping to zero marks the namespace as spent
        self.next_local_id = local_id.wrapping_add(1);
        Ok(WindowId::new(self.client_id, local_id))
    }

    pub fn is_valid_for_new_window(&self, id: WindowId) -> TreeResult<()> {
        if id.is_null() || id.local_id == 0 || id.client_id != self.client_id || self.by_alias.contains_key(&id) {
            return Err(WindowTreeError::InvalidId(id));
        }
        Ok(())
    }

    pub fn to_transport(&self, id: WindowId) -> TransportId {
        id.to_transport(self.client_id)
    }

    pub fn from_transport(&self, raw: TransportId) -> WindowId {
        WindowId::from_transport(raw, self.client_id)
    }

    pub fn register(&mut self, alias: WindowId, node: NodeId) {
        if let Some(previous) = self.by_node.insert(node, alias) {
            self.by_alias.remove(&previous);
        }
        self.by_alias.insert(alias, node);
    }

    pub fn unregister(&mut self, node: NodeId) -> Option<WindowId> {
        let alias = self.by_node.remove(&node)?;
        self.by_alias.remove(&alias);
        Some(alias)
    }

    pub fn node_for(&self, alias: WindowId) -> Option<NodeId> {
        self.by_alias.get(&alias).copied()
    }

    pub fn alias_for(&self, node: NodeId) -> Option<WindowId> {
        self.by_node.get(&node).copied()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.by_node.len()
    }
}

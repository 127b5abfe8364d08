//! The shared window tree.
//!
//! Nodes live in a slotmap arena. Mutations never call out to sessions or
//! collaborators, they queue a [`NodeChange`] which the broker drains and
//! dispatches once the mutating operation has finished.
use bytes::Bytes;
use canopy_core::{
    geometry::Rect,
    ids::{ClientId, DisplayId, FrameSinkId, WindowId},
    messages::Properties,
};
use slotmap::SlotMap;

use crate::broker::{
    backend::NativeHandle,
    error::{TreeResult, WindowTreeError},
};

slotmap::new_key_type! {
    /// Arena key of a node. Stale keys never alias a recycled slot.
    pub struct NodeId;
}

#[derive(Debug, Clone)]
pub struct WindowNode {
    pub id: WindowId,
    /// the id the creator chose, embedded clients see the node under it too
    pub client_window_id: WindowId,
    pub owning_client: Option<ClientId>,
    pub embedded_client: Option<ClientId>,
    pub frame_sink_id: FrameSinkId,
    pub native: Option<NativeHandle>,
    pub display: Option<DisplayId>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    bounds: Rect,
    visible: bool,
    opacity: f32,
    properties: Properties,
}

impl WindowNode {
    fn new(id: WindowId, client_window_id: WindowId, owning_client: Option<ClientId>) -> Self {
        Self {
            id,
            client_window_id,
            owning_client,
            embedded_client: None,
            frame_sink_id: FrameSinkId::from(client_window_id),
            native: None,
            display: None,
            parent: None,
            children: Vec::new(),
            bounds: Rect::default(),
            visible: false,
            opacity: 1.0,
            properties: Properties::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn is_display_root(&self) -> bool {
        self.display.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    /// queued before the node's children are unparented, the node is already
    /// gone from the arena when this is handled
    Deleted {
        node: NodeId,
        id: WindowId,
        native: Option<NativeHandle>,
    },
    HierarchyChanged {
        node: NodeId,
        old_parent: Option<NodeId>,
        new_parent: Option<NodeId>,
    },
    BoundsChanged {
        node: NodeId,
        old_bounds: Rect,
        new_bounds: Rect,
    },
    VisibilityChanged {
        node: NodeId,
        visible: bool,
    },
    OpacityChanged {
        node: NodeId,
        old_opacity: f32,
        new_opacity: f32,
    },
    PropertyChanged {
        node: NodeId,
        name: String,
        value: Option<Bytes>,
    },
}

#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: SlotMap<NodeId, WindowNode>,
    changes: Vec<NodeChange>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        id: WindowId,
        client_window_id: WindowId,
        owning_client: Option<ClientId>,
        native: Option<NativeHandle>,
        properties: Properties,
    ) -> NodeId {
        let mut node = WindowNode::new(id, client_window_id, owning_client);
        node.native = native;
        node.properties = properties;
        self.nodes.insert(node)
    }

    /// display roots are visible from the start and never have an owner
    pub fn create_root(
        &mut self,
        id: WindowId,
        display: DisplayId,
        bounds: Rect,
        native: Option<NativeHandle>,
    ) -> NodeId {
        let mut node = WindowNode::new(id, id, None);
        node.display = Some(display);
        node.bounds = bounds;
        node.visible = true;
        node.native = native;
        self.nodes.insert(node)
    }

    pub fn get(&self, node: NodeId) -> Option<&WindowNode> {
        self.nodes.get(node)
    }

    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut WindowNode> {
        self.nodes.get_mut(node)
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, node: NodeId) -> TreeResult<&WindowNode> {
        debug_assert!(self.nodes.contains_key(node), "stale node key {node:?}");
        self.nodes.get(node).ok_or(WindowTreeError::NotFound(WindowId::NULL))
    }

    fn node_mut(&mut self, node: NodeId) -> TreeResult<&mut WindowNode> {
        debug_assert!(self.nodes.contains_key(node), "stale node key {node:?}");
        self.nodes.get_mut(node).ok_or(WindowTreeError::NotFound(WindowId::NULL))
    }

    pub fn destroy(&mut self, node: NodeId) -> TreeResult<()> {
        let (id, native, children) = {
            let n = self.node(node)?;
            (n.id, n.native, n.children.clone())
        };
        self.changes.push(NodeChange::Deleted { node, id, native });
        for child in children {
            self.detach(child)?;
        }
        if self.node(node)?.parent.is_some() {
            self.detach(node)?;
        }
        self.nodes.remove(node);
        Ok(())
    }

    pub fn reparent(&mut self, child: NodeId, new_parent: NodeId) -> TreeResult<()> {
        let old_parent = self.node(child)?.parent;
        if old_parent == Some(new_parent) {
            return Err(WindowTreeError::HierarchyUnchanged);
        }
        if self.contains(child, new_parent) {
            return Err(WindowTreeError::CycleDetected {
                parent: self.node(new_parent)?.id,
                child: self.node(child)?.id,
            });
        }
        if let Some(old) = old_parent {
            self.node_mut(old)?.children.retain(|c| *c != child);
        }
        self.node_mut(new_parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(new_parent);
        self.changes.push(NodeChange::HierarchyChanged {
            node: child,
            old_parent,
            new_parent: Some(new_parent),
        });
        Ok(())
    }

    pub fn remove_from_parent(&mut self, child: NodeId) -> TreeResult<()> {
        if self.node(child)?.parent.is_none() {
            return Err(WindowTreeError::HierarchyUnchanged);
        }
        self.detach(child)
    }

    fn detach(&mut self, child: NodeId) -> TreeResult<()> {
        let old_parent = self.node_mut(child)?.parent.take();
        if let Some(old) = old_parent {
            self.node_mut(old)?.children.retain(|c| *c != child);
        }
        self.changes.push(NodeChange::HierarchyChanged {
            node: child,
            old_parent,
            new_parent: None,
        });
        Ok(())
    }

    pub fn set_bounds(&mut self, node: NodeId, bounds: Rect) -> TreeResult<bool> {
        let n = self.node_mut(node)?;
        if n.bounds == bounds {
            return Ok(false);
        }
        let old_bounds = std::mem::replace(&mut n.bounds, bounds);
        self.changes.push(NodeChange::BoundsChanged {
            node,
            old_bounds,
            new_bounds: bounds,
        });
        Ok(true)
    }

    pub fn set_visible(&mut self, node: NodeId, visible: bool) -> TreeResult<bool> {
        let n = self.node_mut(node)?;
        if n.visible == visible {
            return Ok(false);
        }
        n.visible = visible;
        self.changes.push(NodeChange::VisibilityChanged { node, visible });
        Ok(true)
    }

    pub fn set_opacity(&mut self, node: NodeId, opacity: f32) -> TreeResult<bool> {
        if opacity.is_nan() {
            return Err(WindowTreeError::InvalidArgument("opacity is NaN"));
        }
        let opacity = opacity.clamp(0.0, 1.0);
        let n = self.node_mut(node)?;
        if n.opacity == opacity {
            return Ok(false);
        }
        let old_opacity = std::mem::replace(&mut n.opacity, opacity);
        self.changes.push(NodeChange::OpacityChanged {
            node,
            old_opacity,
            new_opacity: opacity,
        });
        Ok(true)
    }

    /// `None` removes the property
    pub fn set_property(&mut self, node: NodeId, name: &str, value: Option<Bytes>) -> TreeResult<bool> {
        let n = self.node_mut(node)?;
        let changed = match &value {
            Some(v) => n.properties.get(name) != Some(v),
            None => n.properties.contains_key(name),
        };
        if !changed {
            return Ok(false);
        }
        match &value {
            Some(v) => {
                n.properties.insert(name.to_string(), v.clone());
            }
            None => {
                n.properties.remove(name);
            }
        }
        self.changes.push(NodeChange::PropertyChanged {
            node,
            name: name.to_string(),
            value,
        });
        Ok(true)
    }

    /// visible with a fully visible ancestor chain ending at a display root
    pub fn is_drawn(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        let mut top = None;
        while let Some(id) = current {
            let Some(n) = self.nodes.get(id) else {
                return false;
            };
            if !n.visible {
                return false;
            }
            top = Some(n);
            current = n.parent;
        }
        top.is_some_and(WindowNode::is_display_root)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    /// bottom to top
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(node).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// parent first, the node itself excluded
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut next = self.parent(node);
        std::iter::from_fn(move || {
            let current = next?;
            next = self.parent(current);
            Some(current)
        })
    }

    /// true when `node` is `ancestor` or lies below it
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    pub fn display_of(&self, node: NodeId) -> Option<DisplayId> {
        let top = self.ancestors(node).last().unwrap_or(node);
        self.nodes.get(top).and_then(|n| n.display)
    }

    pub fn preorder(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if !self.nodes.contains_key(id) {
                continue;
            }
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn drain_changes(&mut self) -> Vec<NodeChange> {
        std::mem::take(&mut self.changes)
    }

    #[cfg(test)]
    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

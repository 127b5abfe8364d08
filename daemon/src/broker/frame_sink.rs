use std::collections::HashMap;

use canopy_core::ids::FrameSinkId;
use tracing::trace;

use crate::broker::{
    backend::{FrameSinkHost, SinkPair},
    node_store::NodeId,
};

/// Keeps the compositor side sink of every attached node.
pub struct FrameSinkBridge {
    host: Box<dyn FrameSinkHost>,
    attached: HashMap<NodeId, SinkPair>,
}

impl FrameSinkBridge {
    pub fn new(host: Box<dyn FrameSinkHost>) -> Self {
        Self {
            host,
            attached: HashMap::new(),
        }
    }

    /// re-attaching replaces the previous pair
    pub fn attach(&mut self, node: NodeId, frame_sink_id: FrameSinkId) -> SinkPair {
        if let Some(old) = self.attached.remove(&node) {
            trace!(old = %old.frame_sink_id, "replacing frame sink");
            self.host.release_sink(old.frame_sink_id);
        }
        let pair = self.host.create_sink(frame_sink_id);
        self.attached.insert(node, pair);
        pair
    }

    pub fn detach(&mut self, node: NodeId) -> bool {
        match self.attached.remove(&node) {
            Some(pair) => {
                self.host.release_sink(pair.frame_sink_id);
                true
            }
            None => false,
        }
    }

    /// an attached node whose sink id changed gets a fresh pair under the new id
    pub fn frame_sink_id_changed(&mut self, node: NodeId, frame_sink_id: FrameSinkId) {
        if self.attached.get(&node).is_some_and(|pair| pair.frame_sink_id != frame_sink_id) {
            self.attach(node, frame_sink_id);
        }
    }

    pub fn node_for_sink(&self, frame_sink_id: FrameSinkId) -> Option<NodeId> {
        self.attached
            .iter()
            .find(|(_, pair)| pair.frame_sink_id == frame_sink_id)
            .map(|(node, _)| *node)
    }
}

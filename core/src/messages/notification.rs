use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    geometry::Rect,
    ids::{DisplayId, FrameSinkId, LocalSurfaceId, TransportId},
    messages::{request::Properties, traits::Message},
};

/// A window as one particular client sees it. Parents the client does not
/// know about are reported as `None`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct WindowData {
    pub window_id: TransportId,
    pub parent_id: Option<TransportId>,
    pub bounds: Rect,
    pub visible: bool,
    pub opacity: f32,
    pub properties: Properties,
}

// --------- broker -> client ---------  //

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum Notification {
    /// reply to [`Hello`](crate::messages::Hello), parked embeddables get no id yet
    Connected {
        client_id: Option<u16>,
    },
    ConnectFailed {
        reason: String,
    },
    OnEmbed {
        client_id: u16,
        root: WindowData,
        tree: Vec<WindowData>,
        display_id: Option<DisplayId>,
        focused_window_id: Option<TransportId>,
        drawn: bool,
        local_surface_id: LocalSurfaceId,
    },
    OnTopLevelCreated {
        change_id: u32,
        window: WindowData,
        display_id: Option<DisplayId>,
        drawn: bool,
        local_surface_id: LocalSurfaceId,
    },
    OnWindowDeleted {
        window_id: TransportId,
    },
    OnWindowBoundsChanged {
        window_id: TransportId,
        old_bounds: Rect,
        new_bounds: Rect,
        local_surface_id: Option<LocalSurfaceId>,
    },
    OnWindowHierarchyChanged {
        window_id: TransportId,
        old_parent_id: Option<TransportId>,
        new_parent_id: Option<TransportId>,
    },
    OnWindowVisibilityChanged {
        window_id: TransportId,
        visible: bool,
    },
    OnWindowOpacityChanged {
        window_id: TransportId,
        old_opacity: f32,
        new_opacity: f32,
    },
    OnWindowSharedPropertyChanged {
        window_id: TransportId,
        name: String,
        value: Option<Bytes>,
    },
    OnUnembed {
        window_id: TransportId,
    },
    OnEmbeddedAppDisconnected {
        window_id: TransportId,
    },
    OnFrameSinkIdAllocated {
        window_id: TransportId,
        frame_sink_id: FrameSinkId,
    },
    OnChangeCompleted {
        change_id: u32,
        success: bool,
    },
    WindowTree {
        change_id: u32,
        windows: Vec<WindowData>,
    },
    /// the session is gone, no further notifications follow
    Disconnected,
}
impl Message for Notification {}

impl Notification {
    /// the change id this notification answers, if it answers one
    pub fn change_id(&self) -> Option<u32> {
        match self {
            Self::OnTopLevelCreated { change_id, .. }
            | Self::OnChangeCompleted { change_id, .. }
            | Self::WindowTree { change_id, .. } => Some(*change_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::ConnectFailed { .. })
    }
}

//! Collaborators the broker drives but does not implement: the platform
//! windowing layer, the placement policy and the compositor's frame sinks.
//! The daemon ships headless versions of all three.
use std::collections::HashMap;

use canopy_core::{
    constants::INITIAL_BOUNDS_PROPERTY,
    geometry::{Rect, Size},
    ids::{DisplayId, FrameSinkId, LocalSurfaceId, WindowId},
    messages::Properties,
};
use clap::ValueEnum;
use derive_more::Display;
use tracing::{debug, trace, warn};

use crate::broker::node_store::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[display("native#{_0}")]
pub struct NativeHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeKind {
    DisplayRoot,
    Window,
    TopLevel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Display {
    pub id: DisplayId,
    pub root: NodeId,
    pub bounds: Rect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub display: DisplayId,
    pub bounds: Rect,
}

/// what the compositor reports once a client first submits a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub local_surface_id: Option<LocalSurfaceId>,
    pub size: Size,
    pub device_scale_factor_percent: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkPair {
    pub frame_sink_id: FrameSinkId,
    pub sink: u64,
    pub client: u64,
}

pub trait WindowingBackend: Send {
    /// `None` refuses the window
    fn create_native_node(&mut self, kind: NativeKind, properties: &Properties) -> Option<NativeHandle>;
    fn set_bounds(&mut self, handle: NativeHandle, bounds: Rect);
    fn destroy_native_node(&mut self, handle: NativeHandle);
    fn on_first_surface_activation(&mut self, handle: NativeHandle, info: &SurfaceInfo);
}

pub trait BrokerDelegate: Send {
    /// where a new top-level goes, `None` refuses it
    fn new_top_level(&mut self, properties: &Properties, displays: &[Display]) -> Option<Placement>;

    /// final bounds for a change a client may not apply itself, `None` keeps
    /// the current bounds
    fn on_bounds_change_requested(
        &mut self,
        window: WindowId,
        current: Rect,
        proposed: Rect,
        display: Option<&Display>,
    ) -> Option<Rect>;
}

pub trait FrameSinkHost: Send {
    fn create_sink(&mut self, frame_sink_id: FrameSinkId) -> SinkPair;
    fn release_sink(&mut self, frame_sink_id: FrameSinkId);
}

// --------- headless backend ---------  //

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_handle: u64,
    live: HashMap<NativeHandle, (NativeKind, Rect)>,
    activations: Vec<(NativeHandle, SurfaceInfo)>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    #[cfg(test)]
    pub fn bounds_of(&self, handle: NativeHandle) -> Option<Rect> {
        self.live.get(&handle).map(|(_, bounds)| *bounds)
    }

    #[cfg(test)]
    pub fn activations(&self) -> &[(NativeHandle, SurfaceInfo)] {
        &self.activations
    }
}

impl WindowingBackend for HeadlessBackend {
    fn create_native_node(&mut self, kind: NativeKind, _properties: &Properties) -> Option<NativeHandle> {
        self.next_handle += 1;
        let handle = NativeHandle(self.next_handle);
        self.live.insert(handle, (kind, Rect::default()));
        trace!(%handle, ?kind, "created native node");
        Some(handle)
    }

    fn set_bounds(&mut self, handle: NativeHandle, bounds: Rect) {
        match self.live.get_mut(&handle) {
            Some((_, current)) => *current = bounds,
            None => warn!(%handle, "bounds for unknown native node"),
        }
    }

    fn destroy_native_node(&mut self, handle: NativeHandle) {
        if self.live.remove(&handle).is_none() {
            warn!(%handle, "destroying unknown native node");
        }
    }

    fn on_first_surface_activation(&mut self, handle: NativeHandle, info: &SurfaceInfo) {
        debug!(%handle, size = %info.size, "first surface activation");
        self.activations.push((handle, *info));
    }
}

// --------- placement policy ---------  //

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Display)]
pub enum BoundsPolicy {
    /// apply whatever the client asked for
    Accept,
    /// keep the window inside its display
    #[default]
    Clamp,
    /// ignore client bounds requests
    Deny,
}

const CASCADE_STEP: i32 = 32;
const CASCADE_WRAP: u32 = 10;
const DEFAULT_TOP_LEVEL_SIZE: Size = Size {
    width: 800,
    height: 600,
};

#[derive(Debug)]
pub struct PolicyDelegate {
    policy: BoundsPolicy,
    placed: u32,
}

impl PolicyDelegate {
    pub fn new(policy: BoundsPolicy) -> Self {
        Self { policy, placed: 0 }
    }

    fn cascade(&mut self, display: &Display) -> Rect {
        let step = (self.placed % CASCADE_WRAP) as i32 * CASCADE_STEP;
        self.placed += 1;
        Rect::new(
            display.bounds.x + step,
            display.bounds.y + step,
            DEFAULT_TOP_LEVEL_SIZE.width,
            DEFAULT_TOP_LEVEL_SIZE.height,
        )
        .clamp_within(&display.bounds)
    }
}

impl BrokerDelegate for PolicyDelegate {
    fn new_top_level(&mut self, properties: &Properties, displays: &[Display]) -> Option<Placement> {
        let requested = properties
            .get(INITIAL_BOUNDS_PROPERTY)
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .and_then(|raw| raw.parse::<Rect>().ok());

        let display = match requested {
            Some(rect) => displays
                .iter()
                .find(|d| d.bounds.contains_rect(&rect))
                .or_else(|| displays.first())?,
            None => displays.first()?,
        };

        let bounds = match (requested, self.policy) {
            (Some(rect), BoundsPolicy::Accept) => rect,
            (Some(rect), BoundsPolicy::Clamp) => rect.clamp_within(&display.bounds),
            (Some(_), BoundsPolicy::Deny) | (None, _) => self.cascade(display),
        };
        let display_id = display.id;
        debug!(%display_id, %bounds, "placing top-level");
        Some(Placement {
            display: display.id,
            bounds,
        })
    }

    fn on_bounds_change_requested(
        &mut self,
        window: WindowId,
        current: Rect,
        proposed: Rect,
        display: Option<&Display>,
    ) -> Option<Rect> {
        let decided = match self.policy {
            BoundsPolicy::Accept => Some(proposed),
            BoundsPolicy::Clamp => Some(display.map_or(proposed, |d| proposed.clamp_within(&d.bounds))),
            BoundsPolicy::Deny => None,
        };
        debug!(%window, %current, %proposed, ?decided, policy = %self.policy, "bounds change requested");
        decided
    }
}

// --------- frame sinks ---------  //

#[derive(Debug, Default)]
pub struct HeadlessFrameSinkHost {
    next_pipe: u64,
    live: HashMap<FrameSinkId, SinkPair>,
}

impl HeadlessFrameSinkHost {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

impl FrameSinkHost for HeadlessFrameSinkHost {
    fn create_sink(&mut self, frame_sink_id: FrameSinkId) -> SinkPair {
        self.next_pipe += 2;
        let pair = SinkPair {
            frame_sink_id,
            sink: self.next_pipe - 1,
            client: self.next_pipe,
        };
        if self.live.insert(frame_sink_id, pair).is_some() {
            trace!(%frame_sink_id, "replacing live sink");
        }
        pair
    }

    fn release_sink(&mut self, frame_sink_id: FrameSinkId) {
        self.live.remove(&frame_sink_id);
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use bytes::Bytes;
    use canopy_core::ids::ClientId;
    use slotmap::SlotMap;

    use super::*;

    fn displays() -> Vec<Display> {
        let mut map: SlotMap<NodeId, ()> = SlotMap::with_key();
        vec![
            Display {
                id: DisplayId(1),
                root: map.insert(()),
                bounds: Rect::new(0, 0, 1000, 800),
            },
            Display {
                id: DisplayId(2),
                root: map.insert(()),
                bounds: Rect::new(1000, 0, 1000, 800),
            },
        ]
    }

    #[test]
    fn test_top_levels_cascade() {
        let displays = displays();
        let mut delegate = PolicyDelegate::new(BoundsPolicy::Clamp);
        let first = delegate.new_top_level(&Properties::new(), &displays).unwrap();
        let second = delegate.new_top_level(&Properties::new(), &displays).unwrap();
        assert_eq!(first.display, DisplayId(1));
        assert_eq!(first.bounds, Rect::new(0, 0, 800, 600));
        assert_eq!(second.bounds, Rect::new(32, 32, 800, 600));
    }

    #[test]
    fn test_initial_bounds_pick_display() {
        let displays = displays();
        let mut delegate = PolicyDelegate::new(BoundsPolicy::Clamp);
        let mut properties = Properties::new();
        properties.insert(
            INITIAL_BOUNDS_PROPERTY.to_string(),
            Bytes::from_static(b"200x100+1100+50"),
        );
        let placement = delegate.new_top_level(&properties, &displays).unwrap();
        assert_eq!(placement.display, DisplayId(2));
        assert_eq!(placement.bounds, Rect::new(1100, 50, 200, 100));
    }

    #[test]
    fn test_no_display_refuses_top_level() {
        let mut delegate = PolicyDelegate::new(BoundsPolicy::Accept);
        assert!(delegate.new_top_level(&Properties::new(), &[]).is_none());
    }

    #[test]
    fn test_bounds_policies() {
        let displays = displays();
        let window = WindowId::new(ClientId(1), 1);
        let current = Rect::new(0, 0, 100, 100);
        let proposed = Rect::new(950, 0, 100, 100);

        let mut accept = PolicyDelegate::new(BoundsPolicy::Accept);
        let mut clamp = PolicyDelegate::new(BoundsPolicy::Clamp);
        let mut deny = PolicyDelegate::new(BoundsPolicy::Deny);
        assert_eq!(
            accept.on_bounds_change_requested(window, current, proposed, displays.first()),
            Some(proposed)
        );
        assert_eq!(
            clamp.on_bounds_change_requested(window, current, proposed, displays.first()),
            Some(Rect::new(900, 0, 100, 100))
        );
        assert_eq!(
            deny.on_bounds_change_requested(window, current, proposed, displays.first()),
            None
        );
    }

    #[test]
    fn test_headless_backend_tracks_nodes() {
        let mut backend = HeadlessBackend::new();
        let handle = backend
            .create_native_node(NativeKind::Window, &Properties::new())
            .unwrap();
        backend.set_bounds(handle, Rect::new(1, 1, 5, 5));
        assert_eq!(backend.bounds_of(handle), Some(Rect::new(1, 1, 5, 5)));
        backend.destroy_native_node(handle);
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn test_headless_sink_host_releases_pairs() {
        let mut host = HeadlessFrameSinkHost::new();
        let first = host.create_sink(FrameSinkId::new(ClientId(1), 1));
        let second = host.create_sink(FrameSinkId::new(ClientId(1), 2));
        assert_ne!(first.sink, second.sink);
        assert_eq!(host.live_count(), 2);
        host.release_sink(first.frame_sink_id);
        assert_eq!(host.live_count(), 1);
    }
}

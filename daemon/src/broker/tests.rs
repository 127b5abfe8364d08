#![allow(clippy::unwrap_used)]
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use canopy_core::{
    geometry::Rect,
    ids::{ClientId, ClientToken, DisplayId, FrameSinkId, LocalSurfaceId, TransportId, WindowId},
    messages::{ConnectKind, EmbedFlags, Notification, Properties, RequestBody, RequestBuilder},
};
use tokio::sync::mpsc;

use super::*;
use crate::broker::backend::{
    BoundsPolicy, HeadlessBackend, HeadlessFrameSinkHost, NativeHandle, PolicyDelegate, SurfaceInfo,
    WindowingBackend,
};

const DISPLAY: Rect = Rect::new(0, 0, 1024, 768);

/// lets a test look into the backend after handing it to the broker
#[derive(Clone, Default)]
struct SharedBackend(Arc<Mutex<HeadlessBackend>>);

impl SharedBackend {
    fn with<T>(&self, f: impl FnOnce(&HeadlessBackend) -> T) -> T {
        f(&self.0.lock().unwrap())
    }
}

impl WindowingBackend for SharedBackend {
    fn create_native_node(&mut self, kind: NativeKind, properties: &Properties) -> Option<NativeHandle> {
        self.0.lock().unwrap().create_native_node(kind, properties)
    }

    fn set_bounds(&mut self, handle: NativeHandle, bounds: Rect) {
        self.0.lock().unwrap().set_bounds(handle, bounds)
    }

    fn destroy_native_node(&mut self, handle: NativeHandle) {
        self.0.lock().unwrap().destroy_native_node(handle)
    }

    fn on_first_surface_activation(&mut self, handle: NativeHandle, info: &SurfaceInfo) {
        self.0.lock().unwrap().on_first_surface_activation(handle, info)
    }
}

struct TestClient {
    connection: ConnectionId,
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl TestClient {
    fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.rx.try_recv() {
            out.push(n);
        }
        out
    }

    fn client_id(&mut self) -> ClientId {
        self.drain()
            .into_iter()
            .find_map(|n| match n {
                Notification::Connected { client_id: Some(id) } => Some(ClientId(id)),
                Notification::OnEmbed { client_id, .. } => Some(ClientId(client_id)),
                _ => None,
            })
            .unwrap()
    }
}

struct Harness {
    broker: WindowBroker,
    backend: SharedBackend,
    next_connection: u64,
}

impl Harness {
    fn new(policy: BoundsPolicy) -> Self {
        let backend = SharedBackend::default();
        let broker = WindowBroker::new(
            &[DISPLAY],
            Box::new(backend.clone()),
            Box::new(PolicyDelegate::new(policy)),
            Box::new(HeadlessFrameSinkHost::new()),
        )
        .unwrap();
        Self {
            broker,
            backend,
            next_connection: 0,
        }
    }

    fn connect(&mut self, kind: ConnectKind) -> TestClient {
        self.next_connection += 1;
        let connection = ConnectionId(self.next_connection);
        let (tx, rx) = mpsc::unbounded_channel();
        self.broker.connect(connection, kind, tx).unwrap();
        TestClient { connection, rx }
    }

    fn request(&mut self, client: &TestClient, change_id: u32, body: RequestBody) {
        let request = RequestBuilder::default().change_id(change_id).body(body).build();
        self.broker.dispatch(client.connection, request);
    }

    /// sends `body` and returns the completion, asserting nothing else arrived first
    fn call(&mut self, client: &mut TestClient, body: RequestBody) -> bool {
        self.request(client, 7, body);
        match client.drain().as_slice() {
            [Notification::OnChangeCompleted { change_id: 7, success }] => *success,
            other => panic!("expected a lone completion, got {other:?}"),
        }
    }
}

fn t(local: u32) -> TransportId {
    TransportId(local)
}

fn foreign(client: ClientId, local: u16) -> TransportId {
    TransportId::pack(WindowId::new(client, local))
}

fn new_window(id: u32) -> RequestBody {
    RequestBody::NewWindow {
        window_id: t(id),
        properties: Properties::new(),
    }
}

fn embed(id: u32, token: ClientToken, flags: EmbedFlags) -> RequestBody {
    RequestBody::Embed {
        window_id: t(id),
        client: token,
        flags,
    }
}

/// A creates window 1 and embeds a fresh client there
fn embedded_pair(h: &mut Harness, flags: EmbedFlags) -> (TestClient, ClientId, TestClient, ClientId) {
    let mut a = h.connect(ConnectKind::Client);
    let a_id = a.client_id();
    assert!(h.call(&mut a, new_window(1)));

    let token = ClientToken::generate();
    let mut b = h.connect(ConnectKind::Embeddable { token });
    assert_eq!(b.drain(), vec![Notification::Connected { client_id: None }]);

    h.request(&a, 1, embed(1, token, flags));
    let a_seen = a.drain();
    assert!(matches!(
        a_seen.as_slice(),
        [
            Notification::OnFrameSinkIdAllocated { window_id, .. },
            Notification::OnChangeCompleted { change_id: 1, success: true },
        ] if *window_id == t(1)
    ));
    let b_id = b.client_id();
    (a, a_id, b, b_id)
}

#[test]
fn test_add_window_cycle_is_rejected() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let mut a = h.connect(ConnectKind::Client);
    a.drain();
    assert!(h.call(&mut a, new_window(1)));
    assert!(h.call(&mut a, new_window(2)));
    assert!(h.call(
        &mut a,
        RequestBody::AddWindow {
            parent_id: t(1),
            child_id: t(2),
        }
    ));
    assert!(!h.call(
        &mut a,
        RequestBody::AddWindow {
            parent_id: t(2),
            child_id: t(1),
        }
    ));
    // already parented there
    assert!(!h.call(
        &mut a,
        RequestBody::AddWindow {
            parent_id: t(1),
            child_id: t(2),
        }
    ));
}

#[test]
fn test_new_window_id_validation() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let mut a = h.connect(ConnectKind::Client);
    a.drain();
    assert!(!h.call(&mut a, new_window(0)));
    assert!(!h.call(
        &mut a,
        RequestBody::NewWindow {
            window_id: foreign(ClientId(9), 1),
            properties: Properties::new(),
        }
    ));
    assert!(h.call(&mut a, new_window(1)));
    assert!(!h.call(&mut a, new_window(1)));
}

#[test]
fn test_embed_hands_root_to_child() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let mut a = h.connect(ConnectKind::Client);
    let a_id = a.client_id();
    assert!(h.call(&mut a, new_window(1)));
    let token = ClientToken::generate();
    let mut b = h.connect(ConnectKind::Embeddable { token });
    b.drain();

    h.request(&a, 1, embed(1, token, EmbedFlags::empty()));
    let seen = b.drain();
    let [
        Notification::OnEmbed {
            client_id,
            root,
            tree,
            display_id,
            drawn,
            ..
        },
    ] = seen.as_slice()
    else {
        panic!("expected OnEmbed, got {seen:?}");
    };
    assert_ne!(ClientId(*client_id), a_id);
    assert_eq!(root.window_id, foreign(a_id, 1));
    assert_eq!(root.parent_id, None);
    assert_eq!(tree.len(), 1);
    assert_eq!(*display_id, None);
    assert!(!drawn);

    let frame_sink = a.drain().into_iter().find_map(|n| match n {
        Notification::OnFrameSinkIdAllocated { frame_sink_id, .. } => Some(frame_sink_id),
        _ => None,
    });
    assert_eq!(frame_sink, Some(FrameSinkId::new(ClientId(*client_id), 0)));
}

#[test]
fn test_unknown_embed_token_fails() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let mut a = h.connect(ConnectKind::Client);
    a.drain();
    assert!(h.call(&mut a, new_window(1)));
    assert!(!h.call(&mut a, embed(1, ClientToken::generate(), EmbedFlags::empty())));
}

#[test]
fn test_deleting_embed_root_unembeds_child() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let (mut a, a_id, mut b, _) = embedded_pair(&mut h, EmbedFlags::empty());
    let root = foreign(a_id, 1);

    assert!(h.call(&mut b, new_window(1)));
    assert!(h.call(
        &mut b,
        RequestBody::AddWindow {
            parent_id: root,
            child_id: t(1),
        }
    ));
    assert!(h.call(&mut a, RequestBody::DeleteWindow { window_id: t(1) }));

    assert_eq!(
        b.drain(),
        vec![
            Notification::OnUnembed { window_id: root },
            Notification::OnWindowDeleted { window_id: root },
        ]
    );
    // B's own window survives, unparented
    h.request(&b, 9, RequestBody::GetWindowTree { window_id: t(1) });
    let Some(Notification::WindowTree { windows, .. }) = b.drain().pop() else {
        panic!("expected a tree");
    };
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].parent_id, None);
}

#[test]
fn test_re_embedding_unembeds_previous_child_once() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let (a, a_id, mut b, _) = embedded_pair(&mut h, EmbedFlags::empty());
    let root = foreign(a_id, 1);

    let token = ClientToken::generate();
    let mut c = h.connect(ConnectKind::Embeddable { token });
    c.drain();
    h.request(&a, 2, embed(1, token, EmbedFlags::empty()));

    assert_eq!(
        b.drain(),
        vec![
            Notification::OnUnembed { window_id: root },
            Notification::OnWindowDeleted { window_id: root },
        ]
    );
    let c_seen = c.drain();
    assert!(matches!(c_seen.as_slice(), [Notification::OnEmbed { root: data, .. }] if data.window_id == root));

    // B no longer knows the root
    assert!(!h.call(
        &mut b,
        RequestBody::SetWindowVisibility {
            window_id: root,
            visible: true,
        }
    ));
}

#[test]
fn test_explicit_unembed_notifies_owner() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let (mut a, a_id, mut b, _) = embedded_pair(&mut h, EmbedFlags::empty());
    let root = foreign(a_id, 1);

    assert!(h.call(&mut b, RequestBody::DeleteWindow { window_id: root }));
    assert_eq!(
        a.drain(),
        vec![Notification::OnEmbeddedAppDisconnected { window_id: t(1) }]
    );
    // the node survives for its owner
    assert!(h.call(
        &mut a,
        RequestBody::SetWindowVisibility {
            window_id: t(1),
            visible: true,
        }
    ));
}

#[test]
fn test_foreign_bounds_change_routes_to_delegate() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let (mut a, a_id, mut b, _) = embedded_pair(&mut h, EmbedFlags::empty());
    let root = foreign(a_id, 1);
    let bounds = Rect::new(10, 10, 300, 200);

    h.request(
        &b,
        4,
        RequestBody::SetWindowBounds {
            window_id: root,
            bounds,
            local_surface_id: None,
        },
    );
    let seen = b.drain();
    assert_eq!(
        seen[0],
        Notification::OnChangeCompleted {
            change_id: 4,
            success: false,
        }
    );
    let Notification::OnWindowBoundsChanged {
        window_id,
        old_bounds,
        new_bounds,
        local_surface_id: Some(LocalSurfaceId { parent_sequence, .. }),
    } = &seen[1]
    else {
        panic!("expected bounds change with a surface id, got {seen:?}");
    };
    assert_eq!(*window_id, root);
    assert_eq!(*old_bounds, Rect::default());
    assert_eq!(*new_bounds, bounds);
    assert_eq!(*parent_sequence, 2);
    assert_eq!(seen.len(), 2);

    assert_eq!(
        a.drain(),
        vec![Notification::OnWindowBoundsChanged {
            window_id: t(1),
            old_bounds: Rect::default(),
            new_bounds: bounds,
            local_surface_id: None,
        }]
    );
}

#[test]
fn test_denied_bounds_change_leaves_node_alone() {
    let mut h = Harness::new(BoundsPolicy::Deny);
    let (mut a, a_id, mut b, _) = embedded_pair(&mut h, EmbedFlags::empty());
    let root = foreign(a_id, 1);

    assert!(!h.call(
        &mut b,
        RequestBody::SetWindowBounds {
            window_id: root,
            bounds: Rect::new(0, 0, 50, 50),
            local_surface_id: None,
        }
    ));
    assert!(a.drain().is_empty());

    // the owner applies bounds directly
    assert!(h.call(
        &mut a,
        RequestBody::SetWindowBounds {
            window_id: t(1),
            bounds: Rect::new(0, 0, 60, 60),
            local_surface_id: None,
        }
    ));
    let seen = b.drain();
    assert!(matches!(
        seen.as_slice(),
        [Notification::OnWindowBoundsChanged { new_bounds, local_surface_id: Some(_), .. }]
            if *new_bounds == Rect::new(0, 0, 60, 60)
    ));
}

#[test]
fn test_embedder_controls_visibility() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let (_a, a_id, mut b, b_id) = embedded_pair(&mut h, EmbedFlags::EMBEDDER_CONTROLS_VISIBILITY);
    let node = h.broker.sessions[&a_id].resolve(t(1)).unwrap();
    let embedding = h.broker.embeddings.get(node).unwrap();
    assert_eq!(embedding.embedder, Some(a_id));
    assert_eq!(embedding.flags, EmbedFlags::EMBEDDER_CONTROLS_VISIBILITY);
    assert!(!h.broker.sessions[&b_id].can_change_root_visibility);
    assert!(!h.broker.sessions[&b_id].intercepts_events);

    let root = foreign(a_id, 1);
    assert!(!h.call(
        &mut b,
        RequestBody::SetWindowVisibility {
            window_id: root,
            visible: true,
        }
    ));
    // other root mutations are still allowed
    assert!(h.call(
        &mut b,
        RequestBody::SetWindowOpacity {
            window_id: root,
            opacity: 0.5,
        }
    ));

    let mut h = Harness::new(BoundsPolicy::Accept);
    let (_a, a_id, mut b, _) = embedded_pair(&mut h, EmbedFlags::empty());
    assert!(h.call(
        &mut b,
        RequestBody::SetWindowVisibility {
            window_id: foreign(a_id, 1),
            visible: true,
        }
    ));
}

#[test]
fn test_changes_fan_out_to_everyone_but_the_originator() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let (mut a, a_id, mut b, _) = embedded_pair(&mut h, EmbedFlags::empty());
    let root = foreign(a_id, 1);

    assert!(h.call(
        &mut a,
        RequestBody::SetWindowProperty {
            window_id: t(1),
            name: "title".to_string(),
            value: Some(Bytes::from_static(b"hello")),
        }
    ));
    assert_eq!(
        b.drain(),
        vec![Notification::OnWindowSharedPropertyChanged {
            window_id: root,
            name: "title".to_string(),
            value: Some(Bytes::from_static(b"hello")),
        }]
    );

    assert!(h.call(
        &mut b,
        RequestBody::SetWindowOpacity {
            window_id: root,
            opacity: 0.25,
        }
    ));
    assert_eq!(
        a.drain(),
        vec![Notification::OnWindowOpacityChanged {
            window_id: t(1),
            old_opacity: 1.0,
            new_opacity: 0.25,
        }]
    );
}

#[test]
fn test_window_tree_prunes_unknown_windows() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let (mut a, a_id, mut b, _) = embedded_pair(&mut h, EmbedFlags::empty());
    let root = foreign(a_id, 1);
    assert!(h.call(&mut b, new_window(5)));
    assert!(h.call(
        &mut b,
        RequestBody::AddWindow {
            parent_id: root,
            child_id: t(5),
        }
    ));

    h.request(&a, 3, RequestBody::GetWindowTree { window_id: t(1) });
    let Some(Notification::WindowTree { change_id: 3, windows }) = a.drain().pop() else {
        panic!("expected a tree");
    };
    assert_eq!(windows.iter().map(|w| w.window_id).collect::<Vec<_>>(), vec![t(1)]);

    h.request(&b, 3, RequestBody::GetWindowTree { window_id: root });
    let Some(Notification::WindowTree { windows, .. }) = b.drain().pop() else {
        panic!("expected a tree");
    };
    assert_eq!(windows.iter().map(|w| w.window_id).collect::<Vec<_>>(), vec![root, t(5)]);
    assert_eq!(windows[1].parent_id, Some(root));
}

#[test]
fn test_access_denials_are_counted_not_fatal() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let (mut a, a_id, mut b, b_id) = embedded_pair(&mut h, EmbedFlags::empty());
    assert!(h.call(&mut a, new_window(2)));

    assert!(h.call(&mut b, new_window(1)));
    // B may not parent A's root under its own window
    assert!(!h.call(
        &mut b,
        RequestBody::AddWindow {
            parent_id: t(1),
            child_id: foreign(a_id, 1),
        }
    ));
    // A may not put its window inside a root another client is embedded in
    assert!(!h.call(
        &mut a,
        RequestBody::AddWindow {
            parent_id: t(1),
            child_id: t(2),
        }
    ));
    assert_eq!(h.broker.sessions[&b_id].access_denials(), 1);
    assert_eq!(h.broker.sessions[&a_id].access_denials(), 1);
    // still connected
    assert!(h.call(&mut a, new_window(3)));
}

#[test]
fn test_requests_from_parked_connections_are_dropped() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let mut parked = h.connect(ConnectKind::Embeddable {
        token: ClientToken::generate(),
    });
    parked.drain();
    h.request(&parked, 1, new_window(1));
    assert!(parked.drain().is_empty());
}

#[test]
fn test_duplicate_embed_token_is_refused() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let token = ClientToken::generate();
    let _first = h.connect(ConnectKind::Embeddable { token });
    let (tx, mut rx) = mpsc::unbounded_channel();
    assert!(h
        .broker
        .connect(ConnectionId(99), ConnectKind::Embeddable { token }, tx)
        .is_err());
    assert!(matches!(rx.try_recv(), Ok(Notification::ConnectFailed { .. })));
}

#[test]
fn test_window_manager_is_embedded_at_every_display() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let mut wm = h.connect(ConnectKind::WindowManager);
    let seen = wm.drain();
    let display_root = TransportId((0xFFFF << 16) | 1);
    assert!(matches!(
        seen.as_slice(),
        [
            Notification::Connected { client_id: Some(_) },
            Notification::OnEmbed { root, display_id: Some(DisplayId(1)), drawn: true, .. },
        ] if root.window_id == display_root && root.bounds == DISPLAY
    ));

    // a newer window manager takes the roots over
    let mut next = h.connect(ConnectKind::WindowManager);
    assert_eq!(
        wm.drain(),
        vec![
            Notification::OnUnembed { window_id: display_root },
            Notification::OnWindowDeleted { window_id: display_root },
        ]
    );
    assert_eq!(next.drain().len(), 2);

    // unembedding from a display root leaves the root in place
    assert!(h.call(&mut next, RequestBody::DeleteWindow { window_id: display_root }));
    assert_eq!(h.broker.displays().len(), 1);
    assert!(h.broker.store.contains_node(h.broker.displays()[0].root));
}

#[test]
fn test_top_level_lifecycle() {
    let mut h = Harness::new(BoundsPolicy::Clamp);
    let mut a = h.connect(ConnectKind::Client);
    a.drain();
    let baseline = h.broker.node_count();

    h.request(
        &a,
        5,
        RequestBody::NewTopLevelWindow {
            window_id: t(1),
            properties: Properties::new(),
        },
    );
    let seen = a.drain();
    let [
        Notification::OnTopLevelCreated {
            change_id: 5,
            window,
            display_id,
            drawn,
            ..
        },
    ] = seen.as_slice()
    else {
        panic!("expected OnTopLevelCreated, got {seen:?}");
    };
    assert_eq!(window.window_id, t(1));
    assert_eq!(window.bounds, Rect::new(0, 0, 800, 600));
    assert_eq!(*display_id, Some(DisplayId(1)));
    assert!(!drawn);

    assert!(h.call(
        &mut a,
        RequestBody::SetWindowVisibility {
            window_id: t(1),
            visible: true,
        }
    ));

    // the delegate clamps the move into the display
    h.request(
        &a,
        6,
        RequestBody::SetWindowBounds {
            window_id: t(1),
            bounds: Rect::new(900, 0, 800, 600),
            local_surface_id: None,
        },
    );
    let seen = a.drain();
    assert!(matches!(
        seen.as_slice(),
        [
            Notification::OnChangeCompleted { change_id: 6, success: false },
            Notification::OnWindowBoundsChanged { new_bounds, local_surface_id: Some(_), .. },
        ] if *new_bounds == Rect::new(224, 0, 800, 600)
    ));

    assert!(h.call(&mut a, RequestBody::DeleteWindow { window_id: t(1) }));
    assert_eq!(h.broker.node_count(), baseline);
}

#[test]
fn test_session_teardown_removes_everything_it_owned() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let baseline_nodes = h.broker.node_count();
    let live_before = h.backend.with(HeadlessBackend::live_count);
    let (mut a, a_id, mut b, b_id) = embedded_pair(&mut h, EmbedFlags::empty());
    assert!(h.call(&mut b, new_window(1)));
    assert!(h.call(
        &mut b,
        RequestBody::AddWindow {
            parent_id: foreign(a_id, 1),
            child_id: t(1),
        }
    ));

    h.broker.disconnect(a.connection);
    assert_eq!(b.drain(), vec![Notification::Disconnected]);
    assert!(a.drain().is_empty());
    assert_eq!(h.broker.session_count(), 0);
    assert_eq!(h.broker.node_count(), baseline_nodes);
    assert_eq!(h.backend.with(HeadlessBackend::live_count), live_before);
    assert_eq!(h.broker.embeddings.len(), 0);

    // B's connection no longer maps to a session
    h.request(&b, 1, new_window(2));
    assert!(b.drain().is_empty());
    assert!(!h.broker.sessions.contains_key(&b_id));
}

#[test]
fn test_embedded_client_leaving_tells_embedder_nothing() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let (mut a, a_id, mut b, b_id) = embedded_pair(&mut h, EmbedFlags::empty());
    assert!(h.call(&mut b, new_window(1)));

    h.broker.disconnect(b.connection);
    // only an explicit unembed is reported to the embedder
    assert!(a.drain().is_empty());
    let root = h.broker.sessions[&a_id].resolve(t(1)).unwrap();
    assert!(h.broker.embeddings.get(root).is_none());
    assert_eq!(h.broker.store.get(root).unwrap().embedded_client, None);
    assert!(h.broker.sessions.values().all(|s| !s.embedded_sessions.contains(&b_id)));

    // the window can host a new client
    let token = ClientToken::generate();
    let mut c = h.connect(ConnectKind::Embeddable { token });
    c.drain();
    h.request(&a, 2, embed(1, token, EmbedFlags::empty()));
    assert!(a.drain().contains(&Notification::OnChangeCompleted {
        change_id: 2,
        success: true,
    }));
    assert!(c.drain().iter().any(|n| matches!(n, Notification::OnEmbed { .. })));
}

#[test]
fn test_frame_sink_attach_policy_and_activation() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let (mut a, a_id, mut b, b_id) = embedded_pair(&mut h, EmbedFlags::empty());

    // another client is embedded there
    assert!(!h.call(&mut a, RequestBody::AttachFrameSink { window_id: t(1) }));
    assert!(h.call(&mut b, RequestBody::AttachFrameSink { window_id: foreign(a_id, 1) }));
    assert!(h.call(&mut a, new_window(2)));
    assert!(h.call(&mut a, RequestBody::AttachFrameSink { window_id: t(2) }));

    let info = SurfaceInfo {
        local_surface_id: None,
        size: DISPLAY.size(),
        device_scale_factor_percent: 100,
    };
    h.broker.on_first_surface_activation(FrameSinkId::new(b_id, 0), info);
    h.broker.on_first_surface_activation(FrameSinkId::new(ClientId(77), 3), info);
    assert_eq!(h.backend.with(|backend| backend.activations().len()), 1);
}

#[test]
fn test_shutdown_disconnects_everyone() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let (mut a, _, mut b, _) = embedded_pair(&mut h, EmbedFlags::empty());
    let mut parked = h.connect(ConnectKind::Embeddable {
        token: ClientToken::generate(),
    });
    parked.drain();

    h.broker.shutdown();
    assert_eq!(a.drain(), vec![Notification::Disconnected]);
    assert_eq!(b.drain(), vec![Notification::Disconnected]);
    assert_eq!(parked.drain(), vec![Notification::Disconnected]);
    assert_eq!(h.broker.session_count(), 0);
}

#[test]
fn test_top_level_keeps_drawing_across_window_manager_connect() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let mut a = h.connect(ConnectKind::Client);
    let a_id = a.client_id();
    h.request(
        &a,
        1,
        RequestBody::NewTopLevelWindow {
            window_id: t(1),
            properties: Properties::new(),
        },
    );
    a.drain();
    assert!(h.call(
        &mut a,
        RequestBody::SetWindowVisibility {
            window_id: t(1),
            visible: true,
        }
    ));
    let node = h.broker.sessions[&a_id].resolve(t(1)).unwrap();
    let display_root = h.broker.displays()[0].root;
    assert!(h.broker.store.is_drawn(node));

    let mut wm = h.connect(ConnectKind::WindowManager);
    wm.drain();
    assert_eq!(h.broker.store.parent(node), Some(display_root));
    assert!(h.broker.store.is_drawn(node));
    assert!(a.drain().is_empty());

    // a superseding window manager leaves it alone too
    let mut next = h.connect(ConnectKind::WindowManager);
    next.drain();
    assert_eq!(h.broker.store.parent(node), Some(display_root));
    assert!(h.broker.store.is_drawn(node));
    assert!(a.drain().is_empty());
}

#[test]
fn test_display_root_bounds_are_not_negotiable() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let mut wm = h.connect(ConnectKind::WindowManager);
    wm.drain();
    let display_root = TransportId((0xFFFF << 16) | 1);

    assert!(!h.call(
        &mut wm,
        RequestBody::SetWindowBounds {
            window_id: display_root,
            bounds: Rect::new(0, 0, 640, 480),
            local_surface_id: None,
        }
    ));
    let root = h.broker.displays()[0].root;
    assert_eq!(h.broker.store.get(root).unwrap().bounds(), DISPLAY);
    assert_eq!(h.broker.displays()[0].bounds, DISPLAY);
    assert!(wm.drain().is_empty());
}

#[test]
fn test_spent_namespace_creates_no_native_node() {
    let mut h = Harness::new(BoundsPolicy::Accept);
    let mut a = h.connect(ConnectKind::Client);
    let a_id = a.client_id();
    for local in 1..=u16::MAX as u32 {
        h.broker.new_window(a_id, t(local), Properties::new()).unwrap();
    }
    assert!(h.call(&mut a, RequestBody::DeleteWindow { window_id: t(1) }));
    let live_before = h.backend.with(HeadlessBackend::live_count);

    // the alias is free again but no global id is left for it
    assert_eq!(
        h.broker.new_window(a_id, t(1), Properties::new()),
        Err(WindowTreeError::NamespaceExhausted)
    );
    assert_eq!(h.backend.with(HeadlessBackend::live_count), live_before);
}

//! One line (or a few, for trees) of text per notification.
use std::collections::HashMap;

use canopy_core::{
    ids::TransportId,
    messages::{Notification, WindowData},
};

/// `5` for the caller's own windows, `client:local` for everyone else's,
/// the same form the command parser accepts
pub fn window_id(id: TransportId) -> String {
    match id.hi_word() {
        0 => id.lo_word().to_string(),
        client => format!("{client}:{}", id.lo_word()),
    }
}

fn parent(id: Option<TransportId>) -> String {
    id.map_or_else(|| "-".to_string(), window_id)
}

fn window_line(w: &WindowData) -> String {
    let mut line = format!(
        "{} {} {} opacity={}",
        window_id(w.window_id),
        w.bounds,
        if w.visible { "visible" } else { "hidden" },
        w.opacity
    );
    for (name, value) in &w.properties {
        line.push_str(&format!(" {name}={}", String::from_utf8_lossy(value)));
    }
    line
}

/// Indents each window under its parent. `windows` is in pre-order.
pub fn tree(windows: &[WindowData]) -> String {
    let mut depth: HashMap<TransportId, usize> = HashMap::new();
    let mut lines = Vec::with_capacity(windows.len());
    for w in windows {
        let d = w.parent_id.and_then(|p| depth.get(&p)).map_or(0, |d| d + 1);
        depth.insert(w.window_id, d);
        lines.push(format!("{}{}", "  ".repeat(d), window_line(w)));
    }
    lines.join("\n")
}

/// `op` names the request a reply answers, when the caller still knows it.
pub fn describe(notification: &Notification, op: Option<&str>) -> String {
    use Notification::*;

    let op = op.unwrap_or("request");
    match notification {
        Connected { client_id: Some(id) } => format!("connected as client {id}"),
        Connected { client_id: None } => "waiting to be embedded".to_string(),
        ConnectFailed { reason } => format!("connection refused: {reason}"),
        OnEmbed {
            client_id,
            root,
            tree: windows,
            display_id,
            drawn,
            local_surface_id,
            ..
        } => {
            let display = display_id.map_or_else(|| "no display".to_string(), |d| format!("display {d}"));
            format!(
                "embedded as client {client_id} at {} ({display}, {}, surface {local_surface_id})\n{}",
                window_id(root.window_id),
                if *drawn { "drawn" } else { "not drawn" },
                tree(windows)
            )
        }
        OnTopLevelCreated {
            change_id,
            window,
            display_id,
            drawn,
            ..
        } => {
            let display = display_id.map_or_else(|| "-".to_string(), |d| d.to_string());
            format!(
                "[{change_id}] {op} ok: {} on display {display}{}",
                window_line(window),
                if *drawn { ", drawn" } else { "" }
            )
        }
        OnChangeCompleted { change_id, success } => {
            format!("[{change_id}] {op} {}", if *success { "ok" } else { "failed" })
        }
        WindowTree { change_id, windows } if windows.is_empty() => format!("[{change_id}] {op}: nothing visible"),
        WindowTree { change_id, windows } => format!("[{change_id}] {op}:\n{}", tree(windows)),
        OnWindowDeleted { window_id: id } => format!("{} deleted", window_id(*id)),
        OnWindowBoundsChanged {
            window_id: id,
            old_bounds,
            new_bounds,
            local_surface_id,
        } => {
            let surface = local_surface_id.map_or_else(String::new, |s| format!(" (surface {s})"));
            format!("{} bounds {old_bounds} -> {new_bounds}{surface}", window_id(*id))
        }
        OnWindowHierarchyChanged {
            window_id: id,
            old_parent_id,
            new_parent_id,
        } => format!(
            "{} parent {} -> {}",
            window_id(*id),
            parent(*old_parent_id),
            parent(*new_parent_id)
        ),
        OnWindowVisibilityChanged { window_id: id, visible } => {
            format!("{} {}", window_id(*id), if *visible { "shown" } else { "hidden" })
        }
        OnWindowOpacityChanged {
            window_id: id,
            old_opacity,
            new_opacity,
        } => format!("{} opacity {old_opacity} -> {new_opacity}", window_id(*id)),
        OnWindowSharedPropertyChanged {
            window_id: id,
            name,
            value: Some(value),
        } => format!("{} {name}={}", window_id(*id), String::from_utf8_lossy(value)),
        OnWindowSharedPropertyChanged {
            window_id: id,
            name,
            value: None,
        } => format!("{} {name} cleared", window_id(*id)),
        OnUnembed { window_id: id } => format!("unembedded from {}", window_id(*id)),
        OnEmbeddedAppDisconnected { window_id: id } => format!("app embedded at {} went away", window_id(*id)),
        OnFrameSinkIdAllocated {
            window_id: id,
            frame_sink_id,
        } => format!("{} frame sink {frame_sink_id}", window_id(*id)),
        Disconnected => "disconnected".to_string(),
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use canopy_core::{geometry::Rect, messages::Properties};

    use super::*;

    fn data(id: u32, parent: Option<u32>) -> WindowData {
        WindowData {
            window_id: TransportId(id),
            parent_id: parent.map(TransportId),
            bounds: Rect::new(0, 0, 10, 10),
            visible: true,
            opacity: 1.0,
            properties: Properties::new(),
        }
    }

    #[test]
    fn test_window_ids_print_like_they_parse() {
        assert_eq!(window_id(TransportId(7)), "7");
        assert_eq!(window_id(TransportId((3 << 16) | 7)), "3:7");
        assert_eq!(window_id(TransportId((0xFFFF << 16) | 1)), "65535:1");
    }

    #[test]
    fn test_tree_indents_children() {
        let mut titled = data(3, Some(1));
        titled.properties.insert("title".to_string(), Bytes::from_static(b"hi"));
        let out = tree(&[data(1, None), data(2, Some(1)), data(4, Some(2)), titled]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("1 10x10+0+0 visible"));
        assert!(lines[1].starts_with("  2 "));
        assert!(lines[2].starts_with("    4 "));
        assert!(lines[3].starts_with("  3 ") && lines[3].ends_with("title=hi"));
    }

    #[test]
    fn test_replies_name_their_request() {
        let done = Notification::OnChangeCompleted {
            change_id: 9,
            success: false,
        };
        assert_eq!(describe(&done, Some("AddWindow")), "[9] AddWindow failed");
        assert_eq!(describe(&done, None), "[9] request failed");
        let moved = Notification::OnWindowHierarchyChanged {
            window_id: TransportId(2),
            old_parent_id: None,
            new_parent_id: Some(TransportId((1 << 16) | 1)),
        };
        assert_eq!(describe(&moved, None), "2 parent - -> 1:1");
    }
}

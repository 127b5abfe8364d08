use std::collections::BTreeMap;

use bitflags::bitflags;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    geometry::Rect,
    ids::{ClientToken, LocalSurfaceId, TransportId},
    messages::traits::Message,
    rand,
};

pub type Properties = BTreeMap<String, Bytes>;

// --------- connection handshake ---------  //

/// first frame on every connection
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Hello {
    pub kind: ConnectKind,
}
impl Message for Hello {}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ConnectKind {
    /// embedded at every display root, supersedes any previous window manager
    WindowManager,
    /// an ordinary session with no roots until it creates a top-level window
    Client,
    /// parked until another session embeds it with this token
    Embeddable { token: ClientToken },
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EmbedFlags: u32 {
        const EMBEDDER_INTERCEPTS_EVENTS = 0x01;
        const EMBEDDER_CONTROLS_VISIBILITY = 0x02;
    }
}

// flags travel as their raw bits, unknown bits are dropped
impl Serialize for EmbedFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for EmbedFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        u32::deserialize(deserializer).map(EmbedFlags::from_bits_truncate)
    }
}

// --------- requests ---------  //

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct RequestMessage {
    /// echoed back in the completion so callers can correlate out of order replies
    pub change_id: u32,
    pub body: RequestBody,
}
impl Message for RequestMessage {}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum RequestBody {
    NewWindow {
        window_id: TransportId,
        properties: Properties,
    },
    NewTopLevelWindow {
        window_id: TransportId,
        properties: Properties,
    },
    DeleteWindow {
        window_id: TransportId,
    },
    AddWindow {
        parent_id: TransportId,
        child_id: TransportId,
    },
    RemoveWindowFromParent {
        window_id: TransportId,
    },
    SetWindowVisibility {
        window_id: TransportId,
        visible: bool,
    },
    SetWindowOpacity {
        window_id: TransportId,
        opacity: f32,
    },
    SetWindowBounds {
        window_id: TransportId,
        bounds: Rect,
        local_surface_id: Option<LocalSurfaceId>,
    },
    SetWindowProperty {
        window_id: TransportId,
        name: String,
        value: Option<Bytes>,
    },
    Embed {
        window_id: TransportId,
        client: ClientToken,
        flags: EmbedFlags,
    },
    GetWindowTree {
        window_id: TransportId,
    },
    AttachFrameSink {
        window_id: TransportId,
    },
}

impl RequestBody {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewWindow { .. } => "NewWindow",
            Self::NewTopLevelWindow { .. } => "NewTopLevelWindow",
            Self::DeleteWindow { .. } => "DeleteWindow",
            Self::AddWindow { .. } => "AddWindow",
            Self::RemoveWindowFromParent { .. } => "RemoveWindowFromParent",
            Self::SetWindowVisibility { .. } => "SetWindowVisibility",
            Self::SetWindowOpacity { .. } => "SetWindowOpacity",
            Self::SetWindowBounds { .. } => "SetWindowBounds",
            Self::SetWindowProperty { .. } => "SetWindowProperty",
            Self::Embed { .. } => "Embed",
            Self::GetWindowTree { .. } => "GetWindowTree",
            Self::AttachFrameSink { .. } => "AttachFrameSink",
        }
    }
}

// --------- builder ---------  //

pub struct BodyUnset;
pub type BodySet = RequestBody;

#[derive(Debug)]
pub struct RequestBuilder<BodyState> {
    change_id: u32,
    body: BodyState,
}

impl Default for RequestBuilder<BodyUnset> {
    fn default() -> Self {
        Self {
            change_id: rand::generate_id(),
            body: BodyUnset,
        }
    }
}

impl<BodyState> RequestBuilder<BodyState> {
    pub fn change_id(self, change_id: u32) -> Self {
        Self { change_id, ..self }
    }
}

impl RequestBuilder<BodyUnset> {
    pub fn body(self, body: RequestBody) -> RequestBuilder<BodySet> {
        RequestBuilder {
            change_id: self.change_id,
            body,
        }
    }
}

impl RequestBuilder<BodySet> {
    pub fn build(self) -> RequestMessage {
        RequestMessage {
            change_id: self.change_id,
            body: self.body,
        }
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_builder_keeps_explicit_change_id() {
        let msg = RequestBuilder::default()
            .change_id(42)
            .body(RequestBody::DeleteWindow {
                window_id: TransportId(3),
            })
            .build();
        assert_eq!(msg.change_id, 42);
        assert_eq!(msg.body.name(), "DeleteWindow");
    }

    #[test]
    fn test_embed_flags_serialize_as_bits() {
        let flags = EmbedFlags::EMBEDDER_INTERCEPTS_EVENTS | EmbedFlags::EMBEDDER_CONTROLS_VISIBILITY;
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, "3");
        let back: EmbedFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
        let unknown: EmbedFlags = serde_json::from_str("255").unwrap();
        assert_eq!(unknown, EmbedFlags::all());
    }
}

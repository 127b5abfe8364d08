//! Identifiers shared by the broker and its clients.
//!
//! A [`WindowId`] is a `(client_id, local_id)` pair. On the wire it travels as
//! a [`TransportId`]: the low word is the local id and the high word is the
//! client prefix, left out when the id belongs to the client it is sent to.
use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    constants::{BROKER_CLIENT_ID, BROKER_TRANSPORT_PREFIX, INVALID_TRANSPORT_ID},
    error::{Error, Result},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(transparent)]
pub struct ClientId(pub u16);

impl ClientId {
    pub const BROKER: ClientId = ClientId(BROKER_CLIENT_ID);

    pub fn is_broker(self) -> bool {
        self == Self::BROKER
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{client_id}:{local_id}")]
pub struct WindowId {
    pub client_id: ClientId,
    pub local_id: u16,
}

impl WindowId {
    pub const NULL: WindowId = WindowId {
        client_id: ClientId(0),
        local_id: 0,
    };

    pub const fn new(client_id: ClientId, local_id: u16) -> Self {
        Self { client_id, local_id }
    }

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    /// the id as `requester` addresses it
    pub fn to_transport(self, requester: ClientId) -> TransportId {
        if self.client_id == requester {
            return TransportId(self.local_id as u32);
        }
        let prefix = if self.client_id.is_broker() {
            BROKER_TRANSPORT_PREFIX
        } else {
            self.client_id.0
        };
        TransportId(((prefix as u32) << 16) | self.local_id as u32)
    }

    /// inverse of [`WindowId::to_transport`], does not check that the window exists
    pub fn from_transport(raw: TransportId, requester: ClientId) -> Self {
        let (hi, lo) = (raw.hi_word(), raw.lo_word());
        match hi {
            0 => WindowId::new(requester, lo),
            BROKER_TRANSPORT_PREFIX => WindowId::new(ClientId::BROKER, lo),
            client => WindowId::new(ClientId(client), lo),
        }
    }
}

/// `c:l` addresses another client's window, a bare number is the caller's own
impl FromStr for WindowId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim().parse::<u16>().map_err(|_| Error::Parse {
                input: s.to_string(),
                reason: "expected a 16 bit number",
            })
        };
        match s.split_once(':') {
            Some((client, local)) => Ok(WindowId::new(ClientId(parse(client)?), parse(local)?)),
            None => Ok(WindowId::new(ClientId(0), parse(s)?)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(transparent)]
pub struct TransportId(pub u32);

impl TransportId {
    pub const INVALID: TransportId = TransportId(INVALID_TRANSPORT_ID);

    pub fn hi_word(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn lo_word(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// packs a [`WindowId`] exactly as typed, used by clients that address
    /// foreign windows with `client:local` syntax
    pub fn pack(id: WindowId) -> Self {
        TransportId(((id.client_id.0 as u32) << 16) | id.local_id as u32)
    }
}

/// Compositor-facing handle of a window's frame sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("sink({client_id}, {sink_id})")]
pub struct FrameSinkId {
    pub client_id: ClientId,
    pub sink_id: u16,
}

impl FrameSinkId {
    pub const fn new(client_id: ClientId, sink_id: u16) -> Self {
        Self { client_id, sink_id }
    }
}

impl From<WindowId> for FrameSinkId {
    fn from(id: WindowId) -> Self {
        FrameSinkId::new(id.client_id, id.local_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(transparent)]
pub struct DisplayId(pub i64);

/// Token a parked client hands to whoever should embed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(transparent)]
pub struct ClientToken(pub Uuid);

impl ClientToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for ClientToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim()).map(ClientToken).map_err(|_| Error::Parse {
            input: s.to_string(),
            reason: "expected a uuid",
        })
    }
}

/// Identifies one size generation of an embedded surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{parent_sequence}/{embed_token}")]
pub struct LocalSurfaceId {
    pub parent_sequence: u32,
    pub embed_token: Uuid,
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    const A: ClientId = ClientId(1);
    const B: ClientId = ClientId(2);

    #[test]
    fn test_own_ids_travel_unprefixed() {
        let id = WindowId::new(A, 7);
        let raw = id.to_transport(A);
        assert_eq!(raw, TransportId(7));
        assert_eq!(WindowId::from_transport(raw, A), id);
    }

    #[test]
    fn test_foreign_ids_travel_packed() {
        let id = WindowId::new(A, 7);
        let raw = id.to_transport(B);
        assert_eq!(raw, TransportId((1 << 16) | 7));
        assert_eq!(WindowId::from_transport(raw, B), id);
        // the same raw value means the same window to every client
        assert_eq!(WindowId::from_transport(raw, ClientId(9)), id);
    }

    #[test]
    fn test_broker_ids_do_not_collide_with_own_ids() {
        let root = WindowId::new(ClientId::BROKER, 1);
        let raw = root.to_transport(A);
        assert_eq!(raw.hi_word(), BROKER_TRANSPORT_PREFIX);
        assert_eq!(WindowId::from_transport(raw, A), root);
        assert_ne!(WindowId::from_transport(raw, A), WindowId::new(A, 1));
    }

    #[test]
    fn test_parse_window_id() {
        assert_eq!("5".parse::<WindowId>().unwrap(), WindowId::new(ClientId(0), 5));
        assert_eq!("3:9".parse::<WindowId>().unwrap(), WindowId::new(ClientId(3), 9));
        assert!("70000".parse::<WindowId>().is_err());
        assert!("x:1".parse::<WindowId>().is_err());
    }

    #[test]
    fn test_null_id() {
        assert!(WindowId::NULL.is_null());
        assert!(!WindowId::new(A, 0).is_null());
    }
}

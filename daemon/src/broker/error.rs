use canopy_core::ids::{ClientToken, WindowId};
use thiserror::Error;

pub type TreeResult<T> = std::result::Result<T, WindowTreeError>;

/// Why a single broker operation failed. The dispatcher turns every one of
/// these into a `false` completion for the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowTreeError {
    #[error("window id {0} is not valid for a new window")]
    InvalidId(WindowId),

    #[error("{op} on {window} denied")]
    AccessDenied { op: &'static str, window: WindowId },

    #[error("adding {child} to {parent} would create a cycle")]
    CycleDetected { parent: WindowId, child: WindowId },

    #[error("window {0} not found")]
    NotFound(WindowId),

    #[error("window {0} already has an embedded client")]
    AlreadyEmbedded(WindowId),

    #[error("hierarchy unchanged")]
    HierarchyUnchanged,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("backend refused: {0}")]
    BackendRefused(&'static str),

    #[error("no parked client for token {0}")]
    UnknownEmbedToken(ClientToken),

    #[error("identifier namespace exhausted")]
    NamespaceExhausted,

    #[error("bounds change routed to the delegate")]
    RoutedToDelegate,
}

impl WindowTreeError {
    /// failures that are part of normal protocol traffic and not worth a warning
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::RoutedToDelegate | Self::HierarchyUnchanged)
    }
}

pub const RUNTIME_DIR: &str = "XDG_RUNTIME_DIR";
pub const HOME_DIR: &str = "HOME";
pub const HOME_SOCK_DIR: &str = ".canopy/run";
pub const SOCK_FILE_NAME: &str = "canopy.sock";
pub const LOCK_FILE_EXTENSION: &str = "lock";

/// frames larger than this are treated as a corrupt stream
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// client id reserved for windows the broker creates itself (display roots)
pub const BROKER_CLIENT_ID: u16 = 0;
/// prefix the broker's ids carry on the wire, a zero high word means "my own id"
pub const BROKER_TRANSPORT_PREFIX: u16 = 0xFFFF;
pub const FIRST_CLIENT_ID: u16 = 1;
pub const LAST_CLIENT_ID: u16 = BROKER_TRANSPORT_PREFIX - 1;

pub const INVALID_TRANSPORT_ID: u32 = 0;

/// property a client may set on a new top-level to request its initial bounds,
/// formatted like `800x600+10+10`
pub const INITIAL_BOUNDS_PROPERTY: &str = "canopy:initial-bounds";

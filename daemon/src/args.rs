use std::path::PathBuf;

use canopy_core::geometry::Rect;
use clap::Parser;

use crate::broker::backend::BoundsPolicy;

#[derive(Parser, Debug)]
#[command(name = "canopyd", about = "Window-tree broker daemon")]
pub struct Args {
    /// socket to listen on, defaults to $XDG_RUNTIME_DIR/canopy.sock
    #[arg(long, env = "CANOPY_SOCKET")]
    pub socket: Option<PathBuf>,

    #[arg(long, env = "CANOPY_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// used when RUST_LOG is unset
    #[arg(long, env = "CANOPY_LOG", default_value = "info")]
    pub log_filter: String,

    /// display bounds as WxH or WxH+X+Y, repeat for more displays
    #[arg(long = "display", default_value = "1920x1080")]
    pub displays: Vec<Rect>,

    /// how the delegate answers bounds changes the requester does not own
    #[arg(long, value_enum, default_value_t = BoundsPolicy::Clamp)]
    pub bounds_policy: BoundsPolicy,
}

pub mod comm;
pub mod constants;
pub mod daemon_utils;
pub mod error;
pub mod geometry;
pub mod ids;
pub mod messages;
pub mod rand;
mod prelude;

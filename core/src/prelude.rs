#![allow(unused_imports)]
pub use crate::error::{Error, Result};

use serde::{Serialize, de::DeserializeOwned};

/// anything that travels as one frame
pub trait Message: Serialize + DeserializeOwned {}

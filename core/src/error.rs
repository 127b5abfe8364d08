use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Custom Error: {0}")]
    Custom(String),

    #[error("IO error: {0}")]
    DaemonFileError(#[from] std::io::Error),

    #[error("Serialization/Deserialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: u32 },

    #[error("Could not parse {input:?}: {reason}")]
    Parse { input: String, reason: &'static str },
}

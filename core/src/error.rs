use thiserror::Error;

/// Every failure the engine can report. Only `Mount` is fatal; all other
/// variants leave the volume state unchanged and the session usable.
#[derive(Debug, Error)]
pub enum FatError {
    #[error("cannot mount '{path}': {source}")]
    Mount {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("'{0}' not found")]
    NotFound(String),

    #[error("'{0}' is not a file")]
    NotAFile(String),

    #[error("'{0}' is not a directory")]
    NotADirectory(String),

    #[error("'{0}' already exists")]
    AlreadyExists(String),

    #[error("'{0}' is not empty")]
    NotEmpty(String),

    #[error("'{0}' is already open")]
    AlreadyOpen(String),

    #[error("'{0}' not found in the open file table")]
    NotOpen(String),

    #[error("'{name}' is not open for {access}")]
    WrongMode { name: String, access: &'static str },

    #[error("invalid mode '{0}': valid modes are r, w, and rw")]
    InvalidMode(String),

    #[error("start position {pos} is past the end of the file (size {size})")]
    OutOfRange { pos: u32, size: u32 },

    #[error("insufficient space for write request")]
    InsufficientSpace,

    #[error("access at offset {offset} is outside the image ({len} bytes)")]
    OutOfBounds { offset: u64, len: u64 },

    #[error("corrupt filesystem: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

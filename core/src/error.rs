//! Error taxonomy shared by the client and server. Binaries wrap these in
//! `anyhow` at the top level; the connection handler and protocol driver
//! match on them to decide whether to abort or continue.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// CLI parsing or bad paths (client only).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No keystore present. Handled by transparently creating one.
    #[error("key file not found")]
    KeysNotFound,

    /// Keystore AEAD check failed or the file is truncated. Fatal: the
    /// keys cannot be recovered without the original file and password.
    #[error("keystore corrupted, truncated, or wrong password")]
    CorruptedKeys,

    /// Socket or file I/O failure; terminates the current operation.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// Malformed framing or lengths from the peer (or on disk).
    #[error("corrupted data: {0}")]
    CorruptedResponse(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

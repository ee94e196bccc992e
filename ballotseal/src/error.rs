use std::io;

use thiserror::Error;

/// The failure categories that cross component boundaries.
///
/// Everything a store or crypto backend can report collapses into one of
/// these four kinds. Internal details (I/O errors, malformed randomness)
/// stay attached to the [`Error`] as context but surface as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The content already exists. Returned by `Store::save_key` when a
    /// poll key was committed before.
    Exist,
    /// The content does not exist. Returned by `Store::load_key` for an
    /// unknown poll.
    NotExist,
    /// The given data is invalid. Returned by `Store::validate_signature`
    /// when a committed signature differs.
    Invalid,
    /// Everything else.
    Unknown,
}

/// Error type shared by all ballotseal components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("ballotseal: content already exists")]
    Exist,

    #[error("ballotseal: content does not exist")]
    NotExist,

    #[error("ballotseal: {0}")]
    Invalid(String),

    /// Single error for every way a hybrid decryption can fail. Callers
    /// must not be able to tell a bad frame from a bad tag.
    #[error("ballotseal: unable to decrypt ciphertext")]
    Decrypt,

    #[error("ballotseal: operation cancelled")]
    Cancelled,

    #[error("ballotseal: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("ballotseal: {0}")]
    Other(String),
}

impl Error {
    /// The public category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Exist => ErrorKind::Exist,
            Error::NotExist => ErrorKind::NotExist,
            Error::Invalid(_) | Error::Decrypt => ErrorKind::Invalid,
            Error::Cancelled | Error::Io { .. } | Error::Other(_) => ErrorKind::Unknown,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::Invalid(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}

use cryptsvc::Status;
use tracing::{debug, error};

/// Errors returned by the dispatch table's entries.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// A pointer argument is invalid.
    #[error(transparent)]
    InvalidPtr(#[from] InvalidPtr),
    /// A context pointer refers to the wrong type of context.
    #[error("invalid type")]
    InvalidType,
    /// A context pointer refers to an uninitialized context.
    #[error("uninitialized")]
    Uninitialized,
    /// The dispatch table has already been installed.
    #[error("already installed")]
    AlreadyInstalled,
    /// The operation itself failed.
    #[error(transparent)]
    Crypto(#[from] cryptsvc::Error),
}

impl Error {
    fn log(&self) {
        match self {
            // Expected failures, like a bad signature.
            Self::Crypto(err) => debug!(%err, "operation failed"),
            err => error!(%err, "invalid argument"),
        }
    }
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        match err {
            Error::Crypto(err) => err.into(),
            _ => Status::InvalidParameter,
        }
    }
}

/// Returned when a pointer is invalid.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum InvalidPtr {
    /// The pointer is null.
    #[error("null pointer")]
    Null,
    /// The pointer is unaligned.
    #[error("unaligned pointer")]
    Unaligned,
    /// Two pointers that must not alias do.
    #[error("overlapping pointers")]
    Overlapping,
}

/// Shorthand for `Result<T, Error>`.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Runs `f`, logging any error.
pub(crate) fn or_log<F>(f: F)
where
    F: FnOnce() -> Result<()>,
{
    if let Err(err) = f() {
        err.log();
    }
}

/// Runs `f`, logging and flattening any error into `false`.
pub(crate) fn to_bool<F>(f: F) -> bool
where
    F: FnOnce() -> Result<()>,
{
    match f() {
        Ok(()) => true,
        Err(err) => {
            err.log();
            false
        }
    }
}

/// Runs `f`, logging and mapping any error to a [`Status`].
pub(crate) fn to_status<F>(f: F) -> Status
where
    F: FnOnce() -> Result<()>,
{
    match f() {
        Ok(()) => Status::Success,
        Err(err) => {
            err.log();
            Status::from(&err)
        }
    }
}

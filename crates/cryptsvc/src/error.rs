#![forbid(unsafe_code)]

use core::{fmt, result};

use tracing::debug;

/// Shorthand for `Result<T, Error>`.
pub type Result<T> = result::Result<T, Error>;

/// All possible errors from this crate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// An argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The algorithm is not supported by this build.
    #[error("unsupported algorithm")]
    Unsupported,
    /// The key length is not one of the algorithm's supported
    /// lengths.
    #[error("invalid key length")]
    InvalidKeyLength,
    /// The input length is invalid, e.g., not a multiple of the
    /// cipher's block size.
    #[error("invalid input length")]
    InvalidLength,
    /// The output buffer is too small.
    #[error("buffer too small: {required} bytes required")]
    BufferTooSmall {
        /// The exact capacity the operation needs.
        required: usize,
    },
    /// The requested item does not exist.
    #[error("not found")]
    NotFound,
    /// The input could not be parsed.
    #[error("malformed input")]
    Malformed,
    /// A signature, digest or certificate chain did not verify.
    #[error("verification failed")]
    Verification,
    /// A key (or key component) required by the operation is not
    /// set.
    #[error("missing key material")]
    MissingKey,
    /// The random number generator has not been seeded.
    #[error("random number generator not seeded")]
    NotSeeded,
}

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Self {
        debug!(%err, "DER decoding failed");
        Self::Malformed
    }
}

impl From<rsa::Error> for Error {
    fn from(err: rsa::Error) -> Self {
        debug!(%err, "RSA operation failed");
        match err {
            rsa::Error::Verification => Self::Verification,
            rsa::Error::InvalidPrime
            | rsa::Error::InvalidModulus
            | rsa::Error::InvalidExponent
            | rsa::Error::InvalidCoefficient
            | rsa::Error::PublicExponentTooSmall
            | rsa::Error::PublicExponentTooLarge
            | rsa::Error::ModulusTooLarge => Self::InvalidArgument("invalid RSA key"),
            rsa::Error::NprimesTooSmall | rsa::Error::TooFewPrimes => {
                Self::InvalidArgument("invalid RSA modulus size")
            }
            _ => Self::Malformed,
        }
    }
}

impl From<pkcs8::Error> for Error {
    fn from(err: pkcs8::Error) -> Self {
        debug!(%err, "PKCS#8 decoding failed");
        Self::Malformed
    }
}

impl From<spki::Error> for Error {
    fn from(err: spki::Error) -> Self {
        debug!(%err, "SubjectPublicKeyInfo decoding failed");
        Self::Malformed
    }
}

/// The status returned by operations that report more than
/// success or failure.
#[repr(usize)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Status {
    /// The operation succeeded.
    Success = 0,
    /// An argument was invalid or the input was malformed.
    InvalidParameter = 2,
    /// The output buffer was too small.
    BufferTooSmall = 5,
    /// The operation is not supported.
    Unsupported = 3,
    /// The requested item does not exist.
    NotFound = 14,
}

impl Status {
    /// Reports whether the status is [`Status::Success`].
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        match err {
            Error::BufferTooSmall { .. } => Self::BufferTooSmall,
            Error::NotFound => Self::NotFound,
            Error::Unsupported => Self::Unsupported,
            _ => Self::InvalidParameter,
        }
    }
}

impl<T> From<&Result<T>> for Status {
    fn from(res: &Result<T>) -> Self {
        match res {
            Ok(_) => Self::Success,
            Err(err) => err.into(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::InvalidParameter => "invalid parameter",
            Self::BufferTooSmall => "buffer too small",
            Self::Unsupported => "unsupported",
            Self::NotFound => "not found",
        };
        s.fmt(f)
    }
}

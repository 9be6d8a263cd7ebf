//! A C dispatch table over [`cryptsvc`].
//!
//! [`install`] publishes a [`CryptProtocol`]: a `#[repr(C)]`
//! table with one `extern "C"` entry per operation. Consumers
//! resolve it once, with [`locate`] or `cryptsvc_locate`, and
//! call entries directly.
//!
//! # Contexts
//!
//! Digest, MAC and cipher contexts live in caller memory of the
//! size reported by the family's `GetContextSize` entry. RSA,
//! Diffie-Hellman, HMAC `New` and X.509 objects are heap
//! allocated and released exactly once by the matching `Free`.
//! Either way a context is a typed slot, so passing the wrong
//! kind of context, an uninitialized buffer or a freed context
//! fails instead of being misread.
//!
//! # Randomness
//!
//! Key and parameter generation draw from one process-wide
//! generator that must be seeded with `RandomSeed` first.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

extern crate alloc;

mod buf;
mod cipher;
mod dh;
mod error;
mod hash;
mod hmac;
mod pkcs;
mod protocol;
mod random;
mod rsa;
mod slot;
mod x509;

pub use cipher::{Arc4Entries, BlockCipherEntries};
pub use dh::DhEntries;
pub use error::{Error, InvalidPtr};
pub use hash::HashEntries;
pub use hmac::HmacEntries;
pub use pkcs::{AuthenticodeEntries, EfiTime, Pkcs5Entries, Pkcs7Entries};
pub use protocol::{
    CRYPT_PROTOCOL_REVISION, CryptProtocol, cryptsvc_install, cryptsvc_locate, install, locate,
};
pub use random::RandomEntries;
pub use rsa::RsaEntries;
pub use x509::{CertBlob, X509Entries};

//! Unified cryptographic services.
//!
//! # Overview
//!
//! This crate drives every primitive it offers through a small
//! number of uniform lifecycles:
//!
//! - Digests and MACs: `new` (Init), `clone` (Duplicate),
//!   `update`, `finalize_into` (Final), plus one-shot
//!   [`hash_all`].
//! - Block ciphers: `new` with a validated key length, then
//!   ECB/CBC over whole blocks (no padding).
//! - Stream ciphers: `new`, `process`, `reset`.
//! - RSA and Diffie-Hellman: owned contexts whose components are
//!   set and read through the [sized output
//!   protocol][sized::write_sized].
//! - X.509, PKCS#7 and Authenticode: parsers over untrusted DER
//!   that only hand out owned, validated objects.
//!
//! Every variable-length result is produced through the sized
//! output protocol: the caller supplies a buffer, and if it is
//! too small the operation fails with
//! [`Error::BufferTooSmall`] carrying the exact capacity
//! required, without writing anything.
//!
//! Operations that need randomness take an explicit
//! [`RandomGenerator`] handle, which must be seeded first.
//!
//! # Algorithm Selection
//!
//! Legacy algorithms (MD4, MD5, Triple-DES and ARC4) are Cargo
//! features. Disabling one makes [`context_size`] report zero
//! for it and every operation on it fail with
//! [`Error::Unsupported`].
//!
//! # Warning
//!
//! Several of these algorithms are broken and exist only for
//! compatibility with existing formats. Choosing which ones are
//! acceptable is the caller's responsibility.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

mod algorithm;
pub mod authenticode;
mod block;
mod error;
mod hash;
pub mod kdf;
mod mac;
mod oid;
pub mod pkcs7;
pub mod pkey;
mod random;
pub mod sized;
mod stream;
#[cfg(any(test, feature = "test_util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test_util")))]
pub mod test_util;
pub mod x509;

pub use algorithm::*;
pub use block::*;
pub use error::*;
pub use hash::*;
pub use mac::*;
pub use random::*;
pub use stream::*;

//! Utilities for testing code that uses this crate.

#![forbid(unsafe_code)]

use crate::random::RandomGenerator;

/// Returns a generator seeded with `label`, so that test runs
/// are reproducible.
pub fn seeded_rng(label: &str) -> RandomGenerator {
    RandomGenerator::with_seed(label.as_bytes())
}

/// Certificates, keys and signed data generated by
/// `tests/data/generate.py`.
///
/// The chain is `ROOT` -> `INTER` -> `LEAF`, with the leaf key
/// in `LEAF_KEY_*`. Every certificate is RSA-2048 signed with
/// SHA-256.
pub mod fixtures {
    macro_rules! fixtures {
        ($($(#[$meta:meta])* $name:ident = $file:literal;)*) => {
            $(
                $(#[$meta])*
                pub const $name: &[u8] = include_bytes!(concat!("../../tests/data/", $file));
            )*
        };
    }

    fixtures! {
        /// Self-signed "Test Root CA".
        ROOT = "root.der";
        /// "Test Intermediate CA", issued by [`ROOT`].
        INTER = "inter.der";
        /// "Test Leaf", issued by [`INTER`].
        LEAF = "leaf.der";
        /// Issued by [`ROOT`], with no common name in its subject.
        NO_CN = "no_cn.der";
        /// A self-signed CA unrelated to every other fixture.
        OTHER = "other.der";
        /// Self-signed root of the timestamping chain.
        TSA_ROOT = "tsa_root.der";
        /// The timestamping authority, issued by [`TSA_ROOT`].
        TSA = "tsa.der";

        /// [`LEAF`]'s key as a PKCS#1 `RSA PRIVATE KEY`.
        LEAF_KEY_PEM = "leaf_key.pem";
        /// [`LEAF`]'s key as a PKCS#8 `PRIVATE KEY`.
        LEAF_KEY_PKCS8_PEM = "leaf_key_pkcs8.pem";
        /// [`LEAF`]'s key as a PKCS#8 `ENCRYPTED PRIVATE KEY`
        /// under [`LEAF_KEY_PASSWORD`].
        LEAF_KEY_ENCRYPTED_PEM = "leaf_key_encrypted.pem";

        /// The content signed by [`P7_ATTACHED`] and
        /// [`P7_DETACHED`].
        CONTENT = "content.bin";
        /// A `ContentInfo` with [`CONTENT`] attached and signed
        /// attributes, embedding the full chain.
        P7_ATTACHED = "p7_attached.der";
        /// A bare detached `SignedData` without signed
        /// attributes, embedding [`LEAF`], [`INTER`] and
        /// [`NO_CN`].
        P7_DETACHED = "p7_detached.der";

        /// An Authenticode signature by [`LEAF`] with an RFC 3161
        /// countersignature by [`TSA`].
        AUTHENTICODE = "authenticode.der";
        /// The image hash covered by [`AUTHENTICODE`].
        IMAGE_HASH = "image_hash.bin";
    }

    /// The password protecting [`LEAF_KEY_ENCRYPTED_PEM`].
    pub const LEAF_KEY_PASSWORD: &[u8] = b"password";
}

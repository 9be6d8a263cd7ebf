//! Object identifiers.

#![forbid(unsafe_code)]

use const_oid::ObjectIdentifier;

use crate::algorithm::HashAlgorithm;

macro_rules! oids {
    ($($(#[$meta:meta])* $name:ident = $value:literal;)*) => {
        $(
            $(#[$meta])*
            pub(crate) const $name: ObjectIdentifier = ObjectIdentifier::new_unwrap($value);
        )*
    };
}

oids! {
    /// PKCS#7 `data`.
    DATA = "1.2.840.113549.1.7.1";
    /// PKCS#7 `signedData`.
    SIGNED_DATA = "1.2.840.113549.1.7.2";

    CONTENT_TYPE = "1.2.840.113549.1.9.3";
    MESSAGE_DIGEST = "1.2.840.113549.1.9.4";

    RSA_ENCRYPTION = "1.2.840.113549.1.1.1";
    MD5_WITH_RSA = "1.2.840.113549.1.1.4";
    SHA1_WITH_RSA = "1.2.840.113549.1.1.5";
    SHA256_WITH_RSA = "1.2.840.113549.1.1.11";
    SHA384_WITH_RSA = "1.2.840.113549.1.1.12";
    SHA512_WITH_RSA = "1.2.840.113549.1.1.13";

    MD5 = "1.2.840.113549.2.5";
    SHA1 = "1.3.14.3.2.26";
    SHA256 = "2.16.840.1.101.3.4.2.1";
    SHA384 = "2.16.840.1.101.3.4.2.2";
    SHA512 = "2.16.840.1.101.3.4.2.3";

    /// `id-at-commonName`.
    COMMON_NAME = "2.5.4.3";
    /// `id-ce-subjectKeyIdentifier`.
    SUBJECT_KEY_IDENTIFIER = "2.5.29.14";

    /// `SPC_INDIRECT_DATA_OBJID`.
    SPC_INDIRECT_DATA = "1.3.6.1.4.1.311.2.1.4";
    /// The unsigned attribute carrying an RFC 3161 timestamp
    /// token.
    RFC3161_COUNTERSIGNATURE = "1.3.6.1.4.1.311.3.3.1";
    /// `id-ct-TSTInfo`.
    TST_INFO = "1.2.840.113549.1.9.16.1.4";
}

/// Maps a digest algorithm OID to a hash.
pub(crate) fn hash_from_digest_oid(oid: &ObjectIdentifier) -> Option<HashAlgorithm> {
    [
        (MD5, HashAlgorithm::Md5),
        (SHA1, HashAlgorithm::Sha1),
        (SHA256, HashAlgorithm::Sha256),
        (SHA384, HashAlgorithm::Sha384),
        (SHA512, HashAlgorithm::Sha512),
    ]
    .into_iter()
    .find_map(|(o, alg)| (o == *oid).then_some(alg))
}

/// Maps a hash to its digest algorithm OID.
pub(crate) fn digest_oid(alg: HashAlgorithm) -> Option<ObjectIdentifier> {
    match alg {
        HashAlgorithm::Md4 => None,
        HashAlgorithm::Md5 => Some(MD5),
        HashAlgorithm::Sha1 => Some(SHA1),
        HashAlgorithm::Sha256 => Some(SHA256),
        HashAlgorithm::Sha384 => Some(SHA384),
        HashAlgorithm::Sha512 => Some(SHA512),
    }
}

/// Maps a signature algorithm OID to the hash it signs with.
///
/// Plain `rsaEncryption` carries no hash and maps to `None`.
pub(crate) fn hash_from_rsa_signature_oid(oid: &ObjectIdentifier) -> Option<HashAlgorithm> {
    [
        (MD5_WITH_RSA, HashAlgorithm::Md5),
        (SHA1_WITH_RSA, HashAlgorithm::Sha1),
        (SHA256_WITH_RSA, HashAlgorithm::Sha256),
        (SHA384_WITH_RSA, HashAlgorithm::Sha384),
        (SHA512_WITH_RSA, HashAlgorithm::Sha512),
    ]
    .into_iter()
    .find_map(|(o, alg)| (o == *oid).then_some(alg))
}

//! Authenticode signatures and their RFC 3161 timestamps.

#![forbid(unsafe_code)]

use core::fmt;

use const_oid::ObjectIdentifier;
use der::{
    DateTime, Decode, Encode, Reader, Sequence, SliceReader,
    asn1::{Any, GeneralizedTime, Int, OctetString},
};
use spki::AlgorithmIdentifierOwned;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument};

use crate::{
    error::{Error, Result},
    hash::digest,
    oid,
    pkcs7::{self, SignedData},
    x509::Certificate,
};

/// `SpcIndirectDataContent`.
#[derive(Clone, Debug, Sequence)]
struct SpcIndirectDataContent {
    data: Any,
    message_digest: DigestInfo,
}

/// `DigestInfo`, which is also the layout of an RFC 3161
/// `MessageImprint`.
#[derive(Clone, Debug, Sequence)]
struct DigestInfo {
    digest_algorithm: AlgorithmIdentifierOwned,
    digest: OctetString,
}

/// Verifies the Authenticode signature `auth_data` over an image
/// whose Authenticode hash is `image_hash`.
///
/// The signature must chain to the DER certificate `trusted`.
#[instrument(skip_all)]
pub fn authenticode_verify(auth_data: &[u8], trusted: &[u8], image_hash: &[u8]) -> Result<()> {
    let trusted = Certificate::from_der(trusted)?;
    let sd = SignedData::from_der(auth_data)?;
    if sd.content_type() != oid::SPC_INDIRECT_DATA {
        debug!(oid = %sd.content_type(), "not Authenticode signed data");
        return Err(Error::InvalidArgument("not Authenticode signed data"));
    }
    let spc = sd
        .encapsulated_content()
        .ok_or(Error::Malformed)?
        .decode_as::<SpcIndirectDataContent>()?;
    if !bool::from(spc.message_digest.digest.as_bytes().ct_eq(image_hash)) {
        debug!("image hash mismatch");
        return Err(Error::Verification);
    }
    sd.verify(&trusted, None)
}

/// A UTC calendar time.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Timestamp {
    /// The year, e.g., 2024.
    pub year: u16,
    /// 1 through 12.
    pub month: u8,
    /// 1 through 31.
    pub day: u8,
    /// 0 through 23.
    pub hour: u8,
    /// 0 through 59.
    pub minute: u8,
    /// 0 through 59.
    pub second: u8,
}

impl From<DateTime> for Timestamp {
    fn from(t: DateTime) -> Self {
        Self {
            year: t.year(),
            month: t.month(),
            day: t.day(),
            hour: t.hour(),
            minute: t.minutes(),
            second: t.seconds(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Verifies the RFC 3161 timestamp countersignature on the
/// Authenticode signature `auth_data` and returns its signing
/// time.
///
/// The token must chain to the DER certificate `tsa` and must
/// cover the first signer's signature.
#[instrument(skip_all)]
pub fn image_timestamp_verify(auth_data: &[u8], tsa: &[u8]) -> Result<Timestamp> {
    let tsa = Certificate::from_der(tsa)?;
    let sd = SignedData::from_der(auth_data)?;
    let si = sd.first_signer()?;
    let token = pkcs7::unsigned_attribute(si, oid::RFC3161_COUNTERSIGNATURE)?.ok_or_else(|| {
        debug!("no timestamp countersignature");
        Error::NotFound
    })?;
    let token = SignedData::from_der(&token.to_der()?)?;
    if token.content_type() != oid::TST_INFO {
        debug!(oid = %token.content_type(), "timestamp token is not TSTInfo");
        return Err(Error::Malformed);
    }
    token.verify(&tsa, None)?;

    let (imprint, gen_time) = parse_tst_info(token.attached_content().ok_or(Error::Malformed)?)?;
    let alg_oid = &imprint.digest_algorithm.oid;
    let alg = oid::hash_from_digest_oid(alg_oid).ok_or_else(|| {
        debug!(oid = %alg_oid, "unsupported imprint algorithm");
        Error::Unsupported
    })?;
    let want = digest(alg, si.signature.as_bytes())?;
    if !bool::from(imprint.digest.as_bytes().ct_eq(&want[..])) {
        debug!("timestamp does not cover the signature");
        return Err(Error::Verification);
    }
    Ok(gen_time.to_date_time().into())
}

/// Reads the message imprint and `genTime` from a DER `TSTInfo`.
fn parse_tst_info(der: &[u8]) -> Result<(DigestInfo, GeneralizedTime)> {
    let mut reader = SliceReader::new(der)?;
    let fields = reader.sequence(|r| {
        let version = u8::decode(r)?;
        let _policy = ObjectIdentifier::decode(r)?;
        let imprint = DigestInfo::decode(r)?;
        let _serial = Int::decode(r)?;
        let gen_time = GeneralizedTime::decode(r)?;
        // accuracy, ordering, nonce, tsa, extensions
        while !r.is_finished() {
            r.tlv_bytes()?;
        }
        Ok((version, imprint, gen_time))
    })?;
    let (version, imprint, gen_time) = reader.finish(fields)?;
    if version != 1 {
        debug!(version, "unsupported TSTInfo version");
        return Err(Error::Unsupported);
    }
    Ok((imprint, gen_time))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::test_util::fixtures;

    #[test]
    fn test_authenticode_verify() {
        for trusted in [fixtures::ROOT, fixtures::INTER] {
            authenticode_verify(fixtures::AUTHENTICODE, trusted, fixtures::IMAGE_HASH).unwrap();
        }
        assert_eq!(
            authenticode_verify(fixtures::AUTHENTICODE, fixtures::OTHER, fixtures::IMAGE_HASH),
            Err(Error::Verification)
        );
    }

    #[test]
    fn test_padded_certificate_table_entry() {
        let mut auth = fixtures::AUTHENTICODE.to_vec();
        auth.resize(auth.len().next_multiple_of(8) + 8, 0);
        authenticode_verify(&auth, fixtures::ROOT, fixtures::IMAGE_HASH).unwrap();
        assert!(image_timestamp_verify(&auth, fixtures::TSA).is_ok());
    }

    #[test]
    fn test_authenticode_rejects_wrong_hash() {
        let mut hash = fixtures::IMAGE_HASH.to_vec();
        hash[0] ^= 1;
        assert_eq!(
            authenticode_verify(fixtures::AUTHENTICODE, fixtures::ROOT, &hash),
            Err(Error::Verification)
        );
        assert_eq!(
            authenticode_verify(fixtures::AUTHENTICODE, fixtures::ROOT, &fixtures::IMAGE_HASH[..20]),
            Err(Error::Verification)
        );
    }

    #[test]
    fn test_authenticode_rejects_other_content() {
        assert!(matches!(
            authenticode_verify(fixtures::P7_ATTACHED, fixtures::ROOT, fixtures::IMAGE_HASH),
            Err(Error::InvalidArgument(_))
        ));
        assert!(authenticode_verify(b"junk", fixtures::ROOT, fixtures::IMAGE_HASH).is_err());
    }

    #[test]
    fn test_image_timestamp() {
        let want = Timestamp {
            year: 2024,
            month: 3,
            day: 15,
            hour: 12,
            minute: 30,
            second: 45,
        };
        for tsa in [fixtures::TSA, fixtures::TSA_ROOT] {
            assert_eq!(
                image_timestamp_verify(fixtures::AUTHENTICODE, tsa),
                Ok(want)
            );
        }
        assert_eq!(want.to_string(), "2024-03-15T12:30:45Z");
    }

    #[test]
    fn test_image_timestamp_failures() {
        assert_eq!(
            image_timestamp_verify(fixtures::AUTHENTICODE, fixtures::ROOT),
            Err(Error::Verification)
        );
        assert_eq!(
            image_timestamp_verify(fixtures::P7_ATTACHED, fixtures::TSA),
            Err(Error::NotFound)
        );
    }
}

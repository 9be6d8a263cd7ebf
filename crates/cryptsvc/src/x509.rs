//! X.509 certificates.
//!
//! Certificates usually arrive from outside the trust boundary,
//! so every accessor parses defensively and fails with
//! [`Error::Malformed`] rather than trusting lengths or tags.

#![forbid(unsafe_code)]

use alloc::{string::String, vec::Vec};
use core::{fmt, str};

use der::{
    Decode, Encode, Reader, SliceReader, Tag, Tagged,
    asn1::{Any, OctetString},
};
use rsa::{RsaPublicKey, pkcs8::DecodePublicKey};
use tracing::{debug, warn};
use x509_cert::name::Name;

use crate::{
    error::{Error, Result},
    hash::digest,
    oid, pkey, sized,
};

/// A parsed DER certificate.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    inner: x509_cert::Certificate,
}

impl Certificate {
    /// Parses a DER certificate.
    ///
    /// Trailing data after the certificate is rejected.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = x509_cert::Certificate::from_der(der).map_err(|err| {
            warn!(%err, "malformed certificate");
            Error::Malformed
        })?;
        Ok(Self {
            der: der.to_vec(),
            inner,
        })
    }

    /// Wraps an already decoded certificate.
    pub(crate) fn from_inner(inner: x509_cert::Certificate) -> Result<Self> {
        Ok(Self {
            der: inner.to_der()?,
            inner,
        })
    }

    pub(crate) fn inner(&self) -> &x509_cert::Certificate {
        &self.inner
    }

    /// The certificate's DER encoding.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// The raw `TBSCertificate` bytes.
    pub fn tbs_certificate(&self) -> Result<&[u8]> {
        raw_tbs_certificate(&self.der)
    }

    pub(crate) fn subject(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    pub(crate) fn issuer(&self) -> &Name {
        &self.inner.tbs_certificate.issuer
    }

    pub(crate) fn serial_number(&self) -> &[u8] {
        self.inner.tbs_certificate.serial_number.as_bytes()
    }

    /// The contents of the subject key identifier extension, if
    /// any.
    pub(crate) fn subject_key_identifier(&self) -> Option<Vec<u8>> {
        let exts = self.inner.tbs_certificate.extensions.as_ref()?;
        let ext = exts
            .iter()
            .find(|ext| ext.extn_id == oid::SUBJECT_KEY_IDENTIFIER)?;
        OctetString::from_der(ext.extn_value.as_bytes())
            .ok()
            .map(OctetString::into_bytes)
    }

    /// Reports whether `issuer`'s subject is this certificate's
    /// issuer.
    pub(crate) fn names_issuer(&self, issuer: &Self) -> bool {
        self.issuer() == issuer.subject()
    }

    /// Reports whether the certificate is self-issued.
    pub(crate) fn is_self_issued(&self) -> bool {
        self.issuer() == self.subject()
    }

    /// Writes the DER encoding of the subject name to `out`.
    pub fn subject_name(&self, out: &mut [u8]) -> Result<usize> {
        let name = self.subject().to_der()?;
        sized::write_sized(&name, out)
    }

    /// Returns the first common name in the subject.
    pub fn common_name(&self) -> Result<String> {
        let value = self
            .subject()
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .find(|atv| atv.oid == oid::COMMON_NAME)
            .map(|atv| &atv.value)
            .ok_or(Error::NotFound)?;
        decode_directory_string(value)
    }

    /// Writes the first common name in the subject to `out` as a
    /// NUL-terminated UTF-8 string.
    ///
    /// The returned length includes the NUL.
    pub fn common_name_into(&self, out: &mut [u8]) -> Result<usize> {
        let cn = self.common_name()?;
        sized::write_all_sized(&[cn.as_bytes(), &[0]], out)
    }

    /// The subject's RSA public key.
    pub fn rsa_public_key(&self) -> Result<RsaPublicKey> {
        let spki = &self.inner.tbs_certificate.subject_public_key_info;
        if spki.algorithm.oid != oid::RSA_ENCRYPTION {
            debug!(oid = %spki.algorithm.oid, "not an RSA key");
            return Err(Error::Unsupported);
        }
        Ok(RsaPublicKey::from_public_key_der(&spki.to_der()?)?)
    }

    /// Checks that this certificate was issued by `issuer`.
    ///
    /// The issuer name must match `issuer`'s subject and the
    /// signature must verify with `issuer`'s RSA key. Validity
    /// periods and extensions are not examined.
    pub fn verify_signed_by(&self, issuer: &Self) -> Result<()> {
        if !self.names_issuer(issuer) {
            debug!("issuer name mismatch");
            return Err(Error::Verification);
        }
        let sig_oid = &self.inner.signature_algorithm.oid;
        let alg = oid::hash_from_rsa_signature_oid(sig_oid).ok_or_else(|| {
            debug!(oid = %sig_oid, "unsupported signature algorithm");
            Error::Unsupported
        })?;
        let sig = self.inner.signature.as_bytes().ok_or(Error::Malformed)?;
        let hashed = digest(alg, self.tbs_certificate()?)?;
        pkey::verify_pkcs1(&issuer.rsa_public_key()?, alg, &hashed, sig)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &format_args!("{}", self.subject()))
            .finish_non_exhaustive()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

/// Returns the raw `TBSCertificate` bytes of the DER certificate
/// `cert`, borrowed from `cert`.
pub fn raw_tbs_certificate(cert: &[u8]) -> Result<&[u8]> {
    let mut reader = SliceReader::new(cert)?;
    let tbs = reader.sequence(|r| {
        let tbs = r.tlv_bytes()?;
        // signatureAlgorithm, signatureValue
        r.tlv_bytes()?;
        r.tlv_bytes()?;
        Ok(tbs)
    })?;
    let tbs = reader.finish(tbs)?;
    if tbs.first() != Some(&0x30) {
        return Err(Error::Malformed);
    }
    Ok(tbs)
}

/// Decodes a `DirectoryString` (or IA5String) into UTF-8.
fn decode_directory_string(value: &Any) -> Result<String> {
    let bytes = value.value();
    let s: String = match value.tag() {
        Tag::Utf8String => str::from_utf8(bytes)
            .map_err(|_| Error::Malformed)?
            .into(),
        Tag::PrintableString | Tag::Ia5String => {
            if !bytes.is_ascii() {
                return Err(Error::Malformed);
            }
            bytes.iter().map(|&b| char::from(b)).collect()
        }
        // T.61 is treated as Latin-1.
        Tag::TeletexString => bytes.iter().map(|&b| char::from(b)).collect(),
        Tag::BmpString => {
            let units = bytes.chunks_exact(2);
            if !units.remainder().is_empty() {
                return Err(Error::Malformed);
            }
            char::decode_utf16(units.map(|u| u16::from_be_bytes([u[0], u[1]])))
                .collect::<core::result::Result<String, _>>()
                .map_err(|_| Error::Malformed)?
        }
        tag => {
            debug!(%tag, "unsupported string type");
            return Err(Error::Malformed);
        }
    };
    Ok(s)
}

/// Checks that the DER certificate `cert` was issued by the DER
/// certificate `ca`.
pub fn verify_cert(cert: &[u8], ca: &[u8]) -> Result<()> {
    Certificate::from_der(cert)?.verify_signed_by(&Certificate::from_der(ca)?)
}

/// An ordered collection of certificates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertificateStack {
    certs: Vec<Certificate>,
}

impl CertificateStack {
    /// The largest number of certificates that
    /// [`encode`][Self::encode] can represent.
    pub const MAX_LEN: usize = u8::MAX as usize;

    /// Creates an empty stack.
    pub const fn new() -> Self {
        Self { certs: Vec::new() }
    }

    /// Parses each DER certificate in `ders` and appends them, in
    /// order.
    ///
    /// If any certificate fails to parse the stack is left
    /// unchanged.
    pub fn extend_from_der<'a, I>(&mut self, ders: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let parsed = ders
            .into_iter()
            .map(Certificate::from_der)
            .collect::<Result<Vec<_>>>()?;
        self.certs.extend(parsed);
        Ok(())
    }

    /// Appends `cert`.
    pub fn push(&mut self, cert: Certificate) {
        self.certs.push(cert);
    }

    /// The number of certificates.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Reports whether the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Returns the certificate at `idx`.
    pub fn get(&self, idx: usize) -> Option<&Certificate> {
        self.certs.get(idx)
    }

    /// Iterates over the certificates in order.
    pub fn iter(&self) -> core::slice::Iter<'_, Certificate> {
        self.certs.iter()
    }

    /// Encodes the stack as a one-byte count followed by each
    /// certificate as a little-endian `u32` length and its DER.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let count = u8::try_from(self.certs.len())
            .map_err(|_| Error::InvalidArgument("too many certificates"))?;
        let mut out = Vec::new();
        out.push(count);
        for cert in &self.certs {
            let len = u32::try_from(cert.der.len())
                .map_err(|_| Error::InvalidArgument("certificate too large"))?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&cert.der);
        }
        Ok(out)
    }

    /// The inverse of [`encode`][Self::encode].
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        let (&count, rest) = data.split_first().ok_or(Error::Malformed)?;
        data = rest;
        let mut certs = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let (len, rest) = data.split_first_chunk::<4>().ok_or(Error::Malformed)?;
            let len = usize::try_from(u32::from_le_bytes(*len)).map_err(|_| Error::Malformed)?;
            if rest.len() < len {
                return Err(Error::Malformed);
            }
            let (der, rest) = rest.split_at(len);
            certs.push(Certificate::from_der(der)?);
            data = rest;
        }
        if !data.is_empty() {
            return Err(Error::Malformed);
        }
        Ok(Self { certs })
    }
}

impl FromIterator<Certificate> for CertificateStack {
    fn from_iter<I: IntoIterator<Item = Certificate>>(iter: I) -> Self {
        Self {
            certs: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a CertificateStack {
    type Item = &'a Certificate;
    type IntoIter = core::slice::Iter<'a, Certificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::test_util::fixtures;

    fn cert(der: &[u8]) -> Certificate {
        Certificate::from_der(der).unwrap()
    }

    #[test]
    fn test_common_name() {
        assert_eq!(cert(fixtures::LEAF).common_name().unwrap(), "Test Leaf");
        assert_eq!(
            cert(fixtures::ROOT).common_name().unwrap(),
            "Test Root CA"
        );
        assert_eq!(
            cert(fixtures::NO_CN).common_name(),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn test_common_name_sized() {
        let leaf = cert(fixtures::LEAF);
        let want = b"Test Leaf\0";
        assert_eq!(
            leaf.common_name_into(&mut []),
            Err(Error::BufferTooSmall {
                required: want.len()
            })
        );
        let mut buf = [0u8; 64];
        let n = leaf.common_name_into(&mut buf).unwrap();
        assert_eq!(&buf[..n], want);
    }

    #[test]
    fn test_subject_name_is_der_name() {
        let leaf = cert(fixtures::LEAF);
        let Err(Error::BufferTooSmall { required }) = leaf.subject_name(&mut []) else {
            panic!("expected BufferTooSmall");
        };
        let mut buf = vec![0u8; required];
        assert_eq!(leaf.subject_name(&mut buf), Ok(required));
        assert_eq!(buf[0], 0x30);
        assert_eq!(Name::from_der(&buf).unwrap(), *leaf.subject());
    }

    #[test]
    fn test_verify_chain_links() {
        let root = cert(fixtures::ROOT);
        let inter = cert(fixtures::INTER);
        let leaf = cert(fixtures::LEAF);
        let other = cert(fixtures::OTHER);

        leaf.verify_signed_by(&inter).unwrap();
        inter.verify_signed_by(&root).unwrap();
        root.verify_signed_by(&root).unwrap();
        assert!(root.is_self_issued());

        assert_eq!(leaf.verify_signed_by(&root), Err(Error::Verification));
        assert_eq!(leaf.verify_signed_by(&other), Err(Error::Verification));
        assert!(verify_cert(fixtures::INTER, fixtures::ROOT).is_ok());
        assert!(verify_cert(fixtures::INTER, fixtures::OTHER).is_err());
    }

    #[test]
    fn test_tbs_certificate_borrows_input() {
        let tbs = raw_tbs_certificate(fixtures::LEAF).unwrap();
        assert_eq!(tbs[0], 0x30);
        let start = tbs.as_ptr() as usize - fixtures::LEAF.as_ptr() as usize;
        assert!(start < 8);
        assert!(x509_cert::TbsCertificate::from_der(tbs).is_ok());
    }

    #[test]
    fn test_malformed_input() {
        let bad_inputs: [&[u8]; 4] = [&[], &[0x30], &[0x30, 0x00], &fixtures::LEAF[..100]];
        for bad in bad_inputs {
            assert_eq!(Certificate::from_der(bad).err(), Some(Error::Malformed));
            assert!(raw_tbs_certificate(bad).is_err());
        }
        let mut trailing = fixtures::LEAF.to_vec();
        trailing.push(0);
        assert!(Certificate::from_der(&trailing).is_err());
    }

    #[test]
    fn test_stack_is_atomic() {
        let mut stack = CertificateStack::new();
        stack
            .extend_from_der([fixtures::LEAF, fixtures::INTER])
            .unwrap();
        assert_eq!(stack.len(), 2);
        assert!(
            stack
                .extend_from_der([fixtures::ROOT, &b"junk"[..]])
                .is_err()
        );
        assert_eq!(stack.len(), 2);

        let encoded = stack.encode().unwrap();
        assert_eq!(encoded[0], 2);
        let len = u32::from_le_bytes(encoded[1..5].try_into().unwrap()) as usize;
        assert_eq!(&encoded[5..5 + len], fixtures::LEAF);
        assert_eq!(CertificateStack::decode(&encoded).unwrap(), stack);
        assert!(CertificateStack::decode(&encoded[..encoded.len() - 1]).is_err());
    }

    #[test]
    fn test_rsa_public_key() {
        let key = cert(fixtures::LEAF).rsa_public_key().unwrap();
        let ctx = pkey::RsaContext::from_private_key_pem(fixtures::LEAF_KEY_PEM, None).unwrap();
        assert_eq!(key, ctx.public_key().unwrap());
    }
}

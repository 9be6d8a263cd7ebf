//! PKCS#7 (CMS) signed data.
//!
//! Signed data blobs come from outside the trust boundary.
//! Parsing only establishes structure. Nothing about a blob is
//! trusted until [`SignedData::verify`] has walked the signer's
//! chain to a certificate supplied by the caller.

#![forbid(unsafe_code)]

use alloc::{vec, vec::Vec};

use cms::{
    cert::CertificateChoices,
    content_info::ContentInfo,
    signed_data::{SignerIdentifier, SignerInfo},
};
use const_oid::ObjectIdentifier;
use der::{Decode, Encode, Header, Reader, SliceReader, Tag, Tagged, asn1::Any};
use subtle::ConstantTimeEq;
use tracing::{debug, instrument, warn};
use x509_cert::attr::Attributes;

use crate::{
    error::{Error, Result},
    hash::digest,
    oid, pkey,
    x509::{Certificate, CertificateStack},
};

/// The most issuer links followed from a signer certificate.
const MAX_CHAIN_LEN: usize = 8;

/// A parsed `SignedData`, with its embedded certificates.
#[derive(Clone, Debug)]
pub struct SignedData {
    inner: cms::signed_data::SignedData,
    certs: Vec<Certificate>,
}

impl SignedData {
    /// Parses a `ContentInfo`-wrapped or bare `SignedData`.
    ///
    /// Zero bytes after the object are ignored, since PE
    /// certificate table entries are padded to 8 bytes.
    pub fn from_der(p7: &[u8]) -> Result<Self> {
        let p7 = strip_padding(p7)?;
        let inner = match ContentInfo::from_der(p7) {
            Ok(ci) => Self::unwrap_content_info(&ci)?,
            Err(_) => cms::signed_data::SignedData::from_der(p7).map_err(|err| {
                warn!(%err, "malformed signed data");
                Error::Malformed
            })?,
        };
        let certs = inner
            .certificates
            .iter()
            .flat_map(|set| set.0.iter())
            .filter_map(|choice| match choice {
                CertificateChoices::Certificate(cert) => Some(cert.clone()),
                CertificateChoices::Other(_) => None,
            })
            .map(Certificate::from_inner)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { inner, certs })
    }

    fn unwrap_content_info(ci: &ContentInfo) -> Result<cms::signed_data::SignedData> {
        if ci.content_type != oid::SIGNED_DATA {
            warn!(oid = %ci.content_type, "not signed data");
            return Err(Error::Malformed);
        }
        Ok(ci.content.decode_as::<cms::signed_data::SignedData>()?)
    }

    /// The type of the encapsulated content.
    pub fn content_type(&self) -> ObjectIdentifier {
        self.inner.encap_content_info.econtent_type
    }

    /// The encapsulated content, or `None` for a detached
    /// signature.
    ///
    /// For an OCTET STRING this is its octets. For any other
    /// type it is the encoded value without the tag and length.
    pub fn attached_content(&self) -> Option<&[u8]> {
        self.encapsulated_content().map(Any::value)
    }

    pub(crate) fn encapsulated_content(&self) -> Option<&Any> {
        self.inner.encap_content_info.econtent.as_ref()
    }

    /// The embedded certificates.
    pub fn certificates(&self) -> &[Certificate] {
        &self.certs
    }

    pub(crate) fn first_signer(&self) -> Result<&SignerInfo> {
        self.inner.signer_infos.0.as_slice().first().ok_or_else(|| {
            debug!("no signer infos");
            Error::NotFound
        })
    }

    /// Finds the embedded certificate identified by `si`.
    fn signer_certificate(&self, si: &SignerInfo) -> Result<&Certificate> {
        let found = match &si.sid {
            SignerIdentifier::IssuerAndSerialNumber(ias) => self.certs.iter().find(|cert| {
                cert.issuer() == &ias.issuer
                    && cert.serial_number() == ias.serial_number.as_bytes()
            }),
            SignerIdentifier::SubjectKeyIdentifier(ski) => self
                .certs
                .iter()
                .find(|cert| cert.subject_key_identifier().as_deref() == Some(ski.0.as_bytes())),
        };
        found.ok_or_else(|| {
            debug!("signer certificate is not embedded");
            Error::NotFound
        })
    }

    /// Follows embedded issuers up from `leaf` by name, stopping
    /// at a self-issued certificate.
    fn chain<'a>(&'a self, leaf: &'a Certificate) -> Vec<&'a Certificate> {
        let mut chain = vec![leaf];
        let mut cur = leaf;
        while chain.len() <= MAX_CHAIN_LEN && !cur.is_self_issued() {
            let next = self
                .certs
                .iter()
                .find(|cert| *cert != cur && cur.names_issuer(cert));
            match next {
                Some(next) if !chain.contains(&next) => {
                    chain.push(next);
                    cur = next;
                }
                _ => break,
            }
        }
        chain
    }

    /// Returns every embedded certificate, the first signer's
    /// chain first, and the topmost certificate of that chain.
    pub fn signers(&self) -> Result<(CertificateStack, Certificate)> {
        let signer = self.signer_certificate(self.first_signer()?)?;
        let chain = self.chain(signer);
        let trusted = chain.last().copied().unwrap_or(signer).clone();
        let mut stack: CertificateStack = chain.iter().map(|&cert| cert.clone()).collect();
        for cert in &self.certs {
            if !chain.contains(&cert) {
                stack.push(cert.clone());
            }
        }
        Ok((stack, trusted))
    }

    /// Splits the embedded certificates into those on some
    /// signer's issuer chain (signer first) and the rest.
    pub fn certificate_lists(&self) -> Result<(CertificateStack, CertificateStack)> {
        let mut chained: Vec<&Certificate> = Vec::new();
        for si in self.inner.signer_infos.0.iter() {
            let Ok(signer) = self.signer_certificate(si) else {
                continue;
            };
            for cert in self.chain(signer) {
                if !chained.contains(&cert) {
                    chained.push(cert);
                }
            }
        }
        let unchained = self
            .certs
            .iter()
            .filter(|cert| !chained.contains(cert))
            .cloned()
            .collect();
        let chained = chained.into_iter().cloned().collect();
        Ok((chained, unchained))
    }

    /// Verifies every signer over `content` and checks that each
    /// signer chains to `trusted`.
    ///
    /// If `content` is `None` the attached content is used. If
    /// both are present they must be equal.
    #[instrument(skip_all)]
    pub fn verify(&self, trusted: &Certificate, content: Option<&[u8]>) -> Result<()> {
        let content = match (self.attached_content(), content) {
            (Some(attached), Some(content)) => {
                if attached != content {
                    debug!("supplied content differs from attached content");
                    return Err(Error::Verification);
                }
                content
            }
            (Some(attached), None) => attached,
            (None, Some(content)) => content,
            (None, None) => {
                debug!("detached signature without content");
                return Err(Error::InvalidArgument("no content to verify"));
            }
        };
        let signers = self.inner.signer_infos.0.as_slice();
        if signers.is_empty() {
            debug!("no signer infos");
            return Err(Error::Verification);
        }
        for si in signers {
            self.verify_signer(si, trusted, content)?;
        }
        Ok(())
    }

    fn verify_signer(&self, si: &SignerInfo, trusted: &Certificate, content: &[u8]) -> Result<()> {
        let alg = oid::hash_from_digest_oid(&si.digest_alg.oid).ok_or_else(|| {
            debug!(oid = %si.digest_alg.oid, "unsupported digest algorithm");
            Error::Unsupported
        })?;
        let sig_oid = &si.signature_algorithm.oid;
        if *sig_oid != oid::RSA_ENCRYPTION
            && oid::hash_from_rsa_signature_oid(sig_oid) != Some(alg)
        {
            debug!(oid = %sig_oid, "unsupported signature algorithm");
            return Err(Error::Unsupported);
        }

        let content_digest = digest(alg, content)?;
        let signed_digest = match &si.signed_attrs {
            Some(attrs) => {
                let md = attribute(attrs, oid::MESSAGE_DIGEST)?.ok_or_else(|| {
                    debug!("signed attributes lack messageDigest");
                    Error::Verification
                })?;
                if md.tag() != Tag::OctetString {
                    return Err(Error::Malformed);
                }
                if !bool::from(md.value().ct_eq(&content_digest[..])) {
                    debug!("messageDigest mismatch");
                    return Err(Error::Verification);
                }
                if let Some(ct) = attribute(attrs, oid::CONTENT_TYPE)? {
                    if ct.decode_as::<ObjectIdentifier>()? != self.content_type() {
                        debug!("contentType mismatch");
                        return Err(Error::Verification);
                    }
                }
                digest(alg, &attrs.to_der()?)?
            }
            None => content_digest,
        };

        let signer = self.signer_certificate(si)?;
        pkey::verify_pkcs1(
            &signer.rsa_public_key()?,
            alg,
            &signed_digest,
            si.signature.as_bytes(),
        )?;
        self.chain_to(signer, trusted)
    }

    /// Checks that `cert` reaches `trusted` through embedded
    /// certificates, verifying every signature on the way.
    fn chain_to<'a>(&'a self, mut cur: &'a Certificate, trusted: &Certificate) -> Result<()> {
        for _ in 0..=MAX_CHAIN_LEN {
            if cur == trusted || cur.verify_signed_by(trusted).is_ok() {
                return Ok(());
            }
            cur = self
                .certs
                .iter()
                .find(|cert| *cert != cur && cur.verify_signed_by(cert).is_ok())
                .ok_or_else(|| {
                    debug!("signer does not chain to the trusted certificate");
                    Error::Verification
                })?;
        }
        debug!("certificate chain too long");
        Err(Error::Verification)
    }
}

/// Returns the first DER object in `data`, which may only be
/// followed by zeros.
fn strip_padding(data: &[u8]) -> Result<&[u8]> {
    let mut reader = SliceReader::new(data)?;
    let header = Header::decode(&mut reader)?;
    let len = usize::try_from((reader.position() + header.length)?)?;
    let Some((object, rest)) = data.split_at_checked(len) else {
        warn!(len, have = data.len(), "truncated signed data");
        return Err(Error::Malformed);
    };
    if rest.iter().any(|&b| b != 0) {
        warn!(len = rest.len(), "trailing data after signed data");
        return Err(Error::Malformed);
    }
    Ok(object)
}

/// Returns the only value of the attribute `oid`, if present.
fn attribute(attrs: &Attributes, oid: ObjectIdentifier) -> Result<Option<&Any>> {
    let Some(attr) = attrs.iter().find(|attr| attr.oid == oid) else {
        return Ok(None);
    };
    match attr.values.as_slice() {
        [value] => Ok(Some(value)),
        _ => {
            warn!(%oid, "attribute must have exactly one value");
            Err(Error::Malformed)
        }
    }
}

pub(crate) fn unsigned_attribute(si: &SignerInfo, oid: ObjectIdentifier) -> Result<Option<&Any>> {
    match &si.unsigned_attrs {
        Some(attrs) => attribute(attrs, oid),
        None => Ok(None),
    }
}

/// Returns the signer chain and the trusted certificate from
/// the signed data `p7`. See [`SignedData::signers`].
pub fn get_signers(p7: &[u8]) -> Result<(CertificateStack, Certificate)> {
    SignedData::from_der(p7)?.signers()
}

/// Partitions the certificates embedded in `p7`. See
/// [`SignedData::certificate_lists`].
pub fn get_certificates_list(p7: &[u8]) -> Result<(CertificateStack, CertificateStack)> {
    SignedData::from_der(p7)?.certificate_lists()
}

/// Verifies the signed data `p7` over `content` against the DER
/// certificate `trusted`.
pub fn verify(p7: &[u8], trusted: &[u8], content: Option<&[u8]>) -> Result<()> {
    let trusted = Certificate::from_der(trusted)?;
    SignedData::from_der(p7)?.verify(&trusted, content)
}

/// Returns a copy of the content attached to `p7`, or `None` if
/// the signature is detached.
pub fn get_attached_content(p7: &[u8]) -> Result<Option<Vec<u8>>> {
    Ok(SignedData::from_der(p7)?.attached_content().map(<[u8]>::to_vec))
}

/// Produces a detached SHA-256 signature over `content`.
///
/// The output is a bare `SignedData` with no signed attributes,
/// embedding `signer` and then `others`. It exists to exercise
/// [`verify`] and is not hardened for production signing.
#[cfg(any(test, feature = "test_util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test_util")))]
pub fn sign(
    key_pem: &[u8],
    password: Option<&[u8]>,
    content: &[u8],
    signer: &Certificate,
    others: Option<&CertificateStack>,
) -> Result<Vec<u8>> {
    use cms::{
        cert::IssuerAndSerialNumber,
        content_info::CmsVersion,
        signed_data::{CertificateSet, EncapsulatedContentInfo, SignerInfos},
    };
    use der::asn1::{OctetString, SetOfVec};
    use spki::AlgorithmIdentifierOwned;

    use crate::algorithm::HashAlgorithm;

    let key = pkey::RsaContext::from_private_key_pem(key_pem, password)?;
    let hashed = digest(HashAlgorithm::Sha256, content)?;
    let mut sig = vec![0u8; key.size()?];
    let n = key.pkcs1_sign(&hashed, &mut sig)?;
    sig.truncate(n);

    let alg = |oid| AlgorithmIdentifierOwned {
        oid,
        parameters: Some(Any::null()),
    };
    let certs = core::iter::once(signer)
        .chain(others.into_iter().flatten().filter(|cert| *cert != signer))
        .map(|cert| CertificateChoices::Certificate(cert.inner().clone()))
        .collect::<Vec<_>>();
    let si = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: signer.issuer().clone(),
            serial_number: signer.inner().tbs_certificate.serial_number.clone(),
        }),
        digest_alg: alg(oid::SHA256),
        signed_attrs: None,
        signature_algorithm: alg(oid::RSA_ENCRYPTION),
        signature: OctetString::new(sig)?,
        unsigned_attrs: None,
    };
    let sd = cms::signed_data::SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![alg(oid::SHA256)])?,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: oid::DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(SetOfVec::try_from(certs)?)),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![si])?),
    };
    Ok(sd.to_der()?)
}

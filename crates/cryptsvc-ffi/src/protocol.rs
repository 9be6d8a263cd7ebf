//! The dispatch table.

use core::{
    ptr,
    sync::atomic::{AtomicBool, Ordering},
};

use tracing::{error, info};

use crate::{
    cipher::{Aes, Arc4Entries, BlockCipherEntries, Tdes},
    dh::DhEntries,
    error::{Error, Result},
    hash::{HashEntries, Md4, Md5, Sha1, Sha256, Sha384, Sha512},
    hmac::{HmacEntries, HmacMd5, HmacSha1, HmacSha256},
    pkcs::{AuthenticodeEntries, Pkcs5Entries, Pkcs7Entries},
    random::RandomEntries,
    rsa::RsaEntries,
    x509::X509Entries,
};

/// The revision of [`CryptProtocol`]'s layout.
///
/// It changes whenever an entry is added, removed or reordered.
pub const CRYPT_PROTOCOL_REVISION: u64 = 1;

/// Every cryptographic service, as a flat table of `extern "C"`
/// entries.
///
/// Entries that can fail return `false` (or a non-success
/// [`Status`][cryptsvc::Status]). Entries with a
/// variable-length output take a `(buf, *size)` pair: on entry
/// `*size` is the capacity of `buf`, and on return it is the
/// number of bytes written or, if `buf` was too small, the
/// number required.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct CryptProtocol {
    /// [`CRYPT_PROTOCOL_REVISION`].
    pub revision: u64,
    /// MD4.
    pub md4: HashEntries,
    /// MD5.
    pub md5: HashEntries,
    /// SHA-1.
    pub sha1: HashEntries,
    /// SHA-256.
    pub sha256: HashEntries,
    /// SHA-384.
    pub sha384: HashEntries,
    /// SHA-512.
    pub sha512: HashEntries,
    /// HMAC-MD5.
    pub hmac_md5: HmacEntries,
    /// HMAC-SHA1.
    pub hmac_sha1: HmacEntries,
    /// HMAC-SHA256.
    pub hmac_sha256: HmacEntries,
    /// Triple-DES.
    pub tdes: BlockCipherEntries,
    /// AES.
    pub aes: BlockCipherEntries,
    /// ARC4.
    pub arc4: Arc4Entries,
    /// RSA.
    pub rsa: RsaEntries,
    /// X.509.
    pub x509: X509Entries,
    /// PKCS#5.
    pub pkcs5: Pkcs5Entries,
    /// PKCS#7.
    pub pkcs7: Pkcs7Entries,
    /// Authenticode.
    pub authenticode: AuthenticodeEntries,
    /// Diffie-Hellman.
    pub dh: DhEntries,
    /// The CSPRNG.
    pub random: RandomEntries,
}

impl CryptProtocol {
    const fn new() -> Self {
        Self {
            revision: CRYPT_PROTOCOL_REVISION,
            md4: HashEntries::new::<Md4>(),
            md5: HashEntries::new::<Md5>(),
            sha1: HashEntries::new::<Sha1>(),
            sha256: HashEntries::new::<Sha256>(),
            sha384: HashEntries::new::<Sha384>(),
            sha512: HashEntries::new::<Sha512>(),
            hmac_md5: HmacEntries::new::<HmacMd5>(),
            hmac_sha1: HmacEntries::new::<HmacSha1>(),
            hmac_sha256: HmacEntries::new::<HmacSha256>(),
            tdes: BlockCipherEntries::new::<Tdes>(),
            aes: BlockCipherEntries::new::<Aes>(),
            arc4: Arc4Entries::new(),
            rsa: RsaEntries::new(),
            x509: X509Entries::new(),
            pkcs5: Pkcs5Entries::new(),
            pkcs7: Pkcs7Entries::new(),
            authenticode: AuthenticodeEntries::new(),
            dh: DhEntries::new(),
            random: RandomEntries::new(),
        }
    }
}

static PROTOCOL: CryptProtocol = CryptProtocol::new();

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Installs the dispatch table.
///
/// It succeeds once per process. Afterward the table is
/// immutable and can be found with [`locate`].
pub fn install() -> Result<&'static CryptProtocol> {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        error!("crypto protocol already installed");
        return Err(Error::AlreadyInstalled);
    }
    info!(revision = CRYPT_PROTOCOL_REVISION, "installed crypto protocol");
    Ok(&PROTOCOL)
}

/// Returns the installed dispatch table.
pub fn locate() -> Option<&'static CryptProtocol> {
    INSTALLED.load(Ordering::Acquire).then_some(&PROTOCOL)
}

/// Installs the dispatch table and returns it, or null if it was
/// already installed.
#[unsafe(no_mangle)]
pub extern "C" fn cryptsvc_install() -> *const CryptProtocol {
    install().map_or(ptr::null(), ptr::from_ref)
}

/// Returns the installed dispatch table, or null.
#[unsafe(no_mangle)]
pub extern "C" fn cryptsvc_locate() -> *const CryptProtocol {
    locate().map_or(ptr::null(), ptr::from_ref)
}

//! Algorithm identifiers and the context size registry.

#![forbid(unsafe_code)]

use core::{fmt, mem::size_of};

use crate::{
    block::BlockCipherContext, hash::HashContext, mac::HmacContext, stream::Arc4Context,
};

/// A hash algorithm.
///
/// The discriminants are stable and must never be renumbered.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HashAlgorithm {
    /// MD4.
    Md4 = 0,
    /// MD5.
    Md5 = 1,
    /// SHA-1.
    Sha1 = 2,
    /// SHA-256.
    Sha256 = 3,
    /// SHA-384.
    Sha384 = 4,
    /// SHA-512.
    Sha512 = 5,
}

impl HashAlgorithm {
    /// Every hash algorithm, supported or not.
    pub const ALL: [Self; 6] = [
        Self::Md4,
        Self::Md5,
        Self::Sha1,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
    ];

    /// The size in bytes of the digest.
    pub const fn digest_size(self) -> usize {
        match self {
            Self::Md4 | Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// The size in bytes of the compression function's block.
    pub const fn block_size(self) -> usize {
        match self {
            Self::Md4 | Self::Md5 | Self::Sha1 | Self::Sha256 => 64,
            Self::Sha384 | Self::Sha512 => 128,
        }
    }

    /// Reports whether this build supports the algorithm.
    pub const fn is_supported(self) -> bool {
        match self {
            Self::Md4 => cfg!(feature = "md4"),
            Self::Md5 => cfg!(feature = "md5"),
            Self::Sha1 | Self::Sha256 | Self::Sha384 | Self::Sha512 => true,
        }
    }

    /// Returns the algorithm with the stable identifier `id`.
    pub const fn from_u32(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::Md4),
            1 => Some(Self::Md5),
            2 => Some(Self::Sha1),
            3 => Some(Self::Sha256),
            4 => Some(Self::Sha384),
            5 => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Returns the algorithm whose digest is `size` bytes long
    /// among those accepted by PKCS#1 v1.5 signing: MD5, SHA-1
    /// and SHA-256.
    pub const fn for_pkcs1_digest(size: usize) -> Option<Self> {
        match size {
            16 => Some(Self::Md5),
            20 => Some(Self::Sha1),
            32 => Some(Self::Sha256),
            _ => None,
        }
    }

    /// The algorithm's name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md4 => "MD4",
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

/// A MAC algorithm.
///
/// The discriminants are stable and must never be renumbered.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MacAlgorithm {
    /// HMAC-MD5.
    HmacMd5 = 0,
    /// HMAC-SHA1.
    HmacSha1 = 1,
    /// HMAC-SHA256.
    HmacSha256 = 2,
}

impl MacAlgorithm {
    /// Every MAC algorithm, supported or not.
    pub const ALL: [Self; 3] = [Self::HmacMd5, Self::HmacSha1, Self::HmacSha256];

    /// The underlying hash.
    pub const fn hash(self) -> HashAlgorithm {
        match self {
            Self::HmacMd5 => HashAlgorithm::Md5,
            Self::HmacSha1 => HashAlgorithm::Sha1,
            Self::HmacSha256 => HashAlgorithm::Sha256,
        }
    }

    /// The size in bytes of the tag.
    pub const fn tag_size(self) -> usize {
        self.hash().digest_size()
    }

    /// Reports whether this build supports the algorithm.
    pub const fn is_supported(self) -> bool {
        self.hash().is_supported()
    }
}

/// A symmetric cipher.
///
/// The discriminants are stable and must never be renumbered.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CipherAlgorithm {
    /// Triple-DES (EDE).
    Tdes = 0,
    /// AES.
    Aes = 1,
    /// ARC4.
    Arc4 = 2,
}

impl CipherAlgorithm {
    /// Every cipher, supported or not.
    pub const ALL: [Self; 3] = [Self::Tdes, Self::Aes, Self::Arc4];

    /// The block size in bytes, or 1 for stream ciphers.
    pub const fn block_size(self) -> usize {
        match self {
            Self::Tdes => 8,
            Self::Aes => 16,
            Self::Arc4 => 1,
        }
    }

    /// Reports whether this build supports the algorithm.
    pub const fn is_supported(self) -> bool {
        match self {
            Self::Tdes => cfg!(feature = "tdes"),
            Self::Aes => true,
            Self::Arc4 => cfg!(feature = "arc4"),
        }
    }

    /// Reports whether `bits` is a valid key length for block
    /// ciphers.
    ///
    /// Stream ciphers are keyed in bytes; see
    /// [`Arc4Context::MIN_KEY_SIZE`].
    pub const fn is_valid_key_bits(self, bits: usize) -> bool {
        match self {
            // K1=K2=K3, two-key (K1=K3) and three-key.
            Self::Tdes => matches!(bits, 64 | 128 | 192),
            Self::Aes => matches!(bits, 128 | 192 | 256),
            Self::Arc4 => false,
        }
    }
}

/// Any algorithm with a fixed-size working context.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Algorithm {
    /// A hash.
    Hash(HashAlgorithm),
    /// A MAC.
    Mac(MacAlgorithm),
    /// A cipher.
    Cipher(CipherAlgorithm),
}

impl Algorithm {
    /// Reports whether this build supports the algorithm.
    pub const fn is_supported(self) -> bool {
        match self {
            Self::Hash(alg) => alg.is_supported(),
            Self::Mac(alg) => alg.is_supported(),
            Self::Cipher(alg) => alg.is_supported(),
        }
    }

    /// Returns the algorithm's static metadata.
    pub const fn descriptor(self) -> AlgorithmDescriptor {
        let supported = self.is_supported();
        let (context, output, block, min_key, max_key) = match self {
            Self::Hash(alg) => (
                size_of::<HashContext>(),
                alg.digest_size(),
                alg.block_size(),
                0,
                0,
            ),
            Self::Mac(alg) => (
                size_of::<HmacContext>(),
                alg.tag_size(),
                alg.hash().block_size(),
                0,
                usize::MAX,
            ),
            Self::Cipher(CipherAlgorithm::Tdes) => (size_of::<BlockCipherContext>(), 0, 8, 8, 24),
            Self::Cipher(CipherAlgorithm::Aes) => (size_of::<BlockCipherContext>(), 0, 16, 16, 32),
            Self::Cipher(CipherAlgorithm::Arc4) => (
                size_of::<Arc4Context>(),
                0,
                1,
                Arc4Context::MIN_KEY_SIZE,
                Arc4Context::MAX_KEY_SIZE,
            ),
        };
        AlgorithmDescriptor {
            context_size: if supported { context } else { 0 },
            output_size: output,
            block_size: block,
            min_key_size: min_key,
            max_key_size: max_key,
            supported,
        }
    }
}

impl From<HashAlgorithm> for Algorithm {
    fn from(alg: HashAlgorithm) -> Self {
        Self::Hash(alg)
    }
}

impl From<MacAlgorithm> for Algorithm {
    fn from(alg: MacAlgorithm) -> Self {
        Self::Mac(alg)
    }
}

impl From<CipherAlgorithm> for Algorithm {
    fn from(alg: CipherAlgorithm) -> Self {
        Self::Cipher(alg)
    }
}

/// Static, per-algorithm metadata.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AlgorithmDescriptor {
    /// The size in bytes of the algorithm's working context, or
    /// zero if the algorithm is not supported.
    pub context_size: usize,
    /// The size in bytes of the digest or tag, or zero for
    /// ciphers.
    pub output_size: usize,
    /// The block size in bytes.
    pub block_size: usize,
    /// The smallest key in bytes.
    pub min_key_size: usize,
    /// The largest key in bytes.
    pub max_key_size: usize,
    /// Whether this build supports the algorithm.
    pub supported: bool,
}

/// Returns the size in bytes of `alg`'s working context, or zero
/// if `alg` is not supported by this build.
///
/// Never fails and has no side effects.
pub const fn context_size(alg: Algorithm) -> usize {
    alg.descriptor().context_size
}

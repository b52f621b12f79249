//! Integrity functions for normal-mode SK payload protection
//!
//! HMAC based algorithms from RFC 7296 Section 3.3.2 and RFC 4868, with the
//! output truncated to the negotiated checksum length.

use std::fmt;

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use crate::ikev2::proposal::{IntegTransformId, Transform};
use crate::{Error, Result};

/// Integrity checksum over an encrypted message
pub trait IntegrityFunction: Send + Sync + fmt::Debug {
    /// Key length in bytes
    fn key_len(&self) -> usize;

    /// Checksum length in bytes
    fn checksum_len(&self) -> usize;

    /// Compute the (truncated) checksum of `data`
    fn generate_checksum(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>>;

    /// Constant-time comparison against a received checksum
    fn verify_checksum(&self, key: &[u8], data: &[u8], checksum: &[u8]) -> Result<bool> {
        let computed = self.generate_checksum(key, data)?;
        Ok(computed.ct_eq(checksum).into())
    }
}

/// Integrity algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegrityAlgorithm {
    /// HMAC-SHA1-96
    HmacSha1_96,
    /// HMAC-SHA2-256-128
    HmacSha256_128,
    /// HMAC-SHA2-384-192
    HmacSha384_192,
    /// HMAC-SHA2-512-256
    HmacSha512_256,
}

impl IntegrityAlgorithm {
    /// Map a negotiated INTEG transform to an integrity algorithm
    pub fn from_transform(transform: &Transform) -> Option<Self> {
        match transform.integ_id()? {
            IntegTransformId::HmacSha1_96 => Some(IntegrityAlgorithm::HmacSha1_96),
            IntegTransformId::HmacSha256_128 => Some(IntegrityAlgorithm::HmacSha256_128),
            IntegTransformId::HmacSha384_192 => Some(IntegrityAlgorithm::HmacSha384_192),
            IntegTransformId::HmacSha512_256 => Some(IntegrityAlgorithm::HmacSha512_256),
            _ => None,
        }
    }

    /// INTEG transform advertising this algorithm
    pub fn transform(self) -> Transform {
        Transform::integ(match self {
            IntegrityAlgorithm::HmacSha1_96 => IntegTransformId::HmacSha1_96,
            IntegrityAlgorithm::HmacSha256_128 => IntegTransformId::HmacSha256_128,
            IntegrityAlgorithm::HmacSha384_192 => IntegTransformId::HmacSha384_192,
            IntegrityAlgorithm::HmacSha512_256 => IntegTransformId::HmacSha512_256,
        })
    }
}

macro_rules! hmac_truncated {
    ($digest:ty, $key:expr, $data:expr, $len:expr) => {{
        let mut mac = Hmac::<$digest>::new_from_slice($key)
            .map_err(|_| Error::CryptoError("Invalid HMAC key".into()))?;
        mac.update($data);
        mac.finalize().into_bytes()[..$len].to_vec()
    }};
}

impl IntegrityFunction for IntegrityAlgorithm {
    fn key_len(&self) -> usize {
        match self {
            IntegrityAlgorithm::HmacSha1_96 => 20,
            IntegrityAlgorithm::HmacSha256_128 => 32,
            IntegrityAlgorithm::HmacSha384_192 => 48,
            IntegrityAlgorithm::HmacSha512_256 => 64,
        }
    }

    fn checksum_len(&self) -> usize {
        match self {
            IntegrityAlgorithm::HmacSha1_96 => 12,
            IntegrityAlgorithm::HmacSha256_128 => 16,
            IntegrityAlgorithm::HmacSha384_192 => 24,
            IntegrityAlgorithm::HmacSha512_256 => 32,
        }
    }

    fn generate_checksum(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        if key.len() != self.key_len() {
            return Err(Error::InvalidKeyLength {
                expected: self.key_len(),
                actual: key.len(),
            });
        }

        let len = self.checksum_len();
        let checksum = match self {
            IntegrityAlgorithm::HmacSha1_96 => hmac_truncated!(Sha1, key, data, len),
            IntegrityAlgorithm::HmacSha256_128 => hmac_truncated!(Sha256, key, data, len),
            IntegrityAlgorithm::HmacSha384_192 => hmac_truncated!(Sha384, key, data, len),
            IntegrityAlgorithm::HmacSha512_256 => hmac_truncated!(Sha512, key, data, len),
        };
        Ok(checksum)
    }
}

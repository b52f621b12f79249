//! Cryptographic providers for SK/SKF payload protection
//!
//! The envelope layer only talks to the [`Cipher`] and [`IntegrityFunction`]
//! traits. [`CipherAlgorithm`] and [`IntegrityAlgorithm`] implement them with
//! RustCrypto primitives; tests may substitute deterministic doubles.

pub mod cipher;
pub mod integrity;

pub use cipher::{Cipher, CipherAlgorithm};
pub use integrity::{IntegrityAlgorithm, IntegrityFunction};

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Result};

/// Key material wiped from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Wrap raw key bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        SecretKey(bytes)
    }

    /// Borrow the key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for an empty key
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for SecretKey {
    fn from(bytes: &[u8]) -> Self {
        SecretKey(bytes.to_vec())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED; {}])", self.0.len())
    }
}

/// Cipher, integrity function and keys protecting one direction of an IKE SA
///
/// Normal mode pairs a non-AEAD cipher with an integrity function; combined
/// mode uses an AEAD cipher alone.
#[derive(Debug, Clone, Copy)]
pub struct ProtectionSuite<'a> {
    cipher: &'a dyn Cipher,
    encryption_key: &'a SecretKey,
    integrity: Option<(&'a dyn IntegrityFunction, &'a SecretKey)>,
}

impl<'a> ProtectionSuite<'a> {
    /// Combined mode suite
    pub fn aead(cipher: &'a dyn Cipher, encryption_key: &'a SecretKey) -> Result<Self> {
        if !cipher.is_aead() {
            return Err(Error::InvalidParameter(
                "Normal mode cipher requires an integrity function".into(),
            ));
        }
        check_key_len(cipher.key_len(), encryption_key)?;

        Ok(ProtectionSuite {
            cipher,
            encryption_key,
            integrity: None,
        })
    }

    /// Normal mode suite
    pub fn normal(
        cipher: &'a dyn Cipher,
        encryption_key: &'a SecretKey,
        integrity: &'a dyn IntegrityFunction,
        integrity_key: &'a SecretKey,
    ) -> Result<Self> {
        if cipher.is_aead() {
            return Err(Error::InvalidParameter(
                "AEAD cipher must not be combined with an integrity function".into(),
            ));
        }
        check_key_len(cipher.key_len(), encryption_key)?;
        check_key_len(integrity.key_len(), integrity_key)?;

        Ok(ProtectionSuite {
            cipher,
            encryption_key,
            integrity: Some((integrity, integrity_key)),
        })
    }

    /// The cipher
    pub fn cipher(&self) -> &'a dyn Cipher {
        self.cipher
    }

    /// The encryption key (including any AEAD salt)
    pub fn encryption_key(&self) -> &'a SecretKey {
        self.encryption_key
    }

    /// Integrity function and key; `None` in combined mode
    pub fn integrity(&self) -> Option<(&'a dyn IntegrityFunction, &'a SecretKey)> {
        self.integrity
    }

    /// Whether this is a combined mode suite
    pub fn is_aead(&self) -> bool {
        self.integrity.is_none()
    }

    /// Length of the trailing checksum or AEAD tag
    pub fn checksum_len(&self) -> usize {
        match self.integrity {
            Some((integrity, _)) => integrity.checksum_len(),
            None => self.cipher.tag_len(),
        }
    }

    /// Bytes added to the padded plaintext: IV plus checksum or tag
    pub fn overhead(&self) -> usize {
        self.cipher.iv_len() + self.checksum_len()
    }
}

fn check_key_len(expected: usize, key: &SecretKey) -> Result<()> {
    if key.len() != expected {
        return Err(Error::InvalidKeyLength {
            expected,
            actual: key.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_modes() {
        let gcm = CipherAlgorithm::AesGcm128;
        let cbc = CipherAlgorithm::AesCbc128;
        let sha = IntegrityAlgorithm::HmacSha256_128;
        let gcm_key = SecretKey::new(vec![1; 20]);
        let cbc_key = SecretKey::new(vec![1; 16]);
        let sha_key = SecretKey::new(vec![2; 32]);

        let suite = ProtectionSuite::aead(&gcm, &gcm_key).unwrap();
        assert!(suite.is_aead());
        assert_eq!(suite.checksum_len(), 16);
        assert_eq!(suite.overhead(), 24);

        let suite = ProtectionSuite::normal(&cbc, &cbc_key, &sha, &sha_key).unwrap();
        assert!(!suite.is_aead());
        assert_eq!(suite.overhead(), 32);

        assert!(matches!(
            ProtectionSuite::aead(&cbc, &cbc_key),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            ProtectionSuite::normal(&gcm, &gcm_key, &sha, &sha_key),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            ProtectionSuite::normal(&cbc, &cbc_key, &sha, &cbc_key),
            Err(Error::InvalidKeyLength { expected: 32, actual: 16 })
        ));
    }

    #[test]
    fn test_secret_key_debug_is_redacted() {
        let key = SecretKey::new(vec![0x42; 16]);
        assert_eq!(format!("{:?}", key), "SecretKey([REDACTED; 16])");
        assert_eq!(key.len(), 16);
        assert_eq!(key.as_bytes()[0], 0x42);
    }
}

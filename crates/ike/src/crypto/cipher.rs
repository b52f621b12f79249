//! Cipher implementations for SK payload encryption
//!
//! Two classes of cipher protect IKE messages:
//!
//! - **Normal mode** (AES-CBC): block cipher without padding of its own, paired
//!   with a separate integrity function.
//! - **Combined mode** (AES-GCM per RFC 5282, ChaCha20-Poly1305 per RFC 7634):
//!   AEAD with the tag appended to the ciphertext.
//!
//! For the AEAD ciphers the negotiated key material is the cipher key followed
//! by a 4-byte salt; the 12-byte nonce is `salt || iv` with an 8-byte explicit
//! IV carried on the wire.

use std::fmt;

use aes::{Aes128, Aes192, Aes256};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes128Gcm, Aes256Gcm, Nonce as AesGcmNonce,
};
use cbc::{Decryptor, Encryptor};
use cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::ikev2::proposal::{EncrTransformId, Transform};
use crate::{Error, Result};

/// Cipher used by the encrypted payload envelope
///
/// `key` is the full negotiated key material (including any salt). Normal
/// mode ciphers ignore `aad` and expect block-aligned input.
pub trait Cipher: Send + Sync + fmt::Debug {
    /// Key material length in bytes
    fn key_len(&self) -> usize;

    /// Explicit IV length in bytes
    fn iv_len(&self) -> usize;

    /// Alignment the padded plaintext must reach
    fn block_size(&self) -> usize;

    /// Whether the cipher authenticates (combined mode)
    fn is_aead(&self) -> bool;

    /// Authentication tag length in bytes (0 for normal mode)
    fn tag_len(&self) -> usize {
        0
    }

    /// Encrypt; AEAD ciphers return ciphertext with the tag appended
    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt; AEAD ciphers verify the trailing tag
    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;
}

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;
type Aes192CbcEnc = Encryptor<Aes192>;
type Aes192CbcDec = Decryptor<Aes192>;
type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

/// AEAD salt length (RFC 5282, RFC 7634)
const AEAD_SALT_LEN: usize = 4;

/// Cipher algorithm for SK payload encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    /// AES-CBC with 128-bit key
    AesCbc128,
    /// AES-CBC with 192-bit key
    AesCbc192,
    /// AES-CBC with 256-bit key
    AesCbc256,
    /// AES-GCM with 128-bit key and 16-byte ICV (AEAD)
    AesGcm128,
    /// AES-GCM with 256-bit key and 16-byte ICV (AEAD)
    AesGcm256,
    /// ChaCha20-Poly1305 (AEAD)
    ChaCha20Poly1305,
}

impl CipherAlgorithm {
    /// Map a negotiated ENCR transform to a cipher
    ///
    /// Returns `None` for transforms this crate has no implementation for.
    pub fn from_transform(transform: &Transform) -> Option<Self> {
        match (transform.encr_id()?, transform.key_length()) {
            (EncrTransformId::AesCbc, Some(128)) => Some(CipherAlgorithm::AesCbc128),
            (EncrTransformId::AesCbc, Some(192)) => Some(CipherAlgorithm::AesCbc192),
            (EncrTransformId::AesCbc, Some(256)) => Some(CipherAlgorithm::AesCbc256),
            (EncrTransformId::AesGcm16, Some(128)) => Some(CipherAlgorithm::AesGcm128),
            (EncrTransformId::AesGcm16, Some(256)) => Some(CipherAlgorithm::AesGcm256),
            (EncrTransformId::ChaCha20Poly1305, None) => Some(CipherAlgorithm::ChaCha20Poly1305),
            _ => None,
        }
    }

    /// ENCR transform advertising this cipher
    pub fn transform(self) -> Transform {
        match self {
            CipherAlgorithm::AesCbc128 => Transform::encr_with_key_length(EncrTransformId::AesCbc, 128),
            CipherAlgorithm::AesCbc192 => Transform::encr_with_key_length(EncrTransformId::AesCbc, 192),
            CipherAlgorithm::AesCbc256 => Transform::encr_with_key_length(EncrTransformId::AesCbc, 256),
            CipherAlgorithm::AesGcm128 => {
                Transform::encr_with_key_length(EncrTransformId::AesGcm16, 128)
            }
            CipherAlgorithm::AesGcm256 => {
                Transform::encr_with_key_length(EncrTransformId::AesGcm16, 256)
            }
            CipherAlgorithm::ChaCha20Poly1305 => Transform::encr(EncrTransformId::ChaCha20Poly1305),
        }
    }

    fn check_lengths(self, key: &[u8], iv: &[u8]) -> Result<()> {
        if key.len() != self.key_len() {
            return Err(Error::InvalidKeyLength {
                expected: self.key_len(),
                actual: key.len(),
            });
        }
        if iv.len() != self.iv_len() {
            return Err(Error::InvalidIvLength {
                expected: self.iv_len(),
                actual: iv.len(),
            });
        }
        Ok(())
    }

    fn check_block_aligned(self, data: &[u8]) -> Result<()> {
        if data.len() % self.block_size() != 0 {
            return Err(Error::CryptoError(format!(
                "{} bytes is not a multiple of the {}-byte block size",
                data.len(),
                self.block_size()
            )));
        }
        Ok(())
    }

    /// Split AEAD key material into (key, nonce = salt || iv)
    fn aead_parts<'k>(self, key: &'k [u8], iv: &[u8]) -> (&'k [u8], [u8; 12]) {
        let (cipher_key, salt) = key.split_at(key.len() - AEAD_SALT_LEN);
        let mut nonce = [0u8; 12];
        nonce[..AEAD_SALT_LEN].copy_from_slice(salt);
        nonce[AEAD_SALT_LEN..].copy_from_slice(iv);
        (cipher_key, nonce)
    }
}

impl Cipher for CipherAlgorithm {
    fn key_len(&self) -> usize {
        match self {
            CipherAlgorithm::AesCbc128 => 16,
            CipherAlgorithm::AesCbc192 => 24,
            CipherAlgorithm::AesCbc256 => 32,
            CipherAlgorithm::AesGcm128 => 16 + AEAD_SALT_LEN,
            CipherAlgorithm::AesGcm256 => 32 + AEAD_SALT_LEN,
            CipherAlgorithm::ChaCha20Poly1305 => 32 + AEAD_SALT_LEN,
        }
    }

    fn iv_len(&self) -> usize {
        match self {
            CipherAlgorithm::AesCbc128 | CipherAlgorithm::AesCbc192 | CipherAlgorithm::AesCbc256 => {
                16
            }
            CipherAlgorithm::AesGcm128
            | CipherAlgorithm::AesGcm256
            | CipherAlgorithm::ChaCha20Poly1305 => 8,
        }
    }

    fn block_size(&self) -> usize {
        match self {
            CipherAlgorithm::AesCbc128 | CipherAlgorithm::AesCbc192 | CipherAlgorithm::AesCbc256 => {
                16
            }
            // Stream-like AEADs only need 4-byte alignment
            CipherAlgorithm::AesGcm128
            | CipherAlgorithm::AesGcm256
            | CipherAlgorithm::ChaCha20Poly1305 => 4,
        }
    }

    fn is_aead(&self) -> bool {
        matches!(
            self,
            CipherAlgorithm::AesGcm128
                | CipherAlgorithm::AesGcm256
                | CipherAlgorithm::ChaCha20Poly1305
        )
    }

    fn tag_len(&self) -> usize {
        if self.is_aead() {
            16
        } else {
            0
        }
    }

    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let this = *self;
        this.check_lengths(key, iv)?;

        match this {
            CipherAlgorithm::AesCbc128 => {
                this.check_block_aligned(plaintext)?;
                let enc = Aes128CbcEnc::new_from_slices(key, iv)
                    .map_err(|_| Error::CryptoError("Failed to create AES-CBC cipher".into()))?;
                Ok(enc.encrypt_padded_vec_mut::<NoPadding>(plaintext))
            }
            CipherAlgorithm::AesCbc192 => {
                this.check_block_aligned(plaintext)?;
                let enc = Aes192CbcEnc::new_from_slices(key, iv)
                    .map_err(|_| Error::CryptoError("Failed to create AES-CBC cipher".into()))?;
                Ok(enc.encrypt_padded_vec_mut::<NoPadding>(plaintext))
            }
            CipherAlgorithm::AesCbc256 => {
                this.check_block_aligned(plaintext)?;
                let enc = Aes256CbcEnc::new_from_slices(key, iv)
                    .map_err(|_| Error::CryptoError("Failed to create AES-CBC cipher".into()))?;
                Ok(enc.encrypt_padded_vec_mut::<NoPadding>(plaintext))
            }
            CipherAlgorithm::AesGcm128 => {
                let (cipher_key, nonce) = this.aead_parts(key, iv);
                let cipher = Aes128Gcm::new_from_slice(cipher_key)
                    .map_err(|_| Error::CryptoError("Failed to create AES-GCM cipher".into()))?;
                cipher
                    .encrypt(AesGcmNonce::from_slice(&nonce), Payload { msg: plaintext, aad })
                    .map_err(|_| Error::CryptoError("AES-GCM encryption failed".into()))
            }
            CipherAlgorithm::AesGcm256 => {
                let (cipher_key, nonce) = this.aead_parts(key, iv);
                let cipher = Aes256Gcm::new_from_slice(cipher_key)
                    .map_err(|_| Error::CryptoError("Failed to create AES-GCM cipher".into()))?;
                cipher
                    .encrypt(AesGcmNonce::from_slice(&nonce), Payload { msg: plaintext, aad })
                    .map_err(|_| Error::CryptoError("AES-GCM encryption failed".into()))
            }
            CipherAlgorithm::ChaCha20Poly1305 => {
                let (cipher_key, nonce) = this.aead_parts(key, iv);
                let cipher = chacha20poly1305::ChaCha20Poly1305::new_from_slice(cipher_key)
                    .map_err(|_| Error::CryptoError("Failed to create ChaCha20 cipher".into()))?;
                cipher
                    .encrypt(
                        chacha20poly1305::Nonce::from_slice(&nonce),
                        Payload { msg: plaintext, aad },
                    )
                    .map_err(|_| Error::CryptoError("ChaCha20-Poly1305 encryption failed".into()))
            }
        }
    }

    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let this = *self;
        this.check_lengths(key, iv)?;

        if ciphertext.len() < this.tag_len() {
            return Err(Error::BufferTooShort {
                required: this.tag_len(),
                available: ciphertext.len(),
            });
        }

        match this {
            CipherAlgorithm::AesCbc128 => {
                this.check_block_aligned(ciphertext)?;
                Aes128CbcDec::new_from_slices(key, iv)
                    .map_err(|_| Error::CryptoError("Failed to create AES-CBC cipher".into()))?
                    .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
                    .map_err(|_| Error::CryptoError("AES-CBC decryption failed".into()))
            }
            CipherAlgorithm::AesCbc192 => {
                this.check_block_aligned(ciphertext)?;
                Aes192CbcDec::new_from_slices(key, iv)
                    .map_err(|_| Error::CryptoError("Failed to create AES-CBC cipher".into()))?
                    .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
                    .map_err(|_| Error::CryptoError("AES-CBC decryption failed".into()))
            }
            CipherAlgorithm::AesCbc256 => {
                this.check_block_aligned(ciphertext)?;
                Aes256CbcDec::new_from_slices(key, iv)
                    .map_err(|_| Error::CryptoError("Failed to create AES-CBC cipher".into()))?
                    .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
                    .map_err(|_| Error::CryptoError("AES-CBC decryption failed".into()))
            }
            CipherAlgorithm::AesGcm128 => {
                let (cipher_key, nonce) = this.aead_parts(key, iv);
                let cipher = Aes128Gcm::new_from_slice(cipher_key)
                    .map_err(|_| Error::CryptoError("Failed to create AES-GCM cipher".into()))?;
                cipher
                    .decrypt(AesGcmNonce::from_slice(&nonce), Payload { msg: ciphertext, aad })
                    .map_err(|_| Error::SecurityVerification("AES-GCM tag mismatch".into()))
            }
            CipherAlgorithm::AesGcm256 => {
                let (cipher_key, nonce) = this.aead_parts(key, iv);
                let cipher = Aes256Gcm::new_from_slice(cipher_key)
                    .map_err(|_| Error::CryptoError("Failed to create AES-GCM cipher".into()))?;
                cipher
                    .decrypt(AesGcmNonce::from_slice(&nonce), Payload { msg: ciphertext, aad })
                    .map_err(|_| Error::SecurityVerification("AES-GCM tag mismatch".into()))
            }
            CipherAlgorithm::ChaCha20Poly1305 => {
                let (cipher_key, nonce) = this.aead_parts(key, iv);
                let cipher = chacha20poly1305::ChaCha20Poly1305::new_from_slice(cipher_key)
                    .map_err(|_| Error::CryptoError("Failed to create ChaCha20 cipher".into()))?;
                cipher
                    .decrypt(
                        chacha20poly1305::Nonce::from_slice(&nonce),
                        Payload { msg: ciphertext, aad },
                    )
                    .map_err(|_| {
                        Error::SecurityVerification("ChaCha20-Poly1305 tag mismatch".into())
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CipherAlgorithm; 6] = [
        CipherAlgorithm::AesCbc128,
        CipherAlgorithm::AesCbc192,
        CipherAlgorithm::AesCbc256,
        CipherAlgorithm::AesGcm128,
        CipherAlgorithm::AesGcm256,
        CipherAlgorithm::ChaCha20Poly1305,
    ];

    #[test]
    fn test_cipher_parameters() {
        assert_eq!(CipherAlgorithm::AesCbc128.key_len(), 16);
        assert_eq!(CipherAlgorithm::AesGcm128.key_len(), 20);
        assert_eq!(CipherAlgorithm::ChaCha20Poly1305.key_len(), 36);

        assert_eq!(CipherAlgorithm::AesCbc256.iv_len(), 16);
        assert_eq!(CipherAlgorithm::AesGcm256.iv_len(), 8);
        assert_eq!(CipherAlgorithm::ChaCha20Poly1305.iv_len(), 8);

        assert_eq!(CipherAlgorithm::AesCbc192.tag_len(), 0);
        assert_eq!(CipherAlgorithm::AesGcm128.tag_len(), 16);
        assert!(!CipherAlgorithm::AesCbc128.is_aead());
        assert!(CipherAlgorithm::ChaCha20Poly1305.is_aead());
    }

    #[test]
    fn test_transform_mapping() {
        for algorithm in ALL {
            assert_eq!(
                CipherAlgorithm::from_transform(&algorithm.transform()),
                Some(algorithm)
            );
            assert!(algorithm.transform().is_supported());
        }
        assert_eq!(
            CipherAlgorithm::from_transform(&Transform::encr(EncrTransformId::Des3)),
            None
        );
    }

    #[test]
    fn test_cbc_encrypt_decrypt() {
        let key = vec![0x42; 32];
        let iv = vec![0x01; 16];
        let plaintext = [0x5au8; 48];

        let ciphertext = CipherAlgorithm::AesCbc256
            .encrypt(&key, &iv, &plaintext, &[])
            .unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let decrypted = CipherAlgorithm::AesCbc256
            .decrypt(&key, &iv, &ciphertext, &[])
            .unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_cbc_requires_block_alignment() {
        let result = CipherAlgorithm::AesCbc128.encrypt(&[0u8; 16], &[0u8; 16], &[1u8; 17], &[]);
        assert!(matches!(result, Err(Error::CryptoError(_))));
    }

    #[test]
    fn test_aead_encrypt_decrypt() {
        for algorithm in [
            CipherAlgorithm::AesGcm128,
            CipherAlgorithm::AesGcm256,
            CipherAlgorithm::ChaCha20Poly1305,
        ] {
            let key = vec![0x42; algorithm.key_len()];
            let iv = vec![0x07; 8];
            let plaintext = b"Hello, IKEv2!";
            let aad = b"IKE header data";

            let ciphertext = algorithm.encrypt(&key, &iv, plaintext, aad).unwrap();
            assert_eq!(ciphertext.len(), plaintext.len() + 16);

            let decrypted = algorithm.decrypt(&key, &iv, &ciphertext, aad).unwrap();
            assert_eq!(decrypted, plaintext);

            // Different AAD fails verification
            assert!(matches!(
                algorithm.decrypt(&key, &iv, &ciphertext, b"other header"),
                Err(Error::SecurityVerification(_))
            ));
        }
    }

    #[test]
    fn test_salt_is_part_of_nonce() {
        let algorithm = CipherAlgorithm::AesGcm128;
        let mut key = vec![0x42; algorithm.key_len()];
        let iv = [0u8; 8];
        let ciphertext = algorithm.encrypt(&key, &iv, b"data", &[]).unwrap();

        let last = key.len() - 1;
        key[last] ^= 0x01;
        assert!(algorithm.decrypt(&key, &iv, &ciphertext, &[]).is_err());
    }

    #[test]
    fn test_invalid_lengths() {
        let result = CipherAlgorithm::AesGcm128.encrypt(&[0x42; 10], &[0x01; 8], b"test", b"aad");
        assert!(matches!(result, Err(Error::InvalidKeyLength { .. })));

        let result = CipherAlgorithm::AesGcm128.encrypt(&[0x42; 20], &[0x01; 12], b"test", b"aad");
        assert!(matches!(result, Err(Error::InvalidIvLength { .. })));

        let result = CipherAlgorithm::ChaCha20Poly1305.decrypt(&[0x42; 36], &[0x01; 8], &[0; 8], &[]);
        assert!(matches!(result, Err(Error::BufferTooShort { .. })));
    }
}

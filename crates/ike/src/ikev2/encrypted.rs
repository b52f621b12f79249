//! Encrypted payload envelope (SK and SKF bodies)
//!
//! Builds and opens the protected part of an IKE message, RFC 7296
//! Section 3.14:
//!
//! ```text
//! normal mode:   IV || E(plaintext || padding || pad length) || checksum
//! combined mode: IV || AEAD(plaintext || padding || pad length, aad) (tag appended)
//! ```
//!
//! In normal mode the checksum covers every byte of the message before it,
//! from the IKE header through the ciphertext. In combined mode the
//! associated data is everything before the IV: the IKE header, the generic
//! payload header and, for SKF, the fragment header.

use rand::{CryptoRng, RngCore};

use super::constants::{
    PayloadType, FRAGMENT_HEADER_SIZE, IKE_HEADER_SIZE, MAX_IKE_MESSAGE_SIZE, PAYLOAD_HEADER_SIZE,
};
use super::message::IkeHeader;
use super::payload::PayloadHeader;
use crate::crypto::ProtectionSuite;
use crate::logging;
use crate::{Error, Result};

/// Number of padding bytes needed so that `plaintext_len + padding + 1` is a
/// multiple of `block_size`
pub fn pad_length(plaintext_len: usize, block_size: usize) -> usize {
    let block_size = block_size.max(1);
    (block_size - (plaintext_len + 1) % block_size) % block_size
}

/// Wire size of a protected message carrying `plaintext_len` bytes
///
/// `fragmented` adds the SKF fragment header.
pub fn protected_message_len(
    plaintext_len: usize,
    suite: &ProtectionSuite<'_>,
    fragmented: bool,
) -> usize {
    let block_size = suite.cipher().block_size();
    let padded = plaintext_len + pad_length(plaintext_len, block_size) + 1;
    let prefix = if fragmented { FRAGMENT_HEADER_SIZE } else { 0 };
    IKE_HEADER_SIZE + PAYLOAD_HEADER_SIZE + prefix + suite.overhead() + padded
}

/// Protect a plaintext payload chain
///
/// Produces the whole message: the IKE header (next payload SK, or SKF when
/// `fragment_prefix` is given), the generic payload header naming
/// `inner_next`, the optional unencrypted fragment header, then the protected
/// body. `padding` must be exactly [`pad_length`] bytes long; its content is
/// sent as-is.
pub fn protect(
    header: &IkeHeader,
    inner_next: PayloadType,
    fragment_prefix: Option<[u8; FRAGMENT_HEADER_SIZE]>,
    plaintext: &[u8],
    suite: &ProtectionSuite<'_>,
    iv: &[u8],
    padding: &[u8],
) -> Result<Vec<u8>> {
    let cipher = suite.cipher();
    if iv.len() != cipher.iv_len() {
        return Err(Error::InvalidIvLength {
            expected: cipher.iv_len(),
            actual: iv.len(),
        });
    }

    let pad_len = pad_length(plaintext.len(), cipher.block_size());
    if padding.len() != pad_len {
        return Err(Error::InvalidParameter(format!(
            "Expected {} padding bytes, got {}",
            pad_len,
            padding.len()
        )));
    }
    // Pad length is a single byte on the wire
    if pad_len > u8::MAX as usize {
        return Err(Error::InvalidParameter(format!(
            "Block size {} is too large",
            cipher.block_size()
        )));
    }

    let total = protected_message_len(plaintext.len(), suite, fragment_prefix.is_some());
    if total > MAX_IKE_MESSAGE_SIZE {
        return Err(Error::MessageTooLarge(total));
    }

    let (outer_type, prefix): (PayloadType, &[u8]) = match &fragment_prefix {
        Some(bytes) => (PayloadType::SKF, bytes),
        None => (PayloadType::SK, &[]),
    };
    let payload_len = total - IKE_HEADER_SIZE;
    let payload_header = PayloadHeader::new(inner_next, false, payload_len as u16);

    let mut message = Vec::with_capacity(total);
    message.extend_from_slice(&header.with_chain(outer_type, total).to_bytes());
    message.extend_from_slice(&payload_header.to_bytes());
    message.extend_from_slice(prefix);

    let mut padded = Vec::with_capacity(plaintext.len() + pad_len + 1);
    padded.extend_from_slice(plaintext);
    padded.extend_from_slice(padding);
    padded.push(pad_len as u8);

    let key = suite.encryption_key().as_bytes();
    match suite.integrity() {
        Some((integrity, integrity_key)) => {
            let ciphertext = cipher.encrypt(key, iv, &padded, &[])?;
            message.extend_from_slice(iv);
            message.extend_from_slice(&ciphertext);
            let checksum = integrity.generate_checksum(integrity_key.as_bytes(), &message)?;
            message.extend_from_slice(&checksum);
        }
        None => {
            let sealed = cipher.encrypt(key, iv, &padded, &message)?;
            message.extend_from_slice(iv);
            message.extend_from_slice(&sealed);
        }
    }

    if message.len() != total {
        return Err(Error::CryptoError(format!(
            "Cipher produced {} bytes, expected {}",
            message.len(),
            total
        )));
    }

    Ok(message)
}

/// [`protect`] with a fresh random IV and random padding
pub fn protect_with_rng<R>(
    header: &IkeHeader,
    inner_next: PayloadType,
    fragment_prefix: Option<[u8; FRAGMENT_HEADER_SIZE]>,
    plaintext: &[u8],
    suite: &ProtectionSuite<'_>,
    rng: &mut R,
) -> Result<Vec<u8>>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let cipher = suite.cipher();
    let mut iv = vec![0u8; cipher.iv_len()];
    rng.fill_bytes(&mut iv);
    let mut padding = vec![0u8; pad_length(plaintext.len(), cipher.block_size())];
    rng.fill_bytes(&mut padding);

    protect(header, inner_next, fragment_prefix, plaintext, suite, &iv, &padding)
}

/// Verify and decrypt a protected message
///
/// `body_offset` is the index of the IV in `message`; everything before it is
/// authenticated but not encrypted. Returns the plaintext payload chain with
/// padding removed.
///
/// # Errors
///
/// - [`Error::SecurityVerification`] on a checksum or tag mismatch
/// - [`Error::InvalidSyntax`] for a truncated body, a ciphertext that is not
///   block aligned, or a pad length that overruns the plaintext
pub fn unprotect(message: &[u8], body_offset: usize, suite: &ProtectionSuite<'_>) -> Result<Vec<u8>> {
    let cipher = suite.cipher();
    let iv_len = cipher.iv_len();
    let checksum_len = suite.checksum_len();

    let min_len = body_offset + iv_len + checksum_len + 1;
    if message.len() < min_len {
        return Err(Error::syntax(format!(
            "Encrypted body too short: {} bytes, need at least {}",
            message.len().saturating_sub(body_offset),
            min_len - body_offset
        )));
    }

    let iv = &message[body_offset..body_offset + iv_len];
    let key = suite.encryption_key().as_bytes();

    let padded = match suite.integrity() {
        Some((integrity, integrity_key)) => {
            let (authenticated, checksum) = message.split_at(message.len() - checksum_len);
            if !integrity.verify_checksum(integrity_key.as_bytes(), authenticated, checksum)? {
                log_failure(message, "checksum mismatch");
                return Err(Error::SecurityVerification(
                    "Integrity checksum mismatch".into(),
                ));
            }

            let ciphertext = &authenticated[body_offset + iv_len..];
            if ciphertext.len() % cipher.block_size().max(1) != 0 {
                return Err(Error::syntax(format!(
                    "Ciphertext length {} is not a multiple of the block size {}",
                    ciphertext.len(),
                    cipher.block_size()
                )));
            }
            cipher.decrypt(key, iv, ciphertext, &[])?
        }
        None => {
            let aad = &message[..body_offset];
            let sealed = &message[body_offset + iv_len..];
            cipher.decrypt(key, iv, sealed, aad).map_err(|e| {
                if let Error::SecurityVerification(reason) = &e {
                    log_failure(message, reason);
                }
                e
            })?
        }
    };

    strip_padding(padded)
}

fn strip_padding(mut padded: Vec<u8>) -> Result<Vec<u8>> {
    let pad_len = match padded.last() {
        Some(&pad_len) => pad_len as usize,
        None => return Err(Error::syntax("Empty decrypted body")),
    };
    if pad_len + 1 > padded.len() {
        return Err(Error::syntax(format!(
            "Pad length {} exceeds decrypted length {}",
            pad_len,
            padded.len()
        )));
    }
    padded.truncate(padded.len() - pad_len - 1);
    Ok(padded)
}

fn log_failure(message: &[u8], reason: &str) {
    let spi_i = message.get(0..8).unwrap_or_default();
    let message_id = message
        .get(20..24)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or_default();
    logging::log_integrity_check_failed(spi_i, message_id, reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CipherAlgorithm, IntegrityAlgorithm, SecretKey};
    use crate::ikev2::constants::{ExchangeType, IkeFlags};
    use crate::ikev2::message::IkeMessage;
    use crate::ikev2::payload::IkePayload;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn header() -> IkeHeader {
        IkeHeader::new(
            [0x11; 8],
            [0x22; 8],
            ExchangeType::Informational,
            IkeFlags::request(true),
            5,
        )
    }

    #[test]
    fn test_pad_length() {
        assert_eq!(pad_length(0, 16), 15);
        assert_eq!(pad_length(15, 16), 0);
        assert_eq!(pad_length(16, 16), 15);
        assert_eq!(pad_length(30, 16), 1);
        assert_eq!(pad_length(3, 4), 0);
        assert_eq!(pad_length(7, 1), 0);
    }

    #[test]
    fn test_normal_mode_layout() {
        let cbc = CipherAlgorithm::AesCbc128;
        let sha = IntegrityAlgorithm::HmacSha256_128;
        let enc_key = SecretKey::new(vec![0x01; 16]);
        let integ_key = SecretKey::new(vec![0x02; 32]);
        let suite = ProtectionSuite::normal(&cbc, &enc_key, &sha, &integ_key).unwrap();

        let plaintext = [0xabu8; 20];
        let padding = [0u8; 11];
        let message = protect(
            &header(),
            PayloadType::N,
            None,
            &plaintext,
            &suite,
            &[0x07; 16],
            &padding,
        )
        .unwrap();

        // 28 header + 4 generic header + 16 IV + 32 ciphertext + 16 checksum
        assert_eq!(message.len(), 96);
        assert_eq!(message[16], PayloadType::SK.to_u8());
        assert_eq!(&message[24..28], &96u32.to_be_bytes());
        assert_eq!(message[28], PayloadType::N.to_u8());
        assert_eq!(&message[30..32], &68u16.to_be_bytes());
        assert_eq!(&message[32..48], &[0x07; 16]);

        let decoded = unprotect(&message, 32, &suite).unwrap();
        assert_eq!(decoded, plaintext);

        // The outer chain still parses with the SK body opaque
        let outer = IkeMessage::decode(&message).unwrap();
        assert!(matches!(outer.payloads[0], IkePayload::SK(_)));
    }

    #[test]
    fn test_normal_mode_checksum_flip() {
        let cbc = CipherAlgorithm::AesCbc256;
        let sha = IntegrityAlgorithm::HmacSha1_96;
        let enc_key = SecretKey::new(vec![0x01; 32]);
        let integ_key = SecretKey::new(vec![0x02; 20]);
        let suite = ProtectionSuite::normal(&cbc, &enc_key, &sha, &integ_key).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let mut message =
            protect_with_rng(&header(), PayloadType::D, None, &[1, 2, 3], &suite, &mut rng)
                .unwrap();
        let last = message.len() - 1;
        message[last] ^= 0x01;

        assert!(matches!(
            unprotect(&message, 32, &suite),
            Err(Error::SecurityVerification(_))
        ));
    }

    #[test]
    fn test_aead_covers_fragment_prefix() {
        let gcm = CipherAlgorithm::AesGcm256;
        let key = SecretKey::new(vec![0x33; 36]);
        let suite = ProtectionSuite::aead(&gcm, &key).unwrap();

        let plaintext = b"fragment body".to_vec();
        let mut rng = StdRng::seed_from_u64(1);
        let mut message = protect_with_rng(
            &header(),
            PayloadType::IDi,
            Some([0, 1, 0, 2]),
            &plaintext,
            &suite,
            &mut rng,
        )
        .unwrap();
        assert_eq!(message[16], PayloadType::SKF.to_u8());
        assert_eq!(unprotect(&message, 36, &suite).unwrap(), plaintext);

        // Tampering with the unencrypted fragment header breaks the tag
        message[35] = 3;
        assert!(matches!(
            unprotect(&message, 36, &suite),
            Err(Error::SecurityVerification(_))
        ));
    }

    #[test]
    fn test_wrong_padding_length_rejected() {
        let chacha = CipherAlgorithm::ChaCha20Poly1305;
        let key = SecretKey::new(vec![0x44; 36]);
        let suite = ProtectionSuite::aead(&chacha, &key).unwrap();

        let result = protect(&header(), PayloadType::N, None, &[0; 5], &suite, &[0; 8], &[0; 3]);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));

        let result = protect(&header(), PayloadType::N, None, &[0; 5], &suite, &[0; 12], &[0; 2]);
        assert!(matches!(result, Err(Error::InvalidIvLength { .. })));
    }

    #[test]
    fn test_truncated_body_rejected() {
        let chacha = CipherAlgorithm::ChaCha20Poly1305;
        let key = SecretKey::new(vec![0x44; 36]);
        let suite = ProtectionSuite::aead(&chacha, &key).unwrap();

        let message = [0u8; 50];
        assert!(matches!(
            unprotect(&message, 32, &suite),
            Err(Error::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_strip_padding() {
        assert_eq!(strip_padding(vec![1, 2, 9, 9, 2]).unwrap(), vec![1, 2]);
        assert_eq!(strip_padding(vec![0]).unwrap(), Vec::<u8>::new());
        assert!(strip_padding(vec![1, 5]).is_err());
        assert!(strip_padding(Vec::new()).is_err());
    }
}

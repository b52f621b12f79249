//! Shared helpers for integration tests

#![allow(dead_code)]

use fynx_ike::crypto::Cipher;
use fynx_ike::ikev2::{ExchangeType, IkeFlags, IkeHeader, IkeMessage, IkePayload};
use fynx_ike::Result;
use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness; `RUST_LOG` selects the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic combined-mode cipher with no IV and no tag
///
/// XORs every byte with a key-derived value so ciphertext differs from
/// plaintext while sizes stay fully predictable.
#[derive(Debug, Clone, Copy)]
pub struct XorCipher {
    pub block_size: usize,
}

impl XorCipher {
    pub const KEY_LEN: usize = 4;

    pub fn new(block_size: usize) -> Self {
        XorCipher { block_size }
    }

    fn apply(key: &[u8], data: &[u8]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, b)| b ^ key[i % key.len()])
            .collect()
    }
}

impl Cipher for XorCipher {
    fn key_len(&self) -> usize {
        Self::KEY_LEN
    }

    fn iv_len(&self) -> usize {
        0
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn is_aead(&self) -> bool {
        true
    }

    fn encrypt(&self, key: &[u8], _iv: &[u8], plaintext: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        Ok(Self::apply(key, plaintext))
    }

    fn decrypt(&self, key: &[u8], _iv: &[u8], ciphertext: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        Ok(Self::apply(key, ciphertext))
    }
}

pub const SPI_I: [u8; 8] = [0x11; 8];
pub const SPI_R: [u8; 8] = [0x22; 8];

/// INFORMATIONAL request sent by the original initiator
pub fn request(message_id: u32, payloads: Vec<IkePayload>) -> IkeMessage {
    IkeMessage::new(
        IkeHeader::new(
            SPI_I,
            SPI_R,
            ExchangeType::Informational,
            IkeFlags::request(true),
            message_id,
        ),
        payloads,
    )
}

/// INFORMATIONAL response sent by the original responder
pub fn response(message_id: u32, payloads: Vec<IkePayload>) -> IkeMessage {
    IkeMessage::new(
        IkeHeader::new(
            SPI_I,
            SPI_R,
            ExchangeType::Informational,
            IkeFlags::response(false),
            message_id,
        ),
        payloads,
    )
}

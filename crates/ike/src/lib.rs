//! IKEv2 message layer for the Fynx security ecosystem.
//!
//! This crate implements the parts of IKEv2 that sit between the socket and
//! the session state machine:
//!
//! - **Codec** - IKE header and payload chain encoding (RFC 7296 Section 3)
//! - **Encrypted envelope** - SK payload protection in normal (cipher plus
//!   integrity) and combined (AEAD) mode
//! - **Fragmentation** - SKF splitting and reassembly (RFC 7383)
//! - **SA negotiation** - proposal construction, selection and validation
//!
//! # Example
//!
//! ```rust
//! use fynx_ike::config::FragmentationConfig;
//! use fynx_ike::crypto::{CipherAlgorithm, ProtectionSuite, SecretKey};
//! use fynx_ike::ikev2::payload::DeletePayload;
//! use fynx_ike::ikev2::{
//!     decode_message, encode_message, DecodeResult, ExchangeType, FragmentStore, IkeFlags,
//!     IkeHeader, IkeMessage, IkePayload,
//! };
//!
//! let cipher = CipherAlgorithm::AesGcm256;
//! let key = SecretKey::new(vec![0x42; 36]);
//! let suite = ProtectionSuite::aead(&cipher, &key)?;
//!
//! let header = IkeHeader::new(
//!     [1; 8],
//!     [2; 8],
//!     ExchangeType::Informational,
//!     IkeFlags::request(true),
//!     3,
//! );
//! let message = IkeMessage::new(header, vec![IkePayload::Delete(DeletePayload::ike())]);
//!
//! let packets = encode_message(
//!     &message,
//!     &suite,
//!     &FragmentationConfig::default(),
//!     &mut rand::thread_rng(),
//! )?;
//!
//! let mut store = FragmentStore::new();
//! match decode_message(&packets[0], 3, &suite, &mut store) {
//!     DecodeResult::Ok(decoded) => assert_eq!(decoded.message.payloads, message.payloads),
//!     other => panic!("decode failed: {:?}", other),
//! }
//! # Ok::<(), fynx_ike::Error>(())
//! ```
//!
//! # Security
//!
//! - All cryptographic operations use vetted RustCrypto crates
//! - Checksums are compared in constant time
//! - Key material is wiped with `zeroize`
//! - Every length read from the network is bounds-checked
//!
//! # References
//!
//! - [RFC 7296](https://datatracker.ietf.org/doc/html/rfc7296) - IKEv2 Protocol
//! - [RFC 7383](https://datatracker.ietf.org/doc/html/rfc7383) - IKEv2 Message Fragmentation
//! - [RFC 5282](https://datatracker.ietf.org/doc/html/rfc5282) - AES-GCM in IKEv2
//! - [RFC 7634](https://datatracker.ietf.org/doc/html/rfc7634) - ChaCha20-Poly1305 in IKEv2

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod ikev2;
pub mod logging;
pub mod spi;

pub use error::{Error, Result};

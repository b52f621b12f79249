//! Protected message pipeline
//!
//! Ties the codec, the encrypted envelope and fragment reassembly together
//! for messages exchanged after IKE_SA_INIT.
//!
//! Inbound decoding reports one of four statuses instead of a plain
//! `Result`, so the session can tell an authenticated but malformed message
//! (worth an error notification) from one that could not be verified (to be
//! dropped silently):
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `Ok` | Verified, decrypted and parsed |
//! | `Partial` | Fragment verified and stored, more outstanding |
//! | `ProtectedError` | Verified and decrypted, but the inner chain is malformed |
//! | `UnprotectedError` | Rejected before or during verification |

use rand::{CryptoRng, RngCore};

use super::constants::{PayloadType, IKE_HEADER_SIZE};
use super::encrypted::unprotect;
use super::fragment::{encode_protected, FragmentKey, FragmentOutcome, FragmentStore};
use super::message::{decode_payload_chain, encode_payload_chain, IkeHeader, IkeMessage};
use super::payload::IkePayload;
use crate::config::FragmentationConfig;
use crate::crypto::ProtectionSuite;
use crate::logging;
use crate::{Error, Result};

/// A fully decoded protected message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Header as received, followed by any unencrypted payloads and the
    /// decrypted inner payloads
    pub message: IkeMessage,
    /// Raw bytes of the first packet (fragment 1 for fragmented messages)
    pub first_packet: Vec<u8>,
}

/// Outcome of decoding one inbound protected packet
#[derive(Debug)]
pub enum DecodeResult {
    /// Message complete and parsed
    Ok(DecodedMessage),
    /// Fragment stored; the message is not complete yet
    Partial,
    /// Authenticated message whose decrypted content is malformed
    ProtectedError {
        /// The failure
        error: Error,
        /// Raw bytes of the first packet
        first_packet: Vec<u8>,
    },
    /// Malformed, unverifiable or unexpected packet; discard it
    UnprotectedError(Error),
}

impl DecodeResult {
    /// Check for a fully decoded message
    pub fn is_ok(&self) -> bool {
        matches!(self, DecodeResult::Ok(_))
    }

    /// The error carried by either error status
    pub fn error(&self) -> Option<&Error> {
        match self {
            DecodeResult::ProtectedError { error, .. } | DecodeResult::UnprotectedError(error) => {
                Some(error)
            }
            _ => None,
        }
    }
}

/// Encode a message whose payloads all go inside the encrypted envelope
///
/// Returns one SK packet, or several SKF packets when `fragmentation` is
/// enabled and the message would exceed its budget.
pub fn encode_message<R>(
    message: &IkeMessage,
    suite: &ProtectionSuite<'_>,
    fragmentation: &FragmentationConfig,
    rng: &mut R,
) -> Result<Vec<Vec<u8>>>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let plaintext = encode_payload_chain(&message.payloads)?;
    let inner_next = message
        .payloads
        .first()
        .map(IkePayload::payload_type)
        .unwrap_or(PayloadType::None);

    let packets = encode_protected(
        &message.header,
        inner_next,
        &plaintext,
        suite,
        fragmentation,
        rng,
    )?;
    for packet in &packets {
        logging::log_message_encoded(&message.header.initiator_spi, message.header.message_id, packet.len());
    }
    Ok(packets)
}

/// Decode one inbound protected packet
///
/// The message ID must equal `expected_message_id`; anything else, including
/// a retransmission of the previous message, is an `UnprotectedError`
/// carrying [`Error::InvalidMessageId`] and leaves `store` untouched. Callers
/// check [`FragmentStore::is_retransmitted_request`] to decide whether to
/// resend their last response.
///
/// On `Ok` and `ProtectedError` for a request, the first packet is recorded
/// in `store`. A reassembled collection stays in `store` until a newer
/// message in the same direction is verified, so replayed fragments of it
/// come back as `Partial` without changing anything.
pub fn decode_message(
    packet: &[u8],
    expected_message_id: u32,
    suite: &ProtectionSuite<'_>,
    store: &mut FragmentStore,
) -> DecodeResult {
    let header = match IkeHeader::from_bytes(packet) {
        Ok(header) => header,
        Err(e) => return DecodeResult::UnprotectedError(e),
    };
    if header.length as usize != packet.len() {
        return DecodeResult::UnprotectedError(Error::InvalidLength {
            expected: header.length as usize,
            actual: packet.len(),
        });
    }

    let is_response = header.is_response();
    if header.message_id != expected_message_id {
        logging::log_message_id_mismatch(expected_message_id, header.message_id, is_response);
        return DecodeResult::UnprotectedError(Error::InvalidMessageId {
            expected: expected_message_id,
            received: header.message_id,
        });
    }

    let mut outer = match decode_payload_chain(
        header.next_payload,
        &packet[IKE_HEADER_SIZE..],
        is_response,
    ) {
        Ok(payloads) => payloads,
        Err(e) => return DecodeResult::UnprotectedError(e),
    };

    let key = FragmentKey {
        is_response,
        message_id: header.message_id,
    };

    match outer.pop() {
        Some(IkePayload::SK(sk)) => {
            if store.is_collecting(&key) {
                logging::log_unfragmented_during_collection(header.message_id);
                return DecodeResult::UnprotectedError(Error::InvalidState(format!(
                    "Unfragmented message {} received while collecting fragments",
                    header.message_id
                )));
            }

            let body_offset = packet.len() - sk.body.len();
            let plaintext = match unprotect(packet, body_offset, suite) {
                Ok(plaintext) => plaintext,
                Err(e) => return DecodeResult::UnprotectedError(e),
            };
            store.discard_stale(key);

            finish(
                header,
                outer,
                sk.first_inner_payload,
                &plaintext,
                packet.to_vec(),
                is_response,
                store,
            )
        }
        Some(IkePayload::SKF(skf)) => {
            if !outer.is_empty() {
                return DecodeResult::UnprotectedError(Error::syntax(
                    "Encrypted fragment must be the only payload",
                ));
            }

            let body_offset = packet.len() - skf.body.len();
            let plaintext = match unprotect(packet, body_offset, suite) {
                Ok(plaintext) => plaintext,
                Err(e) => return DecodeResult::UnprotectedError(e),
            };

            let state = store.state_mut(key);
            let outcome = match state.add_fragment(
                skf.fragment_num,
                skf.total_fragments,
                skf.first_inner_payload,
                plaintext,
                packet,
            ) {
                Ok(outcome) => outcome,
                Err(e) => return DecodeResult::UnprotectedError(e),
            };

            match outcome {
                FragmentOutcome::Stored | FragmentOutcome::Restarted => {
                    logging::log_fragment_collected(
                        &header.initiator_spi,
                        header.message_id,
                        skf.fragment_num,
                        skf.total_fragments,
                    );
                    DecodeResult::Partial
                }
                FragmentOutcome::Duplicate | FragmentOutcome::AlreadyComplete => {
                    DecodeResult::Partial
                }
                FragmentOutcome::Completed => {
                    let reassembled = state.reassemble().and_then(|plaintext| {
                        let first = state.first_next_payload().ok_or_else(|| {
                            Error::InvalidState("First fragment missing".into())
                        })?;
                        let first_packet = state.first_packet().unwrap_or_default().to_vec();
                        Ok((plaintext, first, first_packet))
                    });

                    match reassembled {
                        Ok((plaintext, first, first_packet)) => {
                            finish(
                                header,
                                outer,
                                first,
                                &plaintext,
                                first_packet,
                                is_response,
                                store,
                            )
                        }
                        Err(e) => DecodeResult::UnprotectedError(e),
                    }
                }
            }
        }
        _ => DecodeResult::UnprotectedError(Error::syntax(
            "Message carries no encrypted payload",
        )),
    }
}

/// Parse the decrypted inner chain and settle the store
fn finish(
    header: IkeHeader,
    mut payloads: Vec<IkePayload>,
    first_inner: PayloadType,
    plaintext: &[u8],
    first_packet: Vec<u8>,
    is_response: bool,
    store: &mut FragmentStore,
) -> DecodeResult {
    let inner = decode_payload_chain(first_inner, plaintext, is_response);

    if !is_response {
        store.update_last_request_first_packet(first_packet.clone());
    }

    match inner {
        Ok(inner) => {
            payloads.extend(inner);
            logging::log_message_decoded(&header.initiator_spi, header.message_id, payloads.len());
            DecodeResult::Ok(DecodedMessage {
                message: IkeMessage::new(header, payloads),
                first_packet,
            })
        }
        Err(error) => DecodeResult::ProtectedError {
            error,
            first_packet,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CipherAlgorithm, IntegrityAlgorithm, SecretKey};
    use crate::ikev2::constants::{ExchangeType, IkeFlags};
    use crate::ikev2::encrypted::protect_with_rng;
    use crate::ikev2::payload::{DeletePayload, NotifyPayload, VendorPayload};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Keys {
        cipher: CipherAlgorithm,
        integrity: IntegrityAlgorithm,
        enc_key: SecretKey,
        integ_key: SecretKey,
    }

    impl Keys {
        fn new() -> Self {
            Keys {
                cipher: CipherAlgorithm::AesCbc128,
                integrity: IntegrityAlgorithm::HmacSha256_128,
                enc_key: SecretKey::new(vec![0x11; 16]),
                integ_key: SecretKey::new(vec![0x22; 32]),
            }
        }

        fn suite(&self) -> ProtectionSuite<'_> {
            ProtectionSuite::normal(&self.cipher, &self.enc_key, &self.integrity, &self.integ_key)
                .unwrap()
        }
    }

    fn message(is_response: bool, message_id: u32, payloads: Vec<IkePayload>) -> IkeMessage {
        let flags = if is_response {
            IkeFlags::response(false)
        } else {
            IkeFlags::request(true)
        };
        IkeMessage::new(
            IkeHeader::new([1; 8], [2; 8], ExchangeType::Informational, flags, message_id),
            payloads,
        )
    }

    fn big_vendor() -> IkePayload {
        IkePayload::Vendor(VendorPayload {
            vendor_id: (0..600u32).map(|i| i as u8).collect(),
        })
    }

    #[test]
    fn test_single_message_roundtrip() {
        let keys = Keys::new();
        let suite = keys.suite();
        let mut rng = StdRng::seed_from_u64(3);
        let mut store = FragmentStore::new();

        let original = message(
            false,
            4,
            vec![
                IkePayload::Notify(NotifyPayload::fragmentation_supported()),
                IkePayload::Delete(DeletePayload::ike()),
            ],
        );
        let packets =
            encode_message(&original, &suite, &FragmentationConfig::default(), &mut rng).unwrap();
        assert_eq!(packets.len(), 1);

        match decode_message(&packets[0], 4, &suite, &mut store) {
            DecodeResult::Ok(decoded) => {
                assert_eq!(decoded.message.payloads, original.payloads);
                assert_eq!(decoded.first_packet, packets[0]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(store.is_retransmitted_request(&packets[0]));
    }

    #[test]
    fn test_wrong_message_id() {
        let keys = Keys::new();
        let suite = keys.suite();
        let mut rng = StdRng::seed_from_u64(3);
        let mut store = FragmentStore::new();

        let packets = encode_message(
            &message(true, 6, vec![IkePayload::Delete(DeletePayload::ike())]),
            &suite,
            &FragmentationConfig::default(),
            &mut rng,
        )
        .unwrap();

        let result = decode_message(&packets[0], 7, &suite, &mut store);
        assert!(matches!(
            result.error(),
            Some(Error::InvalidMessageId {
                expected: 7,
                received: 6
            })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_fragmented_roundtrip_reverse_order() {
        let keys = Keys::new();
        let suite = keys.suite();
        let mut rng = StdRng::seed_from_u64(9);
        let mut store = FragmentStore::new();

        let original = message(true, 2, vec![big_vendor()]);
        let packets =
            encode_message(&original, &suite, &FragmentationConfig::enabled(256), &mut rng)
                .unwrap();
        assert!(packets.len() > 2);
        assert!(packets.iter().all(|p| p.len() <= 256));

        let mut results: Vec<DecodeResult> = packets
            .iter()
            .rev()
            .map(|p| decode_message(p, 2, &suite, &mut store))
            .collect();
        let last = results.pop().unwrap();
        assert!(results.iter().all(|r| matches!(r, DecodeResult::Partial)));

        match last {
            DecodeResult::Ok(decoded) => {
                assert_eq!(decoded.message.payloads, original.payloads);
                assert_eq!(decoded.first_packet, packets[0]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_unfragmented_during_collection_is_discarded() {
        let keys = Keys::new();
        let suite = keys.suite();
        let mut rng = StdRng::seed_from_u64(5);
        let mut store = FragmentStore::new();

        let fragments = encode_message(
            &message(true, 1, vec![big_vendor()]),
            &suite,
            &FragmentationConfig::enabled(300),
            &mut rng,
        )
        .unwrap();
        assert!(matches!(
            decode_message(&fragments[0], 1, &suite, &mut store),
            DecodeResult::Partial
        ));

        let key = FragmentKey {
            is_response: true,
            message_id: 1,
        };
        let before = store.get(&key).cloned();

        let whole = encode_message(
            &message(true, 1, vec![IkePayload::Delete(DeletePayload::ike())]),
            &suite,
            &FragmentationConfig::default(),
            &mut rng,
        )
        .unwrap();
        let result = decode_message(&whole[0], 1, &suite, &mut store);
        assert!(matches!(
            result,
            DecodeResult::UnprotectedError(Error::InvalidState(_))
        ));
        assert_eq!(store.get(&key).cloned(), before);
    }

    #[test]
    fn test_malformed_inner_chain_is_protected_error() {
        let keys = Keys::new();
        let suite = keys.suite();
        let mut rng = StdRng::seed_from_u64(11);
        let mut store = FragmentStore::new();

        let header = message(false, 0, Vec::new()).header;
        // Delete payload whose length field overruns the plaintext
        let packet = protect_with_rng(
            &header,
            PayloadType::D,
            None,
            &[0, 0, 0, 40, 1, 0, 0, 0],
            &suite,
            &mut rng,
        )
        .unwrap();

        match decode_message(&packet, 0, &suite, &mut store) {
            DecodeResult::ProtectedError {
                error,
                first_packet,
            } => {
                assert!(error.is_syntax_error());
                assert_eq!(first_packet, packet);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(store.is_retransmitted_request(&packet));
    }

    #[test]
    fn test_tampered_packet_is_unprotected_error() {
        let keys = Keys::new();
        let suite = keys.suite();
        let mut rng = StdRng::seed_from_u64(13);
        let mut store = FragmentStore::new();

        let mut packets = encode_message(
            &message(false, 0, vec![IkePayload::Delete(DeletePayload::ike())]),
            &suite,
            &FragmentationConfig::default(),
            &mut rng,
        )
        .unwrap();
        let packet = &mut packets[0];
        let middle = packet.len() / 2;
        packet[middle] ^= 0x80;

        let result = decode_message(packet, 0, &suite, &mut store);
        assert!(matches!(
            result,
            DecodeResult::UnprotectedError(Error::SecurityVerification(_))
        ));
        assert!(!store.is_retransmitted_request(packet));
    }

    #[test]
    fn test_plain_message_rejected() {
        let keys = Keys::new();
        let mut store = FragmentStore::new();
        let bytes = message(false, 0, vec![IkePayload::Delete(DeletePayload::ike())])
            .encode()
            .unwrap();

        let result = decode_message(&bytes, 0, &keys.suite(), &mut store);
        assert!(matches!(
            result,
            DecodeResult::UnprotectedError(Error::InvalidSyntax(_))
        ));
    }
}

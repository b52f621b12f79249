//! Fragmentation integration tests
//!
//! Uses a size-transparent cipher so fragment boundaries can be checked
//! exactly.

mod common;

use common::{request, response, XorCipher};
use fynx_ike::config::FragmentationConfig;
use fynx_ike::crypto::{ProtectionSuite, SecretKey};
use fynx_ike::ikev2::message::encode_payload_chain;
use fynx_ike::ikev2::payload::{DeletePayload, VendorPayload};
use fynx_ike::ikev2::{
    decode_message, encode_message, DecodeResult, FragmentKey, FragmentStore, IkeMessage,
    IkePayload, PayloadType, ReassemblyPhase,
};
use fynx_ike::Error;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Vendor payload whose encoded chain is exactly `len` bytes
fn chain_of(len: usize) -> Vec<IkePayload> {
    vec![IkePayload::Vendor(VendorPayload {
        vendor_id: (0..len - 4).map(|i| (i % 251) as u8).collect(),
    })]
}

fn key() -> SecretKey {
    SecretKey::new(vec![0x5c, 0x13, 0xe7, 0x81])
}

fn encode(message: &IkeMessage, suite: &ProtectionSuite<'_>, budget: usize) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(17);
    encode_message(
        message,
        suite,
        &FragmentationConfig::enabled(budget),
        &mut rng,
    )
    .unwrap()
}

fn expect_ok(result: DecodeResult) -> IkeMessage {
    match result {
        DecodeResult::Ok(decoded) => decoded.message,
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_three_fragments_in_any_order() {
    common::init_tracing();
    let cipher = XorCipher::new(4);
    let key = key();
    let suite = ProtectionSuite::aead(&cipher, &key).unwrap();

    let payloads = chain_of(300);
    assert_eq!(encode_payload_chain(&payloads).unwrap().len(), 300);
    let original = request(7, payloads);
    let packets = encode(&original, &suite, 140);
    assert_eq!(packets.len(), 3);

    for (i, packet) in packets.iter().enumerate() {
        assert!(packet.len() <= 140);
        assert_eq!(packet[16], PayloadType::SKF.to_u8());

        let outer = IkeMessage::decode(packet).unwrap();
        match &outer.payloads[..] {
            [IkePayload::SKF(skf)] => {
                assert_eq!(skf.fragment_num as usize, i + 1);
                assert_eq!(skf.total_fragments, 3);
                let expected_next = if i == 0 {
                    PayloadType::V
                } else {
                    PayloadType::None
                };
                assert_eq!(skf.first_inner_payload, expected_next);
            }
            other => panic!("unexpected payloads: {:?}", other),
        }
    }

    let orders = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    for order in orders {
        let mut store = FragmentStore::new();
        assert!(matches!(
            decode_message(&packets[order[0]], 7, &suite, &mut store),
            DecodeResult::Partial
        ));
        assert!(matches!(
            decode_message(&packets[order[1]], 7, &suite, &mut store),
            DecodeResult::Partial
        ));
        let message = expect_ok(decode_message(&packets[order[2]], 7, &suite, &mut store));

        assert_eq!(message.payloads, original.payloads);
        assert!(store.is_empty());
        assert!(store.is_retransmitted_request(&packets[0]));
    }
}

#[test]
fn test_duplicate_fragment_leaves_state_unchanged() {
    let cipher = XorCipher::new(4);
    let key = key();
    let suite = ProtectionSuite::aead(&cipher, &key).unwrap();

    let original = response(4, chain_of(300));
    let packets = encode(&original, &suite, 140);
    let fragment_key = FragmentKey {
        is_response: true,
        message_id: 4,
    };

    let mut store = FragmentStore::new();
    assert!(matches!(
        decode_message(&packets[1], 4, &suite, &mut store),
        DecodeResult::Partial
    ));
    let before = store.get(&fragment_key).cloned().unwrap();
    assert_eq!(before.collected(), 1);

    assert!(matches!(
        decode_message(&packets[1], 4, &suite, &mut store),
        DecodeResult::Partial
    ));
    assert_eq!(store.get(&fragment_key), Some(&before));

    decode_message(&packets[0], 4, &suite, &mut store);
    let message = expect_ok(decode_message(&packets[2], 4, &suite, &mut store));
    assert_eq!(message.payloads, original.payloads);
}

#[test]
fn test_fragment_after_reassembly_is_discarded() {
    let cipher = XorCipher::new(4);
    let key = key();
    let suite = ProtectionSuite::aead(&cipher, &key).unwrap();
    let fragment_key = FragmentKey {
        is_response: true,
        message_id: 4,
    };

    let original = response(4, chain_of(300));
    let packets = encode(&original, &suite, 140);
    let mut store = FragmentStore::new();
    decode_message(&packets[0], 4, &suite, &mut store);
    decode_message(&packets[1], 4, &suite, &mut store);
    expect_ok(decode_message(&packets[2], 4, &suite, &mut store));
    let before = store.get(&fragment_key).cloned().unwrap();
    assert_eq!(before.phase(), ReassemblyPhase::Complete);

    for packet in &packets {
        assert!(matches!(
            decode_message(packet, 4, &suite, &mut store),
            DecodeResult::Partial
        ));
        assert!(!store.is_collecting(&fragment_key));
        assert_eq!(store.get(&fragment_key), Some(&before));
    }

    // Same message resent with a different fragment size
    let resized = encode(&original, &suite, 200);
    assert!(matches!(
        decode_message(&resized[0], 4, &suite, &mut store),
        DecodeResult::Partial
    ));
    assert_eq!(store.get(&fragment_key), Some(&before));

    // An unfragmented retransmission of the same ID still decodes
    let whole = encode(
        &response(4, vec![IkePayload::Delete(DeletePayload::ike())]),
        &suite,
        140,
    );
    let message = expect_ok(decode_message(&whole[0], 4, &suite, &mut store));
    assert_eq!(message.payloads, vec![IkePayload::Delete(DeletePayload::ike())]);
}

#[test]
fn test_abandoned_collection_is_dropped_for_next_message() {
    let cipher = XorCipher::new(4);
    let key = key();
    let suite = ProtectionSuite::aead(&cipher, &key).unwrap();
    let abandoned = FragmentKey {
        is_response: false,
        message_id: 8,
    };

    let mut store = FragmentStore::new();
    let stalled = encode(&request(8, chain_of(300)), &suite, 140);
    decode_message(&stalled[0], 8, &suite, &mut store);
    assert!(store.is_collecting(&abandoned));

    let next = request(9, chain_of(300));
    let packets = encode(&next, &suite, 140);
    decode_message(&packets[1], 9, &suite, &mut store);
    assert!(store.get(&abandoned).is_none());
    assert_eq!(store.len(), 1);

    decode_message(&packets[0], 9, &suite, &mut store);
    let message = expect_ok(decode_message(&packets[2], 9, &suite, &mut store));
    assert_eq!(message.payloads, next.payloads);
    assert!(store.is_empty());

    // Unfragmented messages take the slot over too
    let partial = encode(&request(10, chain_of(300)), &suite, 140);
    decode_message(&partial[0], 10, &suite, &mut store);
    let whole = encode(&request(11, chain_of(40)), &suite, 140);
    expect_ok(decode_message(&whole[0], 11, &suite, &mut store));
    assert!(store
        .get(&FragmentKey {
            is_response: false,
            message_id: 10,
        })
        .is_none());
    assert!(store.is_empty());
}

#[test]
fn test_total_mismatch_restarts_collection() {
    common::init_tracing();
    let cipher = XorCipher::new(4);
    let key = key();
    let suite = ProtectionSuite::aead(&cipher, &key).unwrap();

    let original = request(2, chain_of(300));
    let three = encode(&original, &suite, 140);
    let two = encode(&original, &suite, 200);
    assert_eq!(three.len(), 3);
    assert_eq!(two.len(), 2);

    let fragment_key = FragmentKey {
        is_response: false,
        message_id: 2,
    };
    let mut store = FragmentStore::new();

    decode_message(&three[0], 2, &suite, &mut store);
    decode_message(&three[2], 2, &suite, &mut store);
    assert_eq!(store.get(&fragment_key).unwrap().collected(), 2);

    // Sender changed its fragment size: start over with the new total
    assert!(matches!(
        decode_message(&two[1], 2, &suite, &mut store),
        DecodeResult::Partial
    ));
    let state = store.get(&fragment_key).unwrap();
    assert_eq!(state.total_fragments(), 2);
    assert_eq!(state.collected(), 1);

    let message = expect_ok(decode_message(&two[0], 2, &suite, &mut store));
    assert_eq!(message.payloads, original.payloads);
}

#[test]
fn test_unfragmented_message_during_collection() {
    let cipher = XorCipher::new(4);
    let key = key();
    let suite = ProtectionSuite::aead(&cipher, &key).unwrap();

    let fragmented = encode(&request(6, chain_of(300)), &suite, 140);
    let whole = encode(
        &request(6, vec![IkePayload::Delete(DeletePayload::ike())]),
        &suite,
        140,
    );
    assert_eq!(whole.len(), 1);

    let fragment_key = FragmentKey {
        is_response: false,
        message_id: 6,
    };
    let mut store = FragmentStore::new();
    decode_message(&fragmented[0], 6, &suite, &mut store);
    let before = store.get(&fragment_key).cloned().unwrap();

    assert!(matches!(
        decode_message(&whole[0], 6, &suite, &mut store),
        DecodeResult::UnprotectedError(Error::InvalidState(_))
    ));
    assert_eq!(store.get(&fragment_key), Some(&before));
    assert_eq!(before.phase(), ReassemblyPhase::PartiallyCollected);
}

#[test]
fn test_directions_are_collected_separately() {
    let cipher = XorCipher::new(4);
    let key = key();
    let suite = ProtectionSuite::aead(&cipher, &key).unwrap();

    let req = request(1, chain_of(300));
    let resp = response(1, chain_of(250));
    let req_packets = encode(&req, &suite, 140);
    let resp_packets = encode(&resp, &suite, 140);

    let mut store = FragmentStore::new();
    for packet in &req_packets[..req_packets.len() - 1] {
        decode_message(packet, 1, &suite, &mut store);
    }
    for packet in &resp_packets[..resp_packets.len() - 1] {
        decode_message(packet, 1, &suite, &mut store);
    }
    assert_eq!(store.len(), 2);

    let message = expect_ok(decode_message(
        &resp_packets[resp_packets.len() - 1],
        1,
        &suite,
        &mut store,
    ));
    assert_eq!(message.payloads, resp.payloads);
    assert_eq!(store.len(), 1);

    let message = expect_ok(decode_message(
        &req_packets[req_packets.len() - 1],
        1,
        &suite,
        &mut store,
    ));
    assert_eq!(message.payloads, req.payloads);
    assert!(store.is_empty());
}

#[test]
fn test_small_messages_are_not_fragmented() {
    let cipher = XorCipher::new(4);
    let key = key();
    let suite = ProtectionSuite::aead(&cipher, &key).unwrap();
    let mut rng = StdRng::seed_from_u64(5);

    let small = encode(&request(0, chain_of(40)), &suite, 140);
    assert_eq!(small.len(), 1);
    assert_eq!(small[0][16], PayloadType::SK.to_u8());

    let disabled = encode_message(
        &request(0, chain_of(300)),
        &suite,
        &FragmentationConfig::disabled(),
        &mut rng,
    )
    .unwrap();
    assert_eq!(disabled.len(), 1);
    assert_eq!(disabled[0][16], PayloadType::SK.to_u8());
}

#[test]
fn test_budget_without_room_for_data() {
    let cipher = XorCipher::new(4);
    let key = key();
    let suite = ProtectionSuite::aead(&cipher, &key).unwrap();
    let mut rng = StdRng::seed_from_u64(5);

    let config = FragmentationConfig::enabled(37);
    assert!(config.validate().is_ok());
    assert!(matches!(
        encode_message(&request(0, chain_of(300)), &suite, &config, &mut rng),
        Err(Error::InvalidParameter(_))
    ));
}

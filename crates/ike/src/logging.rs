//! Structured logging for IKEv2 message processing
//!
//! Provides structured, contextual logging using the `tracing` framework.
//! The library never installs a subscriber; applications and tests decide
//! where events go.
//!
//! # Log Levels
//!
//! - **TRACE**: Message sizes, SPI bookkeeping
//! - **DEBUG**: Fragment collection and reassembly
//! - **INFO**: Proposal negotiation outcomes
//! - **WARN**: Discarded or invalid input, unusual but recoverable conditions
//! - **ERROR**: Integrity check failures
//!
//! # Example
//!
//! ```no_run
//! use fynx_ike::logging;
//!
//! // Initialize tracing subscriber (in tests or applications)
//! tracing_subscriber::fmt()
//!     .with_env_filter("fynx_ike=debug")
//!     .init();
//!
//! logging::log_fragment_collected(&[0x01; 8], 3, 1, 4);
//! ```

use std::net::IpAddr;

use tracing::{debug, error, info, trace, warn};

use crate::ikev2::proposal::ProtocolId;
use crate::spi::Spi;

/// Log an encoded outbound message
pub fn log_message_encoded(spi_i: &[u8], message_id: u32, size_bytes: usize) {
    trace!(
        ike_spi_i = %hex::encode(spi_i),
        message_id = message_id,
        size_bytes = size_bytes,
        "IKE message encoded"
    );
}

/// Log a decoded inbound message
pub fn log_message_decoded(spi_i: &[u8], message_id: u32, payload_count: usize) {
    trace!(
        ike_spi_i = %hex::encode(spi_i),
        message_id = message_id,
        payloads = payload_count,
        "IKE message decoded"
    );
}

/// Log critical payloads that could not be understood
pub fn log_unsupported_critical_payloads(payload_types: &[u8]) {
    warn!(
        payload_types = ?payload_types,
        "Unsupported critical payloads in chain"
    );
}

/// Log a failed checksum or AEAD tag verification
pub fn log_integrity_check_failed(spi_i: &[u8], message_id: u32, reason: &str) {
    error!(
        ike_spi_i = %hex::encode(spi_i),
        message_id = message_id,
        reason = reason,
        "Integrity check failed, message dropped"
    );
}

/// Log an unexpected message ID
pub fn log_message_id_mismatch(expected: u32, received: u32, is_response: bool) {
    warn!(
        expected = expected,
        received = received,
        is_response = is_response,
        "Unexpected message ID"
    );
}

/// Log splitting of an oversized message
pub fn log_message_fragmented(message_id: u32, plaintext_len: usize, fragments: usize, budget: usize) {
    debug!(
        message_id = message_id,
        plaintext_len = plaintext_len,
        fragments = fragments,
        fragment_budget = budget,
        "Message split into fragments"
    );
}

/// Log a stored fragment
pub fn log_fragment_collected(spi_i: &[u8], message_id: u32, fragment_num: u16, total: u16) {
    debug!(
        ike_spi_i = %hex::encode(spi_i),
        message_id = message_id,
        fragment_num = fragment_num,
        total_fragments = total,
        "Fragment collected"
    );
}

/// Log a restart of collection after a total-fragments change
pub fn log_fragments_restarted(message_id: u32, old_total: u16, new_total: u16) {
    warn!(
        message_id = message_id,
        old_total = old_total,
        new_total = new_total,
        "Total fragment count changed, discarding collected fragments"
    );
}

/// Log a fragment that was dropped without touching state
pub fn log_fragment_discarded(message_id: u32, fragment_num: u16, reason: &str) {
    warn!(
        message_id = message_id,
        fragment_num = fragment_num,
        reason = reason,
        "Fragment discarded"
    );
}

/// Log a partial collection dropped because a newer message took its slot
pub fn log_collection_abandoned(message_id: u32, collected: usize, total: u16) {
    warn!(
        message_id = message_id,
        collected = collected,
        total_fragments = total,
        "Abandoning incomplete fragment collection"
    );
}

/// Log a complete message arriving while fragments are being collected
pub fn log_unfragmented_during_collection(message_id: u32) {
    warn!(
        message_id = message_id,
        "Unfragmented message received during fragment collection, discarded"
    );
}

/// Log successful reassembly
pub fn log_reassembly_complete(message_id: u32, total: u16, plaintext_len: usize) {
    debug!(
        message_id = message_id,
        total_fragments = total,
        plaintext_len = plaintext_len,
        "Fragments reassembled"
    );
}

/// Log proposal negotiation result
///
/// # Arguments
///
/// * `offered` - Number of proposals offered
/// * `chosen_id` - Chosen proposal number (None if no match)
pub fn log_proposal_negotiation(offered: usize, chosen_id: Option<u8>) {
    match chosen_id {
        Some(id) => {
            info!(
                proposals_offered = offered,
                chosen_proposal = id,
                "Proposal negotiation successful"
            );
        }
        None => {
            warn!(
                proposals_offered = offered,
                "Proposal negotiation failed - no acceptable proposal"
            );
        }
    }
}

/// Log rejection of a chosen proposal
pub fn log_proposal_rejected(proposal_num: u8, reason: &str) {
    warn!(
        proposal_num = proposal_num,
        reason = reason,
        "Chosen proposal rejected"
    );
}

/// Log an SPI reservation
pub fn log_spi_allocated(protocol: ProtocolId, local_address: &IpAddr, spi: Spi) {
    trace!(
        protocol = ?protocol,
        local_address = %local_address,
        spi = %spi,
        "SPI allocated"
    );
}

/// Log an SPI release
pub fn log_spi_released(protocol: ProtocolId, local_address: &IpAddr, spi: Spi) {
    debug!(
        protocol = ?protocol,
        local_address = %local_address,
        spi = %spi,
        "SPI released"
    );
}

/// Log general error
pub fn log_error(context: &str, error: &str) {
    error!(context = context, error = error, "Operation failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_logging_functions() {
        // These tests just verify the functions compile and execute
        // Actual log output would require tracing subscriber setup
        let spi_i = [0x01u8; 8];
        let local = IpAddr::V4(Ipv4Addr::LOCALHOST);

        log_message_encoded(&spi_i, 1, 256);
        log_message_decoded(&spi_i, 1, 4);
        log_unsupported_critical_payloads(&[140, 141]);
        log_integrity_check_failed(&spi_i, 1, "checksum mismatch");
        log_message_id_mismatch(2, 7, false);

        log_message_fragmented(3, 3000, 3, 1280);
        log_fragment_collected(&spi_i, 3, 1, 3);
        log_fragments_restarted(3, 3, 4);
        log_fragment_discarded(3, 2, "duplicate");
        log_unfragmented_during_collection(3);
        log_collection_abandoned(2, 1, 3);
        log_reassembly_complete(3, 4, 3000);

        log_proposal_negotiation(3, Some(1));
        log_proposal_negotiation(3, None);
        log_proposal_rejected(2, "transform not offered");

        log_spi_allocated(ProtocolId::Esp, &local, Spi::Ipsec(0x1234));
        log_spi_released(ProtocolId::Esp, &local, Spi::Ipsec(0x1234));

        log_error("fragment encode", "budget too small");
    }
}

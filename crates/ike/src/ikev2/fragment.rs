//! IKE message fragmentation (RFC 7383)
//!
//! Outbound, [`encode_protected`] splits an oversized plaintext payload chain
//! into SKF messages that each fit the configured budget. Inbound,
//! [`ReassemblyState`] collects verified fragment plaintexts for one message
//! and [`FragmentStore`] keeps one collection per direction for a single IKE
//! SA. A completed collection stays in its slot until a fragment or message
//! with a newer message ID takes the slot over, so late copies of its
//! fragments are recognised and dropped.
//!
//! Two replacement rules apply while collecting:
//!
//! - a fragment announcing a different total count discards everything
//!   collected so far and restarts with the new count
//! - a fragment for an index that is already filled, or arriving once the
//!   message is complete, is dropped and the state stays as it was

use rand::{CryptoRng, RngCore};

use super::constants::{PayloadType, FRAGMENT_HEADER_SIZE, IKE_HEADER_SIZE, PAYLOAD_HEADER_SIZE};
use super::encrypted::{protect_with_rng, protected_message_len};
use super::message::IkeHeader;
use crate::config::FragmentationConfig;
use crate::crypto::ProtectionSuite;
use crate::logging;
use crate::{Error, Result};

/// Collection progress of one fragmented message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyPhase {
    /// No fragment stored yet
    Empty,
    /// Some but not all fragments stored
    PartiallyCollected,
    /// Every fragment stored
    Complete,
}

/// What [`ReassemblyState::add_fragment`] did with a fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// Stored, more fragments outstanding
    Stored,
    /// Previous fragments discarded for a new total count, this one stored
    Restarted,
    /// Stored and the message is now complete
    Completed,
    /// Index already filled; state unchanged
    Duplicate,
    /// Message already complete; state unchanged
    AlreadyComplete,
}

/// Verified fragments of one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassemblyState {
    message_id: u32,
    total_fragments: u16,
    fragments: Vec<Option<Vec<u8>>>,
    first_next_payload: Option<PayloadType>,
    first_packet: Option<Vec<u8>>,
}

impl ReassemblyState {
    /// Create an empty collection for `message_id`
    pub fn new(message_id: u32) -> Self {
        ReassemblyState {
            message_id,
            total_fragments: 0,
            fragments: Vec::new(),
            first_next_payload: None,
            first_packet: None,
        }
    }

    /// Message ID this collection belongs to
    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    /// Total fragment count currently expected (0 when empty)
    pub fn total_fragments(&self) -> u16 {
        self.total_fragments
    }

    /// Number of fragments stored
    pub fn collected(&self) -> usize {
        self.fragments.iter().filter(|f| f.is_some()).count()
    }

    /// Current phase
    pub fn phase(&self) -> ReassemblyPhase {
        match self.collected() {
            0 => ReassemblyPhase::Empty,
            n if n == self.fragments.len() => ReassemblyPhase::Complete,
            _ => ReassemblyPhase::PartiallyCollected,
        }
    }

    /// Check if every fragment has been stored
    pub fn is_complete(&self) -> bool {
        self.phase() == ReassemblyPhase::Complete
    }

    /// First inner payload type, known once fragment 1 has arrived
    pub fn first_next_payload(&self) -> Option<PayloadType> {
        self.first_next_payload
    }

    /// Raw packet of fragment 1, once it has arrived
    pub fn first_packet(&self) -> Option<&[u8]> {
        self.first_packet.as_deref()
    }

    /// Store a verified fragment
    ///
    /// `first_inner_payload` and `packet` are only kept for fragment 1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSyntax`] for a zero or out-of-range fragment
    /// number; the state is left unchanged.
    pub fn add_fragment(
        &mut self,
        fragment_num: u16,
        total_fragments: u16,
        first_inner_payload: PayloadType,
        plaintext: Vec<u8>,
        packet: &[u8],
    ) -> Result<FragmentOutcome> {
        if fragment_num == 0 || total_fragments == 0 || fragment_num > total_fragments {
            return Err(Error::syntax(format!(
                "Invalid fragment {} of {}",
                fragment_num, total_fragments
            )));
        }

        if self.is_complete() {
            logging::log_fragment_discarded(self.message_id, fragment_num, "message already complete");
            return Ok(FragmentOutcome::AlreadyComplete);
        }

        let mut outcome = FragmentOutcome::Stored;
        if total_fragments != self.total_fragments {
            if self.total_fragments != 0 {
                logging::log_fragments_restarted(
                    self.message_id,
                    self.total_fragments,
                    total_fragments,
                );
                outcome = FragmentOutcome::Restarted;
            }
            *self = ReassemblyState {
                total_fragments,
                fragments: vec![None; total_fragments as usize],
                ..ReassemblyState::new(self.message_id)
            };
        }

        let index = (fragment_num - 1) as usize;
        if self.fragments[index].is_some() {
            logging::log_fragment_discarded(self.message_id, fragment_num, "duplicate fragment");
            return Ok(FragmentOutcome::Duplicate);
        }

        self.fragments[index] = Some(plaintext);
        if fragment_num == 1 {
            self.first_next_payload = Some(first_inner_payload);
            self.first_packet = Some(packet.to_vec());
        }

        if self.is_complete() {
            Ok(FragmentOutcome::Completed)
        } else {
            Ok(outcome)
        }
    }

    /// Concatenate all fragment plaintexts in order
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] while fragments are missing.
    pub fn reassemble(&self) -> Result<Vec<u8>> {
        if !self.is_complete() {
            return Err(Error::InvalidState(format!(
                "Reassembly of message {} incomplete: {} of {} fragments",
                self.message_id,
                self.collected(),
                self.total_fragments
            )));
        }

        let mut plaintext = Vec::with_capacity(
            self.fragments.iter().flatten().map(Vec::len).sum::<usize>(),
        );
        for fragment in self.fragments.iter().flatten() {
            plaintext.extend_from_slice(fragment);
        }
        logging::log_reassembly_complete(self.message_id, self.total_fragments, plaintext.len());
        Ok(plaintext)
    }
}

/// Identifies one inbound collection within an IKE SA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    /// Whether the fragments belong to a response
    pub is_response: bool,
    /// Message ID shared by the fragments
    pub message_id: u32,
}

/// Inbound fragment collections of one IKE SA
///
/// Owned by the session and mutated only from its serial receive path.
#[derive(Debug, Default)]
pub struct FragmentStore {
    requests: Option<ReassemblyState>,
    responses: Option<ReassemblyState>,
    last_request_first_packet: Option<Vec<u8>>,
}

impl FragmentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, is_response: bool) -> &Option<ReassemblyState> {
        if is_response {
            &self.responses
        } else {
            &self.requests
        }
    }

    fn slot_mut(&mut self, is_response: bool) -> &mut Option<ReassemblyState> {
        if is_response {
            &mut self.responses
        } else {
            &mut self.requests
        }
    }

    /// Collection for `key`, if the direction's slot holds that message
    pub fn get(&self, key: &FragmentKey) -> Option<&ReassemblyState> {
        self.slot(key.is_response)
            .as_ref()
            .filter(|state| state.message_id() == key.message_id)
    }

    /// Collection for `key`, replacing whatever the direction held for an
    /// older message
    pub fn state_mut(&mut self, key: FragmentKey) -> &mut ReassemblyState {
        self.discard_stale(key);
        self.slot_mut(key.is_response)
            .get_or_insert_with(|| ReassemblyState::new(key.message_id))
    }

    /// Drop the direction's collection if it belongs to another message
    pub fn discard_stale(&mut self, key: FragmentKey) {
        let slot = self.slot_mut(key.is_response);
        if slot.as_ref().map_or(true, |s| s.message_id() == key.message_id) {
            return;
        }
        if let Some(stale) = slot.take() {
            if stale.phase() == ReassemblyPhase::PartiallyCollected {
                logging::log_collection_abandoned(
                    stale.message_id(),
                    stale.collected(),
                    stale.total_fragments(),
                );
            }
        }
    }

    /// Check whether fragments are being collected for `key`
    pub fn is_collecting(&self, key: &FragmentKey) -> bool {
        self.get(key)
            .map(|s| s.phase() == ReassemblyPhase::PartiallyCollected)
            .unwrap_or(false)
    }

    /// Number of collections still in progress
    pub fn len(&self) -> usize {
        [&self.requests, &self.responses]
            .iter()
            .filter(|slot| {
                slot.as_ref()
                    .map(|s| s.phase() == ReassemblyPhase::PartiallyCollected)
                    .unwrap_or(false)
            })
            .count()
    }

    /// True when nothing is being collected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remember the first packet of the last request processed
    pub fn update_last_request_first_packet(&mut self, packet: Vec<u8>) {
        self.last_request_first_packet = Some(packet);
    }

    /// Check whether `packet` repeats the first packet of the last request
    pub fn is_retransmitted_request(&self, packet: &[u8]) -> bool {
        self.last_request_first_packet.as_deref() == Some(packet)
    }
}

/// Largest plaintext slice one fragment can carry within `max_fragment_size`
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] when the budget cannot hold a single
/// byte of plaintext.
pub fn max_fragment_plaintext(suite: &ProtectionSuite<'_>, max_fragment_size: usize) -> Result<usize> {
    let overhead = IKE_HEADER_SIZE + PAYLOAD_HEADER_SIZE + FRAGMENT_HEADER_SIZE + suite.overhead();
    let block_size = suite.cipher().block_size().max(1);

    let available = max_fragment_size.saturating_sub(overhead);
    let max_padded = available - available % block_size;
    // One byte is always taken by the pad length
    match max_padded.checked_sub(1) {
        Some(max) if max > 0 => Ok(max),
        _ => Err(Error::InvalidParameter(format!(
            "Fragment size {} leaves no room for data",
            max_fragment_size
        ))),
    }
}

/// Protect a plaintext payload chain, fragmenting when needed
///
/// Returns a single SK message when fragmentation is disabled or the message
/// fits `config.max_fragment_size`; otherwise one SKF message per contiguous
/// plaintext slice, each independently encrypted, all sharing the header's
/// message ID. Only fragment 1 names `inner_next`; the rest carry NO_NEXT.
pub fn encode_protected<R>(
    header: &IkeHeader,
    inner_next: PayloadType,
    plaintext: &[u8],
    suite: &ProtectionSuite<'_>,
    config: &FragmentationConfig,
    rng: &mut R,
) -> Result<Vec<Vec<u8>>>
where
    R: RngCore + CryptoRng + ?Sized,
{
    if !config.enabled
        || protected_message_len(plaintext.len(), suite, false) <= config.max_fragment_size
    {
        let message = protect_with_rng(header, inner_next, None, plaintext, suite, rng)?;
        return Ok(vec![message]);
    }

    let chunk_size = max_fragment_plaintext(suite, config.max_fragment_size)?;
    let total = (plaintext.len() + chunk_size - 1) / chunk_size;
    let total_fragments = u16::try_from(total)
        .map_err(|_| Error::MessageTooLarge(plaintext.len()))?;

    let mut fragments = Vec::with_capacity(total);
    for (i, chunk) in plaintext.chunks(chunk_size).enumerate() {
        let fragment_num = (i + 1) as u16;
        let next = if fragment_num == 1 {
            inner_next
        } else {
            PayloadType::None
        };

        let mut prefix = [0u8; FRAGMENT_HEADER_SIZE];
        prefix[0..2].copy_from_slice(&fragment_num.to_be_bytes());
        prefix[2..4].copy_from_slice(&total_fragments.to_be_bytes());

        fragments.push(protect_with_rng(header, next, Some(prefix), chunk, suite, rng)?);
    }

    logging::log_message_fragmented(
        header.message_id,
        plaintext.len(),
        fragments.len(),
        config.max_fragment_size,
    );
    Ok(fragments)
}

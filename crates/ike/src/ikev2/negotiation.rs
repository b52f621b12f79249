//! Security Association negotiation (RFC 7296 Section 2.7)
//!
//! Three steps, each pure apart from SPI allocator calls:
//!
//! - [`build_request`] turns locally supported proposal configurations into
//!   an SA payload, reserving SPIs as needed
//! - [`select_proposal`] (responder) picks the first requested proposal we can
//!   satisfy and narrows it to one transform per type
//! - [`validate_response`] (initiator) checks the peer's choice against what
//!   was offered and hands back unused SPIs

use std::net::IpAddr;

use super::payload::SaPayload;
use super::proposal::{
    EncrTransformId, IntegTransformId, Proposal, ProtocolId, Transform, TransformSet,
    TransformType,
};
use crate::config::SaProposalConfig;
use crate::logging;
use crate::spi::{Spi, SpiAllocator, SpiHandle};
use crate::{Error, Result};

const NEGOTIABLE_TYPES: [TransformType; 5] = [
    TransformType::Encr,
    TransformType::Prf,
    TransformType::Integ,
    TransformType::Dh,
    TransformType::Esn,
];

/// Proposals sent in a request, with the SPI reserved for each
#[derive(Debug)]
pub struct OfferedSa {
    payload: SaPayload,
    reservations: Vec<Option<SpiHandle>>,
}

impl OfferedSa {
    /// SA payload to put in the request
    pub fn sa_payload(&self) -> &SaPayload {
        &self.payload
    }

    /// Offered proposals
    pub fn proposals(&self) -> &[Proposal] {
        self.payload.proposals()
    }

    /// SPI reserved for the proposal numbered `proposal_num`
    pub fn reservation(&self, proposal_num: u8) -> Option<&SpiHandle> {
        self.index_of(proposal_num)
            .and_then(|i| self.reservations[i].as_ref())
    }

    /// Return every reserved SPI to `allocator`
    pub fn release_all(self, allocator: &dyn SpiAllocator) {
        for handle in self.reservations.iter().flatten() {
            allocator.release(handle);
        }
    }

    fn index_of(&self, proposal_num: u8) -> Option<usize> {
        self.proposals()
            .iter()
            .position(|p| p.proposal_num == proposal_num)
    }
}

/// Result of a successful negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedSa {
    /// The agreed proposal, one transform per type
    pub proposal: Proposal,
    /// Our SPI for the new SA, if the protocol uses one
    pub local_spi: Option<SpiHandle>,
    /// The peer's SPI for the new SA
    pub remote_spi: Option<Spi>,
}

impl NegotiatedSa {
    /// SA payload carrying the agreed proposal, for a response
    pub fn response_payload(&self) -> SaPayload {
        SaPayload::new(vec![self.proposal.clone()])
    }
}

/// Build the SA payload of a request
///
/// Proposals are numbered from 1 in configuration order. ESP and AH proposals
/// always carry a freshly allocated SPI; IKE proposals carry one only when
/// `is_rekey` is set.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] for an empty or oversized list, and
/// propagates allocator failures after releasing what was already reserved.
pub fn build_request(
    configs: &[SaProposalConfig],
    local_address: IpAddr,
    is_rekey: bool,
    allocator: &dyn SpiAllocator,
) -> Result<OfferedSa> {
    if configs.is_empty() {
        return Err(Error::InvalidParameter("No proposals to offer".into()));
    }
    if configs.len() > u8::MAX as usize {
        return Err(Error::InvalidParameter(format!(
            "Cannot offer {} proposals",
            configs.len()
        )));
    }

    let mut proposals = Vec::with_capacity(configs.len());
    let mut reservations: Vec<Option<SpiHandle>> = Vec::with_capacity(configs.len());

    for (i, config) in configs.iter().enumerate() {
        let mut proposal = config.to_proposal((i + 1) as u8);

        let needs_spi = config.protocol_id() != ProtocolId::Ike || is_rekey;
        let handle = if needs_spi {
            match allocator.allocate(config.protocol_id(), local_address) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    logging::log_error("SPI allocation", &e.to_string());
                    for handle in reservations.iter().flatten() {
                        allocator.release(handle);
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        if let Some(handle) = &handle {
            proposal = proposal.with_spi(handle.spi);
        }
        proposals.push(proposal);
        reservations.push(handle);
    }

    Ok(OfferedSa {
        payload: SaPayload::new(proposals),
        reservations,
    })
}

/// Validate the peer's response to an offered SA (initiator side)
///
/// The chosen proposal must reuse an offered number and protocol, use only
/// supported transforms that were among the offered options, pick at most
/// one transform per type and cover every mandatory type. On success the
/// SPIs of unselected proposals are released; on failure all reserved SPIs
/// are.
///
/// # Errors
///
/// - [`Error::InvalidSyntax`] when the payload does not hold exactly one
///   proposal, its SPI has the wrong size for the protocol, or the SPI
///   presence disagrees with the offer
/// - [`Error::NoValidProposalChosen`] for any other mismatch
pub fn validate_response(
    offered: OfferedSa,
    response: &SaPayload,
    allocator: &dyn SpiAllocator,
) -> Result<NegotiatedSa> {
    match check_response(&offered, response) {
        Ok(index) => {
            let chosen = response.proposals()[0].clone();
            let OfferedSa {
                payload,
                mut reservations,
            } = offered;

            let local_spi = reservations[index].take();
            for handle in reservations.iter().flatten() {
                allocator.release(handle);
            }

            logging::log_proposal_negotiation(payload.proposals().len(), Some(chosen.proposal_num));
            Ok(NegotiatedSa {
                remote_spi: chosen.spi,
                proposal: chosen,
                local_spi,
            })
        }
        Err(e) => {
            offered.release_all(allocator);
            Err(e)
        }
    }
}

/// Index of the offered proposal matching a valid response
fn check_response(offered: &OfferedSa, response: &SaPayload) -> Result<usize> {
    let chosen = match response.proposals() {
        [only] => only,
        other => {
            return Err(Error::syntax(format!(
                "Response SA payload carries {} proposals",
                other.len()
            )))
        }
    };
    let num = chosen.proposal_num;

    let reject = |reason: String| {
        logging::log_proposal_rejected(num, &reason);
        Error::no_proposal(reason)
    };

    let index = offered
        .index_of(num)
        .ok_or_else(|| reject(format!("Proposal number {} was not offered", num)))?;
    let expected = &offered.proposals()[index];

    if chosen.protocol_id != expected.protocol_id {
        return Err(reject(format!(
            "Protocol {:?} does not match offered {:?}",
            chosen.protocol_id, expected.protocol_id
        )));
    }

    if let Some(spi) = chosen.spi {
        if spi.size() != Spi::size_for(chosen.protocol_id) {
            logging::log_proposal_rejected(num, "SPI size does not match protocol");
            return Err(Error::syntax(format!(
                "Proposal {} carries a {}-byte SPI for {:?}",
                num,
                spi.size(),
                chosen.protocol_id
            )));
        }
    }

    if chosen.spi.is_some() != expected.spi.is_some() {
        logging::log_proposal_rejected(num, "SPI presence differs from offer");
        return Err(Error::syntax(format!(
            "Proposal {} SPI presence differs from offer",
            num
        )));
    }

    if let Some(t) = chosen.transforms.iter().find(|t| !t.is_supported()) {
        return Err(reject(format!(
            "Unsupported transform {:?} {}",
            t.transform_type, t.transform_id
        )));
    }

    if let Some(t) = chosen
        .transforms
        .iter()
        .find(|t| !expected.transforms.contains(t))
    {
        return Err(reject(format!(
            "Transform {:?} {} was not offered",
            t.transform_type, t.transform_id
        )));
    }

    if let Some(ty) = NEGOTIABLE_TYPES
        .iter()
        .find(|&&ty| chosen.transforms.of_type(ty).len() > 1)
    {
        return Err(reject(format!("More than one {:?} transform chosen", ty)));
    }

    if let Some(missing) = chosen.missing_mandatory() {
        return Err(reject(format!("No {:?} transform chosen", missing)));
    }

    Ok(index)
}

/// Select a proposal from a request (responder side)
///
/// Requested proposals are tried in order and the first one a local
/// configuration can fully satisfy wins. The answer keeps the request's
/// proposal number and carries a freshly allocated local SPI for ESP/AH, or
/// for IKE when the request carried an SPI (rekey).
///
/// # Errors
///
/// Returns [`Error::NoValidProposalChosen`] when nothing matches, or the
/// allocator's error.
pub fn select_proposal(
    request: &SaPayload,
    local: &[SaProposalConfig],
    local_address: IpAddr,
    allocator: &dyn SpiAllocator,
) -> Result<NegotiatedSa> {
    let offered = request.proposals();

    let selected = offered.iter().find_map(|requested| {
        local
            .iter()
            .find_map(|config| narrow(requested, config))
            .map(|transforms| (requested, transforms))
    });

    let (requested, transforms) = match selected {
        Some(found) => found,
        None => {
            logging::log_proposal_negotiation(offered.len(), None);
            return Err(Error::no_proposal(format!(
                "None of {} requested proposals is acceptable",
                offered.len()
            )));
        }
    };

    let local_spi = if requested.spi.is_some() || requested.protocol_id != ProtocolId::Ike {
        Some(allocator.allocate(requested.protocol_id, local_address)?)
    } else {
        None
    };

    let proposal = Proposal {
        proposal_num: requested.proposal_num,
        protocol_id: requested.protocol_id,
        spi: local_spi.as_ref().map(|h| h.spi),
        transforms,
    };

    logging::log_proposal_negotiation(offered.len(), Some(proposal.proposal_num));
    Ok(NegotiatedSa {
        proposal,
        local_spi,
        remote_spi: requested.spi,
    })
}

/// Pick one transform per requested type from what `config` allows
///
/// A validated config never mixes AEAD and non-AEAD ciphers, so the
/// integrity choice depends only on the class of the chosen cipher.
fn narrow(requested: &Proposal, config: &SaProposalConfig) -> Option<TransformSet> {
    if !requested.transforms.other.is_empty() {
        return None;
    }

    let ours = config.transforms();
    let acceptable = |t: &&Transform| t.is_supported() && ours.contains(t);

    let mut chosen = TransformSet::default();
    for ty in NEGOTIABLE_TYPES {
        let options = requested.transforms.of_type(ty);
        if options.is_empty() {
            continue;
        }

        let pick = if ty == TransformType::Integ {
            let aead = chosen
                .encryption
                .first()
                .and_then(Transform::encr_id)
                .map(EncrTransformId::is_aead)
                .unwrap_or(false);
            let pick = options
                .iter()
                .filter(acceptable)
                .find(|t| (t.integ_id() == Some(IntegTransformId::None)) == aead);

            // An AEAD cipher may go without the NONE integrity option
            if pick.is_none() && aead {
                continue;
            }
            pick
        } else {
            options.iter().find(acceptable)
        };

        chosen.push(pick?.clone());
    }

    let candidate = Proposal {
        proposal_num: requested.proposal_num,
        protocol_id: requested.protocol_id,
        spi: None,
        transforms: chosen,
    };
    (config.allows(&candidate) && candidate.missing_mandatory().is_none())
        .then_some(candidate.transforms)
}

//! Message layer configuration
//!
//! Builder-style configuration for fragmentation and for the locally
//! supported SA proposals the negotiation engine offers and accepts.

use std::net::{IpAddr, Ipv4Addr};

use crate::ikev2::constants::{
    DEFAULT_FRAGMENT_SIZE, FRAGMENT_HEADER_SIZE, IKE_HEADER_SIZE, MAX_IKE_MESSAGE_SIZE,
    PAYLOAD_HEADER_SIZE,
};
use crate::ikev2::proposal::{
    DhTransformId, EncrTransformId, EsnTransformId, IntegTransformId, PrfTransformId, Proposal,
    ProtocolId, Transform, TransformSet,
};
use crate::{Error, Result};

/// IKE message fragmentation (RFC 7383)
///
/// Disabled until the peer has sent IKEV2_FRAGMENTATION_SUPPORTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentationConfig {
    /// Whether oversized encrypted messages may be split
    pub enabled: bool,

    /// Upper bound on the wire size of each fragment, IKE header included
    pub max_fragment_size: usize,
}

impl Default for FragmentationConfig {
    fn default() -> Self {
        FragmentationConfig {
            enabled: false,
            max_fragment_size: DEFAULT_FRAGMENT_SIZE,
        }
    }
}

impl FragmentationConfig {
    /// Smallest budget that still leaves room for fragment headers
    pub const MIN_FRAGMENT_SIZE: usize = IKE_HEADER_SIZE + PAYLOAD_HEADER_SIZE + FRAGMENT_HEADER_SIZE;

    /// Fragmentation enabled with the given budget
    pub fn enabled(max_fragment_size: usize) -> Self {
        FragmentationConfig {
            enabled: true,
            max_fragment_size,
        }
    }

    /// Fragmentation disabled
    pub fn disabled() -> Self {
        FragmentationConfig::default()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_fragment_size <= Self::MIN_FRAGMENT_SIZE {
            return Err(Error::InvalidParameter(format!(
                "max_fragment_size must exceed {} bytes",
                Self::MIN_FRAGMENT_SIZE
            )));
        }
        if self.max_fragment_size > MAX_IKE_MESSAGE_SIZE {
            return Err(Error::InvalidParameter(format!(
                "max_fragment_size must not exceed {} bytes",
                MAX_IKE_MESSAGE_SIZE
            )));
        }
        Ok(())
    }
}

/// One locally supported proposal: a protocol and its transform options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaProposalConfig {
    protocol_id: ProtocolId,
    transforms: TransformSet,
}

impl SaProposalConfig {
    /// Create builder for a proposal of `protocol_id`
    pub fn builder(protocol_id: ProtocolId) -> SaProposalBuilder {
        SaProposalBuilder::new(protocol_id)
    }

    /// Default IKE proposal: AES-GCM-16-128, HMAC-SHA2-256 PRF, group 14
    pub fn default_ike() -> Self {
        SaProposalConfig {
            protocol_id: ProtocolId::Ike,
            transforms: transform_set([
                Transform::encr_with_key_length(EncrTransformId::AesGcm16, 128),
                Transform::prf(PrfTransformId::HmacSha256),
                Transform::dh(DhTransformId::Group14),
            ]),
        }
    }

    /// Default ESP proposal: AES-GCM-16-128, no ESN
    pub fn default_esp() -> Self {
        SaProposalConfig {
            protocol_id: ProtocolId::Esp,
            transforms: transform_set([
                Transform::encr_with_key_length(EncrTransformId::AesGcm16, 128),
                Transform::esn(EsnTransformId::NoEsn),
            ]),
        }
    }

    /// Protocol of this proposal
    pub fn protocol_id(&self) -> ProtocolId {
        self.protocol_id
    }

    /// Transform options
    pub fn transforms(&self) -> &TransformSet {
        &self.transforms
    }

    /// Render as a wire proposal numbered `proposal_num`, without SPI
    pub fn to_proposal(&self, proposal_num: u8) -> Proposal {
        Proposal {
            proposal_num,
            protocol_id: self.protocol_id,
            spi: None,
            transforms: self.transforms.clone(),
        }
    }

    /// Check whether every transform of `proposal` is one of our options
    /// for its type
    pub fn allows(&self, proposal: &Proposal) -> bool {
        proposal.protocol_id == self.protocol_id
            && proposal
                .transforms
                .iter()
                .all(|t| t.is_supported() && self.transforms.contains(t))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.transforms.iter().find(|t| !t.is_supported()) {
            return Err(Error::InvalidParameter(format!(
                "Unsupported transform {:?} {}",
                t.transform_type, t.transform_id
            )));
        }

        let aead = self
            .transforms
            .encryption
            .iter()
            .filter(|t| t.encr_id().map(EncrTransformId::is_aead).unwrap_or(false))
            .count();
        if aead != 0 && aead != self.transforms.encryption.len() {
            return Err(Error::InvalidParameter(
                "AEAD and non-AEAD ciphers must be in separate proposals".into(),
            ));
        }
        if aead != 0
            && self
                .transforms
                .integrity
                .iter()
                .any(|t| t.integ_id() != Some(IntegTransformId::None))
        {
            return Err(Error::InvalidParameter(
                "AEAD ciphers must not be combined with an integrity algorithm".into(),
            ));
        }

        if let Some(missing) = self.to_proposal(1).missing_mandatory() {
            return Err(Error::InvalidParameter(format!(
                "{:?} proposal lacks a {:?} transform",
                self.protocol_id, missing
            )));
        }
        Ok(())
    }
}

fn transform_set<const N: usize>(transforms: [Transform; N]) -> TransformSet {
    let mut set = TransformSet::default();
    for t in transforms {
        set.push(t);
    }
    set
}

/// Builder for SaProposalConfig
#[derive(Debug)]
pub struct SaProposalBuilder {
    protocol_id: ProtocolId,
    transforms: TransformSet,
}

impl SaProposalBuilder {
    /// Create new proposal builder
    pub fn new(protocol_id: ProtocolId) -> Self {
        SaProposalBuilder {
            protocol_id,
            transforms: TransformSet::default(),
        }
    }

    /// Add an encryption algorithm; `key_bits` for variable-length ciphers
    pub fn with_encryption(mut self, id: EncrTransformId, key_bits: Option<u16>) -> Self {
        self.transforms.push(match key_bits {
            Some(bits) => Transform::encr_with_key_length(id, bits),
            None => Transform::encr(id),
        });
        self
    }

    /// Add a PRF
    pub fn with_prf(mut self, id: PrfTransformId) -> Self {
        self.transforms.push(Transform::prf(id));
        self
    }

    /// Add an integrity algorithm
    pub fn with_integrity(mut self, id: IntegTransformId) -> Self {
        self.transforms.push(Transform::integ(id));
        self
    }

    /// Add a Diffie-Hellman group
    pub fn with_dh_group(mut self, id: DhTransformId) -> Self {
        self.transforms.push(Transform::dh(id));
        self
    }

    /// Add an ESN option
    pub fn with_esn(mut self, id: EsnTransformId) -> Self {
        self.transforms.push(Transform::esn(id));
        self
    }

    /// Add a prebuilt transform
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Build SaProposalConfig with validation
    pub fn build(self) -> Result<SaProposalConfig> {
        let config = SaProposalConfig {
            protocol_id: self.protocol_id,
            transforms: self.transforms,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration of the message layer of one IKE session
#[derive(Clone, Debug)]
pub struct MessageConfig {
    /// Local address SPIs are allocated under
    pub local_address: IpAddr,

    /// Fragmentation settings
    pub fragmentation: FragmentationConfig,

    /// IKE SA proposals in preference order
    pub ike_proposals: Vec<SaProposalConfig>,

    /// Child SA proposals in preference order
    pub child_proposals: Vec<SaProposalConfig>,
}

impl MessageConfig {
    /// Create builder for message configuration
    pub fn builder() -> MessageConfigBuilder {
        MessageConfigBuilder::new()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.fragmentation.validate()?;

        if self.ike_proposals.is_empty() {
            return Err(Error::InvalidParameter(
                "At least one IKE proposal required".into(),
            ));
        }
        if self.ike_proposals.len() > u8::MAX as usize
            || self.child_proposals.len() > u8::MAX as usize
        {
            return Err(Error::InvalidParameter(
                "At most 255 proposals can be offered".into(),
            ));
        }
        if self
            .ike_proposals
            .iter()
            .any(|p| p.protocol_id() != ProtocolId::Ike)
        {
            return Err(Error::InvalidParameter(
                "IKE proposals must use protocol IKE".into(),
            ));
        }
        if self
            .child_proposals
            .iter()
            .any(|p| p.protocol_id() == ProtocolId::Ike)
        {
            return Err(Error::InvalidParameter(
                "Child proposals must use ESP or AH".into(),
            ));
        }

        for proposal in self.ike_proposals.iter().chain(&self.child_proposals) {
            proposal.validate()?;
        }
        Ok(())
    }
}

/// Builder for MessageConfig
#[derive(Default)]
pub struct MessageConfigBuilder {
    local_address: Option<IpAddr>,
    fragmentation: Option<FragmentationConfig>,
    ike_proposals: Option<Vec<SaProposalConfig>>,
    child_proposals: Option<Vec<SaProposalConfig>>,
}

impl MessageConfigBuilder {
    /// Create new message config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set local address
    pub fn with_local_address(mut self, address: IpAddr) -> Self {
        self.local_address = Some(address);
        self
    }

    /// Set fragmentation settings
    pub fn with_fragmentation(mut self, config: FragmentationConfig) -> Self {
        self.fragmentation = Some(config);
        self
    }

    /// Set IKE proposals
    pub fn with_ike_proposals(mut self, proposals: Vec<SaProposalConfig>) -> Self {
        self.ike_proposals = Some(proposals);
        self
    }

    /// Set child SA proposals
    pub fn with_child_proposals(mut self, proposals: Vec<SaProposalConfig>) -> Self {
        self.child_proposals = Some(proposals);
        self
    }

    /// Build MessageConfig with validation
    pub fn build(self) -> Result<MessageConfig> {
        let config = MessageConfig {
            local_address: self
                .local_address
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            fragmentation: self.fragmentation.unwrap_or_default(),
            ike_proposals: self
                .ike_proposals
                .unwrap_or_else(|| vec![SaProposalConfig::default_ike()]),
            child_proposals: self
                .child_proposals
                .unwrap_or_else(|| vec![SaProposalConfig::default_esp()]),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ikev2::proposal::TransformType;

    #[test]
    fn test_message_config_defaults() {
        let config = MessageConfig::builder()
            .build()
            .expect("Failed to build message config");

        assert!(!config.fragmentation.enabled);
        assert_eq!(config.fragmentation.max_fragment_size, 1280);
        assert_eq!(config.ike_proposals, vec![SaProposalConfig::default_ike()]);
        assert_eq!(config.child_proposals, vec![SaProposalConfig::default_esp()]);
    }

    #[test]
    fn test_fragmentation_validation() {
        assert!(FragmentationConfig::enabled(1280).validate().is_ok());
        assert!(FragmentationConfig::enabled(36).validate().is_err());
        assert!(FragmentationConfig::enabled(70000).validate().is_err());

        let result = MessageConfig::builder()
            .with_fragmentation(FragmentationConfig::enabled(20))
            .build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_proposal_builder() {
        let config = SaProposalConfig::builder(ProtocolId::Ike)
            .with_encryption(EncrTransformId::AesCbc, Some(256))
            .with_encryption(EncrTransformId::AesCbc, Some(128))
            .with_prf(PrfTransformId::HmacSha256)
            .with_integrity(IntegTransformId::HmacSha256_128)
            .with_dh_group(DhTransformId::Group14)
            .build()
            .expect("Failed to build proposal");

        assert_eq!(config.transforms().encryption.len(), 2);
        let proposal = config.to_proposal(3);
        assert_eq!(proposal.proposal_num, 3);
        assert_eq!(proposal.spi, None);
        assert!(config.allows(&proposal));
    }

    #[test]
    fn test_proposal_missing_mandatory() {
        // Non-AEAD IKE proposal without integrity
        let result = SaProposalConfig::builder(ProtocolId::Ike)
            .with_encryption(EncrTransformId::AesCbc, Some(128))
            .with_prf(PrfTransformId::HmacSha256)
            .with_dh_group(DhTransformId::Group14)
            .build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));

        // AH needs integrity only
        let result = SaProposalConfig::builder(ProtocolId::Ah)
            .with_integrity(IntegTransformId::HmacSha256_128)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_aead_with_integrity_rejected() {
        let result = SaProposalConfig::builder(ProtocolId::Esp)
            .with_encryption(EncrTransformId::AesGcm16, Some(128))
            .with_integrity(IntegTransformId::HmacSha256_128)
            .build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));

        let result = SaProposalConfig::builder(ProtocolId::Esp)
            .with_encryption(EncrTransformId::AesGcm16, Some(128))
            .with_encryption(EncrTransformId::AesCbc, Some(128))
            .with_integrity(IntegTransformId::HmacSha256_128)
            .build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_unsupported_transform_rejected() {
        // AES-CBC needs a key length
        let result = SaProposalConfig::builder(ProtocolId::Esp)
            .with_encryption(EncrTransformId::AesCbc, None)
            .with_integrity(IntegTransformId::HmacSha256_128)
            .build();
        assert!(result.is_err());

        let result = SaProposalConfig::builder(ProtocolId::Esp)
            .with_transform(Transform::new(TransformType::Unknown(9), 1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_protocol_placement() {
        let result = MessageConfig::builder()
            .with_ike_proposals(vec![SaProposalConfig::default_esp()])
            .build();
        assert!(result.is_err());

        let result = MessageConfig::builder()
            .with_child_proposals(vec![SaProposalConfig::default_ike()])
            .build();
        assert!(result.is_err());

        let result = MessageConfig::builder()
            .with_ike_proposals(Vec::new())
            .build();
        assert!(result.is_err());
    }
}

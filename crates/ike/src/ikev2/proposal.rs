//! IKEv2 Proposal and Transform structures
//!
//! Implements the SA payload substructures defined in RFC 7296 Section 3.3.
//!
//! # Structure
//!
//! ```text
//! SA Payload
//!   └── Proposal(s)
//!         └── Transform(s)
//!               └── Attribute(s)
//! ```
//!
//! Transforms that this implementation does not recognize (unknown type,
//! unknown ID, or an unexpected attribute combination) are still decoded;
//! they only report `is_supported() == false` so that negotiation can skip
//! them without failing the whole payload.

use super::wire::{read_bytes, read_u16, read_u32, read_u64, read_u8, u16_field, u8_field};
use crate::spi::Spi;
use crate::{Error, Result};

/// Transform Type (RFC 7296 Section 3.3.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformType {
    /// Encryption Algorithm (ENCR)
    Encr,
    /// Pseudo-random Function (PRF)
    Prf,
    /// Integrity Algorithm (INTEG)
    Integ,
    /// Diffie-Hellman Group (D-H)
    Dh,
    /// Extended Sequence Numbers (ESN)
    Esn,
    /// Any other transform type value
    Unknown(u8),
}

impl TransformType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => TransformType::Encr,
            2 => TransformType::Prf,
            3 => TransformType::Integ,
            4 => TransformType::Dh,
            5 => TransformType::Esn,
            other => TransformType::Unknown(other),
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        match self {
            TransformType::Encr => 1,
            TransformType::Prf => 2,
            TransformType::Integ => 3,
            TransformType::Dh => 4,
            TransformType::Esn => 5,
            TransformType::Unknown(value) => value,
        }
    }
}

/// Transform ID for Encryption (ENCR) algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EncrTransformId {
    /// 3DES-CBC
    Des3 = 3,
    /// AES-CBC (key length attribute required)
    AesCbc = 12,
    /// AES-CTR (key length attribute required)
    AesCtr = 13,
    /// AES-GCM with 8-byte ICV
    AesGcm8 = 18,
    /// AES-GCM with 12-byte ICV
    AesGcm12 = 19,
    /// AES-GCM with 16-byte ICV
    AesGcm16 = 20,
    /// ChaCha20-Poly1305
    ChaCha20Poly1305 = 28,
}

impl EncrTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            3 => Some(EncrTransformId::Des3),
            12 => Some(EncrTransformId::AesCbc),
            13 => Some(EncrTransformId::AesCtr),
            18 => Some(EncrTransformId::AesGcm8),
            19 => Some(EncrTransformId::AesGcm12),
            20 => Some(EncrTransformId::AesGcm16),
            28 => Some(EncrTransformId::ChaCha20Poly1305),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Check if this is an AEAD cipher
    pub fn is_aead(self) -> bool {
        matches!(
            self,
            EncrTransformId::AesGcm8
                | EncrTransformId::AesGcm12
                | EncrTransformId::AesGcm16
                | EncrTransformId::ChaCha20Poly1305
        )
    }

    /// Variable key length ciphers must carry a Key Length attribute
    pub fn requires_key_length(self) -> bool {
        !matches!(
            self,
            EncrTransformId::Des3 | EncrTransformId::ChaCha20Poly1305
        )
    }
}

/// Transform ID for PRF algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PrfTransformId {
    /// HMAC-MD5
    HmacMd5 = 1,
    /// HMAC-SHA1
    HmacSha1 = 2,
    /// AES128-XCBC
    AesXcbc = 4,
    /// HMAC-SHA2-256
    HmacSha256 = 5,
    /// HMAC-SHA2-384
    HmacSha384 = 6,
    /// HMAC-SHA2-512
    HmacSha512 = 7,
    /// AES128-CMAC
    AesCmac = 8,
}

impl PrfTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(PrfTransformId::HmacMd5),
            2 => Some(PrfTransformId::HmacSha1),
            4 => Some(PrfTransformId::AesXcbc),
            5 => Some(PrfTransformId::HmacSha256),
            6 => Some(PrfTransformId::HmacSha384),
            7 => Some(PrfTransformId::HmacSha512),
            8 => Some(PrfTransformId::AesCmac),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Transform ID for Integrity algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum IntegTransformId {
    /// NONE (only meaningful next to an AEAD cipher)
    None = 0,
    /// HMAC-MD5-96
    HmacMd5_96 = 1,
    /// HMAC-SHA1-96
    HmacSha1_96 = 2,
    /// AES-XCBC-96
    AesXcbc96 = 5,
    /// AES-CMAC-96
    AesCmac96 = 8,
    /// HMAC-SHA2-256-128 (128-bit ICV)
    HmacSha256_128 = 12,
    /// HMAC-SHA2-384-192 (192-bit ICV)
    HmacSha384_192 = 13,
    /// HMAC-SHA2-512-256 (256-bit ICV)
    HmacSha512_256 = 14,
}

impl IntegTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(IntegTransformId::None),
            1 => Some(IntegTransformId::HmacMd5_96),
            2 => Some(IntegTransformId::HmacSha1_96),
            5 => Some(IntegTransformId::AesXcbc96),
            8 => Some(IntegTransformId::AesCmac96),
            12 => Some(IntegTransformId::HmacSha256_128),
            13 => Some(IntegTransformId::HmacSha384_192),
            14 => Some(IntegTransformId::HmacSha512_256),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Transform ID for Diffie-Hellman groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DhTransformId {
    /// No key exchange (child SAs without PFS)
    None = 0,
    /// 1024-bit MODP Group
    Group2 = 2,
    /// 1536-bit MODP Group
    Group5 = 5,
    /// 2048-bit MODP Group
    Group14 = 14,
    /// 3072-bit MODP Group
    Group15 = 15,
    /// 4096-bit MODP Group
    Group16 = 16,
    /// 256-bit random ECP group
    Group19 = 19,
    /// 384-bit random ECP group
    Group20 = 20,
    /// 521-bit random ECP group
    Group21 = 21,
    /// Curve25519
    Group31 = 31,
}

impl DhTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(DhTransformId::None),
            2 => Some(DhTransformId::Group2),
            5 => Some(DhTransformId::Group5),
            14 => Some(DhTransformId::Group14),
            15 => Some(DhTransformId::Group15),
            16 => Some(DhTransformId::Group16),
            19 => Some(DhTransformId::Group19),
            20 => Some(DhTransformId::Group20),
            21 => Some(DhTransformId::Group21),
            31 => Some(DhTransformId::Group31),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Transform ID for Extended Sequence Numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EsnTransformId {
    /// 32-bit sequence numbers
    NoEsn = 0,
    /// 64-bit extended sequence numbers
    Esn = 1,
}

impl EsnTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(EsnTransformId::NoEsn),
            1 => Some(EsnTransformId::Esn),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Key Length attribute type (RFC 7296 Section 3.3.5)
pub const ATTR_KEY_LENGTH: u16 = 14;

/// Attribute Format bit: set for the fixed 2-byte TV form
const ATTR_FORMAT_TV: u16 = 0x8000;

/// Transform attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransformAttribute {
    /// Key length in bits (TV format)
    KeyLength(u16),
    /// Any other attribute, kept verbatim
    Unrecognized {
        /// Attribute type without the format bit
        attr_type: u16,
        /// True when encoded in TV format
        short_format: bool,
        /// Attribute value
        value: Vec<u8>,
    },
}

impl TransformAttribute {
    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            TransformAttribute::KeyLength(bits) => {
                out.extend_from_slice(&(ATTR_FORMAT_TV | ATTR_KEY_LENGTH).to_be_bytes());
                out.extend_from_slice(&bits.to_be_bytes());
            }
            TransformAttribute::Unrecognized {
                attr_type,
                short_format: true,
                value,
            } => {
                out.extend_from_slice(&(ATTR_FORMAT_TV | attr_type).to_be_bytes());
                let mut tv = [0u8; 2];
                let n = value.len().min(2);
                tv[2 - n..].copy_from_slice(&value[value.len() - n..]);
                out.extend_from_slice(&tv);
            }
            TransformAttribute::Unrecognized {
                attr_type, value, ..
            } => {
                out.extend_from_slice(&(attr_type & !ATTR_FORMAT_TV).to_be_bytes());
                out.extend_from_slice(&u16_field(value.len(), "attribute length")?.to_be_bytes());
                out.extend_from_slice(value);
            }
        }
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        match self {
            TransformAttribute::Unrecognized {
                short_format: false,
                value,
                ..
            } => 4 + value.len(),
            _ => 4,
        }
    }

    fn decode_all(data: &[u8]) -> Result<Vec<TransformAttribute>> {
        let mut attributes = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let raw_type = read_u16(data, &mut offset)?;
            let attr_type = raw_type & !ATTR_FORMAT_TV;
            if raw_type & ATTR_FORMAT_TV != 0 {
                let value = read_u16(data, &mut offset)?;
                if attr_type == ATTR_KEY_LENGTH {
                    attributes.push(TransformAttribute::KeyLength(value));
                } else {
                    attributes.push(TransformAttribute::Unrecognized {
                        attr_type,
                        short_format: true,
                        value: value.to_be_bytes().to_vec(),
                    });
                }
            } else {
                let len = read_u16(data, &mut offset)? as usize;
                let value = read_bytes(data, &mut offset, len)?;
                // A TLV-encoded key length is malformed and stays unrecognized
                attributes.push(TransformAttribute::Unrecognized {
                    attr_type,
                    short_format: false,
                    value: value.to_vec(),
                });
            }
        }
        Ok(attributes)
    }
}

/// IKE Transform
///
/// Represents a single cryptographic algorithm choice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transform {
    /// Transform type
    pub transform_type: TransformType,
    /// Transform ID
    pub transform_id: u16,
    /// Attributes (e.g., key length)
    pub attributes: Vec<TransformAttribute>,
}

impl Transform {
    /// Transform substructure header size
    pub const HEADER_SIZE: usize = 8;

    /// Create new transform
    pub fn new(transform_type: TransformType, transform_id: u16) -> Self {
        Transform {
            transform_type,
            transform_id,
            attributes: Vec::new(),
        }
    }

    /// Create encryption transform without a key length
    pub fn encr(id: EncrTransformId) -> Self {
        Transform::new(TransformType::Encr, id.to_u16())
    }

    /// Create encryption transform with a key length in bits
    pub fn encr_with_key_length(id: EncrTransformId, key_bits: u16) -> Self {
        Transform::encr(id).with_attribute(TransformAttribute::KeyLength(key_bits))
    }

    /// Create PRF transform
    pub fn prf(id: PrfTransformId) -> Self {
        Transform::new(TransformType::Prf, id.to_u16())
    }

    /// Create integrity transform
    pub fn integ(id: IntegTransformId) -> Self {
        Transform::new(TransformType::Integ, id.to_u16())
    }

    /// Create DH group transform
    pub fn dh(id: DhTransformId) -> Self {
        Transform::new(TransformType::Dh, id.to_u16())
    }

    /// Create ESN transform
    pub fn esn(id: EsnTransformId) -> Self {
        Transform::new(TransformType::Esn, id.to_u16())
    }

    /// Add attribute
    pub fn with_attribute(mut self, attribute: TransformAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Key length attribute value, if present
    pub fn key_length(&self) -> Option<u16> {
        self.attributes.iter().find_map(|a| match a {
            TransformAttribute::KeyLength(bits) => Some(*bits),
            _ => None,
        })
    }

    /// Encryption transform ID, if this is a recognized ENCR transform
    pub fn encr_id(&self) -> Option<EncrTransformId> {
        match self.transform_type {
            TransformType::Encr => EncrTransformId::from_u16(self.transform_id),
            _ => None,
        }
    }

    /// Integrity transform ID, if this is a recognized INTEG transform
    pub fn integ_id(&self) -> Option<IntegTransformId> {
        match self.transform_type {
            TransformType::Integ => IntegTransformId::from_u16(self.transform_id),
            _ => None,
        }
    }

    /// Check whether this transform's type, ID and attributes are all understood
    pub fn is_supported(&self) -> bool {
        let has_unrecognized = self
            .attributes
            .iter()
            .any(|a| matches!(a, TransformAttribute::Unrecognized { .. }));
        let key_length_count = self
            .attributes
            .iter()
            .filter(|a| matches!(a, TransformAttribute::KeyLength(_)))
            .count();
        if has_unrecognized || key_length_count > 1 {
            return false;
        }

        let key_length = self.key_length();
        match self.transform_type {
            TransformType::Encr => match EncrTransformId::from_u16(self.transform_id) {
                Some(id) if id.requires_key_length() => {
                    matches!(key_length, Some(128) | Some(192) | Some(256))
                }
                Some(_) => key_length.is_none(),
                None => false,
            },
            TransformType::Prf => {
                PrfTransformId::from_u16(self.transform_id).is_some() && key_length.is_none()
            }
            TransformType::Integ => {
                IntegTransformId::from_u16(self.transform_id).is_some() && key_length.is_none()
            }
            TransformType::Dh => {
                DhTransformId::from_u16(self.transform_id).is_some() && key_length.is_none()
            }
            TransformType::Esn => {
                EsnTransformId::from_u16(self.transform_id).is_some() && key_length.is_none()
            }
            TransformType::Unknown(_) => false,
        }
    }

    /// Encoded size in bytes including the substructure header
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE
            + self
                .attributes
                .iter()
                .map(TransformAttribute::encoded_len)
                .sum::<usize>()
    }

    /// Serialize transform substructure (RFC 7296 Section 3.3.2)
    ///
    /// ```text
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// | Last Substruc |   RESERVED    |        Transform Length       |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// |Transform Type |   RESERVED    |          Transform ID         |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// ~                      Transform Attributes                     ~
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// ```
    pub fn to_bytes(&self, is_last: bool) -> Result<Vec<u8>> {
        let length = u16_field(self.encoded_len(), "transform length")?;
        let mut bytes = Vec::with_capacity(self.encoded_len());

        bytes.push(if is_last { 0 } else { 3 });
        bytes.push(0);
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.push(self.transform_type.to_u8());
        bytes.push(0);
        bytes.extend_from_slice(&self.transform_id.to_be_bytes());

        for attribute in &self.attributes {
            attribute.encode(&mut bytes)?;
        }

        Ok(bytes)
    }

    /// Parse one transform substructure
    ///
    /// Returns the transform, whether it was flagged as the last one, and the
    /// number of bytes consumed.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, bool, usize)> {
        let mut offset = 0;

        let last_substruc = read_u8(data, &mut offset)?;
        let is_last = match last_substruc {
            0 => true,
            3 => false,
            other => {
                return Err(Error::syntax(format!(
                    "Invalid transform last-substructure value: {}",
                    other
                )))
            }
        };
        let _reserved = read_u8(data, &mut offset)?;

        let transform_len = read_u16(data, &mut offset)? as usize;
        if transform_len < Self::HEADER_SIZE {
            return Err(Error::syntax(format!(
                "Transform length {} shorter than header",
                transform_len
            )));
        }
        if transform_len > data.len() {
            return Err(Error::BufferTooShort {
                required: transform_len,
                available: data.len(),
            });
        }

        let transform_type = TransformType::from_u8(read_u8(data, &mut offset)?);
        let _reserved = read_u8(data, &mut offset)?;
        let transform_id = read_u16(data, &mut offset)?;
        let attributes = TransformAttribute::decode_all(&data[Self::HEADER_SIZE..transform_len])?;

        Ok((
            Transform {
                transform_type,
                transform_id,
                attributes,
            },
            is_last,
            transform_len,
        ))
    }
}

/// Protocol ID for proposals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolId {
    /// IKE SA
    Ike = 1,
    /// AH (Authentication Header)
    Ah = 2,
    /// ESP (Encapsulating Security Payload)
    Esp = 3,
}

impl ProtocolId {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ProtocolId::Ike),
            2 => Some(ProtocolId::Ah),
            3 => Some(ProtocolId::Esp),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Transforms of one proposal, grouped by category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformSet {
    /// ENCR options
    pub encryption: Vec<Transform>,
    /// PRF options
    pub prf: Vec<Transform>,
    /// INTEG options
    pub integrity: Vec<Transform>,
    /// D-H options
    pub dh: Vec<Transform>,
    /// ESN options
    pub esn: Vec<Transform>,
    /// Transforms of unknown type
    pub other: Vec<Transform>,
}

impl TransformSet {
    /// Add a transform to its category
    pub fn push(&mut self, transform: Transform) {
        match transform.transform_type {
            TransformType::Encr => self.encryption.push(transform),
            TransformType::Prf => self.prf.push(transform),
            TransformType::Integ => self.integrity.push(transform),
            TransformType::Dh => self.dh.push(transform),
            TransformType::Esn => self.esn.push(transform),
            TransformType::Unknown(_) => self.other.push(transform),
        }
    }

    /// Options for one transform type
    pub fn of_type(&self, transform_type: TransformType) -> &[Transform] {
        match transform_type {
            TransformType::Encr => &self.encryption,
            TransformType::Prf => &self.prf,
            TransformType::Integ => &self.integrity,
            TransformType::Dh => &self.dh,
            TransformType::Esn => &self.esn,
            TransformType::Unknown(_) => &self.other,
        }
    }

    /// All transforms in wire order
    pub fn iter(&self) -> impl Iterator<Item = &Transform> {
        self.encryption
            .iter()
            .chain(&self.prf)
            .chain(&self.integrity)
            .chain(&self.dh)
            .chain(&self.esn)
            .chain(&self.other)
    }

    /// Total number of transforms
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// True when no transform is present
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether an identical transform is among the options
    pub fn contains(&self, transform: &Transform) -> bool {
        self.of_type(transform.transform_type).contains(transform)
    }
}

/// IKE Proposal
///
/// Represents a single proposal containing one or more transforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Proposal number (1-based)
    pub proposal_num: u8,
    /// Protocol ID (IKE, ESP, AH)
    pub protocol_id: ProtocolId,
    /// SPI; absent for the IKE proposal of an initial exchange
    pub spi: Option<Spi>,
    /// Transforms grouped by type
    pub transforms: TransformSet,
}

impl Proposal {
    /// Proposal substructure header size
    pub const HEADER_SIZE: usize = 8;

    /// Create new proposal
    pub fn new(proposal_num: u8, protocol_id: ProtocolId) -> Self {
        Proposal {
            proposal_num,
            protocol_id,
            spi: None,
            transforms: TransformSet::default(),
        }
    }

    /// Add transform to proposal
    pub fn add_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Set SPI
    pub fn with_spi(mut self, spi: Spi) -> Self {
        self.spi = Some(spi);
        self
    }

    /// Get first transform of a type
    pub fn get_transform(&self, transform_type: TransformType) -> Option<&Transform> {
        self.transforms.of_type(transform_type).first()
    }

    /// True when every offered encryption transform is an AEAD cipher
    pub fn is_aead(&self) -> bool {
        !self.transforms.encryption.is_empty()
            && self
                .transforms
                .encryption
                .iter()
                .all(|t| t.encr_id().map(EncrTransformId::is_aead).unwrap_or(false))
    }

    /// First mandatory transform category this proposal lacks
    ///
    /// IKE needs ENCR, PRF and D-H, plus INTEG unless the cipher is AEAD.
    /// ESP needs ENCR, plus INTEG unless AEAD. AH needs INTEG.
    pub fn missing_mandatory(&self) -> Option<TransformType> {
        let t = &self.transforms;
        let integ_needed = !self.is_aead();
        let has_integ = t
            .integrity
            .iter()
            .any(|i| i.integ_id() != Some(IntegTransformId::None));

        match self.protocol_id {
            ProtocolId::Ike => {
                if t.encryption.is_empty() {
                    Some(TransformType::Encr)
                } else if t.prf.is_empty() {
                    Some(TransformType::Prf)
                } else if integ_needed && !has_integ {
                    Some(TransformType::Integ)
                } else if t.dh.is_empty() {
                    Some(TransformType::Dh)
                } else {
                    None
                }
            }
            ProtocolId::Esp => {
                if t.encryption.is_empty() {
                    Some(TransformType::Encr)
                } else if integ_needed && !has_integ {
                    Some(TransformType::Integ)
                } else {
                    None
                }
            }
            ProtocolId::Ah => {
                if has_integ {
                    None
                } else {
                    Some(TransformType::Integ)
                }
            }
        }
    }

    /// Encoded size in bytes including the substructure header
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE
            + self.spi.map(Spi::size).unwrap_or(0)
            + self.transforms.iter().map(Transform::encoded_len).sum::<usize>()
    }

    /// Serialize proposal substructure (RFC 7296 Section 3.3.1)
    ///
    /// ```text
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// | Last Substruc |   RESERVED    |         Proposal Length       |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// | Proposal Num  |  Protocol ID  |    SPI Size   |Num  Transforms|
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// ~                        SPI (variable)                         ~
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// ~                        <Transforms>                           ~
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// ```
    pub fn to_bytes(&self, is_last: bool) -> Result<Vec<u8>> {
        let length = u16_field(self.encoded_len(), "proposal length")?;
        let spi = self.spi.map(Spi::to_bytes).unwrap_or_default();
        let transform_count = self.transforms.len();
        let mut bytes = Vec::with_capacity(self.encoded_len());

        bytes.push(if is_last { 0 } else { 2 });
        bytes.push(0);
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.push(self.proposal_num);
        bytes.push(self.protocol_id.to_u8());
        bytes.push(u8_field(spi.len(), "SPI size")?);
        bytes.push(u8_field(transform_count, "transform count")?);
        bytes.extend_from_slice(&spi);

        for (i, transform) in self.transforms.iter().enumerate() {
            bytes.extend_from_slice(&transform.to_bytes(i + 1 == transform_count)?);
        }

        Ok(bytes)
    }

    /// Parse one proposal substructure
    ///
    /// Returns the proposal, whether it was flagged as the last one, and the
    /// number of bytes consumed.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, bool, usize)> {
        let mut offset = 0;

        let is_last = match read_u8(data, &mut offset)? {
            0 => true,
            2 => false,
            other => {
                return Err(Error::syntax(format!(
                    "Invalid proposal last-substructure value: {}",
                    other
                )))
            }
        };
        let _reserved = read_u8(data, &mut offset)?;

        let proposal_len = read_u16(data, &mut offset)? as usize;
        if proposal_len < Self::HEADER_SIZE {
            return Err(Error::syntax(format!(
                "Proposal length {} shorter than header",
                proposal_len
            )));
        }
        if proposal_len > data.len() {
            return Err(Error::BufferTooShort {
                required: proposal_len,
                available: data.len(),
            });
        }
        let body = &data[..proposal_len];

        let proposal_num = read_u8(body, &mut offset)?;
        let raw_protocol = read_u8(body, &mut offset)?;
        let protocol_id = ProtocolId::from_u8(raw_protocol)
            .ok_or_else(|| Error::syntax(format!("Unknown protocol ID: {}", raw_protocol)))?;
        let spi_size = read_u8(body, &mut offset)? as usize;
        let num_transforms = read_u8(body, &mut offset)? as usize;

        let spi = match (protocol_id, spi_size) {
            (ProtocolId::Ike, 0) => None,
            (ProtocolId::Ike, 8) => Some(Spi::Ike(read_u64(body, &mut offset)?)),
            (ProtocolId::Esp | ProtocolId::Ah, 4) => Some(Spi::Ipsec(read_u32(body, &mut offset)?)),
            (protocol, size) => {
                return Err(Error::syntax(format!(
                    "Invalid SPI size {} for {:?} proposal",
                    size, protocol
                )))
            }
        };

        if num_transforms == 0 {
            return Err(Error::syntax(format!(
                "Proposal {} carries no transforms",
                proposal_num
            )));
        }

        let mut transforms = TransformSet::default();
        for i in 0..num_transforms {
            let (transform, transform_is_last, consumed) = Transform::from_bytes(&body[offset..])?;
            if transform_is_last != (i + 1 == num_transforms) {
                return Err(Error::syntax(format!(
                    "Transform count mismatch in proposal {}",
                    proposal_num
                )));
            }
            transforms.push(transform);
            offset += consumed;
        }

        if offset != proposal_len {
            return Err(Error::InvalidLength {
                expected: proposal_len,
                actual: offset,
            });
        }

        Ok((
            Proposal {
                proposal_num,
                protocol_id,
                spi,
                transforms,
            },
            is_last,
            proposal_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ike_proposal() -> Proposal {
        Proposal::new(1, ProtocolId::Ike)
            .add_transform(Transform::encr_with_key_length(EncrTransformId::AesCbc, 256))
            .add_transform(Transform::prf(PrfTransformId::HmacSha256))
            .add_transform(Transform::integ(IntegTransformId::HmacSha256_128))
            .add_transform(Transform::dh(DhTransformId::Group14))
    }

    #[test]
    fn test_transform_wire_layout() {
        let bytes = Transform::encr_with_key_length(EncrTransformId::AesCbc, 128)
            .to_bytes(false)
            .unwrap();
        assert_eq!(
            bytes,
            vec![0x03, 0x00, 0x00, 0x0c, 0x01, 0x00, 0x00, 0x0c, 0x80, 0x0e, 0x00, 0x80]
        );

        let bytes = Transform::dh(DhTransformId::Group14).to_bytes(true).unwrap();
        assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x08, 0x04, 0x00, 0x00, 0x0e]);
    }

    #[test]
    fn test_transform_roundtrip() {
        let transform = Transform::encr_with_key_length(EncrTransformId::AesGcm16, 256);
        let bytes = transform.to_bytes(true).unwrap();
        let (parsed, is_last, consumed) = Transform::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, transform);
        assert!(is_last);
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed.key_length(), Some(256));
    }

    #[test]
    fn test_transform_support() {
        assert!(Transform::encr_with_key_length(EncrTransformId::AesCbc, 128).is_supported());
        assert!(Transform::encr(EncrTransformId::ChaCha20Poly1305).is_supported());
        assert!(Transform::prf(PrfTransformId::HmacSha1).is_supported());

        // Missing, invalid or forbidden key length
        assert!(!Transform::encr(EncrTransformId::AesCbc).is_supported());
        assert!(!Transform::encr_with_key_length(EncrTransformId::AesCbc, 64).is_supported());
        assert!(
            !Transform::encr_with_key_length(EncrTransformId::ChaCha20Poly1305, 256).is_supported()
        );

        // Unknown ID, unknown type, unknown attribute
        assert!(!Transform::new(TransformType::Encr, 1024).is_supported());
        assert!(!Transform::new(TransformType::Unknown(9), 1).is_supported());
        let odd = Transform::dh(DhTransformId::Group14).with_attribute(
            TransformAttribute::Unrecognized {
                attr_type: 99,
                short_format: true,
                value: vec![0, 1],
            },
        );
        assert!(!odd.is_supported());
    }

    #[test]
    fn test_unsupported_transform_still_decodes() {
        let mut bytes = Transform::new(TransformType::Unknown(200), 77).to_bytes(true).unwrap();
        bytes.extend_from_slice(&[0xde, 0xad]);
        let (parsed, _, consumed) = Transform::from_bytes(&bytes).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(parsed.transform_type, TransformType::Unknown(200));
        assert!(!parsed.is_supported());
    }

    #[test]
    fn test_tlv_attribute_roundtrip() {
        let transform = Transform::prf(PrfTransformId::HmacSha256).with_attribute(
            TransformAttribute::Unrecognized {
                attr_type: 17,
                short_format: false,
                value: vec![1, 2, 3],
            },
        );
        let bytes = transform.to_bytes(true).unwrap();
        assert_eq!(bytes.len(), 8 + 4 + 3);
        let (parsed, _, _) = Transform::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, transform);
    }

    #[test]
    fn test_transform_bad_length() {
        let bytes = vec![0x00, 0x00, 0x00, 0x04, 0x01, 0x00, 0x00, 0x0c];
        assert!(matches!(
            Transform::from_bytes(&bytes),
            Err(Error::InvalidSyntax(_))
        ));

        let bytes = vec![0x00, 0x00, 0x00, 0x20, 0x01, 0x00, 0x00, 0x0c];
        assert!(matches!(
            Transform::from_bytes(&bytes),
            Err(Error::BufferTooShort { .. })
        ));
    }

    #[test]
    fn test_proposal_roundtrip() {
        let proposal = ike_proposal();
        let bytes = proposal.to_bytes(true).unwrap();
        assert_eq!(bytes.len(), proposal.encoded_len());
        assert_eq!(&bytes[4..8], &[1, 1, 0, 4]);

        let (parsed, is_last, consumed) = Proposal::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, proposal);
        assert!(is_last);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_esp_proposal_with_spi() {
        let proposal = Proposal::new(2, ProtocolId::Esp)
            .with_spi(Spi::Ipsec(0x11223344))
            .add_transform(Transform::encr_with_key_length(EncrTransformId::AesGcm16, 128))
            .add_transform(Transform::esn(EsnTransformId::NoEsn));
        let bytes = proposal.to_bytes(false).unwrap();
        assert_eq!(bytes[0], 2);
        assert_eq!(bytes[6], 4);
        assert_eq!(&bytes[8..12], &[0x11, 0x22, 0x33, 0x44]);

        let (parsed, is_last, _) = Proposal::from_bytes(&bytes).unwrap();
        assert!(!is_last);
        assert_eq!(parsed.spi, Some(Spi::Ipsec(0x11223344)));
        assert!(parsed.is_aead());
        assert_eq!(parsed.missing_mandatory(), None);
    }

    #[test]
    fn test_proposal_spi_size_must_match_protocol() {
        let mut bytes = Proposal::new(1, ProtocolId::Esp)
            .with_spi(Spi::Ipsec(1000))
            .add_transform(Transform::encr(EncrTransformId::ChaCha20Poly1305))
            .to_bytes(true)
            .unwrap();
        // Relabel the ESP proposal as IKE: a 4-byte SPI is invalid there
        bytes[5] = ProtocolId::Ike.to_u8();
        assert!(matches!(
            Proposal::from_bytes(&bytes),
            Err(Error::InvalidSyntax(_))
        ));

        let bytes = Proposal::new(1, ProtocolId::Esp)
            .add_transform(Transform::encr(EncrTransformId::ChaCha20Poly1305))
            .to_bytes(true)
            .unwrap();
        assert!(matches!(
            Proposal::from_bytes(&bytes),
            Err(Error::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_proposal_transform_count_mismatch() {
        let mut bytes = ike_proposal().to_bytes(true).unwrap();
        bytes[7] = 3;
        assert!(Proposal::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_oversized_fields_are_rejected() {
        let mut proposal = Proposal::new(1, ProtocolId::Esp);
        for _ in 0..256 {
            proposal = proposal.add_transform(Transform::encr(EncrTransformId::ChaCha20Poly1305));
        }
        assert!(matches!(
            proposal.to_bytes(true),
            Err(Error::InvalidParameter(_))
        ));

        let mut transform = Transform::encr(EncrTransformId::ChaCha20Poly1305);
        transform.attributes.push(TransformAttribute::Unrecognized {
            attr_type: 17,
            short_format: false,
            value: vec![0; 70_000],
        });
        assert!(matches!(
            transform.to_bytes(true),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_missing_mandatory() {
        assert_eq!(ike_proposal().missing_mandatory(), None);

        let no_dh = Proposal::new(1, ProtocolId::Ike)
            .add_transform(Transform::encr_with_key_length(EncrTransformId::AesCbc, 128))
            .add_transform(Transform::prf(PrfTransformId::HmacSha256))
            .add_transform(Transform::integ(IntegTransformId::HmacSha256_128));
        assert_eq!(no_dh.missing_mandatory(), Some(TransformType::Dh));

        let aead = Proposal::new(1, ProtocolId::Ike)
            .add_transform(Transform::encr_with_key_length(EncrTransformId::AesGcm16, 128))
            .add_transform(Transform::prf(PrfTransformId::HmacSha256))
            .add_transform(Transform::dh(DhTransformId::Group31));
        assert_eq!(aead.missing_mandatory(), None);

        let esp_cbc = Proposal::new(1, ProtocolId::Esp)
            .add_transform(Transform::encr_with_key_length(EncrTransformId::AesCbc, 128));
        assert_eq!(esp_cbc.missing_mandatory(), Some(TransformType::Integ));

        let ah = Proposal::new(1, ProtocolId::Ah);
        assert_eq!(ah.missing_mandatory(), Some(TransformType::Integ));
    }
}

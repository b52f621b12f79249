//! IKEv2 Payload structures and parsing
//!
//! Implements IKE payloads as defined in RFC 7296 Section 3.2 and the
//! Encrypted Fragment payload from RFC 7383.
//!
//! Every payload kind follows the same pattern: `from_payload_data` decodes
//! the body (everything after the generic header) and must consume it
//! exactly, `to_payload_data` produces the body, and `total_length` adds the
//! generic header. [`IkePayload`] is the closed set of kinds with a
//! type-driven dispatch in [`IkePayload::decode`].

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::constants::{NotifyType, PayloadType, FRAGMENT_HEADER_SIZE, PAYLOAD_HEADER_SIZE};
use super::proposal::{Proposal, ProtocolId};
use super::wire::{read_bytes, read_u16, read_u8, u16_field, u8_field};
use crate::{Error, Result};

/// Generic IKE payload header (4 bytes)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Next Payload  |C|  RESERVED   |         Payload Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Next payload type
    pub next_payload: PayloadType,

    /// Critical bit (if set, must understand this payload)
    pub critical: bool,

    /// Total payload length including header (4 bytes + data)
    pub length: u16,
}

impl PayloadHeader {
    /// Payload header size
    pub const SIZE: usize = PAYLOAD_HEADER_SIZE;

    /// Critical flag bit
    pub const CRITICAL: u8 = 0x80;

    /// Create new payload header
    pub fn new(next_payload: PayloadType, critical: bool, length: u16) -> Self {
        PayloadHeader {
            next_payload,
            critical,
            length,
        }
    }

    /// Parse payload header from bytes
    ///
    /// # Errors
    ///
    /// Returns error if the buffer is too short or the length field is
    /// smaller than the header itself.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let next_payload = PayloadType::from_u8(read_u8(data, &mut offset)?);
        let critical = (read_u8(data, &mut offset)? & Self::CRITICAL) != 0;
        let length = read_u16(data, &mut offset)?;

        if (length as usize) < Self::SIZE {
            return Err(Error::syntax(format!(
                "Payload length {} shorter than generic header",
                length
            )));
        }

        Ok(PayloadHeader {
            next_payload,
            critical,
            length,
        })
    }

    /// Serialize payload header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.next_payload.to_u8();
        bytes[1] = if self.critical { Self::CRITICAL } else { 0x00 };
        bytes[2..4].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }

    /// Get payload data length (excluding header)
    pub fn data_length(&self) -> usize {
        (self.length as usize).saturating_sub(Self::SIZE)
    }
}

/// IKE Payload kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IkePayload {
    /// Security Association payload
    SA(SaPayload),
    /// Key Exchange payload
    KE(KePayload),
    /// Identification payload (Initiator)
    IDi(IdPayload),
    /// Identification payload (Responder)
    IDr(IdPayload),
    /// Certificate payload
    CERT(CertPayload),
    /// Certificate Request payload
    CERTREQ(CertReqPayload),
    /// Authentication payload
    AUTH(AuthPayload),
    /// Nonce payload
    Nonce(NoncePayload),
    /// Notify payload
    Notify(NotifyPayload),
    /// Delete payload
    Delete(DeletePayload),
    /// Vendor ID payload
    Vendor(VendorPayload),
    /// Traffic Selector payload (Initiator)
    TSi(TsPayload),
    /// Traffic Selector payload (Responder)
    TSr(TsPayload),
    /// Configuration payload
    Config(ConfigPayload),
    /// EAP payload
    EAP(EapPayload),
    /// Encrypted and Authenticated payload, still protected
    SK(EncryptedPayload),
    /// Encrypted and Authenticated Fragment, still protected
    SKF(EncryptedFragmentPayload),
    /// Payload of a type this implementation does not understand
    Unsupported {
        /// Payload type
        payload_type: PayloadType,
        /// Critical bit as received
        critical: bool,
        /// Raw payload data (excluding header)
        data: Vec<u8>,
    },
}

impl IkePayload {
    /// Get payload type
    pub fn payload_type(&self) -> PayloadType {
        match self {
            IkePayload::SA(_) => PayloadType::SA,
            IkePayload::KE(_) => PayloadType::KE,
            IkePayload::IDi(_) => PayloadType::IDi,
            IkePayload::IDr(_) => PayloadType::IDr,
            IkePayload::CERT(_) => PayloadType::CERT,
            IkePayload::CERTREQ(_) => PayloadType::CERTREQ,
            IkePayload::AUTH(_) => PayloadType::AUTH,
            IkePayload::Nonce(_) => PayloadType::Nonce,
            IkePayload::Notify(_) => PayloadType::N,
            IkePayload::Delete(_) => PayloadType::D,
            IkePayload::Vendor(_) => PayloadType::V,
            IkePayload::TSi(_) => PayloadType::TSi,
            IkePayload::TSr(_) => PayloadType::TSr,
            IkePayload::Config(_) => PayloadType::CP,
            IkePayload::EAP(_) => PayloadType::EAP,
            IkePayload::SK(_) => PayloadType::SK,
            IkePayload::SKF(_) => PayloadType::SKF,
            IkePayload::Unsupported { payload_type, .. } => *payload_type,
        }
    }

    /// Critical bit to put on the wire
    pub fn is_critical(&self) -> bool {
        match self {
            IkePayload::Unsupported { critical, .. } => *critical,
            _ => false,
        }
    }

    /// Value for the generic header's next-payload field when this payload
    /// wraps an inner chain (SK/SKF); `None` otherwise
    pub fn inner_next_payload(&self) -> Option<PayloadType> {
        match self {
            IkePayload::SK(sk) => Some(sk.first_inner_payload),
            IkePayload::SKF(skf) => Some(skf.first_inner_payload),
            _ => None,
        }
    }

    /// Decode a payload body according to its type
    ///
    /// `header` is the generic header that preceded `body`; `is_response`
    /// selects the SA payload rules for responses.
    pub fn decode(
        payload_type: PayloadType,
        header: &PayloadHeader,
        body: &[u8],
        is_response: bool,
    ) -> Result<Self> {
        let payload = match payload_type {
            PayloadType::SA => IkePayload::SA(SaPayload::from_payload_data(body, is_response)?),
            PayloadType::KE => IkePayload::KE(KePayload::from_payload_data(body)?),
            PayloadType::IDi => IkePayload::IDi(IdPayload::from_payload_data(body)?),
            PayloadType::IDr => IkePayload::IDr(IdPayload::from_payload_data(body)?),
            PayloadType::CERT => IkePayload::CERT(CertPayload::from_payload_data(body)?),
            PayloadType::CERTREQ => IkePayload::CERTREQ(CertReqPayload::from_payload_data(body)?),
            PayloadType::AUTH => IkePayload::AUTH(AuthPayload::from_payload_data(body)?),
            PayloadType::Nonce => IkePayload::Nonce(NoncePayload::from_payload_data(body)?),
            PayloadType::N => IkePayload::Notify(NotifyPayload::from_payload_data(body)?),
            PayloadType::D => IkePayload::Delete(DeletePayload::from_payload_data(body)?),
            PayloadType::V => IkePayload::Vendor(VendorPayload::from_payload_data(body)),
            PayloadType::TSi => IkePayload::TSi(TsPayload::from_payload_data(body)?),
            PayloadType::TSr => IkePayload::TSr(TsPayload::from_payload_data(body)?),
            PayloadType::CP => IkePayload::Config(ConfigPayload::from_payload_data(body)?),
            PayloadType::EAP => IkePayload::EAP(EapPayload::from_payload_data(body)?),
            PayloadType::SK => IkePayload::SK(EncryptedPayload {
                first_inner_payload: header.next_payload,
                body: body.to_vec(),
            }),
            PayloadType::SKF => IkePayload::SKF(EncryptedFragmentPayload::from_payload_data(
                header.next_payload,
                body,
            )?),
            PayloadType::None | PayloadType::Unknown(_) => IkePayload::Unsupported {
                payload_type,
                critical: header.critical,
                data: body.to_vec(),
            },
        };
        Ok(payload)
    }

    /// Serialize the payload body (without header)
    ///
    /// Fails with [`Error::InvalidParameter`] when a count or length does
    /// not fit its wire field.
    pub fn to_payload_data(&self) -> Result<Vec<u8>> {
        let body = match self {
            IkePayload::SA(p) => p.to_payload_data()?,
            IkePayload::KE(p) => p.to_payload_data(),
            IkePayload::IDi(p) | IkePayload::IDr(p) => p.to_payload_data(),
            IkePayload::CERT(p) => p.to_payload_data(),
            IkePayload::CERTREQ(p) => p.to_payload_data(),
            IkePayload::AUTH(p) => p.to_payload_data(),
            IkePayload::Nonce(p) => p.to_payload_data(),
            IkePayload::Notify(p) => p.to_payload_data()?,
            IkePayload::Delete(p) => p.to_payload_data()?,
            IkePayload::Vendor(p) => p.to_payload_data(),
            IkePayload::TSi(p) | IkePayload::TSr(p) => p.to_payload_data()?,
            IkePayload::Config(p) => p.to_payload_data()?,
            IkePayload::EAP(p) => p.to_payload_data(),
            IkePayload::SK(p) => p.body.clone(),
            IkePayload::SKF(p) => p.to_payload_data(),
            IkePayload::Unsupported { data, .. } => data.clone(),
        };
        Ok(body)
    }

    /// Get total payload length (header + data)
    pub fn total_length(&self) -> Result<usize> {
        Ok(PayloadHeader::SIZE + self.to_payload_data()?.len())
    }
}

/// Security Association Payload (RFC 7296 Section 3.3)
///
/// Contains one or more proposals for security association negotiation.
/// A response carries exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaPayload {
    /// List of proposals
    pub proposals: Vec<Proposal>,
}

impl SaPayload {
    /// Create new SA payload with proposals
    pub fn new(proposals: Vec<Proposal>) -> Self {
        SaPayload { proposals }
    }

    /// Parse SA payload from data (without header)
    ///
    /// Requests must number proposals sequentially from 1; responses must
    /// carry exactly one proposal.
    pub fn from_payload_data(data: &[u8], is_response: bool) -> Result<Self> {
        let mut proposals = Vec::new();
        let mut offset = 0;
        let mut saw_last = false;

        while offset < data.len() {
            if saw_last {
                return Err(Error::syntax("Data after last proposal in SA payload"));
            }
            let (proposal, is_last, consumed) = Proposal::from_bytes(&data[offset..])?;
            offset += consumed;
            saw_last = is_last;
            proposals.push(proposal);
        }

        if proposals.is_empty() {
            return Err(Error::syntax("SA payload without proposals"));
        }
        if !saw_last {
            return Err(Error::syntax("SA payload missing last proposal marker"));
        }

        if is_response {
            if proposals.len() != 1 {
                return Err(Error::syntax(format!(
                    "Response SA payload carries {} proposals, expected exactly one",
                    proposals.len()
                )));
            }
        } else {
            for (i, proposal) in proposals.iter().enumerate() {
                if proposal.proposal_num as usize != i + 1 {
                    return Err(Error::syntax(format!(
                        "Proposal number {} out of sequence (expected {})",
                        proposal.proposal_num,
                        i + 1
                    )));
                }
            }
        }

        Ok(SaPayload { proposals })
    }

    /// Serialize SA payload to bytes (without header)
    pub fn to_payload_data(&self) -> Result<Vec<u8>> {
        let count = self.proposals.len();
        let mut bytes = Vec::new();
        for (i, proposal) in self.proposals.iter().enumerate() {
            bytes.extend_from_slice(&proposal.to_bytes(i + 1 == count)?);
        }
        Ok(bytes)
    }

    /// Get total payload length (header + data)
    pub fn total_length(&self) -> usize {
        PayloadHeader::SIZE
            + self
                .proposals
                .iter()
                .map(Proposal::encoded_len)
                .sum::<usize>()
    }

    /// Get proposals
    pub fn proposals(&self) -> &[Proposal] {
        &self.proposals
    }
}

/// Key Exchange Payload (RFC 7296 Section 3.4)
///
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Diffie-Hellman Group Num    |           RESERVED            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ~                       Key Exchange Data                       ~
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KePayload {
    /// Diffie-Hellman group number
    pub dh_group: u16,

    /// Key exchange data (public key)
    pub key_data: Vec<u8>,
}

impl KePayload {
    /// Create new KE payload
    pub fn new(dh_group: u16, key_data: Vec<u8>) -> Self {
        KePayload { dh_group, key_data }
    }

    /// Parse KE payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let dh_group = read_u16(data, &mut offset)?;
        let _reserved = read_u16(data, &mut offset)?;

        Ok(KePayload {
            dh_group,
            key_data: data[offset..].to_vec(),
        })
    }

    /// Serialize KE payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + self.key_data.len());
        data.extend_from_slice(&self.dh_group.to_be_bytes());
        data.extend_from_slice(&[0u8, 0u8]);
        data.extend_from_slice(&self.key_data);
        data
    }
}

/// ID Type for Identification Payload (RFC 7296 Section 3.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IdType {
    /// IPv4 address
    Ipv4Addr = 1,
    /// Fully-qualified domain name
    Fqdn = 2,
    /// RFC 822 email address
    Rfc822Addr = 3,
    /// IPv6 address
    Ipv6Addr = 5,
    /// ASN.1 X.500 Distinguished Name
    DerAsn1Dn = 9,
    /// ASN.1 X.509 GeneralName
    DerAsn1Gn = 10,
    /// Key ID
    KeyId = 11,
}

impl IdType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(IdType::Ipv4Addr),
            2 => Some(IdType::Fqdn),
            3 => Some(IdType::Rfc822Addr),
            5 => Some(IdType::Ipv6Addr),
            9 => Some(IdType::DerAsn1Dn),
            10 => Some(IdType::DerAsn1Gn),
            11 => Some(IdType::KeyId),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Identification Payload (RFC 7296 Section 3.5)
///
/// Used for IDi (Initiator) and IDr (Responder) payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdPayload {
    /// ID type
    pub id_type: IdType,

    /// Identification data
    pub data: Vec<u8>,
}

impl IdPayload {
    /// Create new ID payload
    pub fn new(id_type: IdType, data: Vec<u8>) -> Self {
        IdPayload { id_type, data }
    }

    /// Create ID from FQDN
    pub fn from_fqdn(fqdn: &str) -> Self {
        IdPayload::new(IdType::Fqdn, fqdn.as_bytes().to_vec())
    }

    /// Parse ID payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let raw_type = read_u8(data, &mut offset)?;
        let id_type = IdType::from_u8(raw_type)
            .ok_or_else(|| Error::syntax(format!("Unknown ID type: {}", raw_type)))?;
        read_bytes(data, &mut offset, 3)?;

        let id_data = &data[offset..];
        let expected = match id_type {
            IdType::Ipv4Addr => Some(4),
            IdType::Ipv6Addr => Some(16),
            _ => None,
        };
        if let Some(expected) = expected {
            if id_data.len() != expected {
                return Err(Error::InvalidLength {
                    expected,
                    actual: id_data.len(),
                });
            }
        }

        Ok(IdPayload::new(id_type, id_data.to_vec()))
    }

    /// Serialize ID payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.data.len());
        bytes.push(self.id_type.to_u8());
        bytes.extend_from_slice(&[0u8; 3]);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

/// Certificate Encoding (RFC 7296 Section 3.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CertEncoding(pub u8);

impl CertEncoding {
    /// X.509 Certificate - Signature
    pub const X509_SIGNATURE: CertEncoding = CertEncoding(4);
    /// Certificate Revocation List
    pub const CRL: CertEncoding = CertEncoding(7);
    /// Hash and URL of X.509 certificate
    pub const HASH_AND_URL_X509: CertEncoding = CertEncoding(12);
}

/// Certificate Payload (RFC 7296 Section 3.6)
///
/// Certificate contents are opaque here; chain validation is done elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPayload {
    /// Certificate encoding
    pub encoding: CertEncoding,
    /// Certificate data
    pub data: Vec<u8>,
}

impl CertPayload {
    /// Parse CERT payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let encoding = CertEncoding(read_u8(data, &mut offset)?);
        Ok(CertPayload {
            encoding,
            data: data[offset..].to_vec(),
        })
    }

    /// Serialize CERT payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.data.len());
        bytes.push(self.encoding.0);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

/// Certificate Request Payload (RFC 7296 Section 3.7)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertReqPayload {
    /// Requested certificate encoding
    pub encoding: CertEncoding,
    /// Concatenated SHA-1 hashes of trusted CA public keys
    pub authority: Vec<u8>,
}

impl CertReqPayload {
    /// Length of one CA key hash in the authority field
    pub const CA_HASH_LEN: usize = 20;

    /// Parse CERTREQ payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let encoding = CertEncoding(read_u8(data, &mut offset)?);
        let authority = &data[offset..];
        if encoding == CertEncoding::X509_SIGNATURE && authority.len() % Self::CA_HASH_LEN != 0 {
            return Err(Error::syntax(format!(
                "Certificate authority field of {} bytes is not a list of SHA-1 hashes",
                authority.len()
            )));
        }
        Ok(CertReqPayload {
            encoding,
            authority: authority.to_vec(),
        })
    }

    /// Serialize CERTREQ payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.authority.len());
        bytes.push(self.encoding.0);
        bytes.extend_from_slice(&self.authority);
        bytes
    }
}

/// Authentication Method (RFC 7296 Section 3.8, RFC 7427)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthMethod {
    /// RSA Digital Signature
    RsaSig = 1,
    /// Shared Key Message Integrity Code
    SharedKeyMic = 2,
    /// DSS Digital Signature
    DssSig = 3,
    /// ECDSA with SHA-256 on P-256 curve
    EcdsaSha256P256 = 9,
    /// ECDSA with SHA-384 on P-384 curve
    EcdsaSha384P384 = 10,
    /// ECDSA with SHA-512 on P-521 curve
    EcdsaSha512P521 = 11,
    /// Generic Digital Signature
    DigitalSignature = 14,
}

impl AuthMethod {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AuthMethod::RsaSig),
            2 => Some(AuthMethod::SharedKeyMic),
            3 => Some(AuthMethod::DssSig),
            9 => Some(AuthMethod::EcdsaSha256P256),
            10 => Some(AuthMethod::EcdsaSha384P384),
            11 => Some(AuthMethod::EcdsaSha512P521),
            14 => Some(AuthMethod::DigitalSignature),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Authentication Payload (RFC 7296 Section 3.8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPayload {
    /// Authentication method
    pub auth_method: AuthMethod,

    /// Authentication data
    pub auth_data: Vec<u8>,
}

impl AuthPayload {
    /// Create new AUTH payload
    pub fn new(auth_method: AuthMethod, auth_data: Vec<u8>) -> Self {
        AuthPayload {
            auth_method,
            auth_data,
        }
    }

    /// Parse AUTH payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let raw_method = read_u8(data, &mut offset)?;
        let auth_method = AuthMethod::from_u8(raw_method)
            .ok_or_else(|| Error::syntax(format!("Unknown auth method: {}", raw_method)))?;
        read_bytes(data, &mut offset, 3)?;

        Ok(AuthPayload {
            auth_method,
            auth_data: data[offset..].to_vec(),
        })
    }

    /// Serialize AUTH payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.auth_data.len());
        bytes.push(self.auth_method.to_u8());
        bytes.extend_from_slice(&[0u8; 3]);
        bytes.extend_from_slice(&self.auth_data);
        bytes
    }
}

/// Nonce Payload (RFC 7296 Section 3.9)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoncePayload {
    /// Nonce data (16-256 bytes of random data)
    pub nonce: Vec<u8>,
}

impl NoncePayload {
    /// Minimum nonce size (16 bytes)
    pub const MIN_SIZE: usize = 16;

    /// Maximum nonce size (256 bytes)
    pub const MAX_SIZE: usize = 256;

    /// Create new nonce payload
    pub fn new(nonce: Vec<u8>) -> Result<Self> {
        if nonce.len() < Self::MIN_SIZE || nonce.len() > Self::MAX_SIZE {
            return Err(Error::syntax(format!(
                "Nonce of {} bytes outside {}..={}",
                nonce.len(),
                Self::MIN_SIZE,
                Self::MAX_SIZE
            )));
        }

        Ok(NoncePayload { nonce })
    }

    /// Parse nonce payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        Self::new(data.to_vec())
    }

    /// Serialize nonce payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        self.nonce.clone()
    }
}

/// Notify Payload (RFC 7296 Section 3.10)
///
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Protocol ID  |   SPI Size    |      Notify Message Type      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ~                Security Parameter Index (SPI)                 ~
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ~                       Notification Data                       ~
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyPayload {
    /// Protocol ID (0 when not about a specific SA)
    pub protocol_id: u8,
    /// SPI (empty, 4 or 8 bytes)
    pub spi: Vec<u8>,
    /// Notify message type
    pub notify_type: NotifyType,
    /// Notification data
    pub data: Vec<u8>,
}

impl NotifyPayload {
    /// Create a notify that does not refer to an SA
    pub fn new(notify_type: NotifyType, data: Vec<u8>) -> Self {
        NotifyPayload {
            protocol_id: 0,
            spi: Vec::new(),
            notify_type,
            data,
        }
    }

    /// IKEV2_FRAGMENTATION_SUPPORTED status notify (RFC 7383 Section 2.3)
    pub fn fragmentation_supported() -> Self {
        NotifyPayload::new(NotifyType::IKEV2_FRAGMENTATION_SUPPORTED, Vec::new())
    }

    /// Check for IKEV2_FRAGMENTATION_SUPPORTED
    pub fn is_fragmentation_supported(&self) -> bool {
        self.notify_type == NotifyType::IKEV2_FRAGMENTATION_SUPPORTED
    }

    /// Parse Notify payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let protocol_id = read_u8(data, &mut offset)?;
        let spi_size = read_u8(data, &mut offset)? as usize;
        let notify_type = NotifyType(read_u16(data, &mut offset)?);

        if !matches!(spi_size, 0 | 4 | 8) {
            return Err(Error::syntax(format!(
                "Invalid SPI size {} in notify payload",
                spi_size
            )));
        }
        let spi = read_bytes(data, &mut offset, spi_size)?.to_vec();

        Ok(NotifyPayload {
            protocol_id,
            spi,
            notify_type,
            data: data[offset..].to_vec(),
        })
    }

    /// Serialize Notify payload to bytes (without header)
    pub fn to_payload_data(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(4 + self.spi.len() + self.data.len());
        bytes.push(self.protocol_id);
        bytes.push(u8_field(self.spi.len(), "notify SPI size")?);
        bytes.extend_from_slice(&self.notify_type.value().to_be_bytes());
        bytes.extend_from_slice(&self.spi);
        bytes.extend_from_slice(&self.data);
        Ok(bytes)
    }
}

/// Delete Payload (RFC 7296 Section 3.11)
///
/// Deleting the IKE SA carries no SPI: SPI size and count are both zero.
/// Child SA deletes list 4-byte SPIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePayload {
    /// Protocol of the SAs being deleted
    pub protocol_id: ProtocolId,
    /// SPIs of child SAs being deleted (empty for IKE)
    pub spis: Vec<u32>,
}

impl DeletePayload {
    /// Delete the IKE SA this message is protected under
    pub fn ike() -> Self {
        DeletePayload {
            protocol_id: ProtocolId::Ike,
            spis: Vec::new(),
        }
    }

    /// Delete child SAs
    pub fn child(protocol_id: ProtocolId, spis: Vec<u32>) -> Self {
        DeletePayload { protocol_id, spis }
    }

    /// Parse Delete payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let raw_protocol = read_u8(data, &mut offset)?;
        let protocol_id = ProtocolId::from_u8(raw_protocol)
            .ok_or_else(|| Error::syntax(format!("Unknown protocol ID: {}", raw_protocol)))?;
        let spi_size = read_u8(data, &mut offset)? as usize;
        let num_spi = read_u16(data, &mut offset)? as usize;

        match protocol_id {
            ProtocolId::Ike => {
                if spi_size != 0 || num_spi != 0 || offset != data.len() {
                    return Err(Error::syntax(format!(
                        "IKE delete must not carry SPIs (size {}, count {})",
                        spi_size, num_spi
                    )));
                }
                Ok(DeletePayload::ike())
            }
            ProtocolId::Esp | ProtocolId::Ah => {
                if spi_size != 4 {
                    return Err(Error::syntax(format!(
                        "Invalid SPI size {} in child SA delete",
                        spi_size
                    )));
                }
                let expected = offset + num_spi * spi_size;
                if data.len() != expected {
                    return Err(Error::InvalidLength {
                        expected,
                        actual: data.len(),
                    });
                }
                let spis = data[offset..]
                    .chunks_exact(4)
                    .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                Ok(DeletePayload { protocol_id, spis })
            }
        }
    }

    /// Serialize Delete payload to bytes (without header)
    pub fn to_payload_data(&self) -> Result<Vec<u8>> {
        let spi_size = match self.protocol_id {
            ProtocolId::Ike => 0u8,
            ProtocolId::Esp | ProtocolId::Ah => 4u8,
        };
        let mut bytes = Vec::with_capacity(4 + self.spis.len() * 4);
        bytes.push(self.protocol_id.to_u8());
        bytes.push(spi_size);
        bytes.extend_from_slice(&u16_field(self.spis.len(), "delete SPI count")?.to_be_bytes());
        for spi in &self.spis {
            bytes.extend_from_slice(&spi.to_be_bytes());
        }
        Ok(bytes)
    }
}

/// Vendor ID Payload (RFC 7296 Section 3.12)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorPayload {
    /// Vendor ID
    pub vendor_id: Vec<u8>,
}

impl VendorPayload {
    /// Parse Vendor ID payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Self {
        VendorPayload {
            vendor_id: data.to_vec(),
        }
    }

    /// Serialize Vendor ID payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        self.vendor_id.clone()
    }
}

/// One traffic selector (RFC 7296 Section 3.13.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficSelector {
    /// IP protocol (0 = any)
    pub ip_protocol: u8,
    /// First port of the range
    pub start_port: u16,
    /// Last port of the range
    pub end_port: u16,
    /// First address of the range
    pub start_address: IpAddr,
    /// Last address of the range
    pub end_address: IpAddr,
}

impl TrafficSelector {
    /// TS_IPV4_ADDR_RANGE
    pub const TS_IPV4_ADDR_RANGE: u8 = 7;
    /// TS_IPV6_ADDR_RANGE
    pub const TS_IPV6_ADDR_RANGE: u8 = 8;

    const IPV4_LEN: usize = 16;
    const IPV6_LEN: usize = 40;

    /// Whole IPv4 space, all protocols and ports
    pub fn ipv4_any() -> Self {
        TrafficSelector {
            ip_protocol: 0,
            start_port: 0,
            end_port: u16::MAX,
            start_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            end_address: IpAddr::V4(Ipv4Addr::BROADCAST),
        }
    }

    fn from_bytes(data: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let ts_type = read_u8(data, &mut offset)?;
        let ip_protocol = read_u8(data, &mut offset)?;
        let selector_len = read_u16(data, &mut offset)? as usize;
        let start_port = read_u16(data, &mut offset)?;
        let end_port = read_u16(data, &mut offset)?;

        let (start_address, end_address) = match (ts_type, selector_len) {
            (Self::TS_IPV4_ADDR_RANGE, Self::IPV4_LEN) => {
                let s = read_bytes(data, &mut offset, 4)?;
                let e = read_bytes(data, &mut offset, 4)?;
                (
                    IpAddr::V4(Ipv4Addr::new(s[0], s[1], s[2], s[3])),
                    IpAddr::V4(Ipv4Addr::new(e[0], e[1], e[2], e[3])),
                )
            }
            (Self::TS_IPV6_ADDR_RANGE, Self::IPV6_LEN) => {
                let mut s = [0u8; 16];
                let mut e = [0u8; 16];
                s.copy_from_slice(read_bytes(data, &mut offset, 16)?);
                e.copy_from_slice(read_bytes(data, &mut offset, 16)?);
                (IpAddr::V6(Ipv6Addr::from(s)), IpAddr::V6(Ipv6Addr::from(e)))
            }
            (ts_type, len) => {
                return Err(Error::syntax(format!(
                    "Invalid traffic selector type {} with length {}",
                    ts_type, len
                )))
            }
        };

        Ok((
            TrafficSelector {
                ip_protocol,
                start_port,
                end_port,
                start_address,
                end_address,
            },
            offset,
        ))
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let (ts_type, len) = match self.start_address {
            IpAddr::V4(_) => (Self::TS_IPV4_ADDR_RANGE, Self::IPV4_LEN),
            IpAddr::V6(_) => (Self::TS_IPV6_ADDR_RANGE, Self::IPV6_LEN),
        };
        out.push(ts_type);
        out.push(self.ip_protocol);
        out.extend_from_slice(&(len as u16).to_be_bytes());
        out.extend_from_slice(&self.start_port.to_be_bytes());
        out.extend_from_slice(&self.end_port.to_be_bytes());
        for address in [self.start_address, self.end_address] {
            match address {
                IpAddr::V4(a) => out.extend_from_slice(&a.octets()),
                IpAddr::V6(a) => out.extend_from_slice(&a.octets()),
            }
        }
    }
}

/// Traffic Selector Payload (RFC 7296 Section 3.13)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsPayload {
    /// Traffic selectors
    pub selectors: Vec<TrafficSelector>,
}

impl TsPayload {
    /// Parse TS payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let count = read_u8(data, &mut offset)? as usize;
        read_bytes(data, &mut offset, 3)?;

        let mut selectors = Vec::with_capacity(count);
        for _ in 0..count {
            let (selector, consumed) = TrafficSelector::from_bytes(&data[offset..])?;
            if selector.start_address.is_ipv4() != selector.end_address.is_ipv4() {
                return Err(Error::syntax("Mixed address families in traffic selector"));
            }
            selectors.push(selector);
            offset += consumed;
        }

        if offset != data.len() {
            return Err(Error::InvalidLength {
                expected: offset,
                actual: data.len(),
            });
        }

        Ok(TsPayload { selectors })
    }

    /// Serialize TS payload to bytes (without header)
    pub fn to_payload_data(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![u8_field(self.selectors.len(), "traffic selector count")?, 0, 0, 0];
        for selector in &self.selectors {
            selector.encode(&mut bytes);
        }
        Ok(bytes)
    }
}

/// Configuration attribute (RFC 7296 Section 3.15.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigAttribute {
    /// Attribute type (15 bits)
    pub attr_type: u16,
    /// Attribute value, possibly empty
    pub value: Vec<u8>,
}

/// Configuration Payload (RFC 7296 Section 3.15)
///
/// Attribute semantics (address, DNS assignment) belong to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPayload {
    /// CFG_REQUEST (1), CFG_REPLY (2), CFG_SET (3) or CFG_ACK (4)
    pub cfg_type: u8,
    /// Attributes
    pub attributes: Vec<ConfigAttribute>,
}

impl ConfigPayload {
    /// CFG_REQUEST
    pub const CFG_REQUEST: u8 = 1;
    /// CFG_REPLY
    pub const CFG_REPLY: u8 = 2;
    /// CFG_SET
    pub const CFG_SET: u8 = 3;
    /// CFG_ACK
    pub const CFG_ACK: u8 = 4;

    /// Parse CP payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let cfg_type = read_u8(data, &mut offset)?;
        if !(Self::CFG_REQUEST..=Self::CFG_ACK).contains(&cfg_type) {
            return Err(Error::syntax(format!("Unknown config type: {}", cfg_type)));
        }
        read_bytes(data, &mut offset, 3)?;

        let mut attributes = Vec::new();
        while offset < data.len() {
            let attr_type = read_u16(data, &mut offset)? & 0x7fff;
            let len = read_u16(data, &mut offset)? as usize;
            let value = read_bytes(data, &mut offset, len)?.to_vec();
            attributes.push(ConfigAttribute { attr_type, value });
        }

        Ok(ConfigPayload {
            cfg_type,
            attributes,
        })
    }

    /// Serialize CP payload to bytes (without header)
    pub fn to_payload_data(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![self.cfg_type, 0, 0, 0];
        for attribute in &self.attributes {
            bytes.extend_from_slice(&(attribute.attr_type & 0x7fff).to_be_bytes());
            bytes.extend_from_slice(
                &u16_field(attribute.value.len(), "configuration attribute length")?.to_be_bytes(),
            );
            bytes.extend_from_slice(&attribute.value);
        }
        Ok(bytes)
    }
}

/// EAP Payload (RFC 7296 Section 3.16)
///
/// Carries one EAP message; its length field must match the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapPayload {
    /// Raw EAP message
    pub message: Vec<u8>,
}

impl EapPayload {
    /// Parse EAP payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut offset = 2;
        let eap_len = read_u16(data, &mut offset)? as usize;
        if eap_len != data.len() {
            return Err(Error::InvalidLength {
                expected: eap_len,
                actual: data.len(),
            });
        }
        Ok(EapPayload {
            message: data.to_vec(),
        })
    }

    /// Serialize EAP payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        self.message.clone()
    }
}

/// Encrypted and Authenticated Payload (RFC 7296 Section 3.14)
///
/// The body is opaque until the envelope layer verifies and decrypts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Type of the first payload inside the encrypted chain
    pub first_inner_payload: PayloadType,
    /// IV, ciphertext and checksum/tag
    pub body: Vec<u8>,
}

/// Encrypted and Authenticated Fragment Payload (RFC 7383 Section 2.5)
///
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |        Fragment Number        |        Total Fragments        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ~            IV, Encrypted content, Integrity Checksum          ~
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFragmentPayload {
    /// Type of the first inner payload; `None` on every fragment but the first
    pub first_inner_payload: PayloadType,
    /// Fragment number (1-based)
    pub fragment_num: u16,
    /// Total number of fragments
    pub total_fragments: u16,
    /// IV, ciphertext and checksum/tag
    pub body: Vec<u8>,
}

impl EncryptedFragmentPayload {
    /// Parse SKF payload from data (without header)
    pub fn from_payload_data(first_inner_payload: PayloadType, data: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let fragment_num = read_u16(data, &mut offset)?;
        let total_fragments = read_u16(data, &mut offset)?;
        if fragment_num == 0 || total_fragments == 0 || fragment_num > total_fragments {
            return Err(Error::syntax(format!(
                "Invalid fragment {} of {}",
                fragment_num, total_fragments
            )));
        }

        Ok(EncryptedFragmentPayload {
            first_inner_payload,
            fragment_num,
            total_fragments,
            body: data[FRAGMENT_HEADER_SIZE..].to_vec(),
        })
    }

    /// Fragment header bytes (number, total)
    pub fn fragment_header(&self) -> [u8; FRAGMENT_HEADER_SIZE] {
        let mut bytes = [0u8; FRAGMENT_HEADER_SIZE];
        bytes[0..2].copy_from_slice(&self.fragment_num.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.total_fragments.to_be_bytes());
        bytes
    }

    /// Serialize SKF payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAGMENT_HEADER_SIZE + self.body.len());
        bytes.extend_from_slice(&self.fragment_header());
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

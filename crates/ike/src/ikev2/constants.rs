//! IKEv2 protocol constants from RFC 7296 and RFC 7383

/// IKE version 2 (major version = 2, minor version = 0)
pub const IKE_VERSION: u8 = 0x20;

/// Maximum IKE message size (64KB - 1)
pub const MAX_IKE_MESSAGE_SIZE: usize = 65535;

/// IKE header size (28 bytes)
pub const IKE_HEADER_SIZE: usize = 28;

/// Generic payload header size (4 bytes)
pub const PAYLOAD_HEADER_SIZE: usize = 4;

/// Encrypted Fragment header size: fragment number + total fragments
pub const FRAGMENT_HEADER_SIZE: usize = 4;

/// Default fragment size budget for IPv6-safe paths
pub const DEFAULT_FRAGMENT_SIZE: usize = 1280;

/// Exchange Types (RFC 7296 Section 3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExchangeType {
    /// IKE_SA_INIT exchange (34)
    IkeSaInit = 34,
    /// IKE_AUTH exchange (35)
    IkeAuth = 35,
    /// CREATE_CHILD_SA exchange (36)
    CreateChildSa = 36,
    /// INFORMATIONAL exchange (37)
    Informational = 37,
}

impl ExchangeType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            34 => Some(ExchangeType::IkeSaInit),
            35 => Some(ExchangeType::IkeAuth),
            36 => Some(ExchangeType::CreateChildSa),
            37 => Some(ExchangeType::Informational),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// IKE message flags (RFC 7296 Section 3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IkeFlags(u8);

impl IkeFlags {
    /// Response flag (bit 5)
    pub const RESPONSE: u8 = 0x20;
    /// Version flag (bit 4)
    pub const VERSION: u8 = 0x10;
    /// Initiator flag (bit 3)
    pub const INITIATOR: u8 = 0x08;

    /// Create new flags
    pub fn new(value: u8) -> Self {
        IkeFlags(value & 0x38) // Mask to only keep bits 3-5
    }

    /// Create flags for request
    pub fn request(is_initiator: bool) -> Self {
        if is_initiator {
            IkeFlags(Self::INITIATOR)
        } else {
            IkeFlags(0)
        }
    }

    /// Create flags for response
    pub fn response(is_initiator: bool) -> Self {
        let mut flags = Self::RESPONSE;
        if is_initiator {
            flags |= Self::INITIATOR;
        }
        IkeFlags(flags)
    }

    /// Check if this is a response
    pub fn is_response(self) -> bool {
        (self.0 & Self::RESPONSE) != 0
    }

    /// Check if this is from initiator
    pub fn is_initiator(self) -> bool {
        (self.0 & Self::INITIATOR) != 0
    }

    /// Get raw value
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Payload Types (RFC 7296 Section 3.2, RFC 7383 Section 2.5)
///
/// Unassigned or unimplemented type values are carried as `Unknown` so the
/// chain codec can skip or report them instead of failing on the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// No next payload (0)
    None,
    /// Security Association (33)
    SA,
    /// Key Exchange (34)
    KE,
    /// Identification - Initiator (35)
    IDi,
    /// Identification - Responder (36)
    IDr,
    /// Certificate (37)
    CERT,
    /// Certificate Request (38)
    CERTREQ,
    /// Authentication (39)
    AUTH,
    /// Nonce (40)
    Nonce,
    /// Notify (41)
    N,
    /// Delete (42)
    D,
    /// Vendor ID (43)
    V,
    /// Traffic Selector - Initiator (44)
    TSi,
    /// Traffic Selector - Responder (45)
    TSr,
    /// Encrypted and Authenticated (46)
    SK,
    /// Configuration (47)
    CP,
    /// Extensible Authentication (48)
    EAP,
    /// Encrypted and Authenticated Fragment (53)
    SKF,
    /// Any other type value
    Unknown(u8),
}

impl PayloadType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => PayloadType::None,
            33 => PayloadType::SA,
            34 => PayloadType::KE,
            35 => PayloadType::IDi,
            36 => PayloadType::IDr,
            37 => PayloadType::CERT,
            38 => PayloadType::CERTREQ,
            39 => PayloadType::AUTH,
            40 => PayloadType::Nonce,
            41 => PayloadType::N,
            42 => PayloadType::D,
            43 => PayloadType::V,
            44 => PayloadType::TSi,
            45 => PayloadType::TSr,
            46 => PayloadType::SK,
            47 => PayloadType::CP,
            48 => PayloadType::EAP,
            53 => PayloadType::SKF,
            other => PayloadType::Unknown(other),
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        match self {
            PayloadType::None => 0,
            PayloadType::SA => 33,
            PayloadType::KE => 34,
            PayloadType::IDi => 35,
            PayloadType::IDr => 36,
            PayloadType::CERT => 37,
            PayloadType::CERTREQ => 38,
            PayloadType::AUTH => 39,
            PayloadType::Nonce => 40,
            PayloadType::N => 41,
            PayloadType::D => 42,
            PayloadType::V => 43,
            PayloadType::TSi => 44,
            PayloadType::TSr => 45,
            PayloadType::SK => 46,
            PayloadType::CP => 47,
            PayloadType::EAP => 48,
            PayloadType::SKF => 53,
            PayloadType::Unknown(value) => value,
        }
    }

    /// True for SK and SKF
    pub fn is_encrypted(self) -> bool {
        matches!(self, PayloadType::SK | PayloadType::SKF)
    }
}

/// Notify Message Types (RFC 7296 Section 3.10.1, RFC 7383 Section 2.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifyType(pub u16);

impl NotifyType {
    /// UNSUPPORTED_CRITICAL_PAYLOAD
    pub const UNSUPPORTED_CRITICAL_PAYLOAD: NotifyType = NotifyType(1);
    /// INVALID_IKE_SPI
    pub const INVALID_IKE_SPI: NotifyType = NotifyType(4);
    /// INVALID_MAJOR_VERSION
    pub const INVALID_MAJOR_VERSION: NotifyType = NotifyType(5);
    /// INVALID_SYNTAX
    pub const INVALID_SYNTAX: NotifyType = NotifyType(7);
    /// INVALID_MESSAGE_ID
    pub const INVALID_MESSAGE_ID: NotifyType = NotifyType(9);
    /// INVALID_SPI
    pub const INVALID_SPI: NotifyType = NotifyType(11);
    /// NO_PROPOSAL_CHOSEN
    pub const NO_PROPOSAL_CHOSEN: NotifyType = NotifyType(14);
    /// INVALID_KE_PAYLOAD
    pub const INVALID_KE_PAYLOAD: NotifyType = NotifyType(17);
    /// AUTHENTICATION_FAILED
    pub const AUTHENTICATION_FAILED: NotifyType = NotifyType(24);
    /// TS_UNACCEPTABLE
    pub const TS_UNACCEPTABLE: NotifyType = NotifyType(38);
    /// TEMPORARY_FAILURE
    pub const TEMPORARY_FAILURE: NotifyType = NotifyType(43);
    /// CHILD_SA_NOT_FOUND
    pub const CHILD_SA_NOT_FOUND: NotifyType = NotifyType(44);
    /// INITIAL_CONTACT
    pub const INITIAL_CONTACT: NotifyType = NotifyType(16384);
    /// NAT_DETECTION_SOURCE_IP
    pub const NAT_DETECTION_SOURCE_IP: NotifyType = NotifyType(16388);
    /// NAT_DETECTION_DESTINATION_IP
    pub const NAT_DETECTION_DESTINATION_IP: NotifyType = NotifyType(16389);
    /// COOKIE
    pub const COOKIE: NotifyType = NotifyType(16390);
    /// USE_TRANSPORT_MODE
    pub const USE_TRANSPORT_MODE: NotifyType = NotifyType(16391);
    /// REKEY_SA
    pub const REKEY_SA: NotifyType = NotifyType(16393);
    /// IKEV2_FRAGMENTATION_SUPPORTED
    pub const IKEV2_FRAGMENTATION_SUPPORTED: NotifyType = NotifyType(16430);
    /// SIGNATURE_HASH_ALGORITHMS
    pub const SIGNATURE_HASH_ALGORITHMS: NotifyType = NotifyType(16431);

    /// Error types occupy 1..=16383, status types 16384 and up
    pub fn is_error(self) -> bool {
        self.0 > 0 && self.0 < 16384
    }

    /// Get raw value
    pub fn value(self) -> u16 {
        self.0
    }
}

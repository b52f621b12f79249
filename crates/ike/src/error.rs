//! Error types for IKEv2 message processing
//!
//! This module defines a unified error type for the message layer:
//! payload codec, encrypted envelope, fragmentation and SA negotiation.

use std::fmt;

/// Result type for IKEv2 message operations
pub type Result<T> = std::result::Result<T, Error>;

/// IKEv2 message layer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed structure (bad lengths, wrong proposal counts, SPI mismatches)
    InvalidSyntax(String),

    /// One or more critical payloads of unknown type were found in the chain
    UnsupportedCriticalPayload(Vec<u8>),

    /// Checksum or authentication tag mismatch, or decryption failure
    SecurityVerification(String),

    /// The negotiated proposal is not acceptable
    NoValidProposalChosen(String),

    /// Message ID does not match the expected sequence
    InvalidMessageId {
        /// Expected message ID
        expected: u32,
        /// Received message ID
        received: u32,
    },

    /// Unsupported protocol version
    UnsupportedVersion(u8),

    /// Invalid length field
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Buffer too short for operation
    BufferTooShort {
        /// Required length
        required: usize,
        /// Available length
        available: usize,
    },

    /// Message too large
    MessageTooLarge(usize),

    /// Cryptographic provider failure (not an integrity failure)
    CryptoError(String),

    /// Key has the wrong length for the algorithm
    InvalidKeyLength {
        /// Expected key length
        expected: usize,
        /// Actual key length
        actual: usize,
    },

    /// IV has the wrong length for the algorithm
    InvalidIvLength {
        /// Expected IV length
        expected: usize,
        /// Actual IV length
        actual: usize,
    },

    /// Invalid configuration or argument
    InvalidParameter(String),

    /// No SPI could be allocated
    SpiUnavailable(String),

    /// Operation not valid in the current state
    InvalidState(String),
}

/// Notify error type: UNSUPPORTED_CRITICAL_PAYLOAD
const NOTIFY_UNSUPPORTED_CRITICAL_PAYLOAD: u16 = 1;
/// Notify error type: INVALID_SYNTAX
const NOTIFY_INVALID_SYNTAX: u16 = 7;
/// Notify error type: INVALID_MESSAGE_ID
const NOTIFY_INVALID_MESSAGE_ID: u16 = 9;
/// Notify error type: NO_PROPOSAL_CHOSEN
const NOTIFY_NO_PROPOSAL_CHOSEN: u16 = 14;

impl Error {
    /// Shorthand for [`Error::InvalidSyntax`]
    pub fn syntax(msg: impl Into<String>) -> Self {
        Error::InvalidSyntax(msg.into())
    }

    /// Shorthand for [`Error::NoValidProposalChosen`]
    pub fn no_proposal(msg: impl Into<String>) -> Self {
        Error::NoValidProposalChosen(msg.into())
    }

    /// Returns true for every structural decode failure
    pub fn is_syntax_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidSyntax(_)
                | Error::InvalidLength { .. }
                | Error::BufferTooShort { .. }
                | Error::MessageTooLarge(_)
                | Error::UnsupportedVersion(_)
        )
    }

    /// IKEv2 error notify type a peer should be told about, if any
    ///
    /// Integrity failures map to `None`: such messages are dropped silently.
    pub fn notify_type(&self) -> Option<u16> {
        match self {
            Error::UnsupportedCriticalPayload(_) => Some(NOTIFY_UNSUPPORTED_CRITICAL_PAYLOAD),
            Error::InvalidMessageId { .. } => Some(NOTIFY_INVALID_MESSAGE_ID),
            Error::NoValidProposalChosen(_) => Some(NOTIFY_NO_PROPOSAL_CHOSEN),
            e if e.is_syntax_error() => Some(NOTIFY_INVALID_SYNTAX),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidSyntax(msg) => write!(f, "Invalid syntax: {}", msg),
            Error::UnsupportedCriticalPayload(types) => {
                write!(f, "Unsupported critical payload types: {:?}", types)
            }
            Error::SecurityVerification(msg) => {
                write!(f, "Security verification failed: {}", msg)
            }
            Error::NoValidProposalChosen(msg) => {
                write!(f, "No valid proposal chosen: {}", msg)
            }
            Error::InvalidMessageId { expected, received } => {
                write!(
                    f,
                    "Invalid message ID: expected {}, received {}",
                    expected, received
                )
            }
            Error::UnsupportedVersion(v) => {
                write!(f, "Unsupported IKE version: 0x{:02x}", v)
            }
            Error::InvalidLength { expected, actual } => {
                write!(f, "Invalid length: expected {}, got {}", expected, actual)
            }
            Error::BufferTooShort {
                required,
                available,
            } => {
                write!(
                    f,
                    "Buffer too short: need {} bytes, have {}",
                    required, available
                )
            }
            Error::MessageTooLarge(size) => {
                write!(f, "IKE message too large: {} bytes", size)
            }
            Error::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            Error::InvalidKeyLength { expected, actual } => {
                write!(f, "Invalid key length: expected {}, got {}", expected, actual)
            }
            Error::InvalidIvLength { expected, actual } => {
                write!(f, "Invalid IV length: expected {}, got {}", expected, actual)
            }
            Error::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            Error::SpiUnavailable(msg) => write!(f, "SPI unavailable: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

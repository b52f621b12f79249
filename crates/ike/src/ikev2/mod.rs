//! IKEv2 message layer
//!
//! Everything between raw datagram bytes and typed payloads:
//!
//! ```text
//! bytes -> header + payload chain (message)
//!       -> SK/SKF body verify + decrypt (encrypted)
//!       -> fragment reassembly (fragment)
//!       -> inner payload chain (message)
//!       -> SA payload -> proposal negotiation (negotiation)
//! ```
//!
//! [`protected`] runs the inbound and outbound pipelines end to end.
//!
//! # References
//!
//! - [RFC 7296](https://datatracker.ietf.org/doc/html/rfc7296) - IKEv2 Protocol
//! - [RFC 7383](https://datatracker.ietf.org/doc/html/rfc7383) - IKEv2 Message Fragmentation
//! - [RFC 5282](https://datatracker.ietf.org/doc/html/rfc5282) - Authenticated Encryption in IKEv2

pub mod constants;
pub mod encrypted;
pub mod fragment;
pub mod message;
pub mod negotiation;
pub mod payload;
pub mod proposal;
pub mod protected;

mod wire;

pub use constants::{ExchangeType, IkeFlags, NotifyType, PayloadType};
pub use fragment::{FragmentKey, FragmentOutcome, FragmentStore, ReassemblyPhase, ReassemblyState};
pub use message::{IkeHeader, IkeMessage};
pub use negotiation::{build_request, select_proposal, validate_response, NegotiatedSa, OfferedSa};
pub use payload::{IkePayload, SaPayload};
pub use proposal::{Proposal, ProtocolId, Transform, TransformType};
pub use protected::{decode_message, encode_message, DecodeResult, DecodedMessage};

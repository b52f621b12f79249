//! IKEv2 message structures and parsing
//!
//! Implements the IKE message format defined in RFC 7296 Section 3.1 and the
//! generic payload chain that follows the header.

use bytes::{BufMut, BytesMut};

use super::constants::*;
use super::payload::{IkePayload, PayloadHeader};
use crate::logging;
use crate::{Error, Result};

/// IKE message header (28 bytes)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       IKE SA Initiator's SPI                  |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       IKE SA Responder's SPI                  |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Next Payload | MjVer | MnVer | Exchange Type |     Flags     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          Message ID                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            Length                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IkeHeader {
    /// Initiator's Security Parameter Index (8 bytes)
    pub initiator_spi: [u8; 8],

    /// Responder's Security Parameter Index (8 bytes, zero for IKE_SA_INIT request)
    pub responder_spi: [u8; 8],

    /// Next payload type
    pub next_payload: PayloadType,

    /// Protocol version (must be 0x20 for IKEv2)
    pub version: u8,

    /// Exchange type
    pub exchange_type: ExchangeType,

    /// Message flags
    pub flags: IkeFlags,

    /// Message ID (used for replay protection and matching)
    pub message_id: u32,

    /// Total message length in bytes (including header)
    pub length: u32,
}

impl IkeHeader {
    /// Create a new IKE header
    ///
    /// `next_payload` and `length` are rewritten by the encoders.
    pub fn new(
        initiator_spi: [u8; 8],
        responder_spi: [u8; 8],
        exchange_type: ExchangeType,
        flags: IkeFlags,
        message_id: u32,
    ) -> Self {
        IkeHeader {
            initiator_spi,
            responder_spi,
            next_payload: PayloadType::None,
            version: IKE_VERSION,
            exchange_type,
            flags,
            message_id,
            length: IKE_HEADER_SIZE as u32,
        }
    }

    /// Parse IKE header from bytes
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Buffer is too short (< 28 bytes)
    /// - Protocol version is not 0x20
    /// - Exchange type is unknown
    /// - Message length is out of range
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < IKE_HEADER_SIZE {
            return Err(Error::BufferTooShort {
                required: IKE_HEADER_SIZE,
                available: data.len(),
            });
        }

        let mut initiator_spi = [0u8; 8];
        let mut responder_spi = [0u8; 8];
        initiator_spi.copy_from_slice(&data[0..8]);
        responder_spi.copy_from_slice(&data[8..16]);

        let next_payload = PayloadType::from_u8(data[16]);

        // Only the major version is checked; minor versions are ignored
        let version = data[17];
        if version & 0xf0 != IKE_VERSION & 0xf0 {
            return Err(Error::UnsupportedVersion(version));
        }

        let exchange_type = ExchangeType::from_u8(data[18])
            .ok_or_else(|| Error::syntax(format!("Unknown exchange type: {}", data[18])))?;

        let flags = IkeFlags::new(data[19]);
        let message_id = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
        let length = u32::from_be_bytes([data[24], data[25], data[26], data[27]]);

        if length as usize > MAX_IKE_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge(length as usize));
        }

        if (length as usize) < IKE_HEADER_SIZE {
            return Err(Error::InvalidLength {
                expected: IKE_HEADER_SIZE,
                actual: length as usize,
            });
        }

        Ok(IkeHeader {
            initiator_spi,
            responder_spi,
            next_payload,
            version,
            exchange_type,
            flags,
            message_id,
            length,
        })
    }

    /// Serialize IKE header to bytes
    pub fn to_bytes(&self) -> [u8; IKE_HEADER_SIZE] {
        let mut bytes = [0u8; IKE_HEADER_SIZE];
        bytes[0..8].copy_from_slice(&self.initiator_spi);
        bytes[8..16].copy_from_slice(&self.responder_spi);
        bytes[16] = self.next_payload.to_u8();
        bytes[17] = self.version;
        bytes[18] = self.exchange_type.to_u8();
        bytes[19] = self.flags.value();
        bytes[20..24].copy_from_slice(&self.message_id.to_be_bytes());
        bytes[24..28].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }

    /// Copy of this header with a different next payload and total length
    pub fn with_chain(&self, next_payload: PayloadType, length: usize) -> Self {
        IkeHeader {
            next_payload,
            length: length as u32,
            ..self.clone()
        }
    }

    /// Check if this header belongs to a response
    pub fn is_response(&self) -> bool {
        self.flags.is_response()
    }
}

/// A complete IKE message: header plus an ordered payload chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IkeMessage {
    /// Message header
    pub header: IkeHeader,
    /// Payloads in wire order
    pub payloads: Vec<IkePayload>,
}

impl IkeMessage {
    /// Create a message
    pub fn new(header: IkeHeader, payloads: Vec<IkePayload>) -> Self {
        IkeMessage { header, payloads }
    }

    /// Decode a message, verifying that the header length covers the
    /// buffer exactly
    ///
    /// SK and SKF payloads are returned still protected; see
    /// [`crate::ikev2::protected`] for the verifying pipeline.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = IkeHeader::from_bytes(data)?;
        if header.length as usize != data.len() {
            return Err(Error::InvalidLength {
                expected: header.length as usize,
                actual: data.len(),
            });
        }

        let payloads = decode_payload_chain(
            header.next_payload,
            &data[IKE_HEADER_SIZE..],
            header.is_response(),
        )?;
        logging::log_message_decoded(&header.initiator_spi, header.message_id, payloads.len());

        Ok(IkeMessage { header, payloads })
    }

    /// Encode the message, filling in the next-payload links and the total
    /// length
    pub fn encode(&self) -> Result<Vec<u8>> {
        let chain = encode_payload_chain(&self.payloads)?;
        let total = IKE_HEADER_SIZE + chain.len();
        if total > MAX_IKE_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge(total));
        }

        let first = self
            .payloads
            .first()
            .map(IkePayload::payload_type)
            .unwrap_or(PayloadType::None);
        let header = self.header.with_chain(first, total);

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&chain);
        logging::log_message_encoded(&header.initiator_spi, header.message_id, total);
        Ok(out)
    }

    /// The trailing SK or SKF payload, if any
    pub fn encrypted_payload(&self) -> Option<&IkePayload> {
        self.payloads
            .last()
            .filter(|p| p.payload_type().is_encrypted())
    }
}

/// Decode a payload chain starting with `first`
///
/// Unknown payloads without the critical bit become
/// [`IkePayload::Unsupported`] placeholders and the chain continues. Unknown
/// critical payloads are collected and reported together once the whole
/// chain has been scanned. An SK or SKF payload ends the chain and must be
/// the last thing in `data`.
pub fn decode_payload_chain(
    first: PayloadType,
    data: &[u8],
    is_response: bool,
) -> Result<Vec<IkePayload>> {
    let mut payloads = Vec::new();
    let mut unsupported_critical = Vec::new();
    let mut next = first;
    let mut offset = 0;

    while next != PayloadType::None {
        if offset >= data.len() {
            return Err(Error::syntax(format!(
                "Payload chain ends before {:?} payload",
                next
            )));
        }

        let header = PayloadHeader::from_bytes(&data[offset..])?;
        let end = offset + header.length as usize;
        if end > data.len() {
            return Err(Error::syntax(format!(
                "{:?} payload length {} overruns message",
                next, header.length
            )));
        }

        let body = &data[offset + PayloadHeader::SIZE..end];
        let payload = IkePayload::decode(next, &header, body, is_response)?;
        offset = end;

        if let IkePayload::Unsupported {
            payload_type,
            critical: true,
            ..
        } = &payload
        {
            unsupported_critical.push(payload_type.to_u8());
        }

        if next.is_encrypted() {
            if offset != data.len() {
                return Err(Error::syntax(format!(
                    "{:?} payload is not the last payload",
                    next
                )));
            }
            payloads.push(payload);
            break;
        }

        next = header.next_payload;
        payloads.push(payload);
    }

    if offset != data.len() {
        return Err(Error::syntax(format!(
            "{} trailing bytes after payload chain",
            data.len() - offset
        )));
    }

    if !unsupported_critical.is_empty() {
        logging::log_unsupported_critical_payloads(&unsupported_critical);
        return Err(Error::UnsupportedCriticalPayload(unsupported_critical));
    }

    Ok(payloads)
}

/// Encode a payload chain
///
/// Each generic header's next-payload field names the following payload, or
/// NO_NEXT for the last one. SK/SKF payloads instead carry the type of their
/// first inner payload and must come last.
pub fn encode_payload_chain(payloads: &[IkePayload]) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();

    for (i, payload) in payloads.iter().enumerate() {
        let is_last = i + 1 == payloads.len();
        let next = match payload.inner_next_payload() {
            Some(_) if !is_last => {
                return Err(Error::InvalidParameter(format!(
                    "{:?} payload must be the last payload",
                    payload.payload_type()
                )))
            }
            Some(inner) => inner,
            None => payloads
                .get(i + 1)
                .map(IkePayload::payload_type)
                .unwrap_or(PayloadType::None),
        };

        let body = payload.to_payload_data()?;
        let length = PayloadHeader::SIZE + body.len();
        if length > u16::MAX as usize {
            return Err(Error::MessageTooLarge(length));
        }

        buf.put_u8(next.to_u8());
        buf.put_u8(if payload.is_critical() {
            PayloadHeader::CRITICAL
        } else {
            0
        });
        buf.put_u16(length as u16);
        buf.put_slice(&body);
    }

    Ok(buf.to_vec())
}

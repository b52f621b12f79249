//! Security Parameter Index allocation
//!
//! The negotiation engine reserves SPIs before offering or accepting a
//! proposal and hands unselected ones back afterwards. Allocation itself is
//! an external concern expressed by [`SpiAllocator`]; [`InMemorySpiAllocator`]
//! is a process-local implementation suitable for a single IKE daemon and for
//! tests.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use parking_lot::Mutex;
use rand::Rng;

use crate::ikev2::proposal::ProtocolId;
use crate::logging;
use crate::{Error, Result};

/// SPI value as carried in a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spi {
    /// 64-bit IKE SA SPI
    Ike(u64),
    /// 32-bit ESP/AH SPI
    Ipsec(u32),
}

impl Spi {
    /// Wire size in bytes
    pub fn size(self) -> usize {
        match self {
            Spi::Ike(_) => 8,
            Spi::Ipsec(_) => 4,
        }
    }

    /// Big-endian wire encoding
    pub fn to_bytes(self) -> Vec<u8> {
        match self {
            Spi::Ike(v) => v.to_be_bytes().to_vec(),
            Spi::Ipsec(v) => v.to_be_bytes().to_vec(),
        }
    }

    /// Wire size a proposal for `protocol` must use when it carries an SPI
    pub fn size_for(protocol: ProtocolId) -> usize {
        match protocol {
            ProtocolId::Ike => 8,
            ProtocolId::Ah | ProtocolId::Esp => 4,
        }
    }
}

impl fmt::Display for Spi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Spi::Ike(v) => write!(f, "{:016x}", v),
            Spi::Ipsec(v) => write!(f, "{:08x}", v),
        }
    }
}

/// A reserved SPI, owned by whoever allocated it until released
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpiHandle {
    /// Protocol the SPI was reserved for
    pub protocol: ProtocolId,
    /// Local address the SPI is unique under
    pub local_address: IpAddr,
    /// The SPI value
    pub spi: Spi,
}

/// Source of locally unique SPIs
///
/// Implementations must be safe to share between sessions; atomicity of
/// allocate/release is their responsibility.
pub trait SpiAllocator: Send + Sync {
    /// Reserve a fresh SPI for `protocol` under `local_address`
    fn allocate(&self, protocol: ProtocolId, local_address: IpAddr) -> Result<SpiHandle>;

    /// Return a previously reserved SPI; unknown handles are ignored
    fn release(&self, handle: &SpiHandle);
}

/// Random SPI allocator backed by an in-process reservation set
#[derive(Debug)]
pub struct InMemorySpiAllocator {
    reserved: Mutex<HashSet<(IpAddr, Spi)>>,
    max_attempts: usize,
}

impl InMemorySpiAllocator {
    /// Default number of random draws before giving up
    pub const DEFAULT_MAX_ATTEMPTS: usize = 64;

    /// IPsec SPIs 1-255 are reserved by IANA
    const MIN_IPSEC_SPI: u32 = 256;

    /// Create an empty allocator
    pub fn new() -> Self {
        InMemorySpiAllocator {
            reserved: Mutex::new(HashSet::new()),
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Number of SPIs currently reserved
    pub fn reserved_count(&self) -> usize {
        self.reserved.lock().len()
    }

    /// Check whether `spi` is reserved under `local_address`
    pub fn is_reserved(&self, local_address: IpAddr, spi: Spi) -> bool {
        self.reserved.lock().contains(&(local_address, spi))
    }

    fn random_spi(protocol: ProtocolId) -> Spi {
        let mut rng = rand::thread_rng();
        match protocol {
            ProtocolId::Ike => Spi::Ike(rng.gen_range(1..=u64::MAX)),
            ProtocolId::Ah | ProtocolId::Esp => {
                Spi::Ipsec(rng.gen_range(Self::MIN_IPSEC_SPI..=u32::MAX))
            }
        }
    }
}

impl Default for InMemorySpiAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiAllocator for InMemorySpiAllocator {
    fn allocate(&self, protocol: ProtocolId, local_address: IpAddr) -> Result<SpiHandle> {
        let mut reserved = self.reserved.lock();
        for _ in 0..self.max_attempts {
            let spi = Self::random_spi(protocol);
            if reserved.insert((local_address, spi)) {
                logging::log_spi_allocated(protocol, &local_address, spi);
                return Ok(SpiHandle {
                    protocol,
                    local_address,
                    spi,
                });
            }
        }

        Err(Error::SpiUnavailable(format!(
            "no free {:?} SPI for {} after {} attempts",
            protocol, local_address, self.max_attempts
        )))
    }

    fn release(&self, handle: &SpiHandle) {
        if self
            .reserved
            .lock()
            .remove(&(handle.local_address, handle.spi))
        {
            logging::log_spi_released(handle.protocol, &handle.local_address, handle.spi);
        }
    }
}

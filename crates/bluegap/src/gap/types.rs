use crate::error::GapError;
use crate::gap::constants::*;
use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;

/// Link role on an LE connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Central,
    Peripheral,
}

impl Role {
    /// Role byte of the LE Connection Complete event
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Role::Central),
            0x01 => Some(Role::Peripheral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressType {
    Public,
    Random,
    PublicIdentity,
    RandomIdentity,
}

impl From<u8> for AddressType {
    fn from(value: u8) -> Self {
        match value {
            PUBLIC_DEVICE_ADDRESS => AddressType::Public,
            RANDOM_DEVICE_ADDRESS => AddressType::Random,
            PUBLIC_IDENTITY_ADDRESS => AddressType::PublicIdentity,
            RANDOM_IDENTITY_ADDRESS => AddressType::RandomIdentity,
            _ => AddressType::Public,
        }
    }
}

impl From<AddressType> for u8 {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::Public => PUBLIC_DEVICE_ADDRESS,
            AddressType::Random => RANDOM_DEVICE_ADDRESS,
            AddressType::PublicIdentity => PUBLIC_IDENTITY_ADDRESS,
            AddressType::RandomIdentity => RANDOM_IDENTITY_ADDRESS,
        }
    }
}

/// Bluetooth device address, stored little-endian as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() >= 6 {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&slice[0..6]);
            Some(Self { bytes })
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// True when the two most significant bits mark a resolvable private address
    pub fn is_resolvable_private(&self) -> bool {
        self.bytes[5] & RANDOM_ADDRESS_TYPE_MASK == RESOLVABLE_PRIVATE_ADDRESS
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

impl FromStr for BdAddr {
    type Err = GapError;

    /// Parses the `XX:XX:XX:XX:XX:XX` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GapError::InvalidParameter(format!("malformed address: {s}"));
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 || parts.iter().any(|part| part.len() != 2) {
            return Err(invalid());
        }
        let mut bytes = hex::decode(parts.concat()).map_err(|_| invalid())?;
        bytes.reverse();
        BdAddr::from_slice(&bytes).ok_or_else(invalid)
    }
}

/// Device address together with its type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub addr: BdAddr,
    pub kind: AddressType,
}

impl Address {
    pub fn new(addr: BdAddr, kind: AddressType) -> Self {
        Self { addr, kind }
    }

    pub fn public(addr: BdAddr) -> Self {
        Self::new(addr, AddressType::Public)
    }

    /// Random address whose sub-type marks it resolvable
    pub fn is_resolvable_private(&self) -> bool {
        self.kind == AddressType::Random && self.addr.is_resolvable_private()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.addr, self.kind)
    }
}

/// Transport a link or request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Classic,
    Le,
}

/// Direction of the profile connection a security request guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Protocol multiplexing layer a service listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    /// Channel is a PSM
    L2cap,
    /// Channel is a server channel number
    Rfcomm,
}

/// Profile service identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(pub u16);

impl ServiceId {
    /// GAP itself, used for dedicated bonding
    pub const GAP: ServiceId = ServiceId(SERVICE_ID_GAP);
    /// Matches any service
    pub const UNKNOWN: ServiceId = ServiceId(SERVICE_ID_UNKNOWN);

    /// Equal, or either side is the wildcard
    pub fn matches(&self, other: &ServiceId) -> bool {
        self == other || *self == Self::UNKNOWN || *other == Self::UNKNOWN
    }
}

/// Identifies the profile channel a security decision applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceInfo {
    pub service: ServiceId,
    pub direction: Direction,
    pub protocol: Protocol,
    pub channel: u16,
}

impl ServiceInfo {
    pub fn new(service: ServiceId, direction: Direction, protocol: Protocol, channel: u16) -> Self {
        Self {
            service,
            direction,
            protocol,
            channel,
        }
    }

    /// Registration matching rule: same direction, protocol and channel,
    /// and compatible service ids.
    pub fn matches(&self, other: &ServiceInfo) -> bool {
        self.direction == other.direction
            && self.protocol == other.protocol
            && self.channel == other.channel
            && self.service.matches(&other.service)
    }
}

bitflags! {
    /// Per-service security requirements
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SecurityModeFlags: u16 {
        const OUT_AUTHENTICATION = 0x0001;
        const OUT_ENCRYPTION = 0x0002;
        const IN_AUTHENTICATION = 0x0004;
        const IN_ENCRYPTION = 0x0008;
        const IN_AUTHORIZATION = 0x0010;
        const MITM = 0x0020;
    }
}

/// Classic security mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    /// Service-level enforcement
    Mode2,
    /// Link-level enforcement with Secure Simple Pairing
    Mode4,
}

impl SecurityMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            2 => Some(SecurityMode::Mode2),
            4 => Some(SecurityMode::Mode4),
            _ => None,
        }
    }
}

/// Terminal outcome delivered to a security callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityResult {
    Success,
    /// No matching registration, a rejected authorization, or a MITM shortfall
    Failed,
    /// Encrypt-wait or retry budget expired
    Timeout,
    /// Negative completion or disconnect reason from the controller
    Controller(u8),
    /// Nothing registered that could drive the procedure
    NotSupported,
}

impl SecurityResult {
    pub fn is_success(&self) -> bool {
        *self == SecurityResult::Success
    }
}

impl fmt::Display for SecurityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityResult::Success => write!(f, "success"),
            SecurityResult::Failed => write!(f, "failed"),
            SecurityResult::Timeout => write!(f, "timeout"),
            SecurityResult::Controller(status) => write!(f, "controller status 0x{:02X}", status),
            SecurityResult::NotSupported => write!(f, "not supported"),
        }
    }
}

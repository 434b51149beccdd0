//! Type definitions shared with the LE pairing engine
use super::constants::*;
use super::keys::{ConnectionSignatureResolvingKey, IdentityResolvingKey, LongTermKey};
use crate::gap::{Address, BdAddr};
use bitflags::bitflags;
use std::fmt;

/// IO Capability types for pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCapability {
    /// Display only capability
    DisplayOnly,
    /// Display with yes/no capability
    DisplayYesNo,
    /// Keyboard only
    KeyboardOnly,
    /// No input, no output
    NoInputNoOutput,
    /// Both keyboard and display
    KeyboardDisplay,
}

impl IoCapability {
    /// Convert to u8 value for protocol
    pub fn to_u8(&self) -> u8 {
        match self {
            IoCapability::DisplayOnly => SMP_IO_CAPABILITY_DISPLAY_ONLY,
            IoCapability::DisplayYesNo => SMP_IO_CAPABILITY_DISPLAY_YES_NO,
            IoCapability::KeyboardOnly => SMP_IO_CAPABILITY_KEYBOARD_ONLY,
            IoCapability::NoInputNoOutput => SMP_IO_CAPABILITY_NO_INPUT_NO_OUTPUT,
            IoCapability::KeyboardDisplay => SMP_IO_CAPABILITY_KEYBOARD_DISPLAY,
        }
    }

    /// Convert from u8 value from protocol
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            SMP_IO_CAPABILITY_DISPLAY_ONLY => Some(IoCapability::DisplayOnly),
            SMP_IO_CAPABILITY_DISPLAY_YES_NO => Some(IoCapability::DisplayYesNo),
            SMP_IO_CAPABILITY_KEYBOARD_ONLY => Some(IoCapability::KeyboardOnly),
            SMP_IO_CAPABILITY_NO_INPUT_NO_OUTPUT => Some(IoCapability::NoInputNoOutput),
            SMP_IO_CAPABILITY_KEYBOARD_DISPLAY => Some(IoCapability::KeyboardDisplay),
            _ => None,
        }
    }
}

impl fmt::Display for IoCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoCapability::DisplayOnly => write!(f, "Display Only"),
            IoCapability::DisplayYesNo => write!(f, "Display Yes/No"),
            IoCapability::KeyboardOnly => write!(f, "Keyboard Only"),
            IoCapability::NoInputNoOutput => write!(f, "No Input No Output"),
            IoCapability::KeyboardDisplay => write!(f, "Keyboard Display"),
        }
    }
}

/// Pairing method negotiated by the pairing engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairMethod {
    JustWorks,
    PasskeyDisplay,
    PasskeyEntry,
    NumericComparison,
    OobLegacy,
    OobScLocalSendPeerRecv,
    OobScLocalRecvPeerSend,
    OobScBothSendRecv,
}

impl PairMethod {
    pub fn to_u8(&self) -> u8 {
        match self {
            PairMethod::JustWorks => SMP_PAIR_METHOD_JUST_WORKS,
            PairMethod::PasskeyDisplay => SMP_PAIR_METHOD_PASSKEY_DISPLAY,
            PairMethod::PasskeyEntry => SMP_PAIR_METHOD_PASSKEY_ENTRY,
            PairMethod::NumericComparison => SMP_PAIR_METHOD_NUMERIC_COMPARISON,
            PairMethod::OobLegacy => SMP_PAIR_METHOD_OOB_LEGACY,
            PairMethod::OobScLocalSendPeerRecv => SMP_PAIR_METHOD_OOB_SC_LOCAL_SEND_PEER_RECV,
            PairMethod::OobScLocalRecvPeerSend => SMP_PAIR_METHOD_OOB_SC_LOCAL_RECV_PEER_SEND,
            PairMethod::OobScBothSendRecv => SMP_PAIR_METHOD_OOB_SC_BOTH_SEND_RECV,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            SMP_PAIR_METHOD_JUST_WORKS => Some(PairMethod::JustWorks),
            SMP_PAIR_METHOD_PASSKEY_DISPLAY => Some(PairMethod::PasskeyDisplay),
            SMP_PAIR_METHOD_PASSKEY_ENTRY => Some(PairMethod::PasskeyEntry),
            SMP_PAIR_METHOD_NUMERIC_COMPARISON => Some(PairMethod::NumericComparison),
            SMP_PAIR_METHOD_OOB_LEGACY => Some(PairMethod::OobLegacy),
            SMP_PAIR_METHOD_OOB_SC_LOCAL_SEND_PEER_RECV => Some(PairMethod::OobScLocalSendPeerRecv),
            SMP_PAIR_METHOD_OOB_SC_LOCAL_RECV_PEER_SEND => Some(PairMethod::OobScLocalRecvPeerSend),
            SMP_PAIR_METHOD_OOB_SC_BOTH_SEND_RECV => Some(PairMethod::OobScBothSendRecv),
            _ => None,
        }
    }

    /// Secure connections out-of-band variants
    pub fn is_sc_oob(&self) -> bool {
        matches!(
            self,
            PairMethod::OobScLocalSendPeerRecv
                | PairMethod::OobScLocalRecvPeerSend
                | PairMethod::OobScBothSendRecv
        )
    }
}

impl fmt::Display for PairMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairMethod::JustWorks => write!(f, "Just Works"),
            PairMethod::PasskeyDisplay => write!(f, "Passkey Display"),
            PairMethod::PasskeyEntry => write!(f, "Passkey Entry"),
            PairMethod::NumericComparison => write!(f, "Numeric Comparison"),
            PairMethod::OobLegacy => write!(f, "Legacy Out of Band"),
            PairMethod::OobScLocalSendPeerRecv => write!(f, "SC Out of Band (local sends)"),
            PairMethod::OobScLocalRecvPeerSend => write!(f, "SC Out of Band (peer sends)"),
            PairMethod::OobScBothSendRecv => write!(f, "SC Out of Band (both)"),
        }
    }
}

/// Authentication requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthRequirements {
    /// Whether bonding is required
    pub bonding: bool,
    /// Whether MITM protection is required
    pub mitm: bool,
    /// Whether Secure Connections is required
    pub secure_connections: bool,
    /// Whether keypress notifications are required
    pub keypress_notifications: bool,
}

impl AuthRequirements {
    /// Create new authentication requirements
    pub fn new(bonding: bool, mitm: bool, secure_connections: bool) -> Self {
        Self {
            bonding,
            mitm,
            secure_connections,
            keypress_notifications: false,
        }
    }

    /// Convert to u8 value for protocol
    pub fn to_u8(&self) -> u8 {
        let mut value = 0;

        if self.bonding {
            value |= SMP_AUTH_REQ_BONDING;
        }

        if self.mitm {
            value |= SMP_AUTH_REQ_MITM;
        }

        if self.secure_connections {
            value |= SMP_AUTH_REQ_SC;
        }

        if self.keypress_notifications {
            value |= SMP_AUTH_REQ_KEYPRESS;
        }

        value
    }

    /// Convert from u8 value from protocol
    pub fn from_u8(value: u8) -> Self {
        Self {
            bonding: (value & SMP_AUTH_REQ_BONDING) != 0,
            mitm: (value & SMP_AUTH_REQ_MITM) != 0,
            secure_connections: (value & SMP_AUTH_REQ_SC) != 0,
            keypress_notifications: (value & SMP_AUTH_REQ_KEYPRESS) != 0,
        }
    }
}

bitflags! {
    /// Key distribution bitmap
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeyDistribution: u8 {
        /// Encryption key (LTK, EDIV, RAND)
        const ENC_KEY = SMP_KEY_DIST_ENC_KEY;
        /// Identity key (IRK, identity address)
        const ID_KEY = SMP_KEY_DIST_ID_KEY;
        /// Signing key (CSRK)
        const SIGN_KEY = SMP_KEY_DIST_SIGN_KEY;
        /// Link key derivation
        const LINK_KEY = SMP_KEY_DIST_LINK_KEY;
    }
}

/// SMP OOB (Out of Band) data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OobData {
    /// Random value (r)
    pub r: [u8; 16],
    /// Confirm value (c)
    pub c: [u8; 16],
}

/// Feature exchange parameters of a pairing request or response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingFeatures {
    /// IO Capability
    pub io_capability: IoCapability,
    /// OOB data flag
    pub oob_data_present: bool,
    /// Authentication requirements
    pub auth_req: AuthRequirements,
    /// Maximum encryption key size (7-16)
    pub max_key_size: u8,
    /// Initiator key distribution
    pub initiator_key_dist: KeyDistribution,
    /// Responder key distribution
    pub responder_key_dist: KeyDistribution,
}

impl Default for PairingFeatures {
    fn default() -> Self {
        Self {
            io_capability: IoCapability::NoInputNoOutput,
            oob_data_present: false,
            auth_req: AuthRequirements::new(true, false, true),
            max_key_size: SMP_MAX_ENCRYPTION_KEY_SIZE,
            initiator_key_dist: KeyDistribution::ENC_KEY
                | KeyDistribution::ID_KEY
                | KeyDistribution::SIGN_KEY,
            responder_key_dist: KeyDistribution::ENC_KEY
                | KeyDistribution::ID_KEY
                | KeyDistribution::SIGN_KEY,
        }
    }
}

/// Encryption level of an LE link, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum EncryptionLevel {
    /// Not encrypted
    #[default]
    None,
    /// Encrypted with a key from an unauthenticated pairing
    Unauthenticated,
    /// Encrypted with a key from a MITM-protected pairing
    Authenticated,
}

impl EncryptionLevel {
    pub fn is_encrypted(&self) -> bool {
        *self >= EncryptionLevel::Unauthenticated
    }
}

/// Value carried by a positive reply to an authentication request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationValue {
    /// Just works and numeric comparison confirmations
    Confirm,
    /// Entered or displayed passkey
    Passkey(u32),
    /// Legacy OOB temporary key
    OobKey([u8; 16]),
    /// Peer's secure connections OOB data
    ScOob { peer: BdAddr, data: OobData },
}

/// Key material as reported by the pairing engine for one side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKeySet {
    pub ltk: LongTermKey,
    pub irk: [u8; 16],
    pub identity: Address,
    pub csrk: [u8; 16],
}

/// Keys of one side after filtering by the distribution bitmap
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DistributedKeys {
    pub ltk: Option<LongTermKey>,
    pub irk: Option<IdentityResolvingKey>,
    pub csrk: Option<ConnectionSignatureResolvingKey>,
}

impl DistributedKeys {
    /// Keep only the keys named in `dist`. Signing counters start at zero.
    pub fn from_raw(raw: &RawKeySet, dist: KeyDistribution, authenticated: bool) -> Self {
        Self {
            ltk: dist.contains(KeyDistribution::ENC_KEY).then(|| raw.ltk.clone()),
            irk: dist
                .contains(KeyDistribution::ID_KEY)
                .then(|| IdentityResolvingKey::new(raw.irk, raw.identity)),
            csrk: dist
                .contains(KeyDistribution::SIGN_KEY)
                .then(|| ConnectionSignatureResolvingKey::new(raw.csrk, authenticated)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ltk.is_none() && self.irk.is_none() && self.csrk.is_none()
    }
}

/// Keys exchanged during a pairing
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PairedKeys {
    pub local: DistributedKeys,
    pub remote: DistributedKeys,
}

/// Outcome of a pairing as reported by the pairing engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairResult {
    pub status: u8,
    pub bonded: bool,
    pub authenticated: bool,
    pub key_size: u8,
    pub local_key_dist: KeyDistribution,
    pub peer_key_dist: KeyDistribution,
    pub local_keys: Option<RawKeySet>,
    pub peer_keys: Option<RawKeySet>,
}

impl PairResult {
    /// A failed pairing carrying only its reason
    pub fn failed(status: u8) -> Self {
        Self {
            status,
            bonded: false,
            authenticated: false,
            key_size: 0,
            local_key_dist: KeyDistribution::empty(),
            peer_key_dist: KeyDistribution::empty(),
            local_keys: None,
            peer_keys: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SMP_SUCCESS
    }
}

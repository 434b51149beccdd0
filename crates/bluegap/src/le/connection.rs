//! Per-link LE security state

use super::callbacks::LeSecurityResultCallback;
use crate::gap::registry::LinkEntry;
use crate::gap::{Address, BdAddr, Role, SecurityResult};
use crate::smp::constants::SMP_MIN_ENCRYPTION_KEY_SIZE;
use crate::smp::{EncryptionLevel, PairMethod};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeSecurityStatus {
    Idle,
    /// A pairing is running on the link
    Pair,
}

/// Request for a minimum encryption level on one link
pub struct LeSecurityRequest {
    pub target: EncryptionLevel,
    callback: Option<LeSecurityResultCallback>,
}

impl fmt::Debug for LeSecurityRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeSecurityRequest")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl LeSecurityRequest {
    pub fn new(target: EncryptionLevel, callback: Option<LeSecurityResultCallback>) -> Self {
        Self { target, callback }
    }

    pub fn resolve(mut self, result: SecurityResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

/// Parameters proposed in an L2CAP connection parameter update request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub interval_min: u16,
    pub interval_max: u16,
    pub latency: u16,
    pub timeout: u16,
}

#[derive(Debug)]
pub struct LeConnectionState {
    pub peer: Address,
    pub handle: u16,
    pub role: Role,
    pub encryption_level: EncryptionLevel,
    /// Whether the key in use came from an authenticated pairing
    pub key_authenticated: bool,
    pub security_status: LeSecurityStatus,
    pub is_remote_security_request: bool,
    pub is_local_security_request: bool,
    pub pair_method: Option<PairMethod>,
    pub pending_request: Option<LeSecurityRequest>,
    /// Identifier of a parameter update request waiting for the client
    pub pending_param_update: Option<u8>,
}

impl LeConnectionState {
    pub fn new(peer: Address, handle: u16, role: Role) -> Self {
        Self {
            peer,
            handle,
            role,
            encryption_level: EncryptionLevel::None,
            key_authenticated: false,
            security_status: LeSecurityStatus::Idle,
            is_remote_security_request: false,
            is_local_security_request: false,
            pair_method: None,
            pending_request: None,
            pending_param_update: None,
        }
    }

    /// Level an encryption with the current key reaches
    pub fn key_level(&self) -> EncryptionLevel {
        if self.key_authenticated {
            EncryptionLevel::Authenticated
        } else {
            EncryptionLevel::Unauthenticated
        }
    }

    pub fn target_level(&self) -> EncryptionLevel {
        self.pending_request
            .as_ref()
            .map_or(EncryptionLevel::None, |request| request.target)
    }
}

impl LinkEntry for LeConnectionState {
    fn address(&self) -> BdAddr {
        self.peer.addr
    }

    fn handle(&self) -> u16 {
        self.handle
    }
}

/// Local LE security policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeSecuritySettings {
    pub bondable: bool,
    pub min_key_size: u8,
    /// LE security mode 1 level (1..=4)
    pub mode1_level: u8,
    /// LE security mode 2 level (1..=2)
    pub mode2_level: u8,
}

impl Default for LeSecuritySettings {
    fn default() -> Self {
        Self {
            bondable: false,
            min_key_size: SMP_MIN_ENCRYPTION_KEY_SIZE,
            mode1_level: 1,
            mode2_level: 1,
        }
    }
}

impl LeSecuritySettings {
    /// Whether local policy forbids unauthenticated (just works) pairing
    pub fn requires_authentication(&self) -> bool {
        self.mode1_level >= 3 || self.mode2_level >= 2
    }
}

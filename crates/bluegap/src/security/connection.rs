//! Per-ACL security state

use super::request::RequestId;
use crate::dispatch::TimerId;
use crate::gap::registry::LinkEntry;
use crate::gap::BdAddr;
use crate::hci::constants::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSecurityStatus {
    Idle,
    Action,
    WaitDisconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationStatus {
    Idle,
    Action,
    WaitRetry,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionStatus {
    Idle,
    Action,
}

/// Security bookkeeping for one classic link
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub addr: BdAddr,
    pub handle: u16,
    pub status: DeviceSecurityStatus,
    pub auth_status: AuthenticationStatus,
    pub enc_status: EncryptionStatus,
    pub link_key_type: Option<u8>,
    pub local_io_capability: Option<u8>,
    pub remote_io_capability: Option<u8>,
    pub remote_auth_req: u8,
    pub in_dedicated_bonding: bool,
    pub support_ssp: bool,
    pub is_authenticated: bool,
    pub is_encrypted: bool,
    /// The single request allowed to drive a link action
    pub action_req: Option<RequestId>,
    pub acl_ref_held: bool,
    pub hold_timer: Option<TimerId>,
    pub encrypt_wait_timer: Option<TimerId>,
}

impl ConnectionState {
    pub fn new(addr: BdAddr, handle: u16) -> Self {
        Self {
            addr,
            handle,
            status: DeviceSecurityStatus::Idle,
            auth_status: AuthenticationStatus::Idle,
            enc_status: EncryptionStatus::Idle,
            link_key_type: None,
            local_io_capability: None,
            remote_io_capability: None,
            remote_auth_req: AUTH_REQ_UNKNOWN,
            in_dedicated_bonding: false,
            support_ssp: false,
            is_authenticated: false,
            is_encrypted: false,
            action_req: None,
            acl_ref_held: false,
            hold_timer: None,
            encrypt_wait_timer: None,
        }
    }

    /// Whether the current link key came from a MITM-protected pairing
    pub fn has_authenticated_key(&self) -> bool {
        self.link_key_type.is_some_and(is_authenticated_link_key)
    }

    /// Whether the peer's IO capability response asked for bonding
    pub fn remote_requests_bonding(&self) -> bool {
        !matches!(
            self.remote_auth_req,
            AUTH_REQ_UNKNOWN | AUTH_REQ_NO_MITM_NO_BONDING | AUTH_REQ_MITM_NO_BONDING
        )
    }
}

impl LinkEntry for ConnectionState {
    fn address(&self) -> BdAddr {
        self.addr
    }

    fn handle(&self) -> u16 {
        self.handle
    }
}

/// Link key types produced by an authenticated pairing
pub fn is_authenticated_link_key(key_type: u8) -> bool {
    matches!(
        key_type,
        LINK_KEY_COMBINATION | LINK_KEY_AUTHENTICATED_P192 | LINK_KEY_AUTHENTICATED_P256
    )
}

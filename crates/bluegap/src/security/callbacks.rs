//! Profile-facing capabilities of the classic security engine
//!
//! Methods that correspond to a controller request return `true` when the
//! capability took the request and will answer it later through the matching
//! `GapStack` response call. The default implementations decline, which makes
//! the engine send the negative reply at once, exactly as if no capability
//! were registered.

use crate::gap::{BdAddr, SecurityResult, ServiceInfo};
use crate::smp::IoCapability;

/// Completion of a classic security request
pub type SecurityResultCallback = Box<dyn FnOnce(SecurityResult, ServiceInfo) + Send>;

/// Authorization decisions for incoming connections
pub trait SecurityCallback: Send {
    /// A profile connection from `addr` needs authorization. Answer with
    /// `GapStack::authorize_res`.
    fn authorize_ind(&mut self, _addr: &BdAddr, _service: &ServiceInfo) -> bool {
        false
    }
}

/// User interaction and result reporting for classic pairing
pub trait AuthenticationCallback: Send {
    fn authentication_complete(&mut self, _addr: &BdAddr, _status: u8) {}

    fn io_capability_request(&mut self, _addr: &BdAddr) -> bool {
        false
    }

    fn io_capability_response(&mut self, _addr: &BdAddr, _io_capability: u8) {}

    fn user_confirm_request(&mut self, _addr: &BdAddr, _numeric_value: u32) -> bool {
        false
    }

    fn user_passkey_request(&mut self, _addr: &BdAddr) -> bool {
        false
    }

    fn user_passkey_notification(&mut self, _addr: &BdAddr, _passkey: u32) {}

    fn remote_oob_request(&mut self, _addr: &BdAddr) -> bool {
        false
    }

    fn pin_code_request(&mut self, _addr: &BdAddr) -> bool {
        false
    }

    fn link_key_request(&mut self, _addr: &BdAddr) -> bool {
        false
    }

    fn link_key_notification(&mut self, _addr: &BdAddr, _link_key: &[u8; 16], _key_type: u8) {}

    fn simple_pairing_complete(&mut self, _addr: &BdAddr, _status: u8) {}

    fn encryption_change(&mut self, _addr: &BdAddr, _enabled: bool) {}
}

/// IO capability answer given by a profile client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoCapabilityReply {
    pub io_capability: IoCapability,
    pub oob_data_present: bool,
    /// `MITM_REQUIRED` or `MITM_NOT_REQUIRED`
    pub mitm: u8,
}

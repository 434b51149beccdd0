//! Capabilities registered by LE clients
//!
//! As on the classic side, request methods return `true` when the client will
//! answer through the matching `GapStack` call; declining makes the engine
//! reject on the client's behalf.

use super::connection::ConnectionParameters;
use super::signature::SignCounterKind;
use crate::gap::{Address, SecurityResult};
use crate::hci::LeAdvertisingReport;
use crate::smp::{OobData, PairMethod, PairedKeys};

/// Completion of an LE security request
pub type LeSecurityResultCallback = Box<dyn FnOnce(SecurityResult) + Send>;

/// Pairing user interaction and results
pub trait LePairCallback: Send {
    /// Pairing features are needed. `local_pair` is false when the peer
    /// started the exchange. Answer with `GapStack::le_pair_feature_rsp`.
    fn pair_feature_request(&mut self, _addr: &Address, _local_pair: bool) -> bool {
        false
    }

    fn pair_method_notify(&mut self, _addr: &Address, _method: PairMethod) {}

    fn pair_passkey_request(&mut self, _addr: &Address) -> bool {
        false
    }

    fn pair_passkey_notification(&mut self, _addr: &Address, _passkey: u32) {}

    fn pair_oob_request(&mut self, _addr: &Address) -> bool {
        false
    }

    fn pair_sc_oob_request(&mut self, _addr: &Address) -> bool {
        false
    }

    /// Local secure connections OOB values to hand to the peer
    fn pair_sc_oob_notification(&mut self, _addr: &Address, _data: &OobData) {}

    fn pair_user_confirm_request(&mut self, _addr: &Address, _numeric_value: u32) -> bool {
        false
    }

    /// Keys distributed by a bonded pairing
    fn key_notify(&mut self, _addr: &Address, _keys: &PairedKeys) {}

    fn pair_complete(&mut self, _addr: &Address, _status: u8, _authenticated: bool) {}
}

/// Stored-key lookups and link security results
pub trait LeSecurityCallback: Send {
    /// The central wants to encrypt with a stored key of the peer. Answer
    /// with `GapStack::le_remote_encryption_key_rsp`.
    fn remote_encryption_key_request(&mut self, _addr: &Address) -> bool {
        false
    }

    /// The controller asks for the LTK identified by `ediv`/`rand`. Answer
    /// with `GapStack::le_local_encryption_key_rsp`.
    fn local_encryption_key_request(&mut self, _addr: &Address, _ediv: u16, _rand: u64) -> bool {
        false
    }

    fn encryption_complete(&mut self, _addr: &Address, _status: u8) {}

    fn sign_counter_change(&mut self, _addr: &Address, _kind: SignCounterKind, _counter: u32) {}
}

/// Link parameter negotiation
pub trait LeConnectionCallback: Send {
    /// Answer with `GapStack::le_connection_parameter_update_rsp`
    fn connection_parameter_update_request(
        &mut self,
        _addr: &Address,
        _params: &ConnectionParameters,
    ) -> bool {
        false
    }
}

/// Receives advertising reports once their address has been resolved
pub trait ReportSubscriber: Send {
    /// `identity` is set when a resolvable private address matched a known IRK
    fn on_report(&mut self, report: &LeAdvertisingReport, identity: Option<&Address>);
}

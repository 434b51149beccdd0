//! Downward interfaces to the controller and the link manager
//!
//! Commands are accepted or rejected immediately; completions arrive later as
//! [`ControllerEvent`](super::ControllerEvent)s through the
//! [`EventTranslator`](crate::translator::EventTranslator), correlated by
//! link handle or peer address.

use super::packet::HciCommand;
use crate::error::GapResult;
use crate::gap::{Address, BdAddr};

/// HCI version number of Bluetooth Core 4.2
pub const HCI_VERSION_4_2: u8 = 0x08;

/// Controller features the engine consults before issuing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFeatures {
    /// Secure Simple Pairing supported
    pub simple_pairing: bool,
    /// Secure Connections (controller side) supported
    pub secure_connections: bool,
    /// HCI version
    pub hci_version: u8,
}

impl Default for LocalFeatures {
    fn default() -> Self {
        Self {
            simple_pairing: true,
            secure_connections: true,
            hci_version: HCI_VERSION_4_2,
        }
    }
}

/// Command interface to the link-layer controller
pub trait Controller: Send {
    /// Issue a command. An `Err` is the controller's immediate rejection.
    fn send_command(&mut self, command: HciCommand) -> GapResult<()>;

    /// Features of the local controller
    fn local_features(&self) -> LocalFeatures {
        LocalFeatures::default()
    }
}

/// ACL/LE link management below GAP
pub trait LinkManager: Send {
    /// Start classic ACL establishment. Completion arrives as Connection Complete.
    fn acl_connect(&mut self, addr: &BdAddr) -> GapResult<()>;

    /// Keep the ACL alive on behalf of the security engine
    fn acl_add_ref(&mut self, handle: u16);

    /// Drop the reference taken with [`acl_add_ref`](Self::acl_add_ref)
    fn acl_release(&mut self, handle: u16);

    /// Ask whether the peer host supports SSP. The answer arrives as a remote
    /// host supported features notification or through
    /// [`EventTranslator::on_remote_ssp_support`](crate::translator::EventTranslator::on_remote_ssp_support).
    fn query_remote_ssp_support(&mut self, addr: &BdAddr) -> GapResult<()>;

    /// Start LE connection establishment
    fn le_connect(&mut self, addr: &Address) -> GapResult<()>;

    /// Cancel a pending LE connection
    fn le_cancel_connect(&mut self, addr: &Address) -> GapResult<()>;

    /// Answer an L2CAP connection parameter update request
    fn connection_parameter_update_reply(
        &mut self,
        handle: u16,
        identifier: u8,
        accept: bool,
    ) -> GapResult<()>;
}

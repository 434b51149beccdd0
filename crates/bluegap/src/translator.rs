//! Entry point for asynchronous notifications from the layers below
//!
//! Callbacks from the controller, link manager and pairing engine may arrive
//! on any thread. The translator copies whatever they carry into an owned
//! value and queues it for the worker without waiting.

use crate::context::GapContext;
use crate::dispatch::DispatcherHandle;
use crate::error::GapResult;
use crate::gap::{Address, AddressType, BdAddr, Role};
use crate::hci::constants::LINK_TYPE_ACL;
use crate::hci::{ControllerEvent, HciEvent, LeAdvertisingReport};
use crate::le::ConnectionParameters;
use crate::smp::constants::SMP_SIGNATURE_LEN;
use crate::smp::{AuthRequirements, PairMethod, PairResult, PairingFeatures};
use log::{trace, warn};

/// Cloneable producer side for lower-layer notifications
#[derive(Clone)]
pub struct EventTranslator {
    handle: DispatcherHandle<GapContext>,
}

impl EventTranslator {
    pub(crate) fn new(handle: DispatcherHandle<GapContext>) -> Self {
        Self { handle }
    }

    fn post<F>(&self, task: F) -> GapResult<()>
    where
        F: FnOnce(&mut GapContext) + Send + 'static,
    {
        self.handle.submit_async(task).map_err(|err| {
            warn!("Dropping lower-layer notification: {}", err);
            err
        })
    }

    /// Raw HCI event, without the packet type indicator. Events the engine
    /// does not consume are ignored.
    pub fn on_hci_packet(&self, packet: &[u8]) -> GapResult<()> {
        let Some(event) = HciEvent::parse(packet).as_ref().and_then(ControllerEvent::decode) else {
            trace!("Ignoring HCI packet of {} bytes", packet.len());
            return Ok(());
        };
        self.on_controller_event(event)
    }

    pub fn on_controller_event(&self, event: ControllerEvent) -> GapResult<()> {
        self.post(move |ctx| ctx.handle_controller_event(event))
    }

    pub fn on_advertising_report(&self, report: &LeAdvertisingReport) -> GapResult<()> {
        let report = report.clone();
        self.post(move |ctx| ctx.le_on_advertising_report(report))
    }

    /// Answer to [`LinkManager::query_remote_ssp_support`](crate::hci::LinkManager::query_remote_ssp_support)
    pub fn on_remote_ssp_support(&self, addr: BdAddr, supported: bool) -> GapResult<()> {
        self.post(move |ctx| ctx.on_remote_ssp_support(addr, supported))
    }

    pub fn on_le_connection_parameter_request(
        &self,
        handle: u16,
        identifier: u8,
        params: ConnectionParameters,
    ) -> GapResult<()> {
        self.post(move |ctx| ctx.le_on_connection_parameter_request(handle, identifier, params))
    }

    pub fn on_pair_result(&self, handle: u16, result: PairResult) -> GapResult<()> {
        self.post(move |ctx| ctx.le_on_pair_result(handle, result))
    }

    /// `data` carries the method's value: a little-endian passkey or numeric
    /// value, or the local SC OOB random and confirm values.
    pub fn on_authentication_request(
        &self,
        handle: u16,
        method: PairMethod,
        data: &[u8],
    ) -> GapResult<()> {
        let data = data.to_vec();
        self.post(move |ctx| ctx.le_on_authentication_request(handle, method, data))
    }

    pub fn on_remote_pair_request(&self, handle: u16, features: PairingFeatures) -> GapResult<()> {
        self.post(move |ctx| ctx.le_on_remote_pair_request(handle, features))
    }

    pub fn on_remote_pair_response(&self, handle: u16, features: PairingFeatures) -> GapResult<()> {
        self.post(move |ctx| ctx.le_on_remote_pair_response(handle, features))
    }

    pub fn on_remote_security_request(
        &self,
        handle: u16,
        auth_req: AuthRequirements,
    ) -> GapResult<()> {
        self.post(move |ctx| ctx.le_on_remote_security_request(handle, auth_req))
    }

    pub fn on_long_term_key_request(&self, handle: u16, rand: u64, ediv: u16) -> GapResult<()> {
        self.post(move |ctx| ctx.le_on_long_term_key_request(handle, rand, ediv))
    }

    pub fn on_signature_result(
        &self,
        status: u8,
        signature: [u8; SMP_SIGNATURE_LEN],
    ) -> GapResult<()> {
        self.post(move |ctx| ctx.le_on_signature_result(status, signature))
    }

    pub fn on_resolve_result(&self, status: u8, matched: bool) -> GapResult<()> {
        self.post(move |ctx| ctx.le_on_resolve_result(status, matched))
    }
}

impl GapContext {
    /// Route a decoded controller event to the engines. Handles are shared
    /// between transports, so link events are offered to both.
    pub(crate) fn handle_controller_event(&mut self, event: ControllerEvent) {
        trace!("Controller event {:?}", event);
        match event {
            ControllerEvent::ConnectionComplete {
                status,
                handle,
                bd_addr,
                link_type,
            } => {
                if link_type == LINK_TYPE_ACL {
                    self.on_acl_connect_complete(status, handle, bd_addr);
                }
            }
            ControllerEvent::DisconnectionComplete { handle, reason, .. } => {
                self.on_acl_disconnect(handle, reason);
                self.le_on_disconnect(handle, reason);
            }
            ControllerEvent::AuthenticationComplete { status, handle } => {
                self.on_authentication_complete(handle, status);
            }
            ControllerEvent::EncryptionChange {
                status,
                handle,
                enabled,
            } => self.on_encryption_change(handle, status, enabled),
            ControllerEvent::EncryptionKeyRefreshComplete { status, handle } => {
                self.on_encryption_key_refresh(handle, status);
            }
            ControllerEvent::ReplyComplete {
                opcode,
                status,
                bd_addr,
            } => self.on_reply_complete(opcode, status, bd_addr),
            ControllerEvent::PinCodeRequest { bd_addr } => self.on_pin_code_request(bd_addr),
            ControllerEvent::LinkKeyRequest { bd_addr } => self.on_link_key_request(bd_addr),
            ControllerEvent::LinkKeyNotification {
                bd_addr,
                link_key,
                key_type,
            } => self.on_link_key_notification(bd_addr, link_key, key_type),
            ControllerEvent::IoCapabilityRequest { bd_addr } => {
                self.on_io_capability_request(bd_addr)
            }
            ControllerEvent::IoCapabilityResponse {
                bd_addr,
                io_capability,
                authentication_requirements,
                ..
            } => self.on_io_capability_response(bd_addr, io_capability, authentication_requirements),
            ControllerEvent::UserConfirmationRequest {
                bd_addr,
                numeric_value,
            } => self.on_user_confirmation_request(bd_addr, numeric_value),
            ControllerEvent::UserPasskeyRequest { bd_addr } => self.on_user_passkey_request(bd_addr),
            ControllerEvent::UserPasskeyNotification { bd_addr, passkey } => {
                self.on_user_passkey_notification(bd_addr, passkey)
            }
            ControllerEvent::RemoteOobDataRequest { bd_addr } => self.on_remote_oob_request(bd_addr),
            ControllerEvent::SimplePairingComplete { status, bd_addr } => {
                self.on_simple_pairing_complete(bd_addr, status)
            }
            ControllerEvent::RemoteHostSupportedFeatures { bd_addr, features } => {
                let supported = features & crate::hci::constants::HOST_FEATURE_SSP != 0;
                self.on_remote_ssp_support(bd_addr, supported);
            }
            ControllerEvent::LeConnectionComplete {
                status,
                handle,
                role,
                peer_address_type,
                peer_address,
            } => {
                let Some(role) = Role::from_u8(role) else {
                    warn!("LE connection with unknown role 0x{:02X}", role);
                    return;
                };
                let peer = Address::new(peer_address, AddressType::from(peer_address_type));
                self.le_on_connect_complete(status, handle, role, peer);
            }
            ControllerEvent::LeAdvertisingReports(reports) => {
                for report in reports {
                    self.le_on_advertising_report(report);
                }
            }
        }
    }
}

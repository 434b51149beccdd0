//! Classic pairing exchange: controller requests and the client's answers

use super::callbacks::IoCapabilityReply;
use super::connection::{is_authenticated_link_key, AuthenticationStatus};
use crate::context::GapContext;
use crate::error::{GapError, GapResult};
use crate::gap::BdAddr;
use crate::hci::constants::*;
use crate::hci::packet::opcode;
use crate::hci::HciCommand;
use crate::smp::OobData;
use log::{debug, info, warn};

const LINK_KEY_REPLY: u16 = opcode(OGF_LINK_CTL, OCF_LINK_KEY_REQUEST_REPLY);
const PIN_CODE_REPLY: u16 = opcode(OGF_LINK_CTL, OCF_PIN_CODE_REQUEST_REPLY);
const IO_CAPABILITY_REPLY: u16 = opcode(OGF_LINK_CTL, OCF_IO_CAPABILITY_REQUEST_REPLY);
const USER_CONFIRMATION_REPLY: u16 = opcode(OGF_LINK_CTL, OCF_USER_CONFIRMATION_REQUEST_REPLY);
const USER_PASSKEY_REPLY: u16 = opcode(OGF_LINK_CTL, OCF_USER_PASSKEY_REQUEST_REPLY);
const REMOTE_OOB_REPLY: u16 = opcode(OGF_LINK_CTL, OCF_REMOTE_OOB_DATA_REQUEST_REPLY);

const MAX_PASSKEY: u32 = 999_999;

impl GapContext {
    fn send_pairing_reply(&mut self, command: HciCommand) -> GapResult<()> {
        debug!("Pairing reply {:?}", command);
        self.controller.send_command(command).map_err(|err| {
            warn!("Pairing reply rejected: {}", err);
            err
        })
    }

    /// Negative replies are best effort; the controller times the exchange
    /// out on its own if one is lost.
    fn send_negative_reply(&mut self, command: HciCommand) {
        let _ = self.send_pairing_reply(command);
    }

    /// Whether the in-flight request on `addr` requires a MITM-protected key
    fn action_needs_mitm(&self, addr: &BdAddr) -> bool {
        self.classic
            .connections
            .get(addr)
            .and_then(|conn| conn.action_req)
            .and_then(|id| self.classic.requests.get(id))
            .is_some_and(|request| request.need_mitm || request.need_authentication)
    }

    pub(crate) fn on_io_capability_request(&mut self, addr: BdAddr) {
        let bondable = self.classic.bondable;
        let use_time = self.config.acl_use_time;

        if let Some(conn) = self.classic.connections.get_mut(&addr) {
            if conn.auth_status == AuthenticationStatus::Idle {
                // Peer-initiated pairing keeps the link up while it runs.
                if !conn.acl_ref_held {
                    self.links.acl_add_ref(conn.handle);
                    conn.acl_ref_held = true;
                }
                if let Some(timer) = conn.hold_timer.take() {
                    self.timers.cancel(timer);
                }
                conn.hold_timer = Some(
                    self.timers
                        .set(use_time, move |ctx: &mut GapContext| ctx.release_acl(addr)),
                );
            }
            if !bondable && conn.remote_requests_bonding() {
                info!("Bonding with {} refused, not bondable", addr);
                self.send_negative_reply(HciCommand::IoCapabilityRequestNegativeReply {
                    bd_addr: addr,
                    reason: HCI_PAIRING_NOT_ALLOWED,
                });
                return;
            }
        }

        let taken = self
            .classic
            .auth_callback
            .as_mut()
            .is_some_and(|callback| callback.io_capability_request(&addr));
        if !taken {
            self.send_negative_reply(HciCommand::IoCapabilityRequestNegativeReply {
                bd_addr: addr,
                reason: HCI_PAIRING_NOT_ALLOWED,
            });
        }
    }

    /// Answer an IO capability request
    pub fn io_capability_rsp(
        &mut self,
        addr: BdAddr,
        accept: bool,
        reply: IoCapabilityReply,
    ) -> GapResult<()> {
        if !accept {
            return self.send_pairing_reply(HciCommand::IoCapabilityRequestNegativeReply {
                bd_addr: addr,
                reason: HCI_PAIRING_NOT_ALLOWED,
            });
        }

        let only_unauthenticated = self
            .classic
            .connections
            .get(&addr)
            .and_then(|conn| conn.action_req)
            .and_then(|id| self.classic.requests.get(id))
            .is_some_and(|request| {
                request.need_unauthentication && !request.need_authentication && !request.need_mitm
            });
        let mitm = if only_unauthenticated {
            MITM_NOT_REQUIRED
        } else {
            reply.mitm & MITM_REQUIRED
        };

        let bondable = self.classic.bondable;
        let io_capability = reply.io_capability.to_u8();
        let authentication_requirements = match self.classic.connections.get_mut(&addr) {
            Some(conn) => {
                conn.local_io_capability = Some(io_capability);
                if conn.remote_auth_req != AUTH_REQ_UNKNOWN {
                    (conn.remote_auth_req & !MITM_REQUIRED) | mitm
                } else if !bondable {
                    AUTH_REQ_NO_MITM_NO_BONDING + mitm
                } else if conn.in_dedicated_bonding {
                    AUTH_REQ_NO_MITM_DEDICATED_BONDING + mitm
                } else {
                    AUTH_REQ_NO_MITM_GENERAL_BONDING + mitm
                }
            }
            None if bondable => AUTH_REQ_NO_MITM_GENERAL_BONDING + mitm,
            None => AUTH_REQ_NO_MITM_NO_BONDING + mitm,
        };

        self.send_pairing_reply(HciCommand::IoCapabilityRequestReply {
            bd_addr: addr,
            io_capability,
            oob_data_present: reply.oob_data_present as u8,
            authentication_requirements,
        })
    }

    pub(crate) fn on_io_capability_response(
        &mut self,
        addr: BdAddr,
        io_capability: u8,
        authentication_requirements: u8,
    ) {
        if let Some(conn) = self.classic.connections.get_mut(&addr) {
            conn.remote_io_capability = Some(io_capability);
            conn.remote_auth_req = authentication_requirements;
        }
        if let Some(callback) = self.classic.auth_callback.as_mut() {
            callback.io_capability_response(&addr, io_capability);
        }
    }

    pub(crate) fn on_user_confirmation_request(&mut self, addr: BdAddr, numeric_value: u32) {
        let taken = self
            .classic
            .auth_callback
            .as_mut()
            .is_some_and(|callback| callback.user_confirm_request(&addr, numeric_value));
        if !taken {
            self.send_negative_reply(HciCommand::UserConfirmationRequestNegativeReply {
                bd_addr: addr,
            });
        }
    }

    pub fn user_confirm_rsp(&mut self, addr: BdAddr, accept: bool) -> GapResult<()> {
        let command = if accept {
            HciCommand::UserConfirmationRequestReply { bd_addr: addr }
        } else {
            HciCommand::UserConfirmationRequestNegativeReply { bd_addr: addr }
        };
        self.send_pairing_reply(command)
    }

    pub(crate) fn on_user_passkey_request(&mut self, addr: BdAddr) {
        let taken = self
            .classic
            .auth_callback
            .as_mut()
            .is_some_and(|callback| callback.user_passkey_request(&addr));
        if !taken {
            self.send_negative_reply(HciCommand::UserPasskeyRequestNegativeReply { bd_addr: addr });
        }
    }

    pub fn user_passkey_rsp(&mut self, addr: BdAddr, accept: bool, passkey: u32) -> GapResult<()> {
        if !accept {
            return self
                .send_pairing_reply(HciCommand::UserPasskeyRequestNegativeReply { bd_addr: addr });
        }
        if passkey > MAX_PASSKEY {
            return Err(GapError::InvalidParameter(format!(
                "passkey {} out of range",
                passkey
            )));
        }
        self.send_pairing_reply(HciCommand::UserPasskeyRequestReply {
            bd_addr: addr,
            passkey,
        })
    }

    pub(crate) fn on_user_passkey_notification(&mut self, addr: BdAddr, passkey: u32) {
        if let Some(callback) = self.classic.auth_callback.as_mut() {
            callback.user_passkey_notification(&addr, passkey);
        }
    }

    pub(crate) fn on_remote_oob_request(&mut self, addr: BdAddr) {
        let taken = self
            .classic
            .auth_callback
            .as_mut()
            .is_some_and(|callback| callback.remote_oob_request(&addr));
        if !taken {
            self.send_negative_reply(HciCommand::RemoteOobDataRequestNegativeReply {
                bd_addr: addr,
            });
        }
    }

    pub fn remote_oob_rsp(&mut self, addr: BdAddr, accept: bool, data: OobData) -> GapResult<()> {
        let command = if accept {
            HciCommand::RemoteOobDataRequestReply {
                bd_addr: addr,
                c: data.c,
                r: data.r,
            }
        } else {
            HciCommand::RemoteOobDataRequestNegativeReply { bd_addr: addr }
        };
        self.send_pairing_reply(command)
    }

    pub(crate) fn on_pin_code_request(&mut self, addr: BdAddr) {
        let taken = self.classic.bondable
            && self
                .classic
                .auth_callback
                .as_mut()
                .is_some_and(|callback| callback.pin_code_request(&addr));
        if !taken {
            self.send_negative_reply(HciCommand::PinCodeRequestNegativeReply { bd_addr: addr });
        }
    }

    pub fn pin_code_rsp(&mut self, addr: BdAddr, accept: bool, pin: &[u8]) -> GapResult<()> {
        if !accept {
            return self
                .send_pairing_reply(HciCommand::PinCodeRequestNegativeReply { bd_addr: addr });
        }
        if pin.is_empty() || pin.len() > PIN_CODE_MAX_LEN {
            return Err(GapError::InvalidParameter(format!(
                "PIN length {} not in 1..={}",
                pin.len(),
                PIN_CODE_MAX_LEN
            )));
        }
        self.send_pairing_reply(HciCommand::PinCodeRequestReply {
            bd_addr: addr,
            pin: pin.to_vec(),
        })
    }

    pub(crate) fn on_link_key_request(&mut self, addr: BdAddr) {
        let forced_negative = self.classic.connections.get(&addr).is_some_and(|conn| {
            conn.auth_status == AuthenticationStatus::Retry
                || (conn.link_key_type.is_some()
                    && !conn.has_authenticated_key()
                    && self.action_needs_mitm(&addr))
        });

        let taken = !forced_negative
            && self
                .classic
                .auth_callback
                .as_mut()
                .is_some_and(|callback| callback.link_key_request(&addr));
        if !taken {
            self.send_negative_reply(HciCommand::LinkKeyRequestNegativeReply { bd_addr: addr });
        }
    }

    /// Answer a link key request with a stored key of `key_type`
    pub fn link_key_rsp(
        &mut self,
        addr: BdAddr,
        accept: bool,
        link_key: [u8; 16],
        key_type: u8,
    ) -> GapResult<()> {
        if accept && !is_authenticated_link_key(key_type) && self.action_needs_mitm(&addr) {
            debug!("Stored key for {} is unauthenticated, forcing pairing", addr);
            return self
                .send_pairing_reply(HciCommand::LinkKeyRequestNegativeReply { bd_addr: addr });
        }
        if !accept {
            return self
                .send_pairing_reply(HciCommand::LinkKeyRequestNegativeReply { bd_addr: addr });
        }

        if let Some(conn) = self.classic.connections.get_mut(&addr) {
            conn.link_key_type = Some(key_type);
        }
        self.send_pairing_reply(HciCommand::LinkKeyRequestReply {
            bd_addr: addr,
            link_key,
        })
    }

    pub(crate) fn on_link_key_notification(
        &mut self,
        addr: BdAddr,
        link_key: [u8; 16],
        key_type: u8,
    ) {
        if let Some(conn) = self.classic.connections.get_mut(&addr) {
            conn.link_key_type = Some(key_type);
        }
        debug!("New link key for {}, type 0x{:02X}", addr, key_type);
        if let Some(callback) = self.classic.auth_callback.as_mut() {
            callback.link_key_notification(&addr, &link_key, key_type);
        }
    }

    pub(crate) fn on_simple_pairing_complete(&mut self, addr: BdAddr, status: u8) {
        if status != HCI_SUCCESS {
            info!("Simple pairing with {} failed: 0x{:02X}", addr, status);
        }
        if let Some(callback) = self.classic.auth_callback.as_mut() {
            callback.simple_pairing_complete(&addr, status);
        }
    }

    /// A positive pairing reply the controller refused is turned into the
    /// matching negative reply.
    pub(crate) fn on_reply_complete(&mut self, opcode: u16, status: u8, addr: BdAddr) {
        if status == HCI_SUCCESS {
            return;
        }
        let negative = match opcode {
            LINK_KEY_REPLY => HciCommand::LinkKeyRequestNegativeReply { bd_addr: addr },
            PIN_CODE_REPLY => HciCommand::PinCodeRequestNegativeReply { bd_addr: addr },
            IO_CAPABILITY_REPLY => HciCommand::IoCapabilityRequestNegativeReply {
                bd_addr: addr,
                reason: HCI_PAIRING_NOT_ALLOWED,
            },
            USER_CONFIRMATION_REPLY => {
                HciCommand::UserConfirmationRequestNegativeReply { bd_addr: addr }
            }
            USER_PASSKEY_REPLY => HciCommand::UserPasskeyRequestNegativeReply { bd_addr: addr },
            REMOTE_OOB_REPLY => HciCommand::RemoteOobDataRequestNegativeReply { bd_addr: addr },
            _ => return,
        };
        warn!(
            "Reply 0x{:04X} for {} failed with 0x{:02X}, sending negative reply",
            opcode, addr, status
        );
        self.send_negative_reply(negative);
    }
}

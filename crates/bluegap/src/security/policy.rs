//! Request processing for the classic security engine

use super::callbacks::SecurityResultCallback;
use super::connection::{AuthenticationStatus, ConnectionState, DeviceSecurityStatus, EncryptionStatus};
use super::request::{RequestId, RequestStatus, SecurityRequest};
use crate::context::GapContext;
use crate::error::{GapError, GapResult};
use crate::gap::{
    BdAddr, Direction, Protocol, SecurityMode, SecurityModeFlags, SecurityResult, ServiceId,
    ServiceInfo,
};
use crate::hci::constants::*;
use crate::hci::HciCommand;
use log::{debug, info, warn};

impl GapContext {
    pub fn register_service_security(
        &mut self,
        addr: Option<BdAddr>,
        info: ServiceInfo,
        flags: SecurityModeFlags,
    ) -> GapResult<()> {
        self.classic.services.register(addr, info, flags)?;
        debug!("Registered security {:?} for {:?}", flags, info);
        Ok(())
    }

    pub fn deregister_service_security(
        &mut self,
        addr: Option<BdAddr>,
        info: &ServiceInfo,
    ) -> GapResult<()> {
        self.classic.services.deregister(addr, info)?;
        debug!("Deregistered security for {:?}", info);
        Ok(())
    }

    /// Ask for the security `info` was registered with before a profile
    /// channel to `addr` is used. The outcome is always delivered through
    /// `callback`, also when nothing is registered for the service.
    pub fn request_security(
        &mut self,
        addr: BdAddr,
        info: ServiceInfo,
        callback: Option<SecurityResultCallback>,
    ) -> GapResult<()> {
        if !self.classic.enabled {
            return Err(GapError::NotEnabled);
        }

        let Some(registration) = self.classic.services.find(&addr, &info).copied() else {
            warn!("No security registered for {:?} towards {}", info, addr);
            if let Some(callback) = callback {
                callback(SecurityResult::Failed, info);
            }
            return Ok(());
        };

        let id = self.classic.requests.next_id();
        let request = SecurityRequest::new(
            id,
            addr,
            info,
            registration.flags,
            self.classic.mode,
            callback,
        );
        debug!("Queued {:?}", request);
        self.classic.requests.push_back(request);

        if self.classic.connections.contains(&addr) {
            self.start_feature_check(addr, id);
        } else {
            self.connect_for_request(addr, id);
        }

        self.process_security_requests();
        Ok(())
    }

    /// Dedicated bonding with `addr`. The result is reported through
    /// [`AuthenticationCallback::authentication_complete`](super::AuthenticationCallback::authentication_complete).
    pub fn authentication_req(&mut self, addr: BdAddr) -> GapResult<()> {
        if !self.classic.enabled {
            return Err(GapError::NotEnabled);
        }
        if !self.classic.bondable {
            return Err(GapError::InvalidState);
        }

        let id = self.classic.requests.next_id();
        let info = ServiceInfo::new(ServiceId::GAP, Direction::Outgoing, Protocol::L2cap, 0);
        let request = SecurityRequest::new(
            id,
            addr,
            info,
            SecurityModeFlags::OUT_AUTHENTICATION,
            self.classic.mode,
            None,
        );
        info!("Dedicated bonding requested with {}", addr);
        self.classic.requests.push_front(request);

        if self.classic.connections.contains(&addr) {
            self.start_feature_check(addr, id);
        } else {
            self.connect_for_request(addr, id);
        }

        self.process_security_requests();
        Ok(())
    }

    pub fn cancel_authentication_req(&mut self, addr: BdAddr) -> GapResult<()> {
        let request = self
            .classic
            .requests
            .for_peer_mut(&addr)
            .find(|request| request.is_dedicated_bonding() && !request.status.is_terminal())
            .ok_or(GapError::InvalidState)?;
        let id = request.id;
        let was_acting = request.status == RequestStatus::Action;
        request.status = RequestStatus::Failed;

        if let Some(conn) = self.classic.connections.get_mut(&addr) {
            if conn.action_req == Some(id) {
                conn.action_req = None;
            }
            if was_acting && conn.status == DeviceSecurityStatus::Action {
                conn.status = DeviceSecurityStatus::WaitDisconnect;
            }
            conn.in_dedicated_bonding = false;
        }
        info!("Dedicated bonding with {} cancelled", addr);

        self.process_security_requests();
        Ok(())
    }

    /// Whether a running pairing on `addr` was started by this host
    pub fn pair_is_from_local(&self, addr: &BdAddr) -> GapResult<bool> {
        let conn = self
            .classic
            .connections
            .get(addr)
            .ok_or(GapError::InvalidState)?;
        Ok(conn.auth_status != AuthenticationStatus::Idle)
    }

    pub fn set_bondable_mode(&mut self, bondable: bool) -> GapResult<()> {
        if !self.classic.enabled {
            return Err(GapError::NotEnabled);
        }
        self.classic.bondable = bondable;
        debug!("Classic bondable mode {}", bondable);
        Ok(())
    }

    /// Switch between service-level (2) and link-level (4) security.
    ///
    /// The mode only changes when the controller accepts the host feature
    /// writes; a rejection is logged and the call still succeeds.
    pub fn set_security_mode(&mut self, mode: u8) -> GapResult<()> {
        let mode = SecurityMode::from_u8(mode).ok_or_else(|| {
            GapError::InvalidParameter(format!("unsupported security mode {}", mode))
        })?;
        if !self.classic.enabled {
            return Err(GapError::NotEnabled);
        }

        let enable = mode == SecurityMode::Mode4;
        let features = self.controller.local_features();
        let result = self
            .controller
            .send_command(HciCommand::WriteSimplePairingMode { enable })
            .and_then(|()| {
                if features.secure_connections {
                    self.controller
                        .send_command(HciCommand::WriteSecureConnectionsHostSupport { enable })
                } else {
                    Ok(())
                }
            });

        match result {
            Ok(()) => {
                self.classic.mode = mode;
                info!("Classic security mode set to {:?}", mode);
            }
            Err(err) => warn!("Security mode {:?} not applied: {}", mode, err),
        }
        Ok(())
    }

    /// Run every queued request that can make progress, in arrival order
    pub(crate) fn process_security_requests(&mut self) {
        for id in self.classic.requests.ids() {
            let Some(request) = self.classic.requests.get_mut(id) else {
                continue;
            };
            match request.status {
                RequestStatus::Success | RequestStatus::Failed => {
                    self.finish_request(id);
                    continue;
                }
                RequestStatus::WaitConnect
                | RequestStatus::WaitFeature
                | RequestStatus::WaitEncrypt => continue,
                RequestStatus::WaitAction | RequestStatus::Action => {}
            }

            let Some(conn) = self.classic.connections.get_mut(&request.addr) else {
                continue;
            };
            if conn.action_req.is_some() {
                continue;
            }

            if request.is_dedicated_bonding() {
                conn.in_dedicated_bonding = true;
            } else {
                if conn.is_authenticated {
                    request.need_authentication = false;
                    request.need_unauthentication = false;
                } else if conn.is_encrypted {
                    // Encryption implies a link key of some kind.
                    request.need_unauthentication = false;
                }
                if conn.is_encrypted {
                    request.need_encryption = false;
                }
            }

            if request.needs_action() {
                request.status = RequestStatus::Action;
                conn.action_req = Some(id);
                self.do_security_action(id);
            } else {
                request.status = RequestStatus::Success;
                self.finish_request(id);
            }
        }

        self.check_connections();
    }

    /// Start the next link action the in-flight request still needs
    fn do_security_action(&mut self, id: RequestId) {
        let Some(request) = self.classic.requests.get_mut(id) else {
            return;
        };
        let Some(conn) = self.classic.connections.get_mut(&request.addr) else {
            return;
        };

        if !conn.acl_ref_held {
            self.links.acl_add_ref(conn.handle);
            conn.acl_ref_held = true;
        }
        if let Some(timer) = conn.hold_timer.take() {
            self.timers.cancel(timer);
        }
        conn.status = DeviceSecurityStatus::Action;

        let addr = request.addr;
        let handle = conn.handle;

        if request.need_authorization {
            let accepted = match self.classic.security_callback.as_mut() {
                Some(callback) => callback.authorize_ind(&addr, &request.info),
                None => false,
            };
            if accepted {
                request.authorization_pending = true;
                debug!("Authorization of {:?} pending for {}", request.info, addr);
            } else {
                warn!("Authorization of {:?} declined for {}", request.info, addr);
                request.status = RequestStatus::Failed;
                conn.action_req = None;
                conn.status = DeviceSecurityStatus::WaitDisconnect;
                self.finish_request(id);
            }
            return;
        }

        let command = if request.need_authentication || request.need_unauthentication {
            if conn.auth_status == AuthenticationStatus::Idle {
                conn.auth_status = AuthenticationStatus::Action;
            }
            HciCommand::AuthenticationRequested { handle }
        } else if request.need_encryption {
            conn.enc_status = EncryptionStatus::Action;
            HciCommand::SetConnectionEncryption {
                handle,
                enable: true,
            }
        } else {
            return;
        };

        debug!("Security action for {}: {:?}", addr, command);
        if let Err(err) = self.controller.send_command(command) {
            warn!("Security action for {} rejected: {}", addr, err);
            request.fail(err.status_code());
            conn.status = DeviceSecurityStatus::Idle;
            conn.auth_status = AuthenticationStatus::Idle;
            conn.enc_status = EncryptionStatus::Idle;
            conn.action_req = None;
            self.finish_request(id);
        }
    }

    /// Remove a request, release whatever it holds, and report its result
    pub(crate) fn finish_request(&mut self, id: RequestId) {
        let Some(mut request) = self.classic.requests.remove(id) else {
            return;
        };
        if let Some(timer) = request.retry_timer.take() {
            self.timers.cancel(timer);
        }
        for conn in self.classic.connections.iter_mut() {
            if conn.action_req == Some(id) {
                conn.action_req = None;
            }
            if request.is_dedicated_bonding() && conn.addr == request.addr {
                conn.in_dedicated_bonding = false;
            }
        }

        info!(
            "Security for {:?} towards {}: {}",
            request.info,
            request.addr,
            request.result()
        );
        request.fire();
    }

    /// Give links that finished their action back to the link manager after
    /// the hold time.
    fn check_connections(&mut self) {
        let hold = self.config.acl_hold_time;
        for conn in self.classic.connections.iter_mut() {
            if conn.status != DeviceSecurityStatus::WaitDisconnect {
                continue;
            }
            if let Some(timer) = conn.hold_timer.take() {
                self.timers.cancel(timer);
            }
            let addr = conn.addr;
            conn.hold_timer = Some(
                self.timers
                    .set(hold, move |ctx: &mut GapContext| ctx.release_acl(addr)),
            );
            conn.status = DeviceSecurityStatus::Idle;
        }
    }

    pub(crate) fn release_acl(&mut self, addr: BdAddr) {
        let Some(conn) = self.classic.connections.get_mut(&addr) else {
            return;
        };
        conn.hold_timer = None;
        if conn.acl_ref_held {
            conn.acl_ref_held = false;
            self.links.acl_release(conn.handle);
            debug!("Released ACL reference on {}", addr);
        }
    }

    fn connect_for_request(&mut self, addr: BdAddr, id: RequestId) {
        let result = self.links.acl_connect(&addr);
        let Some(request) = self.classic.requests.get_mut(id) else {
            return;
        };
        match result {
            Ok(()) => request.status = RequestStatus::WaitConnect,
            Err(err) => {
                warn!("ACL connection to {} rejected: {}", addr, err);
                request.fail(err.status_code());
            }
        }
    }

    /// Mode 4 checks the peer's SSP support before acting; mode 2 acts at once
    fn start_feature_check(&mut self, addr: BdAddr, id: RequestId) {
        let mode = self.classic.mode;
        let Some(request) = self.classic.requests.get_mut(id) else {
            return;
        };
        match mode {
            SecurityMode::Mode2 => request.status = RequestStatus::WaitAction,
            SecurityMode::Mode4 => {
                request.status = RequestStatus::WaitFeature;
                self.query_remote_ssp(addr);
            }
        }
    }

    fn query_remote_ssp(&mut self, addr: BdAddr) {
        if let Err(err) = self.links.query_remote_ssp_support(&addr) {
            warn!("SSP support query for {} failed: {}", addr, err);
            self.on_remote_ssp_support(addr, false);
        }
    }

    pub fn authorize_res(
        &mut self,
        addr: BdAddr,
        info: ServiceInfo,
        accept: bool,
    ) -> GapResult<()> {
        let request = self
            .classic
            .requests
            .for_peer_mut(&addr)
            .find(|request| {
                request.status == RequestStatus::Action
                    && request.authorization_pending
                    && request.info.direction == Direction::Incoming
                    && request.info.matches(&info)
            })
            .ok_or(GapError::InvalidState)?;

        request.authorization_pending = false;
        if accept {
            request.need_authorization = false;
        } else {
            request.status = RequestStatus::Failed;
        }
        let id = request.id;
        debug!("Authorization of {:?} for {}: {}", info, addr, accept);

        if let Some(conn) = self.classic.connections.get_mut(&addr) {
            if conn.action_req == Some(id) {
                conn.action_req = None;
            }
            if conn.status == DeviceSecurityStatus::Action {
                conn.status = DeviceSecurityStatus::WaitDisconnect;
            }
        }

        self.process_security_requests();
        Ok(())
    }

    pub(crate) fn on_acl_connect_complete(&mut self, status: u8, handle: u16, addr: BdAddr) {
        if status == HCI_SUCCESS {
            debug!("ACL to {} up, handle 0x{:04X}", addr, handle);
            if let Some(previous) = self.classic.connections.insert(ConnectionState::new(addr, handle)) {
                self.cancel_link_timers(previous);
            }
            let mode = self.classic.mode;
            let mut query = false;
            for request in self.classic.requests.for_peer_mut(&addr) {
                if request.status != RequestStatus::WaitConnect {
                    continue;
                }
                request.status = match mode {
                    SecurityMode::Mode2 => RequestStatus::WaitAction,
                    SecurityMode::Mode4 => {
                        query = true;
                        RequestStatus::WaitFeature
                    }
                };
            }
            if query {
                self.query_remote_ssp(addr);
            }
        } else {
            warn!("ACL to {} failed: 0x{:02X}", addr, status);
            for request in self.classic.requests.for_peer_mut(&addr) {
                if request.status == RequestStatus::WaitConnect {
                    request.fail(status);
                }
            }
        }

        self.process_security_requests();
    }

    pub(crate) fn on_acl_disconnect(&mut self, handle: u16, reason: u8) {
        let Some(conn) = self.classic.connections.remove_by_handle(handle) else {
            return;
        };
        let addr = conn.addr;
        debug!("ACL to {} down: 0x{:02X}", addr, reason);
        self.cancel_link_timers(conn);

        for request in self.classic.requests.for_peer_mut(&addr) {
            if let Some(timer) = request.retry_timer.take() {
                self.timers.cancel(timer);
            }
            if !request.status.is_terminal() {
                request.fail(reason);
            }
        }

        self.process_security_requests();
    }

    fn cancel_link_timers(&mut self, conn: ConnectionState) {
        for timer in [conn.hold_timer, conn.encrypt_wait_timer].into_iter().flatten() {
            self.timers.cancel(timer);
        }
    }

    pub(crate) fn on_remote_ssp_support(&mut self, addr: BdAddr, supported: bool) {
        let Some(conn) = self.classic.connections.get_mut(&addr) else {
            return;
        };
        conn.support_ssp = supported;
        let encrypted = conn.is_encrypted;

        let mut wait_encrypt = false;
        for request in self.classic.requests.for_peer_mut(&addr) {
            if request.status != RequestStatus::WaitFeature {
                continue;
            }
            if !supported || request.info.direction == Direction::Outgoing || encrypted {
                request.status = RequestStatus::WaitAction;
            } else {
                request.status = RequestStatus::WaitEncrypt;
                wait_encrypt = true;
            }
        }

        if wait_encrypt {
            if let Some(timer) = conn.encrypt_wait_timer.take() {
                self.timers.cancel(timer);
            }
            conn.encrypt_wait_timer = Some(self.timers.set(
                self.config.encrypt_wait,
                move |ctx: &mut GapContext| ctx.on_encrypt_wait_timeout(addr),
            ));
            debug!("Waiting for {} to encrypt", addr);
        }

        self.process_security_requests();
    }

    fn on_encrypt_wait_timeout(&mut self, addr: BdAddr) {
        let Some(conn) = self.classic.connections.get_mut(&addr) else {
            return;
        };
        conn.encrypt_wait_timer = None;
        warn!("{} did not encrypt in time, disconnecting", addr);
        let command = HciCommand::Disconnect {
            handle: conn.handle,
            reason: HCI_AUTHENTICATION_FAILURE,
        };
        if let Err(err) = self.controller.send_command(command) {
            warn!("Disconnect of {} rejected: {}", addr, err);
        }

        for request in self.classic.requests.for_peer_mut(&addr) {
            if !request.status.is_terminal() {
                request.fail_timeout();
            }
        }

        self.process_security_requests();
    }

    pub(crate) fn on_authentication_complete(&mut self, handle: u16, status: u8) {
        let Some(conn) = self.classic.connections.by_handle_mut(handle) else {
            return;
        };
        let addr = conn.addr;
        let action_id = conn.action_req;
        let gap_in_flight = action_id
            .and_then(|id| self.classic.requests.get(id))
            .is_some_and(SecurityRequest::is_dedicated_bonding);

        if status == HCI_SUCCESS {
            conn.auth_status = AuthenticationStatus::Idle;
            if conn.has_authenticated_key() {
                conn.is_authenticated = true;
                for request in self.classic.requests.for_peer_mut(&addr) {
                    request.need_authentication = false;
                }
            } else if let Some(request) = action_id.and_then(|id| self.classic.requests.get_mut(id)) {
                request.need_authentication = false;
                request.need_unauthentication = false;
                if request.need_mitm {
                    warn!("{} paired without MITM protection", addr);
                    request.status = RequestStatus::Failed;
                }
            }
            if let Some(request) = action_id.and_then(|id| self.classic.requests.get_mut(id)) {
                if let Some(timer) = request.retry_timer.take() {
                    self.timers.cancel(timer);
                }
            }
            conn.action_req = None;
        } else {
            let max_retries = self.config.pair_retry_count;
            let retry_id = action_id
                .filter(|_| self.config.is_retryable(&addr, status))
                .filter(|id| {
                    self.classic
                        .requests
                        .get(*id)
                        .is_some_and(|request| request.retry_count < max_retries)
                });
            match retry_id.and_then(|id| self.classic.requests.get_mut(id)) {
                Some(request) => {
                    request.retry_count += 1;
                    conn.auth_status = AuthenticationStatus::WaitRetry;
                    if let Some(timer) = request.retry_timer.take() {
                        self.timers.cancel(timer);
                    }
                    let id = request.id;
                    request.retry_timer = Some(self.timers.set(
                        self.config.pair_retry_wait,
                        move |ctx: &mut GapContext| ctx.on_retry_timeout(id),
                    ));
                    info!(
                        "Authentication with {} failed (0x{:02X}), retry {}",
                        addr, status, request.retry_count
                    );
                }
                None => {
                    warn!("Authentication with {} failed: 0x{:02X}", addr, status);
                    conn.auth_status = AuthenticationStatus::Idle;
                    conn.action_req = None;
                    for request in self.classic.requests.for_peer_mut(&addr) {
                        if matches!(
                            request.status,
                            RequestStatus::Action | RequestStatus::WaitEncrypt
                        ) {
                            request.fail(status);
                        }
                    }
                }
            }
        }

        if conn.status == DeviceSecurityStatus::Action {
            conn.status = DeviceSecurityStatus::WaitDisconnect;
        }
        let dedicated = conn.in_dedicated_bonding;
        let retrying = conn.auth_status == AuthenticationStatus::WaitRetry;

        self.process_security_requests();

        if !dedicated || gap_in_flight || !retrying {
            if let Some(callback) = self.classic.auth_callback.as_mut() {
                callback.authentication_complete(&addr, status);
            }
        }
    }

    fn on_retry_timeout(&mut self, id: RequestId) {
        let Some(request) = self.classic.requests.get_mut(id) else {
            return;
        };
        request.retry_timer = None;
        let addr = request.addr;

        match self.classic.connections.get_mut(&addr) {
            Some(conn) => {
                debug!("Retrying authentication with {}", addr);
                conn.auth_status = AuthenticationStatus::Retry;
                if conn.action_req == Some(id) {
                    conn.action_req = None;
                }
            }
            None => {
                request.status = RequestStatus::WaitConnect;
                if let Err(err) = self.links.acl_connect(&addr) {
                    warn!("ACL reconnection to {} rejected: {}", addr, err);
                    request.fail(err.status_code());
                }
            }
        }

        self.process_security_requests();
    }

    pub(crate) fn on_encryption_change(&mut self, handle: u16, status: u8, enabled: bool) {
        if let Some(addr) = self.apply_encryption_change(handle, status, enabled) {
            if let Some(callback) = self.classic.auth_callback.as_mut() {
                callback.encryption_change(&addr, status == HCI_SUCCESS && enabled);
            }
        }
        self.le_on_encryption_complete(handle, status, enabled);
    }

    pub(crate) fn on_encryption_key_refresh(&mut self, handle: u16, status: u8) {
        self.apply_encryption_change(handle, status, true);
    }

    /// Record an encryption outcome on a classic link. Returns the peer when
    /// the handle belongs to one.
    fn apply_encryption_change(&mut self, handle: u16, status: u8, enabled: bool) -> Option<BdAddr> {
        let conn = self.classic.connections.by_handle_mut(handle)?;
        let addr = conn.addr;
        if let Some(timer) = conn.encrypt_wait_timer.take() {
            self.timers.cancel(timer);
        }

        if status == HCI_SUCCESS && enabled {
            conn.is_encrypted = true;
            for request in self.classic.requests.for_peer_mut(&addr) {
                request.need_encryption = false;
                if request.status == RequestStatus::WaitEncrypt {
                    request.status = RequestStatus::WaitAction;
                }
            }
        } else {
            warn!("Encryption on {} failed: 0x{:02X}", addr, status);
            if status == HCI_SUCCESS {
                conn.is_encrypted = false;
            }
            for request in self.classic.requests.for_peer_mut(&addr) {
                if matches!(
                    request.status,
                    RequestStatus::Action | RequestStatus::WaitEncrypt
                ) {
                    request.fail(status);
                }
            }
        }

        if conn.status == DeviceSecurityStatus::Action && conn.enc_status == EncryptionStatus::Action {
            conn.action_req = None;
            conn.status = DeviceSecurityStatus::WaitDisconnect;
            conn.enc_status = EncryptionStatus::Idle;
        }

        self.process_security_requests();
        Some(addr)
    }
}

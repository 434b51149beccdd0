//! LE link security: requests for an encryption level, key lookups and
//! connection lifecycle

use super::callbacks::LeSecurityResultCallback;
use super::connection::{ConnectionParameters, LeConnectionState, LeSecurityRequest, LeSecurityStatus};
use crate::context::GapContext;
use crate::error::{GapError, GapResult};
use crate::gap::{Address, BdAddr, Role, SecurityResult};
use crate::hci::constants::HCI_SUCCESS;
use crate::smp::constants::*;
use crate::smp::{AuthRequirements, EncryptionLevel, LongTermKey};
use log::{debug, info, warn};

impl GapContext {
    /// Bring the link to `addr` to at least `target`
    pub fn le_request_security(
        &mut self,
        addr: Address,
        target: EncryptionLevel,
        callback: Option<LeSecurityResultCallback>,
    ) -> GapResult<()> {
        if !self.le.enabled {
            return Err(GapError::NotEnabled);
        }
        let conn = self
            .le
            .connections
            .get_mut(&addr.addr)
            .ok_or(GapError::InvalidState)?;
        if conn.pending_request.is_some() {
            return Err(GapError::InvalidState);
        }

        let request = LeSecurityRequest::new(target, callback);
        if conn.encryption_level >= target {
            request.resolve(SecurityResult::Success);
            return Ok(());
        }
        debug!("{} needs {:?}, has {:?}", addr, target, conn.encryption_level);
        conn.pending_request = Some(request);
        self.le_process_security_request(addr);
        Ok(())
    }

    fn le_process_security_request(&mut self, addr: Address) {
        let bondable = self.le.settings.bondable;
        let Some(conn) = self.le.connections.get_mut(&addr.addr) else {
            return;
        };
        if conn.security_status == LeSecurityStatus::Pair {
            return;
        }
        let Some(target) = conn.pending_request.as_ref().map(|request| request.target) else {
            return;
        };

        match conn.role {
            Role::Central => {
                let prefer_stored_key = conn.is_remote_security_request;
                let mut started = prefer_stored_key && self.le_request_stored_key(addr);
                let mut lock_busy = false;
                if !started {
                    match self.le_request_locked_pair(addr) {
                        Some(taken) => started = taken,
                        None => lock_busy = true,
                    }
                }
                if !started && !prefer_stored_key {
                    started = self.le_request_stored_key(addr);
                }

                if started {
                    return;
                }
                if lock_busy {
                    warn!("Another pairing is running, {} not secured", addr);
                    self.le_resolve_request(&addr.addr, SecurityResult::Failed);
                } else {
                    warn!("No LE client can secure {}", addr);
                    self.le_resolve_request(&addr.addr, SecurityResult::NotSupported);
                }
            }
            Role::Peripheral => {
                if target == EncryptionLevel::None {
                    self.le_resolve_request(&addr.addr, SecurityResult::Success);
                    return;
                }
                let auth_req = AuthRequirements::new(
                    bondable,
                    target == EncryptionLevel::Authenticated,
                    true,
                );
                conn.is_local_security_request = true;
                if let Err(err) = self.smp.send_security_request(conn.handle, auth_req) {
                    warn!("Security request to {} not sent: {}", addr, err);
                    self.le_resolve_request(&addr.addr, SecurityResult::Failed);
                }
            }
        }
    }

    fn le_request_stored_key(&mut self, addr: Address) -> bool {
        self.le
            .security_callback
            .as_mut()
            .is_some_and(|callback| callback.remote_encryption_key_request(&addr))
    }

    fn le_resolve_request(&mut self, addr: &BdAddr, result: SecurityResult) {
        let request = self
            .le
            .connections
            .get_mut(addr)
            .and_then(|conn| conn.pending_request.take());
        if let Some(request) = request {
            debug!("LE security for {}: {}", addr, result);
            request.resolve(result);
        }
    }

    /// Pair with an already connected peer on behalf of a security request
    fn le_pair_for_request(&mut self, addr: Address) {
        match self.le_request_locked_pair(addr) {
            Some(true) => {}
            Some(false) => self.le_resolve_request(&addr.addr, SecurityResult::NotSupported),
            None => {
                warn!("Another pairing is running, {} not paired", addr);
                self.le_resolve_request(&addr.addr, SecurityResult::Failed);
            }
        }
    }

    /// Stored key of the peer for a central-side encryption. `authenticated`
    /// tells whether the key came from an authenticated pairing.
    pub fn le_remote_encryption_key_rsp(
        &mut self,
        addr: Address,
        accept: bool,
        key: LongTermKey,
        authenticated: bool,
    ) -> GapResult<()> {
        let conn = self
            .le
            .connections
            .get_mut(&addr.addr)
            .ok_or(GapError::InvalidState)?;

        if accept && conn.is_remote_security_request {
            // The peer's security request is answered by the stored key.
            let handle = conn.handle;
            if let Err(err) = self.smp.remote_security_request_reply(handle, Ok(())) {
                warn!("Security request reply for {} failed: {}", addr, err);
            }
        }
        if !accept {
            debug!("No stored key for {}, pairing", addr);
            self.le_pair_for_request(addr);
            return Ok(());
        }
        if !authenticated && conn.target_level() == EncryptionLevel::Authenticated {
            debug!("Stored key for {} is unauthenticated, pairing", addr);
            self.le_pair_for_request(addr);
            return Ok(());
        }

        conn.key_authenticated = authenticated;
        let handle = conn.handle;
        if let Err(err) = self.smp.start_encryption(handle, &key) {
            warn!("Encryption of {} not started: {}", addr, err);
            self.le_resolve_request(&addr.addr, SecurityResult::Failed);
            return Err(err);
        }
        Ok(())
    }

    /// LTK for the controller's request on a peripheral link
    pub fn le_local_encryption_key_rsp(
        &mut self,
        addr: Address,
        accept: bool,
        key: [u8; 16],
        authenticated: bool,
    ) -> GapResult<()> {
        let conn = self
            .le
            .connections
            .get_mut(&addr.addr)
            .ok_or(GapError::InvalidState)?;
        if accept {
            conn.key_authenticated = authenticated;
        }
        let handle = conn.handle;
        self.smp
            .long_term_key_request_reply(handle, accept.then_some(&key))
    }

    pub(crate) fn le_on_remote_security_request(&mut self, handle: u16, auth_req: AuthRequirements) {
        let Some(conn) = self.le.connections.by_handle_mut(handle) else {
            return;
        };
        conn.is_remote_security_request = true;
        let addr = conn.peer;
        debug!("Security request from {}: {:?}", addr, auth_req);

        if !self.le_request_stored_key(addr) {
            if let Err(err) = self
                .smp
                .remote_security_request_reply(handle, Err(SMP_REASON_PAIRING_NOT_SUPPORTED))
            {
                warn!("Security request rejection for {} failed: {}", addr, err);
            }
        }
    }

    pub(crate) fn le_on_long_term_key_request(&mut self, handle: u16, rand: u64, ediv: u16) {
        let Some(conn) = self.le.connections.by_handle(handle) else {
            return;
        };
        let addr = conn.peer;
        let taken = self
            .le
            .security_callback
            .as_mut()
            .is_some_and(|callback| callback.local_encryption_key_request(&addr, ediv, rand));
        if !taken {
            debug!("No LTK for {}", addr);
            if let Err(err) = self.smp.long_term_key_request_reply(handle, None) {
                warn!("LTK negative reply for {} failed: {}", addr, err);
            }
        }
    }

    /// Encryption change on a link; called for every handle, LE or not
    pub(crate) fn le_on_encryption_complete(&mut self, handle: u16, status: u8, enabled: bool) {
        let Some(conn) = self.le.connections.by_handle_mut(handle) else {
            return;
        };
        let addr = conn.peer;
        if status == HCI_SUCCESS && enabled {
            conn.encryption_level = conn.encryption_level.max(conn.key_level());
        } else {
            conn.encryption_level = EncryptionLevel::None;
        }
        info!("{} encryption now {:?}", addr, conn.encryption_level);

        // A running pairing resolves the request with its own result.
        if conn.security_status != LeSecurityStatus::Pair {
            if let Some(request) = conn.pending_request.take() {
                let outcome = if conn.encryption_level >= request.target {
                    SecurityResult::Success
                } else if status != HCI_SUCCESS {
                    SecurityResult::Controller(status)
                } else {
                    SecurityResult::Failed
                };
                request.resolve(outcome);
            }
        }

        if let Some(callback) = self.le.security_callback.as_mut() {
            callback.encryption_complete(&addr, status);
        }
    }

    pub(crate) fn le_on_connect_complete(
        &mut self,
        status: u8,
        handle: u16,
        role: Role,
        peer: Address,
    ) {
        let pairing = self
            .le
            .pairing_lock
            .holder()
            .is_some_and(|holder| holder.addr == peer.addr);

        if status != HCI_SUCCESS {
            warn!("LE connection to {} failed: 0x{:02X}", peer, status);
            if pairing {
                self.le_abort_pair(peer, status);
            }
            return;
        }

        debug!("LE link to {} up as {:?}", peer, role);
        self.le
            .connections
            .insert(LeConnectionState::new(peer, handle, role));
        if pairing {
            if let Err(err) = self.le_start_local_pair(peer) {
                warn!("Pairing with {} not started: {}", peer, err);
                self.le_abort_pair(peer, err.status_code());
            }
        }
    }

    fn le_abort_pair(&mut self, addr: Address, status: u8) {
        if self.le.pairing_lock.release_for(&addr) {
            if let Some(callback) = self.le.pair_callback.as_mut() {
                callback.pair_complete(&addr, status, false);
            }
        }
    }

    pub(crate) fn le_on_disconnect(&mut self, handle: u16, reason: u8) {
        let Some(mut conn) = self.le.connections.remove_by_handle(handle) else {
            return;
        };
        let addr = conn.peer;
        debug!("LE link to {} down: 0x{:02X}", addr, reason);
        if let Some(request) = conn.pending_request.take() {
            request.resolve(SecurityResult::Controller(reason));
        }
        self.le_fail_signatures_for(&addr.addr);
        let released = self.le.pairing_lock.release_for(&addr);
        if released || conn.security_status == LeSecurityStatus::Pair {
            if let Some(callback) = self.le.pair_callback.as_mut() {
                callback.pair_complete(&addr, reason, false);
            }
        }
    }

    pub(crate) fn le_on_connection_parameter_request(
        &mut self,
        handle: u16,
        identifier: u8,
        params: ConnectionParameters,
    ) {
        let Some(conn) = self.le.connections.by_handle_mut(handle) else {
            return;
        };
        let addr = conn.peer;
        let taken = self
            .le
            .connection_callback
            .as_mut()
            .is_some_and(|callback| callback.connection_parameter_update_request(&addr, &params));
        if taken {
            conn.pending_param_update = Some(identifier);
        } else if let Err(err) = self
            .links
            .connection_parameter_update_reply(handle, identifier, false)
        {
            warn!("Parameter update rejection for {} failed: {}", addr, err);
        }
    }

    pub fn le_connection_parameter_update_rsp(&mut self, addr: Address, accept: bool) -> GapResult<()> {
        let conn = self
            .le
            .connections
            .get_mut(&addr.addr)
            .ok_or(GapError::InvalidState)?;
        let identifier = conn.pending_param_update.take().ok_or(GapError::InvalidState)?;
        let handle = conn.handle;
        self.links
            .connection_parameter_update_reply(handle, identifier, accept)
    }

    pub fn le_set_bondable_mode(&mut self, bondable: bool) -> GapResult<()> {
        if !self.le.enabled {
            return Err(GapError::NotEnabled);
        }
        self.le.settings.bondable = bondable;
        Ok(())
    }

    /// LE security mode 1 level (1..=4) and mode 2 level (1..=2)
    pub fn le_set_security_mode(&mut self, mode1_level: u8, mode2_level: u8) -> GapResult<()> {
        if !(1..=4).contains(&mode1_level) || !(1..=2).contains(&mode2_level) {
            return Err(GapError::InvalidParameter(format!(
                "LE security mode 1 level {} / mode 2 level {}",
                mode1_level, mode2_level
            )));
        }
        if !self.le.enabled {
            return Err(GapError::NotEnabled);
        }
        self.le.settings.mode1_level = mode1_level;
        self.le.settings.mode2_level = mode2_level;
        info!("LE security mode 1 level {}, mode 2 level {}", mode1_level, mode2_level);
        Ok(())
    }

    pub fn le_set_min_enc_key_size(&mut self, size: u8) -> GapResult<()> {
        if !(SMP_MIN_ENCRYPTION_KEY_SIZE..=SMP_MAX_ENCRYPTION_KEY_SIZE).contains(&size) {
            return Err(GapError::InvalidParameter(format!("key size {}", size)));
        }
        self.le.settings.min_key_size = size;
        Ok(())
    }

    pub fn le_get_security_status(&self, addr: &Address) -> GapResult<EncryptionLevel> {
        self.le
            .connections
            .get(&addr.addr)
            .map(|conn| conn.encryption_level)
            .ok_or(GapError::InvalidState)
    }
}

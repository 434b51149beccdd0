//! LE pairing orchestration
//!
//! Only one locally requested pairing may run at a time. The pairing lock
//! records the peer it was taken for; it is released when that pairing
//! completes, fails to start, or its link goes away.

use super::connection::LeSecurityStatus;
use crate::context::GapContext;
use crate::error::{GapError, GapResult};
use crate::gap::{Address, Role, SecurityResult};
use crate::hci::HCI_VERSION_4_2;
use crate::smp::constants::*;
use crate::smp::{
    AuthRequirements, AuthenticationValue, DistributedKeys, EncryptionLevel, KeyDistribution,
    OobData, PairMethod, PairResult, PairedKeys, PairingFeatures,
};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use std::ops::{Deref, DerefMut};

/// Process-wide guard for locally requested pairings
#[derive(Debug, Default)]
pub struct PairingLock {
    holder: Option<Address>,
}

impl PairingLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&mut self, addr: Address) -> GapResult<()> {
        if self.holder.is_some() {
            return Err(GapError::InvalidState);
        }
        self.holder = Some(addr);
        Ok(())
    }

    pub fn holder(&self) -> Option<Address> {
        self.holder
    }

    pub fn is_held(&self) -> bool {
        self.holder.is_some()
    }

    pub fn release(&mut self) -> Option<Address> {
        self.holder.take()
    }

    /// Release only if held for `addr`
    pub fn release_for(&mut self, addr: &Address) -> bool {
        if self.holder.is_some_and(|holder| holder.addr == addr.addr) {
            self.holder = None;
            true
        } else {
            false
        }
    }
}

/// Pairing lock taken for one pairing attempt. Dropping the guard releases
/// the lock unless [`commit`](Self::commit) handed it to a running pairing,
/// which releases it on its result or when its link goes away.
pub(crate) struct PairingGuard<'a> {
    ctx: &'a mut GapContext,
    addr: Address,
    committed: bool,
}

impl<'a> PairingGuard<'a> {
    pub(crate) fn acquire(ctx: &'a mut GapContext, addr: Address) -> GapResult<Self> {
        ctx.le.pairing_lock.try_acquire(addr)?;
        Ok(Self {
            ctx,
            addr,
            committed: false,
        })
    }

    pub(crate) fn commit(mut self) {
        self.committed = true;
    }
}

impl Deref for PairingGuard<'_> {
    type Target = GapContext;

    fn deref(&self) -> &GapContext {
        self.ctx
    }
}

impl DerefMut for PairingGuard<'_> {
    fn deref_mut(&mut self) -> &mut GapContext {
        self.ctx
    }
}

impl Drop for PairingGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.ctx.le.pairing_lock.release_for(&self.addr);
        }
    }
}

impl GapContext {
    /// Pair with `addr`, connecting first if needed
    pub fn le_pair(&mut self, addr: Address) -> GapResult<()> {
        if !self.le.enabled {
            return Err(GapError::NotEnabled);
        }
        let mut pairing = PairingGuard::acquire(self, addr)?;
        if pairing.le.connections.contains(&addr.addr) {
            pairing.le_start_local_pair(addr)?;
        } else {
            info!("Connecting to {} to pair", addr);
            pairing.links.le_connect(&addr)?;
        }
        pairing.commit();
        Ok(())
    }

    /// Begin a local pairing on an existing link. The caller holds the lock.
    pub(crate) fn le_start_local_pair(&mut self, addr: Address) -> GapResult<()> {
        let conn = self
            .le
            .connections
            .get_mut(&addr.addr)
            .ok_or(GapError::InvalidState)?;
        if conn.security_status != LeSecurityStatus::Idle {
            return Err(GapError::InvalidState);
        }

        match conn.role {
            Role::Central => {
                let local_pair = !conn.is_remote_security_request;
                if self.le_request_pair_features(addr, local_pair) {
                    Ok(())
                } else {
                    Err(GapError::NotSupported)
                }
            }
            Role::Peripheral => {
                let auth_req = AuthRequirements::new(
                    self.le.settings.bondable,
                    self.le.settings.mode1_level >= 3,
                    true,
                );
                conn.is_local_security_request = true;
                self.smp.send_security_request(conn.handle, auth_req)
            }
        }
    }

    /// Pair with a connected peer on behalf of a security request, holding
    /// the pairing lock while the pairing runs. `None` when another pairing
    /// holds the lock.
    pub(crate) fn le_request_locked_pair(&mut self, addr: Address) -> Option<bool> {
        if self
            .le
            .pairing_lock
            .holder()
            .is_some_and(|holder| holder.addr == addr.addr)
        {
            return Some(self.le_request_pair_features(addr, true));
        }
        let mut pairing = PairingGuard::acquire(self, addr).ok()?;
        let taken = pairing.le_request_pair_features(addr, true);
        if taken {
            pairing.commit();
        }
        Some(taken)
    }

    /// Ask the pairing client for features. Marks the link as pairing when the
    /// client takes the request.
    pub(crate) fn le_request_pair_features(&mut self, addr: Address, local_pair: bool) -> bool {
        let taken = self
            .le
            .pair_callback
            .as_mut()
            .is_some_and(|callback| callback.pair_feature_request(&addr, local_pair));
        if taken {
            if let Some(conn) = self.le.connections.get_mut(&addr.addr) {
                conn.security_status = LeSecurityStatus::Pair;
            }
        }
        taken
    }

    pub fn le_cancel_pair(&mut self, addr: Address) -> GapResult<()> {
        match self.le.connections.get(&addr.addr) {
            Some(conn) => self.smp.cancel_pair(conn.handle),
            None => {
                let result = self.links.le_cancel_connect(&addr);
                if self.le.pairing_lock.release_for(&addr) {
                    if let Some(callback) = self.le.pair_callback.as_mut() {
                        callback.pair_complete(&addr, SMP_REASON_UNSPECIFIED_REASON, false);
                    }
                }
                result
            }
        }
    }

    /// Local features for a pairing with `addr`, adjusted to local policy
    pub fn le_pair_feature_rsp(&mut self, addr: Address, features: PairingFeatures) -> GapResult<()> {
        let hci_version = self.controller.local_features().hci_version;
        let settings = self.le.settings;
        let conn = self
            .le
            .connections
            .get_mut(&addr.addr)
            .ok_or(GapError::InvalidState)?;

        let mut features = features;
        if !settings.bondable {
            features.auth_req.bonding = false;
            features.initiator_key_dist &= KeyDistribution::ID_KEY;
            features.responder_key_dist &= KeyDistribution::ID_KEY;
        }
        if conn.target_level() == EncryptionLevel::Authenticated || settings.mode1_level >= 3 {
            features.auth_req.mitm = true;
        }
        if hci_version < HCI_VERSION_4_2 {
            features.auth_req.secure_connections = false;
        }
        conn.security_status = LeSecurityStatus::Pair;
        let (handle, role) = (conn.handle, conn.role);
        debug!("Pairing features for {}: {:?}", addr, features);

        let result = match role {
            Role::Central => self.smp.start_pair(handle, &features),
            Role::Peripheral => self.smp.remote_pair_request_reply(handle, Ok(&features)),
        };
        if let Err(err) = &result {
            warn!("Pairing with {} not started: {}", addr, err);
            if let Some(conn) = self.le.connections.get_mut(&addr.addr) {
                conn.security_status = LeSecurityStatus::Idle;
            }
            self.le.pairing_lock.release_for(&addr);
        }
        result
    }

    pub(crate) fn le_on_remote_pair_request(&mut self, handle: u16, features: PairingFeatures) {
        let min_key_size = self.le.settings.min_key_size;
        let Some(conn) = self.le.connections.by_handle_mut(handle) else {
            return;
        };
        let addr = conn.peer;

        let reply = if features.max_key_size < min_key_size {
            warn!("{} offers key size {}", addr, features.max_key_size);
            Some(SMP_REASON_ENCRYPTION_KEY_SIZE)
        } else if self.le_request_pair_features(addr, false) {
            None
        } else {
            Some(SMP_REASON_PAIRING_NOT_SUPPORTED)
        };

        if let Some(reason) = reply {
            if let Err(err) = self.smp.remote_pair_request_reply(handle, Err(reason)) {
                warn!("Pairing request rejection for {} failed: {}", addr, err);
            }
        }
    }

    pub(crate) fn le_on_remote_pair_response(&mut self, handle: u16, features: PairingFeatures) {
        let settings = self.le.settings;
        let Some(conn) = self.le.connections.by_handle(handle) else {
            return;
        };
        let addr = conn.peer;
        let needs_authentication = conn.target_level() == EncryptionLevel::Authenticated
            || settings.requires_authentication();

        let reply = if features.max_key_size < settings.min_key_size {
            Err(SMP_REASON_ENCRYPTION_KEY_SIZE)
        } else if needs_authentication && !features.auth_req.mitm {
            Err(SMP_REASON_AUTHENTICATION_REQUIREMENTS)
        } else {
            Ok(())
        };
        if let Err(reason) = reply {
            warn!("Pairing response from {} rejected: 0x{:02X}", addr, reason);
        }
        if let Err(err) = self.smp.remote_pair_response_reply(handle, reply) {
            warn!("Pairing response reply for {} failed: {}", addr, err);
        }
    }

    /// The pairing engine negotiated `method` and needs a value for it
    pub(crate) fn le_on_authentication_request(
        &mut self,
        handle: u16,
        method: PairMethod,
        data: Vec<u8>,
    ) {
        let requires_authentication = self.le.settings.requires_authentication();
        let Some(conn) = self.le.connections.by_handle_mut(handle) else {
            return;
        };
        conn.pair_method = Some(method);
        let addr = conn.peer;

        if method == PairMethod::JustWorks && requires_authentication {
            info!("Just works pairing with {} refused by policy", addr);
            self.le_auth_reply(handle, method, Err(SMP_REASON_AUTHENTICATION_REQUIREMENTS));
            return;
        }

        let Some(callback) = self.le.pair_callback.as_mut() else {
            self.le_auth_reply(handle, method, Err(SMP_REASON_UNSPECIFIED_REASON));
            return;
        };
        callback.pair_method_notify(&addr, method);

        let value = || data.get(..4).map_or(0, LittleEndian::read_u32);
        let reply = match method {
            PairMethod::JustWorks => Some(Ok(AuthenticationValue::Confirm)),
            PairMethod::PasskeyDisplay => {
                let passkey = value();
                callback.pair_passkey_notification(&addr, passkey);
                Some(Ok(AuthenticationValue::Passkey(passkey)))
            }
            PairMethod::PasskeyEntry => {
                (!callback.pair_passkey_request(&addr)).then_some(Err(SMP_REASON_UNSPECIFIED_REASON))
            }
            PairMethod::NumericComparison => (!callback
                .pair_user_confirm_request(&addr, value()))
            .then_some(Err(SMP_REASON_UNSPECIFIED_REASON)),
            PairMethod::OobLegacy => {
                (!callback.pair_oob_request(&addr)).then_some(Err(SMP_REASON_UNSPECIFIED_REASON))
            }
            PairMethod::OobScLocalSendPeerRecv
            | PairMethod::OobScLocalRecvPeerSend
            | PairMethod::OobScBothSendRecv => {
                if method != PairMethod::OobScLocalRecvPeerSend {
                    if let Some(local) = sc_oob_data(&data) {
                        callback.pair_sc_oob_notification(&addr, &local);
                    }
                }
                (!callback.pair_sc_oob_request(&addr)).then_some(Err(SMP_REASON_UNSPECIFIED_REASON))
            }
        };

        if let Some(reply) = reply {
            self.le_auth_reply(handle, method, reply);
        }
    }

    fn le_auth_reply(
        &mut self,
        handle: u16,
        method: PairMethod,
        reply: Result<AuthenticationValue, u8>,
    ) {
        if let Err(err) = self.smp.authentication_request_reply(handle, method, reply) {
            warn!("Authentication reply for {:?} failed: {}", method, err);
        }
    }

    /// Link and negotiated method of a pairing waiting for the client
    fn le_pending_method(&self, addr: &Address) -> GapResult<(u16, PairMethod)> {
        let conn = self
            .le
            .connections
            .get(&addr.addr)
            .ok_or(GapError::InvalidState)?;
        let method = conn.pair_method.ok_or(GapError::InvalidState)?;
        Ok((conn.handle, method))
    }

    pub fn le_pair_passkey_rsp(&mut self, addr: Address, accept: bool, passkey: u32) -> GapResult<()> {
        let (handle, method) = self.le_pending_method(&addr)?;
        let reply = if !accept {
            Err(SMP_REASON_PASSKEY_ENTRY_FAILED)
        } else if passkey > 999_999 {
            return Err(GapError::InvalidParameter(format!(
                "passkey {} out of range",
                passkey
            )));
        } else {
            Ok(AuthenticationValue::Passkey(passkey))
        };
        self.smp.authentication_request_reply(handle, method, reply)
    }

    pub fn le_pair_oob_rsp(&mut self, addr: Address, accept: bool, key: [u8; 16]) -> GapResult<()> {
        let (handle, method) = self.le_pending_method(&addr)?;
        let reply = if accept {
            Ok(AuthenticationValue::OobKey(key))
        } else {
            Err(SMP_REASON_OOB_NOT_AVAILABLE)
        };
        self.smp.authentication_request_reply(handle, method, reply)
    }

    pub fn le_pair_sc_oob_rsp(&mut self, addr: Address, accept: bool, data: OobData) -> GapResult<()> {
        let (handle, method) = self.le_pending_method(&addr)?;
        if !method.is_sc_oob() {
            return Err(GapError::InvalidState);
        }
        let reply = if accept {
            Ok(AuthenticationValue::ScOob {
                peer: addr.addr,
                data,
            })
        } else {
            Err(SMP_REASON_OOB_NOT_AVAILABLE)
        };
        self.smp.authentication_request_reply(handle, method, reply)
    }

    pub fn le_pair_sc_user_confirm_rsp(&mut self, addr: Address, accept: bool) -> GapResult<()> {
        let (handle, method) = self.le_pending_method(&addr)?;
        let reply = if accept {
            Ok(AuthenticationValue::Confirm)
        } else {
            Err(SMP_REASON_NUMERIC_COMPARISON_FAILED)
        };
        self.smp.authentication_request_reply(handle, method, reply)
    }

    pub(crate) fn le_on_pair_result(&mut self, handle: u16, result: PairResult) {
        let success = result.is_success();
        let peer = match self.le.connections.by_handle_mut(handle) {
            Some(conn) => {
                conn.security_status = LeSecurityStatus::Idle;
                conn.pair_method = None;
                conn.is_local_security_request = false;
                if success {
                    conn.key_authenticated = result.authenticated;
                    // Only an encryption already in place is upgraded.
                    if conn.encryption_level != EncryptionLevel::None {
                        conn.encryption_level = conn.encryption_level.max(conn.key_level());
                    }
                } else {
                    conn.encryption_level = EncryptionLevel::None;
                }

                // Without encryption yet, the encryption change resolves the request.
                let level = conn.encryption_level;
                if !success || level != EncryptionLevel::None {
                    if let Some(request) = conn.pending_request.take() {
                        let outcome = if success && level >= request.target {
                            SecurityResult::Success
                        } else {
                            SecurityResult::Failed
                        };
                        request.resolve(outcome);
                    }
                }
                Some(conn.peer)
            }
            None => self.le.pairing_lock.holder(),
        };
        let Some(addr) = peer else {
            debug!("Pair result for unknown handle 0x{:04X}", handle);
            return;
        };
        self.le.pairing_lock.release_for(&addr);
        info!(
            "Pairing with {} finished: 0x{:02X}, bonded {}",
            addr, result.status, result.bonded
        );

        if success && result.bonded {
            let keys = PairedKeys {
                local: result
                    .local_keys
                    .as_ref()
                    .map(|raw| DistributedKeys::from_raw(raw, result.local_key_dist, result.authenticated))
                    .unwrap_or_default(),
                remote: result
                    .peer_keys
                    .as_ref()
                    .map(|raw| DistributedKeys::from_raw(raw, result.peer_key_dist, result.authenticated))
                    .unwrap_or_default(),
            };
            self.le_store_paired_keys(addr, &keys);
            if let Some(callback) = self.le.pair_callback.as_mut() {
                callback.key_notify(&addr, &keys);
            }
        }

        if let Some(callback) = self.le.pair_callback.as_mut() {
            callback.pair_complete(&addr, result.status, success && result.authenticated);
        }
    }

    fn le_store_paired_keys(&mut self, addr: Address, keys: &PairedKeys) {
        if keys.local.csrk.is_some() || keys.remote.csrk.is_some() {
            let signing = self.le.signing.entry(addr.addr).or_default();
            if let Some(csrk) = &keys.local.csrk {
                signing.local = Some(csrk.clone());
            }
            if let Some(csrk) = &keys.remote.csrk {
                signing.remote = Some(csrk.clone());
            }
        }
        if let Some(irk) = &keys.remote.irk {
            self.le.irks.retain(|known| known.identity != irk.identity);
            self.le.irks.push(irk.clone());
        }
    }
}

/// Local SC OOB random and confirm values carried in an authentication request
fn sc_oob_data(data: &[u8]) -> Option<OobData> {
    if data.len() < SMP_SC_OOB_DATA_LEN {
        return None;
    }
    let mut oob = OobData::default();
    oob.r.copy_from_slice(&data[SMP_SC_OOB_RANDOM_OFFSET..SMP_SC_OOB_RANDOM_OFFSET + 16]);
    oob.c.copy_from_slice(&data[SMP_SC_OOB_CONFIRM_OFFSET..SMP_SC_OOB_CONFIRM_OFFSET + 16]);
    Some(oob)
}

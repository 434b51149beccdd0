//! Synchronous client API
//!
//! Every call is executed on the dispatcher worker and waited for, bounded by
//! [`GapConfig::blocking_timeout`]. Outcomes that take link activity are
//! delivered later through the supplied callbacks, also on the worker; a
//! callback must not make blocking calls back into the stack.

use crate::config::GapConfig;
use crate::context::{Collaborators, GapContext};
use crate::dispatch::Dispatcher;
use crate::error::GapResult;
use crate::gap::{Address, BdAddr, SecurityModeFlags, SecurityResult, ServiceInfo};
use crate::le::{
    LeConnectionCallback, LePairCallback, LeSecurityCallback, ReportSubscriber, SignatureResult,
};
use crate::security::{AuthenticationCallback, IoCapabilityReply, SecurityCallback};
use crate::smp::constants::SMP_SIGNATURE_LEN;
use crate::smp::{
    ConnectionSignatureResolvingKey, EncryptionLevel, IdentityResolvingKey, LongTermKey, OobData,
    PairingFeatures,
};
use crate::translator::EventTranslator;
use log::info;

/// Running GAP security engine
pub struct GapStack {
    dispatcher: Dispatcher<GapContext>,
}

impl GapStack {
    /// Start the worker that owns all engine state
    pub fn start(config: GapConfig, collaborators: Collaborators) -> GapResult<Self> {
        let capacity = config.queue_capacity;
        let timeout = config.blocking_timeout;
        let context = GapContext::new(config, collaborators);
        let dispatcher = Dispatcher::start(context, capacity, timeout)?;
        info!("GAP security engine started");
        Ok(Self { dispatcher })
    }

    /// Producer for notifications from the controller, link manager and
    /// pairing engine
    pub fn translator(&self) -> EventTranslator {
        EventTranslator::new(self.dispatcher.handle().clone())
    }

    /// Stop the worker once the queued tasks have run
    pub fn shutdown(&mut self) {
        self.dispatcher.shutdown();
    }

    fn call<R, F>(&self, op: F) -> GapResult<R>
    where
        F: FnOnce(&mut GapContext) -> GapResult<R> + Send + 'static,
        R: Send + 'static,
    {
        self.dispatcher.handle().submit_blocking(op)?
    }

    /// Read engine state on the worker
    pub fn inspect<R, F>(&self, view: F) -> GapResult<R>
    where
        F: FnOnce(&GapContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.dispatcher.handle().submit_blocking(move |ctx| view(ctx))
    }

    pub fn set_classic_enabled(&self, enabled: bool) -> GapResult<()> {
        self.call(move |ctx| {
            ctx.set_classic_enabled(enabled);
            Ok(())
        })
    }

    pub fn set_le_enabled(&self, enabled: bool) -> GapResult<()> {
        self.call(move |ctx| {
            ctx.set_le_enabled(enabled);
            Ok(())
        })
    }

    // Capability registration

    pub fn register_security_callback(&self, callback: Box<dyn SecurityCallback>) -> GapResult<()> {
        self.call(move |ctx| {
            ctx.register_security_callback(callback);
            Ok(())
        })
    }

    pub fn clear_security_callback(&self) -> GapResult<()> {
        self.call(|ctx| {
            ctx.clear_security_callback();
            Ok(())
        })
    }

    pub fn register_authentication_callback(
        &self,
        callback: Box<dyn AuthenticationCallback>,
    ) -> GapResult<()> {
        self.call(move |ctx| {
            ctx.register_authentication_callback(callback);
            Ok(())
        })
    }

    pub fn clear_authentication_callback(&self) -> GapResult<()> {
        self.call(|ctx| {
            ctx.clear_authentication_callback();
            Ok(())
        })
    }

    pub fn register_le_pair_callback(&self, callback: Box<dyn LePairCallback>) -> GapResult<()> {
        self.call(move |ctx| {
            ctx.register_le_pair_callback(callback);
            Ok(())
        })
    }

    pub fn clear_le_pair_callback(&self) -> GapResult<()> {
        self.call(|ctx| {
            ctx.clear_le_pair_callback();
            Ok(())
        })
    }

    pub fn register_le_security_callback(
        &self,
        callback: Box<dyn LeSecurityCallback>,
    ) -> GapResult<()> {
        self.call(move |ctx| {
            ctx.register_le_security_callback(callback);
            Ok(())
        })
    }

    pub fn clear_le_security_callback(&self) -> GapResult<()> {
        self.call(|ctx| {
            ctx.clear_le_security_callback();
            Ok(())
        })
    }

    pub fn register_le_connection_callback(
        &self,
        callback: Box<dyn LeConnectionCallback>,
    ) -> GapResult<()> {
        self.call(move |ctx| {
            ctx.register_le_connection_callback(callback);
            Ok(())
        })
    }

    pub fn clear_le_connection_callback(&self) -> GapResult<()> {
        self.call(|ctx| {
            ctx.clear_le_connection_callback();
            Ok(())
        })
    }

    pub fn register_report_subscriber(&self, subscriber: Box<dyn ReportSubscriber>) -> GapResult<()> {
        self.call(move |ctx| {
            ctx.register_report_subscriber(subscriber);
            Ok(())
        })
    }

    pub fn clear_report_subscribers(&self) -> GapResult<()> {
        self.call(|ctx| {
            ctx.clear_report_subscribers();
            Ok(())
        })
    }

    // Classic security

    pub fn register_service_security(
        &self,
        addr: Option<BdAddr>,
        info: ServiceInfo,
        flags: SecurityModeFlags,
    ) -> GapResult<()> {
        self.call(move |ctx| ctx.register_service_security(addr, info, flags))
    }

    pub fn deregister_service_security(
        &self,
        addr: Option<BdAddr>,
        info: ServiceInfo,
    ) -> GapResult<()> {
        self.call(move |ctx| ctx.deregister_service_security(addr, &info))
    }

    pub fn request_security<F>(&self, addr: BdAddr, info: ServiceInfo, callback: F) -> GapResult<()>
    where
        F: FnOnce(SecurityResult, ServiceInfo) + Send + 'static,
    {
        self.call(move |ctx| ctx.request_security(addr, info, Some(Box::new(callback))))
    }

    pub fn authorize_res(&self, addr: BdAddr, info: ServiceInfo, accept: bool) -> GapResult<()> {
        self.call(move |ctx| ctx.authorize_res(addr, info, accept))
    }

    pub fn set_security_mode(&self, mode: u8) -> GapResult<()> {
        self.call(move |ctx| ctx.set_security_mode(mode))
    }

    pub fn set_bondable_mode(&self, bondable: bool) -> GapResult<()> {
        self.call(move |ctx| ctx.set_bondable_mode(bondable))
    }

    pub fn authentication_req(&self, addr: BdAddr) -> GapResult<()> {
        self.call(move |ctx| ctx.authentication_req(addr))
    }

    pub fn cancel_authentication_req(&self, addr: BdAddr) -> GapResult<()> {
        self.call(move |ctx| ctx.cancel_authentication_req(addr))
    }

    pub fn pair_is_from_local(&self, addr: BdAddr) -> GapResult<bool> {
        self.call(move |ctx| ctx.pair_is_from_local(&addr))
    }

    pub fn io_capability_rsp(
        &self,
        addr: BdAddr,
        accept: bool,
        reply: IoCapabilityReply,
    ) -> GapResult<()> {
        self.call(move |ctx| ctx.io_capability_rsp(addr, accept, reply))
    }

    pub fn user_confirm_rsp(&self, addr: BdAddr, accept: bool) -> GapResult<()> {
        self.call(move |ctx| ctx.user_confirm_rsp(addr, accept))
    }

    pub fn user_passkey_rsp(&self, addr: BdAddr, accept: bool, passkey: u32) -> GapResult<()> {
        self.call(move |ctx| ctx.user_passkey_rsp(addr, accept, passkey))
    }

    pub fn remote_oob_rsp(&self, addr: BdAddr, accept: bool, data: OobData) -> GapResult<()> {
        self.call(move |ctx| ctx.remote_oob_rsp(addr, accept, data))
    }

    pub fn pin_code_rsp(&self, addr: BdAddr, accept: bool, pin: &[u8]) -> GapResult<()> {
        let pin = pin.to_vec();
        self.call(move |ctx| ctx.pin_code_rsp(addr, accept, &pin))
    }

    pub fn link_key_rsp(
        &self,
        addr: BdAddr,
        accept: bool,
        link_key: [u8; 16],
        key_type: u8,
    ) -> GapResult<()> {
        self.call(move |ctx| ctx.link_key_rsp(addr, accept, link_key, key_type))
    }

    // LE security

    pub fn le_request_security<F>(
        &self,
        addr: Address,
        target: EncryptionLevel,
        callback: F,
    ) -> GapResult<()>
    where
        F: FnOnce(SecurityResult) + Send + 'static,
    {
        self.call(move |ctx| ctx.le_request_security(addr, target, Some(Box::new(callback))))
    }

    pub fn le_pair(&self, addr: Address) -> GapResult<()> {
        self.call(move |ctx| ctx.le_pair(addr))
    }

    pub fn le_cancel_pair(&self, addr: Address) -> GapResult<()> {
        self.call(move |ctx| ctx.le_cancel_pair(addr))
    }

    pub fn le_pair_feature_rsp(&self, addr: Address, features: PairingFeatures) -> GapResult<()> {
        self.call(move |ctx| ctx.le_pair_feature_rsp(addr, features))
    }

    pub fn le_pair_passkey_rsp(&self, addr: Address, accept: bool, passkey: u32) -> GapResult<()> {
        self.call(move |ctx| ctx.le_pair_passkey_rsp(addr, accept, passkey))
    }

    pub fn le_pair_oob_rsp(&self, addr: Address, accept: bool, key: [u8; 16]) -> GapResult<()> {
        self.call(move |ctx| ctx.le_pair_oob_rsp(addr, accept, key))
    }

    pub fn le_pair_sc_oob_rsp(&self, addr: Address, accept: bool, data: OobData) -> GapResult<()> {
        self.call(move |ctx| ctx.le_pair_sc_oob_rsp(addr, accept, data))
    }

    pub fn le_pair_sc_user_confirm_rsp(&self, addr: Address, accept: bool) -> GapResult<()> {
        self.call(move |ctx| ctx.le_pair_sc_user_confirm_rsp(addr, accept))
    }

    pub fn le_remote_encryption_key_rsp(
        &self,
        addr: Address,
        accept: bool,
        key: LongTermKey,
        authenticated: bool,
    ) -> GapResult<()> {
        self.call(move |ctx| ctx.le_remote_encryption_key_rsp(addr, accept, key, authenticated))
    }

    pub fn le_local_encryption_key_rsp(
        &self,
        addr: Address,
        accept: bool,
        key: [u8; 16],
        authenticated: bool,
    ) -> GapResult<()> {
        self.call(move |ctx| ctx.le_local_encryption_key_rsp(addr, accept, key, authenticated))
    }

    pub fn le_set_signing_info(
        &self,
        addr: Address,
        local: Option<ConnectionSignatureResolvingKey>,
        remote: Option<ConnectionSignatureResolvingKey>,
    ) -> GapResult<()> {
        self.call(move |ctx| ctx.le_set_signing_info(addr, local, remote))
    }

    pub fn le_generate_signature<F>(&self, addr: Address, data: &[u8], callback: F) -> GapResult<()>
    where
        F: FnOnce(SignatureResult, [u8; SMP_SIGNATURE_LEN]) + Send + 'static,
    {
        let data = data.to_vec();
        self.call(move |ctx| ctx.le_generate_signature(addr, data, Some(Box::new(callback))))
    }

    pub fn le_confirm_signature<F>(
        &self,
        addr: Address,
        data: &[u8],
        signature: [u8; SMP_SIGNATURE_LEN],
        callback: F,
    ) -> GapResult<()>
    where
        F: FnOnce(SignatureResult, [u8; SMP_SIGNATURE_LEN]) + Send + 'static,
    {
        let data = data.to_vec();
        self.call(move |ctx| {
            ctx.le_confirm_signature(addr, data, signature, Some(Box::new(callback)))
        })
    }

    pub fn le_set_security_mode(&self, mode1_level: u8, mode2_level: u8) -> GapResult<()> {
        self.call(move |ctx| ctx.le_set_security_mode(mode1_level, mode2_level))
    }

    pub fn le_set_min_enc_key_size(&self, size: u8) -> GapResult<()> {
        self.call(move |ctx| ctx.le_set_min_enc_key_size(size))
    }

    pub fn le_set_bondable_mode(&self, bondable: bool) -> GapResult<()> {
        self.call(move |ctx| ctx.le_set_bondable_mode(bondable))
    }

    pub fn le_get_security_status(&self, addr: Address) -> GapResult<EncryptionLevel> {
        self.call(move |ctx| ctx.le_get_security_status(&addr))
    }

    pub fn le_connection_parameter_update_rsp(&self, addr: Address, accept: bool) -> GapResult<()> {
        self.call(move |ctx| ctx.le_connection_parameter_update_rsp(addr, accept))
    }

    pub fn le_add_identity_resolving_key(&self, irk: IdentityResolvingKey) -> GapResult<()> {
        self.call(move |ctx| ctx.le_add_identity_resolving_key(irk))
    }

    pub fn le_remove_identity_resolving_key(&self, identity: Address) -> GapResult<()> {
        self.call(move |ctx| ctx.le_remove_identity_resolving_key(&identity))
    }

    pub fn le_current_address(&self, identity: BdAddr) -> GapResult<Option<Address>> {
        self.inspect(move |ctx| ctx.le_current_address(&identity))
    }
}

impl Drop for GapStack {
    fn drop(&mut self) {
        self.dispatcher.shutdown();
    }
}

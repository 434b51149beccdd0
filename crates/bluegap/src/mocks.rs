//! Recording collaborators for engine tests

use crate::config::GapConfig;
use crate::context::{Collaborators, GapContext};
use crate::error::{GapError, GapResult};
use crate::gap::{Address, BdAddr};
use crate::hci::{Controller, HciCommand, LinkManager};
use crate::smp::{
    AuthRequirements, AuthenticationValue, LongTermKey, PairMethod, PairingFeatures,
    SecurityManager,
};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    AclConnect(BdAddr),
    AclAddRef(u16),
    AclRelease(u16),
    QuerySsp(BdAddr),
    LeConnect(Address),
    LeCancelConnect(Address),
    ParamUpdateReply { handle: u16, identifier: u8, accept: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmpCall {
    StartPair(u16, PairingFeatures),
    PairRequestReply(u16, Result<PairingFeatures, u8>),
    PairResponseReply(u16, Result<(), u8>),
    SecurityRequestReply(u16, Result<(), u8>),
    AuthReply(u16, PairMethod, Result<AuthenticationValue, u8>),
    SendSecurityRequest(u16, AuthRequirements),
    LtkReply(u16, Option<[u8; 16]>),
    StartEncryption(u16, LongTermKey),
    CancelPair(u16),
    Sign { csrk: [u8; 16], counter: u32, data: Vec<u8> },
    Resolve { addr: BdAddr, irk: [u8; 16] },
}

/// Shared view of everything the engine sent downwards
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub commands: Arc<Mutex<Vec<HciCommand>>>,
    pub links: Arc<Mutex<Vec<LinkCall>>>,
    pub smp: Arc<Mutex<Vec<SmpCall>>>,
}

impl Recorder {
    pub fn commands(&self) -> Vec<HciCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn links(&self) -> Vec<LinkCall> {
        self.links.lock().unwrap().clone()
    }

    pub fn smp(&self) -> Vec<SmpCall> {
        self.smp.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().unwrap().clear();
        self.links.lock().unwrap().clear();
        self.smp.lock().unwrap().clear();
    }
}

pub struct MockController {
    commands: Arc<Mutex<Vec<HciCommand>>>,
}

impl Controller for MockController {
    fn send_command(&mut self, command: HciCommand) -> GapResult<()> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

pub struct MockLinks {
    calls: Arc<Mutex<Vec<LinkCall>>>,
    fail_connect: bool,
}

impl MockLinks {
    fn record(&self, call: LinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl LinkManager for MockLinks {
    fn acl_connect(&mut self, addr: &BdAddr) -> GapResult<()> {
        if self.fail_connect {
            return Err(GapError::Controller(0x04));
        }
        self.record(LinkCall::AclConnect(*addr));
        Ok(())
    }

    fn acl_add_ref(&mut self, handle: u16) {
        self.record(LinkCall::AclAddRef(handle));
    }

    fn acl_release(&mut self, handle: u16) {
        self.record(LinkCall::AclRelease(handle));
    }

    fn query_remote_ssp_support(&mut self, addr: &BdAddr) -> GapResult<()> {
        self.record(LinkCall::QuerySsp(*addr));
        Ok(())
    }

    fn le_connect(&mut self, addr: &Address) -> GapResult<()> {
        self.record(LinkCall::LeConnect(*addr));
        Ok(())
    }

    fn le_cancel_connect(&mut self, addr: &Address) -> GapResult<()> {
        self.record(LinkCall::LeCancelConnect(*addr));
        Ok(())
    }

    fn connection_parameter_update_reply(
        &mut self,
        handle: u16,
        identifier: u8,
        accept: bool,
    ) -> GapResult<()> {
        self.record(LinkCall::ParamUpdateReply {
            handle,
            identifier,
            accept,
        });
        Ok(())
    }
}

pub struct MockSmp {
    calls: Arc<Mutex<Vec<SmpCall>>>,
}

impl MockSmp {
    fn record(&self, call: SmpCall) -> GapResult<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl SecurityManager for MockSmp {
    fn start_pair(&mut self, handle: u16, features: &PairingFeatures) -> GapResult<()> {
        self.record(SmpCall::StartPair(handle, *features))
    }

    fn remote_pair_request_reply(
        &mut self,
        handle: u16,
        reply: Result<&PairingFeatures, u8>,
    ) -> GapResult<()> {
        self.record(SmpCall::PairRequestReply(handle, reply.copied()))
    }

    fn remote_pair_response_reply(&mut self, handle: u16, reply: Result<(), u8>) -> GapResult<()> {
        self.record(SmpCall::PairResponseReply(handle, reply))
    }

    fn remote_security_request_reply(
        &mut self,
        handle: u16,
        reply: Result<(), u8>,
    ) -> GapResult<()> {
        self.record(SmpCall::SecurityRequestReply(handle, reply))
    }

    fn authentication_request_reply(
        &mut self,
        handle: u16,
        method: PairMethod,
        reply: Result<AuthenticationValue, u8>,
    ) -> GapResult<()> {
        self.record(SmpCall::AuthReply(handle, method, reply))
    }

    fn send_security_request(&mut self, handle: u16, auth_req: AuthRequirements) -> GapResult<()> {
        self.record(SmpCall::SendSecurityRequest(handle, auth_req))
    }

    fn long_term_key_request_reply(
        &mut self,
        handle: u16,
        key: Option<&[u8; 16]>,
    ) -> GapResult<()> {
        self.record(SmpCall::LtkReply(handle, key.copied()))
    }

    fn start_encryption(&mut self, handle: u16, key: &LongTermKey) -> GapResult<()> {
        self.record(SmpCall::StartEncryption(handle, key.clone()))
    }

    fn cancel_pair(&mut self, handle: u16) -> GapResult<()> {
        self.record(SmpCall::CancelPair(handle))
    }

    fn generate_signature(&mut self, csrk: &[u8; 16], counter: u32, data: &[u8]) -> GapResult<()> {
        self.record(SmpCall::Sign {
            csrk: *csrk,
            counter,
            data: data.to_vec(),
        })
    }

    fn resolve_rpa(&mut self, addr: &BdAddr, irk: &[u8; 16]) -> GapResult<()> {
        self.record(SmpCall::Resolve {
            addr: *addr,
            irk: *irk,
        })
    }
}

/// Collaborators wired to a fresh recorder
pub fn collaborators() -> (Collaborators, Recorder) {
    collaborators_with(false)
}

/// Collaborators whose ACL connection attempts are rejected
pub fn collaborators_with(fail_connect: bool) -> (Collaborators, Recorder) {
    let recorder = Recorder::default();
    let collaborators = Collaborators {
        controller: Box::new(MockController {
            commands: recorder.commands.clone(),
        }),
        links: Box::new(MockLinks {
            calls: recorder.links.clone(),
            fail_connect,
        }),
        security_manager: Box::new(MockSmp {
            calls: recorder.smp.clone(),
        }),
    };
    (collaborators, recorder)
}

/// Engine context with default configuration
pub fn context() -> (GapContext, Recorder) {
    let (collaborators, recorder) = collaborators();
    (GapContext::new(GapConfig::default(), collaborators), recorder)
}

pub fn addr(last: u8) -> BdAddr {
    BdAddr::new([last, 0x22, 0x33, 0x44, 0x55, 0x66])
}

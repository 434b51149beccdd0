//! Interface to the LE pairing and cryptography engine
//!
//! Every operation is accepted or rejected immediately. Results come back
//! through the [`EventTranslator`](crate::translator::EventTranslator): pair
//! results, authentication requests, signature results and resolution results
//! each arrive as one completion per outstanding operation.

use super::keys::LongTermKey;
use super::types::{AuthRequirements, AuthenticationValue, PairMethod, PairingFeatures};
use crate::error::GapResult;
use crate::gap::BdAddr;

pub trait SecurityManager: Send {
    /// Start pairing as initiator with the given features
    fn start_pair(&mut self, handle: u16, features: &PairingFeatures) -> GapResult<()>;

    /// Answer a peer's pairing request: `Ok` accepts with local features,
    /// `Err` rejects with a pairing-failed reason.
    fn remote_pair_request_reply(
        &mut self,
        handle: u16,
        reply: Result<&PairingFeatures, u8>,
    ) -> GapResult<()>;

    /// Accept or reject the peer's pairing response
    fn remote_pair_response_reply(&mut self, handle: u16, reply: Result<(), u8>) -> GapResult<()>;

    /// Accept or reject a peer's security request
    fn remote_security_request_reply(
        &mut self,
        handle: u16,
        reply: Result<(), u8>,
    ) -> GapResult<()>;

    /// Answer an authentication request for the negotiated method
    fn authentication_request_reply(
        &mut self,
        handle: u16,
        method: PairMethod,
        reply: Result<AuthenticationValue, u8>,
    ) -> GapResult<()>;

    /// Ask the central to secure the link (peripheral role)
    fn send_security_request(&mut self, handle: u16, auth_req: AuthRequirements) -> GapResult<()>;

    /// Answer the controller's LTK request; `None` is a negative reply
    fn long_term_key_request_reply(&mut self, handle: u16, key: Option<&[u8; 16]>)
        -> GapResult<()>;

    /// Encrypt the link with a stored key (central role)
    fn start_encryption(&mut self, handle: u16, key: &LongTermKey) -> GapResult<()>;

    fn cancel_pair(&mut self, handle: u16) -> GapResult<()>;

    /// Compute a data signature with `csrk` and `counter`
    fn generate_signature(&mut self, csrk: &[u8; 16], counter: u32, data: &[u8]) -> GapResult<()>;

    /// Check whether `addr` was generated from `irk`
    fn resolve_rpa(&mut self, addr: &BdAddr, irk: &[u8; 16]) -> GapResult<()>;
}

//! LE pairing and security engine
//!
//! Drives the external pairing engine ([`SecurityManager`](crate::smp::SecurityManager))
//! on behalf of LE clients:
//! - Security requests for a minimum encryption level per link
//! - Local and peer-initiated pairing, serialized by a pairing lock
//! - Stored-key encryption on both roles
//! - Data signing jobs with replay protection
//! - Resolution of private addresses in advertising reports

mod callbacks;
mod connection;
mod pairing;
mod rpa;
mod security;
mod signature;

#[cfg(test)]
mod tests;

pub use self::callbacks::{
    LeConnectionCallback, LePairCallback, LeSecurityCallback, LeSecurityResultCallback,
    ReportSubscriber,
};
pub use self::connection::{
    ConnectionParameters, LeConnectionState, LeSecurityRequest, LeSecuritySettings,
    LeSecurityStatus,
};
pub use self::pairing::PairingLock;
pub use self::rpa::{RpaQueue, RpaResolutionTask};
pub use self::signature::{
    signature_counter, SignCounterKind, SignatureCallback, SignatureJob, SignatureOp,
    SignatureQueue, SignatureResult, SigningKeys,
};

use crate::gap::{Address, BdAddr, LinkRegistry};
use crate::smp::IdentityResolvingKey;
use std::collections::HashMap;

/// State of the LE security engine
pub struct LeState {
    pub enabled: bool,
    pub settings: LeSecuritySettings,
    pub connections: LinkRegistry<LeConnectionState>,
    pub pairing_lock: PairingLock,
    pub signatures: SignatureQueue,
    pub signing: HashMap<BdAddr, SigningKeys>,
    pub rpa: RpaQueue,
    pub irks: Vec<IdentityResolvingKey>,
    /// Last private address seen for each identity address
    pub current_addresses: HashMap<BdAddr, Address>,
    pub pair_callback: Option<Box<dyn LePairCallback>>,
    pub security_callback: Option<Box<dyn LeSecurityCallback>>,
    pub connection_callback: Option<Box<dyn LeConnectionCallback>>,
    pub report_subscribers: Vec<Box<dyn ReportSubscriber>>,
}

impl Default for LeState {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: LeSecuritySettings::default(),
            connections: LinkRegistry::new(),
            pairing_lock: PairingLock::new(),
            signatures: SignatureQueue::new(),
            signing: HashMap::new(),
            rpa: RpaQueue::new(),
            irks: Vec::new(),
            current_addresses: HashMap::new(),
            pair_callback: None,
            security_callback: None,
            connection_callback: None,
            report_subscribers: Vec::new(),
        }
    }
}

impl std::fmt::Debug for LeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeState")
            .field("enabled", &self.enabled)
            .field("settings", &self.settings)
            .field("connections", &self.connections.len())
            .field("pairing_lock", &self.pairing_lock)
            .field("signatures", &self.signatures.len())
            .field("rpa", &self.rpa.len())
            .field("irks", &self.irks.len())
            .finish()
    }
}

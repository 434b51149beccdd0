//! BlueGAP - Bluetooth GAP security and pairing orchestration
//!
//! This library sits between profile clients and the lower Bluetooth layers
//! (controller, link manager and an LE pairing engine). It decides when a link
//! needs authorization, authentication or encryption, drives classic Secure
//! Simple Pairing and legacy PIN pairing through the controller, and
//! orchestrates LE pairing, stored-key encryption, data signing and resolution
//! of private addresses.
//!
//! All engine state is owned by a single worker thread. Clients call through
//! [`GapStack`]; lower layers report back through an [`EventTranslator`].

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod gap;
pub mod hci;
pub mod le;
pub mod security;
pub mod smp;
pub mod stack;
pub mod translator;

#[cfg(test)]
mod mocks;

// Re-export common types for convenience
pub use config::GapConfig;
pub use context::{Collaborators, GapContext};
pub use error::{GapError, GapResult};
pub use gap::{
    Address, AddressType, BdAddr, Direction, Protocol, Role, SecurityMode, SecurityModeFlags,
    SecurityResult, ServiceId, ServiceInfo,
};
pub use hci::{Controller, ControllerEvent, HciCommand, HciEvent, LeAdvertisingReport, LinkManager};
pub use le::{
    LeConnectionCallback, LePairCallback, LeSecurityCallback, ReportSubscriber, SignatureResult,
};
pub use security::{AuthenticationCallback, IoCapabilityReply, SecurityCallback};
pub use smp::{
    AuthRequirements, EncryptionLevel, IoCapability, KeyDistribution, PairMethod, PairResult,
    PairingFeatures, SecurityManager,
};
pub use stack::GapStack;
pub use translator::EventTranslator;

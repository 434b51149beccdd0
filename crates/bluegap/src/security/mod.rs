//! Classic (BR/EDR) security policy engine
//!
//! Profiles register per-service requirements and ask for security before
//! opening a channel. Requests are kept in a FIFO and driven one link action
//! at a time per connection:
//! - Authorization through the registered [`SecurityCallback`]
//! - Authentication through AuthenticationRequested
//! - Encryption through SetConnectionEncryption
//!
//! The pairing exchange the controller runs in between (IO capabilities,
//! confirmations, link keys) is routed through the [`AuthenticationCallback`].

mod auth;
mod callbacks;
mod connection;
mod policy;
mod request;
mod service;


pub use self::callbacks::{
    AuthenticationCallback, IoCapabilityReply, SecurityCallback, SecurityResultCallback,
};
pub use self::connection::{
    is_authenticated_link_key, AuthenticationStatus, ConnectionState, DeviceSecurityStatus,
    EncryptionStatus,
};
pub use self::request::{RequestId, RequestQueue, RequestStatus, SecurityRequest};
pub use self::service::{ProfileRegistration, ServiceRegistry};

use crate::gap::{LinkRegistry, SecurityMode};

/// State of the classic security engine
pub struct ClassicState {
    pub enabled: bool,
    pub mode: SecurityMode,
    pub bondable: bool,
    pub services: ServiceRegistry,
    pub requests: RequestQueue,
    pub connections: LinkRegistry<ConnectionState>,
    pub security_callback: Option<Box<dyn SecurityCallback>>,
    pub auth_callback: Option<Box<dyn AuthenticationCallback>>,
}

impl Default for ClassicState {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: SecurityMode::Mode4,
            bondable: false,
            services: ServiceRegistry::new(),
            requests: RequestQueue::new(),
            connections: LinkRegistry::new(),
            security_callback: None,
            auth_callback: None,
        }
    }
}

impl std::fmt::Debug for ClassicState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassicState")
            .field("enabled", &self.enabled)
            .field("mode", &self.mode)
            .field("bondable", &self.bondable)
            .field("services", &self.services.len())
            .field("requests", &self.requests.len())
            .field("connections", &self.connections.len())
            .finish()
    }
}

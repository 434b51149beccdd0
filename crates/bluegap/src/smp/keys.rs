//! Key records for LE security
//!
//! Long Term Keys (LTK), Identity Resolving Keys (IRK), and Connection
//! Signature Resolving Keys (CSRK) as handed to profile clients after a
//! pairing and back to the engine for encryption and signing.

use crate::gap::Address;

/// Long Term Key (LTK) information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongTermKey {
    /// Key value
    pub key: [u8; 16],
    /// EDIV (Encrypted Diversifier)
    pub ediv: u16,
    /// RAND (Random number)
    pub rand: u64,
    /// Negotiated key size in octets
    pub key_size: u8,
}

impl LongTermKey {
    /// Create a new Long Term Key
    pub fn new(key: [u8; 16], ediv: u16, rand: u64, key_size: u8) -> Self {
        Self {
            key,
            ediv,
            rand,
            key_size,
        }
    }
}

/// Identity Resolving Key (IRK)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityResolvingKey {
    /// Key value
    pub key: [u8; 16],
    /// Identity address the key resolves to
    pub identity: Address,
}

impl IdentityResolvingKey {
    /// Create a new Identity Resolving Key
    pub fn new(key: [u8; 16], identity: Address) -> Self {
        Self { key, identity }
    }
}

/// Connection Signature Resolving Key (CSRK)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSignatureResolvingKey {
    /// Key value
    pub key: [u8; 16],
    /// Counter of the next signed write
    pub sign_counter: u32,
    /// Whether the key came from an authenticated pairing
    pub authenticated: bool,
}

impl ConnectionSignatureResolvingKey {
    /// Create a new Connection Signature Resolving Key
    pub fn new(key: [u8; 16], authenticated: bool) -> Self {
        Self {
            key,
            sign_counter: 0,
            authenticated,
        }
    }

    /// Advance the counter past `used`. The counter never moves backwards.
    pub fn advance_past(&mut self, used: u32) -> u32 {
        self.sign_counter = self.sign_counter.max(used.wrapping_add(1));
        self.sign_counter
    }
}

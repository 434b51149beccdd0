//! Security Manager Protocol (SMP) types
//!
//! The pairing protocol itself runs in an external engine; this module holds
//! the vocabulary the GAP layer shares with it:
//! - IO capabilities, authentication requirements and key distribution
//! - Negotiated pairing methods and the values that answer them
//! - Typed key records produced by a pairing
//! - The [`SecurityManager`] interface the engine is driven through

pub mod constants;
mod engine;
mod keys;
mod types;


// Re-export public API
pub use self::engine::SecurityManager;
pub use self::keys::*;
pub use self::types::*;

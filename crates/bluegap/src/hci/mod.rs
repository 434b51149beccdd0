//! Bluetooth HCI (Host Controller Interface) surface used by the engine
//!
//! Typed commands, event decoding, and the controller/link-manager traits.

pub mod constants;
pub mod controller;
pub mod event;
pub mod packet;


pub use controller::{Controller, LinkManager, LocalFeatures, HCI_VERSION_4_2};
pub use event::ControllerEvent;
pub use packet::{HciCommand, HciEvent, LeAdvertisingReport};

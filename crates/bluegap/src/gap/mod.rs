pub mod constants;
pub mod registry;
pub mod types;

pub use constants::*;
pub use registry::LinkRegistry;
pub use types::*;

//! Global configuration of the engine: application identity, logging
//! and circuit breaker defaults, resolved from defaults, YAML and environment.
mod base;
pub mod constant;
mod entity;

pub use base::*;
pub use constant::*;
pub use entity::*;

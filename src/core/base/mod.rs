//! Basic types shared by the rule check and statistic slots:
//! rules, check results, block errors and the per-invocation context.
mod block_error;
pub mod constant;
mod context;
mod result;
mod rule;
mod slot_chain;

pub use block_error::*;
pub use constant::*;
pub use context::*;
pub use result::*;
pub use rule::*;
pub use slot_chain::*;

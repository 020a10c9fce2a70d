//! Circuit breaking (degradation): rules, breakers, the rule manager
//! publishing them, and the slots applying them on the invocation path.
pub mod breaker;
mod default_rule;
mod rule;
mod rule_manager;
mod slot;
mod stat_slot;

pub use breaker::*;
pub use default_rule::*;
pub use rule::*;
pub use rule_manager::*;
pub use slot::*;
pub use stat_slot::*;

pub(crate) use crate::base::LIMIT_APP_DEFAULT;

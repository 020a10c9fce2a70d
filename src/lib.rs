//! # Sentinel Degrade
//!
//! Circuit breaking for the calls of an application, in the manner of Sentinel.
//! Each degrade rule guards a resource, which is any call the application names,
//! such as a downstream service or a database query. The circuit breaker built from
//! the rule watches the recent outcomes of the resource in a sliding window,
//! and stops admitting calls once the rule trips:
//!
//! - `ResponseTime`: the ratio of calls slower than the threshold reaches the slow ratio threshold.
//! - `ExceptionRatio`: the ratio of failed calls reaches the threshold.
//! - `ExceptionCount`: the number of failed calls reaches the threshold.
//!
//! After the recovery timeout, a single probing call is let through.
//! Its outcome decides whether the breaker closes again or stays open for another timeout.
//!
//! ## Initialization
//!
//! Sentinel is initialized by `init_default()`, `init_with_config()` or `init_with_config_file()`,
//! which resolve the general configuration, start the logger and apply the configuration
//! to the process-wide rule manager. See the `api` module for details.
//!
//! ## Load Degrade Rules
//!
//! The method `load_rules()` will overload all of the rules defined before.
//! The method `append_rules()` will append rules incrementally.
//! A rule with the resource `"*"` is the default rule, applying to every resource without rules of its own.
//!
//! ```rust
//! sentinel_degrade::load_rules(vec![Arc::new(circuitbreaker::Rule {
//!     resource: "example".into(),
//!     grade: circuitbreaker::Grade::ExceptionRatio,
//!     threshold: 0.5,
//!     recovery_timeout_sec: 10,
//!     ..Default::default()
//! })])?;
//! ```
//!
//! The rule manager is an ordinary value, the free functions above work on a process-wide instance.
//! Applications hosting several independent rule sets can create their own `circuitbreaker::RuleManager`.
//!
//! ### Via Dynamic Datasource
//!
//! Rules can also be loaded from a file watched by `datasource::FileDataSource`,
//! or from any source feeding a `datasource::DynamicProperty`.
//!

/// Sentinel API
pub mod api;
/// Core implementations of Sentinel, including the statistic structures,
/// such as the sliding window and its underlying LeapArray, the rule manager
/// of the circuit breakers, and the configuration.
pub mod core;
/// Dynamic datasource support for the degrade rules.
pub mod datasource;
/// Adapters for different logging crates.
pub mod logging;
// Utility functions for Sentinel.
pub mod utils;

// re-export precludes
pub use crate::core::*;
pub use api::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;

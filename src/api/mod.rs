//! mod `api` provides the topmost fundamental APIs for users using sentinel-degrade.
//! Users should initialize Sentinel before loading the degrade rules. Sentinel supports three ways to perform initialization:
//!
//!  1. `init_default()`, using default config to initialize.
//!  2. `init_with_config(config_entity: config::ConfigEntity)`, using customized config Entity to initialize.
//!  3. `init_with_config_file(config_path: &mut String)`, using yaml file to initialize.
//!
//! The process-wide rule manager behind these functions is built lazily,
//! so the APIs stay usable even without an explicit initialization.
//!
//! Here is the example code to guard a call with the degrade rules:
//!
//! ```
//! use sentinel_degrade::{self as sentinel, circuitbreaker};
//! use std::sync::Arc;
//!
//! sentinel::init_default().unwrap_or_else(|err| sentinel::logging::error!("{:?}", err));
//! sentinel::load_rules(vec![Arc::new(circuitbreaker::Rule {
//!     resource: "some-test".into(),
//!     grade: circuitbreaker::Grade::ExceptionCount,
//!     threshold: 10.0,
//!     recovery_timeout_sec: 3,
//!     ..Default::default()
//! })])
//! .unwrap();
//!
//! match sentinel::degrade_check("some-test", "") {
//!     Ok(_) => {
//!         let start = sentinel::utils::curr_time_millis();
//!         // do the real work here
//!         let elapsed = sentinel::utils::curr_time_millis() - start;
//!         sentinel::degrade_record("some-test", elapsed, None, false);
//!     }
//!     Err(block_err) => {
//!         // the call is degraded, fall back
//!         sentinel::logging::info!("{}", block_err);
//!     }
//! }
//! ```

mod base;
mod init;
mod slot_chain;

pub use base::*;
pub use init::*;
pub use slot_chain::*;

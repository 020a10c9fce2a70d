//! Initialization func initialize the Sentinel's runtime environment, including:
//! 1. override global config, from manually config or yaml file or env variable
//! 2. initialize global logger
//! 3. apply the config to the process-wide rule manager and start the optional time ticker

use super::global_rule_manager;
use crate::{config, config::ConfigEntity, utils, Result};

/// `init_default` initializes Sentinel using the configuration from system
/// environment and the default value.
#[inline]
pub fn init_default() -> Result<()> {
    init_sentinel(&mut String::new())
}

/// `init_with_config` initializes Sentinel using given config.
#[inline]
pub fn init_with_config(config_entity: ConfigEntity) -> Result<()> {
    config_entity.check()?;
    config::reset_global_config(config_entity);
    config::override_items_from_system_env()?;
    init_core_components()
}

/// Init loads Sentinel general configuration from the given YAML file
/// and initializes Sentinel.
#[inline]
pub fn init_with_config_file(config_path: &mut String) -> Result<()> {
    init_sentinel(config_path)
}

#[inline]
fn init_sentinel(config_path: &mut String) -> Result<()> {
    // a blank path is resolved from the environment, then falls back to the defaults
    config::init_config_with_yaml(config_path)?;
    init_core_components()
}

// `init_core_components` init core components with global config
#[inline]
fn init_core_components() -> Result<()> {
    config::init_log();
    global_rule_manager()
        .default_rule_resolver()
        .set_exclusions(config::default_rule_exclusions());
    if config::use_cache_time() {
        utils::start_time_ticker();
    }
    Ok(())
}

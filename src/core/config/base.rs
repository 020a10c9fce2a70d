use super::{constant::*, ConfigEntity};
use crate::{logging, utils, Error, Result};
use lazy_static::lazy_static;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

lazy_static! {
    static ref GLOBAL_CONFIG: RwLock<ConfigEntity> = RwLock::new(ConfigEntity::new());
}

#[inline]
fn global_config() -> RwLockReadGuard<'static, ConfigEntity> {
    GLOBAL_CONFIG.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn reset_global_config(entity: ConfigEntity) {
    *GLOBAL_CONFIG.write().unwrap_or_else(PoisonError::into_inner) = entity;
}

/// `init_config_with_yaml` loads general configuration from the YAML file under provided path,
/// then overrides the items present in the system environment.
pub fn init_config_with_yaml(config_path: &mut String) -> Result<()> {
    apply_yaml_config_file(config_path)?;
    override_items_from_system_env()?;
    Ok(())
}

// apply_yaml_config_file loads general configuration from the given YAML file.
fn apply_yaml_config_file(config_path: &mut String) -> Result<()> {
    // Priority: system environment > YAML file > default config
    if utils::is_blank(config_path) {
        // If the config file path is absent, Sentinel will try to resolve it from the system env.
        *config_path = env::var(CONF_FILE_PATH_ENV_KEY).unwrap_or_else(|_| CONFIG_FILENAME.into());
    }
    load_global_config_from_yaml_file(config_path)
}

fn load_global_config_from_yaml_file(path_str: &str) -> Result<()> {
    if path_str == CONFIG_FILENAME {
        // use default global config
        return Ok(());
    }
    let path = Path::new(path_str);
    if !path.exists() {
        return Err(Error::msg(format!(
            "Sentinel YAML configuration file {} does not exist!",
            path_str
        )));
    }
    let content = fs::read_to_string(path)?;
    let entity: ConfigEntity = serde_yaml::from_str(&content)?;
    entity.check()?;
    logging::info!(
        "[Config] Resolving Sentinel config from file, file {}",
        path_str
    );
    reset_global_config(entity);
    Ok(())
}

pub fn override_items_from_system_env() -> Result<()> {
    let app_name = match env::var(APP_NAME_ENV_KEY) {
        Ok(app_name) if !utils::is_blank(&app_name) => app_name,
        _ => return Ok(()),
    };
    let mut cfg = GLOBAL_CONFIG.write().unwrap_or_else(PoisonError::into_inner);
    let mut updated = cfg.clone();
    updated.config.app.app_name = app_name;
    updated.check()?;
    *cfg = updated;
    Ok(())
}

/// `init_log` starts the configured logging backend and prints the effective configuration.
pub fn init_log() {
    logging::logger_init(log_config_file());
    logging::info!("[Config] App name resolved, appName {}", app_name());
    logging::info!(
        "[Config] Print effective global config, globalConfig {}",
        *global_config()
    );
}

#[inline]
pub fn log_config_file() -> Option<String> {
    let file = global_config().config.log.config_file.clone();
    if utils::is_blank(&file) {
        None
    } else {
        Some(file)
    }
}

#[inline]
pub fn app_name() -> String {
    global_config().config.app.app_name.clone()
}

#[inline]
pub fn use_cache_time() -> bool {
    global_config().config.use_cache_time
}

#[inline]
pub fn stat_bucket_count() -> u32 {
    global_config().config.breaker.stat_bucket_count
}

#[inline]
pub fn default_rule_exclusions() -> Vec<String> {
    global_config().config.breaker.default_rule_exclusions.clone()
}

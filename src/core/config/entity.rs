use super::constant::*;
use crate::{utils, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    // app_name represents the name of current running service.
    pub app_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            app_name: DEFAULT_APP_NAME.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    // config_file is the log4rs configuration, only used with the `logger_log4rs` feature
    pub config_file: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            config_file: LOG_CONFIG_FILE.into(),
        }
    }
}

/// BreakerConfig represents the defaults shared by all circuit breakers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// bucket count of the sliding window, used when a rule leaves it unset
    /// or sets a count that does not divide its `stat_interval_ms`
    pub stat_bucket_count: u32,
    /// resources that never receive breakers from the wildcard rule
    pub default_rule_exclusions: Vec<String>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            stat_bucket_count: DEFAULT_STAT_BUCKET_COUNT,
            default_rule_exclusions: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SentinelConfig {
    pub app: AppConfig,
    pub log: LogConfig,
    pub breaker: BreakerConfig,
    // use_cache_time indicates whether to cache time(ms), it is false by default
    pub use_cache_time: bool,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        SentinelConfig {
            app: AppConfig::default(),
            log: LogConfig::default(),
            breaker: BreakerConfig::default(),
            use_cache_time: false,
        }
    }
}

// ConfigEntity represents the general configuration of Sentinel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ConfigEntity {
    pub version: String,
    pub config: SentinelConfig,
}

impl Default for ConfigEntity {
    fn default() -> Self {
        ConfigEntity {
            version: SENTINEL_VERSION.into(),
            config: SentinelConfig::default(),
        }
    }
}

impl ConfigEntity {
    pub fn new() -> Self {
        ConfigEntity::default()
    }

    pub fn check(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(Error::msg("empty version"));
        }
        if utils::is_blank(&self.config.app.app_name) {
            return Err(Error::msg("empty app name"));
        }
        if self.config.breaker.stat_bucket_count == 0 {
            return Err(Error::msg(
                "illegal breaker configuration: stat_bucket_count must be positive",
            ));
        }
        if self
            .config
            .breaker
            .default_rule_exclusions
            .iter()
            .any(|res| utils::is_blank(res))
        {
            return Err(Error::msg(
                "illegal breaker configuration: blank resource in default_rule_exclusions",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ConfigEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", fmtted)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_is_valid() {
        let entity = ConfigEntity::new();
        assert!(entity.check().is_ok());
        assert_eq!(entity.config.breaker.stat_bucket_count, DEFAULT_STAT_BUCKET_COUNT);
    }

    #[test]
    fn invalid_entities() {
        let mut entity = ConfigEntity::new();
        entity.version = String::new();
        assert!(entity.check().is_err());

        let mut entity = ConfigEntity::new();
        entity.config.app.app_name = "  ".into();
        assert!(entity.check().is_err());

        let mut entity = ConfigEntity::new();
        entity.config.breaker.stat_bucket_count = 0;
        assert!(entity.check().is_err());

        let mut entity = ConfigEntity::new();
        entity.config.breaker.default_rule_exclusions = vec!["".into()];
        assert!(entity.check().is_err());
    }

    #[test]
    fn partial_yaml() {
        let yaml = r#"
version: v1
config:
  app:
    app_name: order-service
  breaker:
    stat_bucket_count: 10
    default_rule_exclusions:
      - health
"#;
        let entity: ConfigEntity = serde_yaml::from_str(yaml).unwrap();
        assert!(entity.check().is_ok());
        assert_eq!(entity.config.app.app_name, "order-service");
        assert_eq!(entity.config.breaker.stat_bucket_count, 10);
        assert_eq!(entity.config.breaker.default_rule_exclusions, vec!["health"]);
        assert_eq!(entity.config.log, LogConfig::default());
        assert!(!entity.config.use_cache_time);
    }
}

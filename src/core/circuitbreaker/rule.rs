use crate::{
    base::{SentinelRule, LIMIT_APP_DEFAULT},
    config, utils, Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Resource key of the wildcard rule, which applies to every resource without explicit rules.
pub const WILDCARD_RESOURCE: &str = "*";
pub const DEFAULT_MIN_REQUEST_AMOUNT: u64 = 5;
pub const DEFAULT_SLOW_RATIO_THRESHOLD: f64 = 1.0;
pub const DEFAULT_STAT_INTERVAL_MS: u32 = 1000;

/// `Grade` decides which statistic trips the circuit breaker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    /// trips on the ratio of slow requests, a request is slow if its rt exceeds the threshold (ms)
    ResponseTime,
    /// trips on the ratio of requests completed with an error
    ExceptionRatio,
    /// trips on the absolute amount of errors within the statistic interval
    ExceptionCount,
}

impl Default for Grade {
    fn default() -> Grade {
        Grade::ResponseTime
    }
}

/// Rule encompasses the fields of circuit breaking rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// unique id, not taken into account by equality
    pub id: String,
    /// resource name, `*` stands for the default rule
    pub resource: String,
    pub grade: Grade,
    /// `threshold` represents the threshold of circuit breaker.
    /// for `ResponseTime`, it is the max allowed response time (ms), slower requests are slow requests
    /// for `ExceptionRatio`, it represents the max error request ratio
    /// for `ExceptionCount`, it represents the max error request count
    pub threshold: f64,
    /// `recovery_timeout_sec` represents recovery timeout (in seconds) before the circuit breaker probes.
    /// During the open period, no requests are permitted until the timeout has elapsed.
    /// After that, the circuit breaker will transform to half-open state for trying one "trial" request.
    pub recovery_timeout_sec: u32,
    /// min_request_amount represents the minimum number of requests (in an active statistic time span)
    /// that can trigger circuit breaking. Not used by `ExceptionCount`.
    pub min_request_amount: u64,
    /// the ratio of slow requests that trips a `ResponseTime` breaker
    pub slow_ratio_threshold: f64,
    /// stat_interval_ms represents statistic time interval of the internal circuit breaker (in ms).
    pub stat_interval_ms: u32,
    /// `stat_sliding_window_bucket_count` represents the bucket count of statistic sliding window.
    /// The statistic will be more precise as the bucket count increases, but the memory cost increases too.
    /// The following must be true: `stat_interval_ms % stat_sliding_window_bucket_count == 0`,
    /// otherwise the configured default bucket count (or 1) will be used.
    pub stat_sliding_window_bucket_count: u32,
    /// the caller this rule limits, `default` means all callers
    pub limit_app: String,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            id: uuid::Uuid::new_v4().to_string(),
            resource: String::default(),
            grade: Grade::default(),
            threshold: 0.0,
            recovery_timeout_sec: 0,
            min_request_amount: DEFAULT_MIN_REQUEST_AMOUNT,
            slow_ratio_threshold: DEFAULT_SLOW_RATIO_THRESHOLD,
            stat_interval_ms: DEFAULT_STAT_INTERVAL_MS,
            stat_sliding_window_bucket_count: 0,
            limit_app: LIMIT_APP_DEFAULT.into(),
        }
    }
}

impl Rule {
    pub fn is_wildcard(&self) -> bool {
        self.resource == WILDCARD_RESOURCE
    }

    /// whether this rule limits invocations from `origin`
    pub fn applies_to(&self, origin: &str) -> bool {
        self.limit_app == LIMIT_APP_DEFAULT || self.limit_app == origin
    }

    /// a copy of the rule bound to another resource, used to instantiate default rules
    pub fn with_resource(&self, resource: &str) -> Rule {
        Rule {
            resource: resource.into(),
            ..self.clone()
        }
    }

    pub fn get_rule_stat_sliding_window_bucket_count(&self) -> u32 {
        let divides = |count: u32| count != 0 && self.stat_interval_ms % count == 0;
        if divides(self.stat_sliding_window_bucket_count) {
            return self.stat_sliding_window_bucket_count;
        }
        let fallback = config::stat_bucket_count();
        if divides(fallback) {
            fallback
        } else {
            1
        }
    }

    pub fn recovery_timeout_ms(&self) -> u64 {
        self.recovery_timeout_sec as u64 * 1000
    }
}

impl SentinelRule for Rule {
    fn resource_name(&self) -> String {
        self.resource.clone()
    }

    fn limit_app(&self) -> String {
        self.limit_app.clone()
    }

    fn is_valid(&self) -> crate::Result<()> {
        if utils::is_blank(&self.resource) {
            return Err(Error::msg("empty resource name"));
        }
        if self.threshold.is_nan() || self.threshold < 0.0 {
            return Err(Error::msg("invalid threshold"));
        }
        if self.grade == Grade::ExceptionRatio && self.threshold > 1.0 {
            return Err(Error::msg(
                "invalid ExceptionRatio threshold (valid range: [0.0, 1.0])",
            ));
        }
        if self.recovery_timeout_sec == 0 {
            return Err(Error::msg("invalid recovery_timeout_sec"));
        }
        if self.stat_interval_ms == 0 {
            return Err(Error::msg("invalid stat_interval_ms"));
        }
        if self.min_request_amount == 0 {
            return Err(Error::msg("invalid min_request_amount"));
        }
        if !(0.0..=1.0).contains(&self.slow_ratio_threshold) {
            return Err(Error::msg(
                "invalid slow_ratio_threshold (valid range: [0.0, 1.0])",
            ));
        }
        if utils::is_blank(&self.limit_app) {
            return Err(Error::msg("empty limit_app"));
        }
        Ok(())
    }
}

/// `is_valid_rule` checks whether the rule could become a circuit breaker.
pub fn is_valid_rule(rule: &Rule) -> bool {
    rule.is_valid().is_ok()
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.grade == other.grade
            && self.threshold.to_bits() == other.threshold.to_bits()
            && self.recovery_timeout_sec == other.recovery_timeout_sec
            && self.min_request_amount == other.min_request_amount
            && self.slow_ratio_threshold.to_bits() == other.slow_ratio_threshold.to_bits()
            && self.stat_interval_ms == other.stat_interval_ms
            && self.stat_sliding_window_bucket_count == other.stat_sliding_window_bucket_count
            && self.limit_app == other.limit_app
    }
}

impl Eq for Rule {}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.hash(state);
        self.grade.hash(state);
        self.threshold.to_bits().hash(state);
        self.recovery_timeout_sec.hash(state);
        self.min_request_amount.hash(state);
        self.slow_ratio_threshold.to_bits().hash(state);
        self.stat_interval_ms.hash(state);
        self.stat_sliding_window_bucket_count.hash(state);
        self.limit_app.hash(state);
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", fmtted)
    }
}

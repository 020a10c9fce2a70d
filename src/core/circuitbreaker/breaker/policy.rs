use super::{Aggregate, Grade, Rule};

/// `TriggerPolicy` is the trip condition of a circuit breaker, derived from its rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerPolicy {
    SlowRequestRatio {
        max_allowed_rt_ms: f64,
        slow_ratio_threshold: f64,
        min_request_amount: u64,
    },
    ExceptionRatio {
        threshold: f64,
        min_request_amount: u64,
    },
    ExceptionCount {
        threshold: f64,
    },
}

impl TriggerPolicy {
    pub fn from_rule(rule: &Rule) -> Self {
        match rule.grade {
            Grade::ResponseTime => TriggerPolicy::SlowRequestRatio {
                max_allowed_rt_ms: rule.threshold,
                slow_ratio_threshold: rule.slow_ratio_threshold,
                min_request_amount: rule.min_request_amount,
            },
            Grade::ExceptionRatio => TriggerPolicy::ExceptionRatio {
                threshold: rule.threshold,
                min_request_amount: rule.min_request_amount,
            },
            Grade::ExceptionCount => TriggerPolicy::ExceptionCount {
                threshold: rule.threshold,
            },
        }
    }

    /// only `SlowRequestRatio` classifies requests as slow
    pub fn is_slow(&self, rt: u64) -> bool {
        match *self {
            TriggerPolicy::SlowRequestRatio {
                max_allowed_rt_ms, ..
            } => rt as f64 > max_allowed_rt_ms,
            _ => false,
        }
    }

    /// whether a single completed probe counts as a failure
    pub fn is_probe_failure(&self, is_slow: bool, has_error: bool) -> bool {
        match self {
            TriggerPolicy::SlowRequestRatio { .. } => is_slow,
            _ => has_error,
        }
    }

    /// `evaluate` returns the triggering value when the window breaches the threshold.
    pub fn evaluate(&self, agg: &Aggregate) -> Option<f64> {
        match *self {
            TriggerPolicy::SlowRequestRatio {
                slow_ratio_threshold,
                min_request_amount,
                ..
            } => {
                if agg.total < min_request_amount {
                    return None;
                }
                let slow_ratio = agg.slow_ratio();
                (slow_ratio >= slow_ratio_threshold).then(|| slow_ratio)
            }
            TriggerPolicy::ExceptionRatio {
                threshold,
                min_request_amount,
            } => {
                if agg.total < min_request_amount {
                    return None;
                }
                let exception_ratio = agg.exception_ratio();
                (exception_ratio >= threshold).then(|| exception_ratio)
            }
            TriggerPolicy::ExceptionCount { threshold } => {
                let exception = agg.exception as f64;
                (exception >= threshold).then(|| exception)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slow_request_ratio() {
        let policy = TriggerPolicy::from_rule(&Rule {
            resource: "abc".into(),
            grade: Grade::ResponseTime,
            threshold: 100.0,
            slow_ratio_threshold: 0.5,
            min_request_amount: 5,
            ..Default::default()
        });
        assert!(policy.is_slow(101));
        assert!(!policy.is_slow(100));
        assert!(policy.is_probe_failure(true, false));
        assert!(!policy.is_probe_failure(false, true));

        let agg = Aggregate {
            total: 5,
            slow: 3,
            ..Default::default()
        };
        assert_eq!(policy.evaluate(&agg), Some(0.6));
        let agg = Aggregate {
            total: 4,
            slow: 4,
            ..Default::default()
        };
        assert_eq!(policy.evaluate(&agg), None);
        let agg = Aggregate {
            total: 10,
            slow: 4,
            ..Default::default()
        };
        assert_eq!(policy.evaluate(&agg), None);
    }

    #[test]
    fn exception_ratio() {
        let policy = TriggerPolicy::from_rule(&Rule {
            resource: "abc".into(),
            grade: Grade::ExceptionRatio,
            threshold: 0.5,
            min_request_amount: 4,
            ..Default::default()
        });
        assert!(!policy.is_slow(10_000));
        assert!(policy.is_probe_failure(false, true));
        let agg = Aggregate {
            total: 4,
            exception: 2,
            ..Default::default()
        };
        assert_eq!(policy.evaluate(&agg), Some(0.5));
        let agg = Aggregate {
            total: 3,
            exception: 3,
            ..Default::default()
        };
        assert_eq!(policy.evaluate(&agg), None);
    }

    #[test]
    fn exception_count_ignores_min_request_amount() {
        let policy = TriggerPolicy::from_rule(&Rule {
            resource: "abc".into(),
            grade: Grade::ExceptionCount,
            threshold: 3.0,
            min_request_amount: 100,
            ..Default::default()
        });
        let agg = Aggregate {
            total: 3,
            exception: 3,
            ..Default::default()
        };
        assert_eq!(policy.evaluate(&agg), Some(3.0));
        let agg = Aggregate {
            total: 3,
            exception: 2,
            ..Default::default()
        };
        assert_eq!(policy.evaluate(&agg), None);
    }
}

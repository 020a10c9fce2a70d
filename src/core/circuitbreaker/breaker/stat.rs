use crate::{
    logging,
    stat::{LeapArray, MetricTrait},
    utils::curr_time_millis,
    Result,
};
use std::sync::atomic::{AtomicU64, Ordering};

/// `DegradeBucket` holds the counters of one time slice of the sliding window.
#[derive(Debug, Default)]
pub struct DegradeBucket {
    pub(crate) pass: AtomicU64,
    pub(crate) block: AtomicU64,
    pub(crate) complete: AtomicU64,
    pub(crate) exception: AtomicU64,
    pub(crate) slow: AtomicU64,
    pub(crate) rt: AtomicU64,
}

impl MetricTrait for DegradeBucket {
    fn reset(&self) {
        self.pass.store(0, Ordering::SeqCst);
        self.block.store(0, Ordering::SeqCst);
        self.complete.store(0, Ordering::SeqCst);
        self.exception.store(0, Ordering::SeqCst);
        self.slow.store(0, Ordering::SeqCst);
        self.rt.store(0, Ordering::SeqCst);
    }
}

/// Totals over the alive buckets of a sliding window.
/// `total` counts completed requests, the base of every ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aggregate {
    pub pass: u64,
    pub block: u64,
    pub total: u64,
    pub exception: u64,
    pub slow: u64,
    pub total_rt: u64,
}

impl Aggregate {
    pub fn avg_rt(&self) -> f64 {
        ratio(self.total_rt, self.total)
    }

    pub fn slow_ratio(&self) -> f64 {
        ratio(self.slow, self.total)
    }

    pub fn exception_ratio(&self) -> f64 {
        ratio(self.exception, self.total)
    }
}

#[inline]
fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

pub type DegradeLeapArray = LeapArray<DegradeBucket>;

/// `SlidingWindowMetric` is the rolling statistic of one circuit breaker.
#[derive(Debug)]
pub struct SlidingWindowMetric {
    data: DegradeLeapArray,
}

impl SlidingWindowMetric {
    pub fn new(sample_count: u32, interval_ms: u32) -> Result<Self> {
        Ok(SlidingWindowMetric {
            data: LeapArray::new(sample_count, interval_ms)?,
        })
    }

    pub fn sample_count(&self) -> u32 {
        self.data.sample_count()
    }

    pub fn interval_ms(&self) -> u32 {
        self.data.interval_ms()
    }

    // a failure to locate the bucket (clock moved backwards) drops the sample
    fn with_bucket<F: FnOnce(&DegradeBucket)>(&self, now: u64, f: F) {
        match self.data.get_bucket_of_time(now) {
            Ok(bucket) => f(bucket.value()),
            Err(err) => logging::debug!(
                "[CircuitBreaker SlidingWindowMetric] Fail to get bucket at {}, reason: {:?}",
                now,
                err
            ),
        }
    }

    pub fn record_pass(&self) {
        self.record_pass_with_time(curr_time_millis());
    }

    pub fn record_pass_with_time(&self, now: u64) {
        self.with_bucket(now, |b| {
            b.pass.fetch_add(1, Ordering::SeqCst);
        });
    }

    pub fn record_block(&self) {
        self.record_block_with_time(curr_time_millis());
    }

    pub fn record_block_with_time(&self, now: u64) {
        self.with_bucket(now, |b| {
            b.block.fetch_add(1, Ordering::SeqCst);
        });
    }

    pub fn record_exception(&self) {
        self.record_exception_with_time(curr_time_millis());
    }

    pub fn record_exception_with_time(&self, now: u64) {
        self.with_bucket(now, |b| {
            b.exception.fetch_add(1, Ordering::SeqCst);
        });
    }

    /// records one completed request
    pub fn record_response_time(&self, rt: u64, is_slow: bool) {
        self.record_response_time_with_time(curr_time_millis(), rt, is_slow);
    }

    pub fn record_response_time_with_time(&self, now: u64, rt: u64, is_slow: bool) {
        self.with_bucket(now, |b| {
            b.complete.fetch_add(1, Ordering::SeqCst);
            b.rt.fetch_add(rt, Ordering::SeqCst);
            if is_slow {
                b.slow.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    pub fn current_aggregate(&self) -> Aggregate {
        self.current_aggregate_with_time(curr_time_millis())
    }

    pub fn current_aggregate_with_time(&self, now: u64) -> Aggregate {
        let mut agg = Aggregate::default();
        for bucket in self.data.get_valid_values(now) {
            let b = bucket.value();
            agg.pass += b.pass.load(Ordering::SeqCst);
            agg.block += b.block.load(Ordering::SeqCst);
            agg.total += b.complete.load(Ordering::SeqCst);
            agg.exception += b.exception.load(Ordering::SeqCst);
            agg.slow += b.slow.load(Ordering::SeqCst);
            agg.total_rt += b.rt.load(Ordering::SeqCst);
        }
        agg
    }

    /// zeroes every bucket
    pub fn reset(&self) {
        self.data.reset_values();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;

    const NOW: u64 = 1_600_000_000_000;

    #[test]
    fn reset_bucket() {
        let bucket = DegradeBucket::default();
        bucket.pass.store(5, Ordering::SeqCst);
        bucket.slow.store(3, Ordering::SeqCst);
        bucket.rt.store(300, Ordering::SeqCst);
        bucket.reset();
        assert_eq!(bucket.pass.load(Ordering::SeqCst), 0);
        assert_eq!(bucket.slow.load(Ordering::SeqCst), 0);
        assert_eq!(bucket.rt.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn aggregate_ratios() {
        let agg = Aggregate::default();
        assert_eq!(agg.avg_rt(), 0.0);
        assert_eq!(agg.slow_ratio(), 0.0);
        let agg = Aggregate {
            total: 4,
            slow: 1,
            exception: 2,
            total_rt: 100,
            ..Default::default()
        };
        assert_eq!(agg.avg_rt(), 25.0);
        assert_eq!(agg.slow_ratio(), 0.25);
        assert_eq!(agg.exception_ratio(), 0.5);
    }

    #[test]
    fn records_into_window() {
        let metric = SlidingWindowMetric::new(10, 1000).unwrap();
        let mut rng = rand::thread_rng();
        let mut total_rt = 0;
        for i in 0..20 {
            let rt: u64 = rng.gen_range(1..200);
            total_rt += rt;
            let now = NOW + i * 10;
            metric.record_pass_with_time(now);
            metric.record_response_time_with_time(now, rt, rt > 100);
        }
        metric.record_block_with_time(NOW + 300);
        metric.record_exception_with_time(NOW + 300);
        let agg = metric.current_aggregate_with_time(NOW + 300);
        assert_eq!(agg.pass, 20);
        assert_eq!(agg.total, 20);
        assert_eq!(agg.block, 1);
        assert_eq!(agg.exception, 1);
        assert_eq!(agg.total_rt, total_rt);
    }

    #[test]
    fn expired_buckets_are_dropped() {
        let metric = SlidingWindowMetric::new(2, 1000).unwrap();
        metric.record_response_time_with_time(NOW, 10, false);
        metric.record_response_time_with_time(NOW + 500, 10, true);
        assert_eq!(metric.current_aggregate_with_time(NOW + 999).total, 2);
        // the first bucket ages out exactly one interval after its start
        let agg = metric.current_aggregate_with_time(NOW + 1000);
        assert_eq!(agg.total, 1);
        assert_eq!(agg.slow, 1);
        assert_eq!(metric.current_aggregate_with_time(NOW + 1500).total, 0);
        // the stale slot is reused instead of being counted twice
        metric.record_response_time_with_time(NOW + 2000, 10, false);
        assert_eq!(metric.current_aggregate_with_time(NOW + 2000).total, 1);
    }

    #[test]
    fn reset_window() {
        let metric = SlidingWindowMetric::new(1, 1000).unwrap();
        metric.record_response_time_with_time(NOW, 10, true);
        metric.reset();
        assert_eq!(metric.current_aggregate_with_time(NOW), Aggregate::default());
    }
}

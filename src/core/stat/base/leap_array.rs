use crate::utils::curr_time_millis;
use crate::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const DEFAULT_TIME: u64 = 0;

/// use atomic types to ensure metric's internal mutability
/// otherwise, exclusive Mutex would be necessary on the LeapArray among threads
pub trait MetricTrait: fmt::Debug + Default + Send + Sync {
    fn reset(&self);
}

/// BucketWrap represent a slot to record metrics
/// The metric itself should be atomic
/// The length of BucketWrap could be seen in LeapArray.
/// The scope of time is [start_stamp, start_stamp+bucket_length)
#[derive(Debug, Default)]
pub struct BucketWrap<T: MetricTrait> {
    // The start timestamp of this statistic bucket wrapper.
    start_stamp: AtomicU64,
    // The actual data structure to record the metrics.
    value: T,
}

impl<T: MetricTrait> BucketWrap<T> {
    pub fn new(start_stamp: u64) -> Self {
        BucketWrap {
            start_stamp: AtomicU64::new(start_stamp),
            value: T::default(),
        }
    }

    pub fn start_stamp(&self) -> u64 {
        self.start_stamp.load(Ordering::SeqCst)
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn reset_start_stamp(&self, start_stamp: u64) {
        self.start_stamp.store(start_stamp, Ordering::SeqCst);
    }

    pub fn reset_value(&self) {
        self.value.reset();
    }

    pub fn is_time_in_bucket(&self, now: u64, bucket_len_ms: u32) -> bool {
        let start = self.start_stamp.load(Ordering::SeqCst);
        start <= now && now < start + (bucket_len_ms as u64)
    }

    /// a bucket is deprecated once its start falls out of `(now - interval, now]`
    pub fn is_deprecated(&self, now: u64, interval: u64) -> bool {
        let start = self.start_stamp.load(Ordering::SeqCst);
        now > start && now - start >= interval
    }
}

/// The BucketWrap leap array,
/// it treats the inner array as a ring
/// sample_count represent the number of BucketWrap
/// interval_ms represent the interval of LeapArray.
/// For example, bucket_len_ms is 200ms, interval_ms is 1000ms, so sample_count is 5.
/// Deprecated buckets are reset in place, the ring never reallocates.
#[derive(Debug)]
pub struct LeapArray<T: MetricTrait> {
    bucket_len_ms: u32,
    sample_count: u32,
    interval_ms: u32,
    array: Vec<BucketWrap<T>>,
    // one update lock per bucket, only taken when the bucket has to be reset
    mutex: Vec<Mutex<()>>,
}

impl<T: MetricTrait> LeapArray<T> {
    pub fn new(sample_count: u32, interval_ms: u32) -> Result<Self> {
        if sample_count == 0 || interval_ms == 0 || interval_ms % sample_count != 0 {
            return Err(Error::msg(
                "Invalid sample count or interval_ms. Time span needs to be evenly divided",
            ));
        }
        let mut array = Vec::with_capacity(sample_count as usize);
        let mut mutex = Vec::with_capacity(sample_count as usize);
        for _ in 0..sample_count {
            array.push(BucketWrap::default());
            mutex.push(Mutex::new(()));
        }
        Ok(LeapArray {
            bucket_len_ms: interval_ms / sample_count,
            sample_count,
            interval_ms,
            array,
            mutex,
        })
    }

    pub fn bucket_len_ms(&self) -> u32 {
        self.bucket_len_ms
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn current_bucket(&self) -> Result<&BucketWrap<T>> {
        self.get_bucket_of_time(curr_time_millis())
    }

    pub fn get_bucket_of_time(&self, now: u64) -> Result<&BucketWrap<T>> {
        let idx = self.time2idx(now) as usize;
        let target_start = self.calculate_start_stamp(now);
        /*
        Get bucket item at given time from the array.
        - (1) Bucket is absent, then claim it with a CAS on its start timestamp.
        - (2) Bucket is up-to-date, then just return the bucket.
        - (3) Bucket is deprecated, then reset it under the update lock.
        */
        let bucket = &self.array[idx];
        loop {
            let start = bucket.start_stamp();
            if start == DEFAULT_TIME {
                /*
                     B0       B1      B2    NULL      B4
                ||_______|_______|_______|_______|_______||___
                200     400     600     800     1000    1200  timestamp
                                            ^
                                         time=888
                           bucket is empty, so claim it
                */
                if bucket
                    .start_stamp
                    .compare_exchange(DEFAULT_TIME, target_start, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return Ok(bucket);
                }
                // another thread claimed it first, check again
            } else if start == target_start {
                /*
                    B0       B1      B2     B3      B4
                ||_______|_______|_______|_______|_______||___
                200     400     600     800     1000    1200  timestamp
                                            ^
                                         time=888
                           startTime of Bucket 3: 800, so it's up-to-date
                */
                return Ok(bucket);
            } else if target_start > start {
                /*
                  (old)
                            B0       B1      B2    NULL      B4
                |_______||_______|_______|_______|_______|_______||___
                ...    1200     1400    1600    1800    2000    2200  timestamp
                                             ^
                                          time=1676
                         startTime of Bucket 2: 400, deprecated, should be reset
                The value is cleared before the new start timestamp is published,
                so threads observing the new timestamp never write into stale counters.
                Only the lock holder resets; the others yield and look again.
                 */
                match self.mutex[idx].try_lock() {
                    Ok(_guard) => {
                        // another thread may have finished the reset before we got the lock
                        if bucket.start_stamp() < target_start {
                            bucket.reset_value();
                            bucket.reset_start_stamp(target_start);
                        }
                    }
                    Err(_) => std::thread::yield_now(),
                }
            } else {
                return Err(Error::msg("invalid time stamp, cannot find bucket"));
            }
        }
    }

    /// compute the start timestamp of current bucket
    pub(crate) fn calculate_start_stamp(&self, now: u64) -> u64 {
        now - now % (self.bucket_len_ms as u64)
    }

    pub(crate) fn time2idx(&self, now: u64) -> u64 {
        let idx = now / (self.bucket_len_ms as u64);
        idx % (self.sample_count as u64)
    }

    pub fn get_current_values(&self) -> Vec<&BucketWrap<T>> {
        self.get_valid_values(curr_time_millis())
    }

    ///  Get all BucketWrap within (now - interval, now]
    pub fn get_valid_values(&self, now: u64) -> Vec<&BucketWrap<T>> {
        self.array
            .iter()
            .filter(|bucket| {
                bucket.start_stamp() != DEFAULT_TIME
                    && bucket.start_stamp() <= now
                    && !bucket.is_deprecated(now, self.interval_ms as u64)
            })
            .collect()
    }

    /// Clear the values of all the buckets, keeping their time slices.
    pub fn reset_values(&self) {
        for bucket in &self.array {
            bucket.reset_value();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SAMPLE_COUNT: u32 = 20;
    const BUCKET_LEN_MS: u32 = 500; // 500 ms
    const INTERVAL_MS: u32 = BUCKET_LEN_MS * SAMPLE_COUNT; // 10 s

    impl MetricTrait for AtomicU64 {
        fn reset(&self) {
            self.store(0, Ordering::SeqCst);
        }
    }
    type LeapArrayAtomicU64 = LeapArray<AtomicU64>;

    #[test]
    fn invalid_params() {
        assert!(LeapArrayAtomicU64::new(0, INTERVAL_MS).is_err());
        assert!(LeapArrayAtomicU64::new(3, 1000).is_err());
        assert!(LeapArrayAtomicU64::new(1, 0).is_err());
    }

    #[test]
    fn time_idx() {
        let arr = LeapArrayAtomicU64::new(SAMPLE_COUNT, INTERVAL_MS).unwrap();
        assert_eq!(arr.time2idx(1576296044907), 9);
        assert_eq!(arr.calculate_start_stamp(1576296044907), 1576296044500);
    }

    #[test]
    fn start_time() {
        let arr = LeapArrayAtomicU64::new(SAMPLE_COUNT, INTERVAL_MS).unwrap();
        let now = 1596199310000;
        let bucket = arr.get_bucket_of_time(now + 801).unwrap();
        assert_eq!(bucket.start_stamp(), now + 500);
        assert!(std::ptr::eq(bucket, &arr.array[1]));
    }

    #[test]
    fn deprecated() {
        let now = 1576296044907;
        let bucket = BucketWrap::<AtomicU64>::new(1576296004907);
        assert!(bucket.is_deprecated(now, INTERVAL_MS as u64));
        let bucket = BucketWrap::<AtomicU64>::new(now - INTERVAL_MS as u64);
        assert!(bucket.is_deprecated(now, INTERVAL_MS as u64));
        let bucket = BucketWrap::<AtomicU64>::new(now - INTERVAL_MS as u64 + 1);
        assert!(!bucket.is_deprecated(now, INTERVAL_MS as u64));
    }

    #[test]
    fn reset_deprecated_bucket() {
        let arr = LeapArrayAtomicU64::new(SAMPLE_COUNT, INTERVAL_MS).unwrap();
        let now = 1596199310000;
        arr.get_bucket_of_time(now)
            .unwrap()
            .value()
            .store(10, Ordering::SeqCst);
        // the same slot, one full interval later
        let bucket = arr.get_bucket_of_time(now + INTERVAL_MS as u64).unwrap();
        assert_eq!(bucket.start_stamp(), now + INTERVAL_MS as u64);
        assert_eq!(bucket.value().load(Ordering::SeqCst), 0);
        // time going backwards is refused
        assert!(arr.get_bucket_of_time(now).is_err());
    }

    #[test]
    fn valid_values_cover_interval() {
        let arr = LeapArrayAtomicU64::new(SAMPLE_COUNT, INTERVAL_MS).unwrap();
        let now = 1596199310000;
        for i in 0..(SAMPLE_COUNT as u64 * 2) {
            arr.get_bucket_of_time(now + i * BUCKET_LEN_MS as u64)
                .unwrap()
                .value()
                .fetch_add(1, Ordering::SeqCst);
        }
        let last = now + (SAMPLE_COUNT as u64 * 2 - 1) * BUCKET_LEN_MS as u64;
        let values = arr.get_valid_values(last);
        assert_eq!(values.len(), SAMPLE_COUNT as usize);
        // half a window later, only half of the buckets are alive
        let values = arr.get_valid_values(last + (INTERVAL_MS / 2) as u64);
        assert_eq!(values.len(), (SAMPLE_COUNT / 2) as usize);
    }

    #[test]
    fn concurrent_rotation_keeps_counts() {
        let arr = Arc::new(LeapArrayAtomicU64::new(1, 1000).unwrap());
        let now = 1596199310000;
        arr.get_bucket_of_time(now)
            .unwrap()
            .value()
            .store(1000, Ordering::SeqCst);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let arr = Arc::clone(&arr);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    arr.get_bucket_of_time(now + 1000)
                        .unwrap()
                        .value()
                        .fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let bucket = arr.get_bucket_of_time(now + 1000).unwrap();
        assert_eq!(bucket.value().load(Ordering::SeqCst), 800);
    }

    #[test]
    fn reset_values() {
        let arr = LeapArrayAtomicU64::new(SAMPLE_COUNT, INTERVAL_MS).unwrap();
        let now = 1596199310000;
        let bucket = arr.get_bucket_of_time(now).unwrap();
        bucket.value().store(3, Ordering::SeqCst);
        arr.reset_values();
        assert_eq!(bucket.value().load(Ordering::SeqCst), 0);
        assert_eq!(bucket.start_stamp(), now);
    }
}

use lazy_static::lazy_static;
use time::{macros::format_description, Duration, OffsetDateTime};

lazy_static! {
    static ref UNIX_TIME_UNIT_OFFSET: i128 = (Duration::MILLISECOND / Duration::NANOSECOND) as i128;
}

#[inline]
pub fn sleep_for_ms(ms: u64) {
    std::thread::sleep(std::time::Duration::from_millis(ms));
}

#[inline]
fn cal_curr_time_millis() -> u64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / (*UNIX_TIME_UNIT_OFFSET)) as u64
}

/// Formats a millisecond timestamp as `hh:mm:ss`, falling back to the raw number
/// when the timestamp is out of the representable range.
pub fn format_time_millis(ts_millis: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(milli2nano(ts_millis))
        .ok()
        .and_then(|t| {
            t.format(format_description!("[hour]:[minute]:[second]"))
                .ok()
        })
        .unwrap_or_else(|| ts_millis.to_string())
}

pub fn curr_time_millis() -> u64 {
    let ticker_time = curr_time_millis_with_ticker();
    if ticker_time > 0 {
        ticker_time
    } else {
        cal_curr_time_millis()
    }
}

#[inline]
pub fn curr_time_nanos() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos()
}

#[inline]
pub fn milli2nano<T: Into<i128>>(t: T) -> i128 {
    *UNIX_TIME_UNIT_OFFSET * t.into()
}

pub use ticker::*;

// provide cached time by a ticker
pub mod ticker {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    lazy_static! {
        static ref NOW_IN_MS: AtomicU64 = AtomicU64::new(0);
        static ref TICKER_STARTED: AtomicBool = AtomicBool::new(false);
    }

    /// `start_time_ticker()` starts a background thread that caches current timestamp per millisecond,
    /// which may provide better performance in high-concurrency scenarios.
    /// Calling it more than once has no further effect.
    pub fn start_time_ticker() {
        if TICKER_STARTED.swap(true, Ordering::SeqCst) {
            return;
        }
        update_time();
        std::thread::spawn(move || loop {
            update_time();
            std::thread::sleep(std::time::Duration::from_millis(1));
        });
    }

    #[inline]
    fn update_time() {
        let curr = cal_curr_time_millis();
        NOW_IN_MS.store(curr, Ordering::SeqCst);
    }

    #[inline]
    pub(super) fn curr_time_millis_with_ticker() -> u64 {
        NOW_IN_MS.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn monotonic_enough() {
        let t1 = curr_time_millis();
        sleep_for_ms(5);
        let t2 = curr_time_millis();
        assert!(t2 >= t1 + 5);
    }

    #[test]
    fn format() {
        // 1970-01-01 00:00:01.500
        assert_eq!(format_time_millis(1500), "00:00:01");
    }

    #[test]
    fn nano() {
        assert_eq!(milli2nano(3u64), 3_000_000);
    }
}

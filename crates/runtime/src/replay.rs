use std::fmt;

use foundation::YearMonth;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// The end bound lies before the start bound.
    EmptyRange { start: YearMonth, end: YearMonth },
    /// A replay period of zero would tick without pause.
    ZeroPeriod,
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::EmptyRange { start, end } => {
                write!(f, "replay end {end} lies before start {start}")
            }
            ReplayError::ZeroPeriod => write!(f, "replay period must be non-zero"),
        }
    }
}

impl std::error::Error for ReplayError {}

/// Inclusive month range `[start, end]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MonthRange {
    start: YearMonth,
    end: YearMonth,
}

impl MonthRange {
    pub fn new(start: YearMonth, end: YearMonth) -> Result<Self, ReplayError> {
        if end < start {
            return Err(ReplayError::EmptyRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> YearMonth {
        self.start
    }

    pub fn end(&self) -> YearMonth {
        self.end
    }

    /// Number of months in the range. Never zero.
    pub fn month_count(&self) -> usize {
        self.start.months_until(self.end) as usize + 1
    }

    pub fn cursor(&self) -> MonthCursor {
        MonthCursor {
            next: Some(self.start),
            end: self.end,
        }
    }
}

/// Monotonic month cursor. Once it has yielded the end bound it stays exhausted.
#[derive(Debug, Clone)]
pub struct MonthCursor {
    next: Option<YearMonth>,
    end: YearMonth,
}

impl MonthCursor {
    pub fn is_finished(&self) -> bool {
        self.next.is_none()
    }
}

impl Iterator for MonthCursor {
    type Item = YearMonth;

    fn next(&mut self) -> Option<YearMonth> {
        let current = self.next?;
        self.next = if current >= self.end {
            None
        } else {
            Some(current.succ())
        };
        Some(current)
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use driver::ReplayDriver;

#[cfg(not(target_arch = "wasm32"))]
mod driver {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tokio::task::JoinHandle;
    use tokio::time::{Instant, MissedTickBehavior, interval_at};
    use tracing::debug;

    use super::{MonthRange, ReplayError};
    use foundation::YearMonth;

    /// Replays a [`MonthRange`] on a fixed wall-clock period.
    ///
    /// The first month is emitted one period after start, the last one is the end bound,
    /// after which the driver stops for good. There is no pause or restart: build a new
    /// driver to replay again. Dropping the driver cancels it.
    #[derive(Debug)]
    pub struct ReplayDriver {
        handle: Option<JoinHandle<()>>,
        cancelled: Arc<AtomicBool>,
    }

    impl ReplayDriver {
        /// Spawns the driver on the current tokio runtime.
        pub fn spawn<F>(
            range: MonthRange,
            period: Duration,
            mut on_tick: F,
        ) -> Result<Self, ReplayError>
        where
            F: FnMut(YearMonth) + Send + 'static,
        {
            if period.is_zero() {
                return Err(ReplayError::ZeroPeriod);
            }
            let cancelled = Arc::new(AtomicBool::new(false));
            let stop = Arc::clone(&cancelled);
            let handle = tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                for month in range.cursor() {
                    ticker.tick().await;
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    debug!(%month, "replay tick");
                    on_tick(month);
                }
            });
            Ok(Self {
                handle: Some(handle),
                cancelled,
            })
        }

        pub fn is_finished(&self) -> bool {
            self.handle.as_ref().is_none_or(|h| h.is_finished())
        }

        /// Stops the driver. No callback starts after this returns; on a multi-threaded
        /// runtime a callback already running on another worker may still complete.
        pub fn cancel(&mut self) {
            self.cancelled.store(true, Ordering::SeqCst);
            if let Some(handle) = self.handle.take() {
                handle.abort();
            }
        }

        /// Waits until the last month has been emitted (or the driver was cancelled).
        /// A panic raised by the tick callback is resumed here.
        pub async fn join(mut self) {
            if let Some(handle) = self.handle.take() {
                if let Err(err) = handle.await {
                    if err.is_panic() {
                        std::panic::resume_unwind(err.into_panic());
                    }
                }
            }
        }
    }

    impl Drop for ReplayDriver {
        fn drop(&mut self) {
            self.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MonthRange, ReplayDriver, ReplayError};
    use foundation::YearMonth;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[test]
    fn cursor_covers_range_inclusive() {
        let range = MonthRange::new(ym("2015-01"), ym("2017-03")).unwrap();
        let months: Vec<String> = range.cursor().map(|m| m.to_string()).collect();
        assert_eq!(months.len(), 27);
        assert_eq!(range.month_count(), 27);
        assert_eq!(months.first().map(String::as_str), Some("2015-01"));
        assert_eq!(months[12], "2016-01");
        assert_eq!(months.last().map(String::as_str), Some("2017-03"));
    }

    #[test]
    fn cursor_stays_exhausted() {
        let range = MonthRange::new(ym("2020-05"), ym("2020-05")).unwrap();
        let mut c = range.cursor();
        assert_eq!(c.next(), Some(ym("2020-05")));
        assert!(c.is_finished());
        assert_eq!(c.next(), None);
        assert_eq!(c.next(), None);
    }

    #[test]
    fn rejects_reversed_range() {
        assert_eq!(
            MonthRange::new(ym("2017-03"), ym("2015-01")),
            Err(ReplayError::EmptyRange {
                start: ym("2017-03"),
                end: ym("2015-01"),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn driver_emits_every_month_then_stops() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let range = MonthRange::new(ym("2015-01"), ym("2017-03")).unwrap();
        let driver = ReplayDriver::spawn(range, Duration::from_secs(2), move |m| {
            sink.lock().unwrap().push(m);
        })
        .unwrap();
        driver.join().await;

        let seen = seen.lock().unwrap();
        let expected: Vec<YearMonth> = range.cursor().collect();
        assert_eq!(*seen, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_one_period() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let range = MonthRange::new(ym("2015-01"), ym("2015-03")).unwrap();
        let _driver = ReplayDriver::spawn(range, Duration::from_secs(2), move |m| {
            sink.lock().unwrap().push(m);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(seen.lock().unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock().unwrap(), vec![ym("2015-01")]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_further_ticks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let range = MonthRange::new(ym("2015-01"), ym("2017-03")).unwrap();
        let mut driver = ReplayDriver::spawn(range, Duration::from_secs(2), move |m| {
            sink.lock().unwrap().push(m);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        driver.cancel();
        assert!(driver.is_finished());
        let at_cancel = seen.lock().unwrap().clone();
        assert_eq!(at_cancel, vec![ym("2015-01"), ym("2015-02")]);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(*seen.lock().unwrap(), at_cancel);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_is_rejected() {
        let range = MonthRange::new(ym("2015-01"), ym("2015-03")).unwrap();
        let err = ReplayDriver::spawn(range, Duration::ZERO, |_| {}).unwrap_err();
        assert_eq!(err, ReplayError::ZeroPeriod);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_flag_blocks_pending_tick() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let range = MonthRange::new(ym("2015-01"), ym("2015-03")).unwrap();
        let mut driver = ReplayDriver::spawn(range, Duration::from_secs(1), move |m| {
            sink.lock().unwrap().push(m);
        })
        .unwrap();

        driver.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(seen.lock().unwrap().is_empty());
    }
}

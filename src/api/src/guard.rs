//! Scrape guards: the site's maintenance window and the single-update lock.

use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::GuardConfig;

/// Current time at the site's UTC offset.
pub fn site_now(config: &GuardConfig) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600)
        .unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&offset)
}

/// True unless `now` falls inside the maintenance window.
pub fn is_scrape_window_ok(now: DateTime<FixedOffset>, config: &GuardConfig) -> bool {
    let weekday = now.weekday().num_days_from_monday();
    let hour = now.hour();
    let blocked = config.blocked_weekdays.contains(&weekday)
        && (config.block_start_hour..config.block_end_hour).contains(&hour);
    !blocked
}

/// Allows at most one update at a time; later callers are turned away
/// rather than queued.
#[derive(Debug, Default)]
pub struct UpdateGuard {
    running: Arc<AtomicBool>,
}

impl UpdateGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or `None` when an update is already running.
    pub fn try_acquire(&self) -> Option<UpdatePermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| UpdatePermit {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of an update; releases the lock when dropped.
///
/// Owned, so it can move into whichever task finishes the update.
#[derive(Debug)]
pub struct UpdatePermit {
    running: Arc<AtomicBool>,
}

impl Drop for UpdatePermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn jst(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_window_blocks_wednesday_afternoon() {
        let config = GuardConfig::default();
        // 2024-12-18 is a Wednesday
        assert!(!is_scrape_window_ok(jst(2024, 12, 18, 16, 30), &config));
        assert!(is_scrape_window_ok(jst(2024, 12, 18, 17, 0), &config));
        assert!(is_scrape_window_ok(jst(2024, 12, 18, 15, 59), &config));
    }

    #[test]
    fn test_window_allows_other_days() {
        let config = GuardConfig::default();
        // Friday and Monday at the same hour
        assert!(is_scrape_window_ok(jst(2024, 12, 20, 16, 30), &config));
        assert!(is_scrape_window_ok(jst(2024, 12, 16, 16, 30), &config));
        // Tuesday and Thursday are blocked too
        assert!(!is_scrape_window_ok(jst(2024, 12, 17, 16, 0), &config));
        assert!(!is_scrape_window_ok(jst(2024, 12, 19, 16, 59), &config));
    }

    #[test]
    fn test_window_uses_local_hour() {
        let config = GuardConfig::default();
        // 07:30 UTC on a Wednesday is 16:30 at +09:00
        let utc = Utc.with_ymd_and_hms(2024, 12, 18, 7, 30, 0).unwrap();
        let local = utc.with_timezone(&FixedOffset::east_opt(9 * 3600).unwrap());
        assert!(!is_scrape_window_ok(local, &config));
    }

    #[test]
    fn test_permit_released_on_drop() {
        let guard = UpdateGuard::new();
        {
            let _permit = guard.try_acquire().unwrap();
            assert!(guard.is_running());
            assert!(guard.try_acquire().is_none());
        }
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_permit_held_by_another_thread() {
        let guard = UpdateGuard::new();
        let permit = guard.try_acquire().unwrap();
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let holder = std::thread::spawn(move || {
            rx.recv().unwrap();
            drop(permit);
        });

        assert!(guard.is_running());
        assert!(guard.try_acquire().is_none());
        tx.send(()).unwrap();
        holder.join().unwrap();
        assert!(!guard.is_running());
    }

    #[test]
    fn test_permit_released_on_panic() {
        let guard = Arc::new(UpdateGuard::new());
        let inner = Arc::clone(&guard);
        let result = std::thread::spawn(move || {
            let _permit = inner.try_acquire().unwrap();
            panic!("scrape blew up");
        })
        .join();
        assert!(result.is_err());
        assert!(!guard.is_running());
    }

    #[test]
    fn test_concurrent_acquire_single_winner() {
        let guard = Arc::new(UpdateGuard::new());
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let permit = guard.try_acquire();
                    let won = permit.is_some();
                    // Hold until everyone has tried
                    barrier.wait();
                    won
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}

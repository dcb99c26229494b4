//! Frame clock and the async tick driver.
//!
//! The driver runs one tick per target interval on the tokio runtime:
//!
//! 1. Check the run state (running / paused / stopped).
//! 2. Measure `dt` since the previous tick on a monotonic clock.
//! 3. Run the tick body on the blocking pool.
//! 4. Sleep for what is left of the interval, waking early on a state change.
//!
//! A tick that takes longer than the interval is logged and the next tick
//! starts straight away. There is no catch-up: the loop settles at whatever
//! rate the machine sustains, and `dt` reports the real elapsed time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Requested state of the tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    /// Ticking at the target rate.
    Running,
    /// Alive but not ticking.
    Paused,
    /// Exit at the next opportunity.
    Stopped,
}

/// Measures the time between consecutive ticks.
#[derive(Debug, Clone)]
pub struct FrameClock {
    interval: Duration,
    last: Option<Instant>,
}

impl FrameClock {
    /// Create a clock for the given target interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// The target interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Seconds since the previous call. The first call after creation or
    /// [`reset`](Self::reset) reports one target interval.
    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();
        let dt = match self.last {
            Some(last) => now.duration_since(last),
            None => self.interval,
        };
        self.last = Some(now);
        dt.as_secs_f64()
    }

    /// Forget the previous tick so time spent paused is not reported as `dt`.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Something the driver can tick.
pub trait TickTarget: Send + Sync + 'static {
    /// Run one tick with the given `dt`. Returns `false` if the tick was
    /// cancelled and the loop should end.
    fn run_tick(&self, dt: f64) -> bool;

    /// Called once when the loop exits, with the number of completed ticks.
    fn loop_finished(&self, ticks: u64);
}

/// Drive `target` until the state becomes [`RunState::Stopped`], a tick is
/// cancelled, or `max_ticks` ticks have run (0 = unlimited).
///
/// Returns the number of completed ticks.
pub async fn drive<T: TickTarget>(
    target: Arc<T>,
    mut control: watch::Receiver<RunState>,
    interval: Duration,
    max_ticks: u64,
) -> u64 {
    let mut clock = FrameClock::new(interval);
    let mut ticks = 0u64;

    info!(
        tick_rate = 1.0 / interval.as_secs_f64(),
        max_ticks, "starting tick loop"
    );

    loop {
        let state = *control.borrow_and_update();
        match state {
            RunState::Stopped => break,
            RunState::Paused => {
                clock.reset();
                debug!(ticks, "tick loop paused");
                if control.changed().await.is_err() {
                    break;
                }
                continue;
            }
            RunState::Running => {}
        }

        let started = Instant::now();
        let dt = clock.tick();
        let tick_target = Arc::clone(&target);
        match tokio::task::spawn_blocking(move || tick_target.run_tick(dt)).await {
            Ok(true) => ticks += 1,
            Ok(false) => break,
            Err(e) => {
                error!(error = %e, "tick task failed");
                break;
            }
        }

        if max_ticks > 0 && ticks >= max_ticks {
            break;
        }

        let elapsed = started.elapsed();
        if elapsed < interval {
            tokio::select! {
                () = tokio::time::sleep(interval - elapsed) => {}
                changed = control.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        } else {
            warn!(
                ticks,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = interval.as_millis() as u64,
                "tick exceeded time budget"
            );
        }
    }

    info!(ticks, "tick loop complete");
    target.loop_finished(ticks);
    ticks
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counter {
        ticks: AtomicU64,
        finished: AtomicU64,
        exited: AtomicBool,
        cancel_at: u64,
    }

    impl TickTarget for Counter {
        fn run_tick(&self, _dt: f64) -> bool {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            self.cancel_at == 0 || n < self.cancel_at
        }

        fn loop_finished(&self, ticks: u64) {
            self.finished.store(ticks, Ordering::SeqCst);
            self.exited.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_frame_clock_first_tick_is_interval() {
        let mut clock = FrameClock::new(Duration::from_millis(20));
        let dt = clock.tick();
        assert!((dt - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_frame_clock_measures_elapsed() {
        let mut clock = FrameClock::new(Duration::from_secs(10));
        clock.tick();
        std::thread::sleep(Duration::from_millis(5));
        let dt = clock.tick();
        assert!(dt >= 0.005 && dt < 10.0);
        clock.reset();
        assert!((clock.tick() - 10.0).abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drive_runs_limited_ticks() {
        let target = Arc::new(Counter::default());
        let (_tx, rx) = watch::channel(RunState::Running);
        let ticks = drive(Arc::clone(&target), rx, Duration::from_millis(1), 5).await;
        assert_eq!(ticks, 5);
        assert_eq!(target.ticks.load(Ordering::SeqCst), 5);
        assert_eq!(target.finished.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drive_stops_on_cancelled_tick() {
        let target = Arc::new(Counter {
            cancel_at: 3,
            ..Counter::default()
        });
        let (_tx, rx) = watch::channel(RunState::Running);
        let ticks = drive(Arc::clone(&target), rx, Duration::from_millis(1), 0).await;
        assert_eq!(ticks, 2);
        assert!(target.exited.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drive_pause_resume_stop() {
        let target = Arc::new(Counter::default());
        let (tx, rx) = watch::channel(RunState::Paused);
        let handle = tokio::spawn(drive(Arc::clone(&target), rx, Duration::from_millis(1), 0));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(target.ticks.load(Ordering::SeqCst), 0, "paused loop must not tick");

        tx.send_replace(RunState::Running);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(target.ticks.load(Ordering::SeqCst) > 0);

        tx.send_replace(RunState::Stopped);
        let ticks = handle.await.unwrap();
        assert_eq!(ticks, target.ticks.load(Ordering::SeqCst));
        assert!(target.exited.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drive_exits_when_sender_dropped() {
        let target = Arc::new(Counter::default());
        let (tx, rx) = watch::channel(RunState::Paused);
        let handle = tokio::spawn(drive(Arc::clone(&target), rx, Duration::from_millis(1), 0));
        drop(tx);
        assert_eq!(handle.await.unwrap(), 0);
    }
}

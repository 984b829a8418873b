// Timeout mechanisms and the cooperative interrupt they share

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Granularity of cooperative waits
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// No deadline armed
const NO_DEADLINE: u64 = u64::MAX;

/// Why an interruptible unit of work must stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    Timeout,
    Killed,
}

#[derive(Debug)]
struct InterruptState {
    origin: Instant,
    /// Deadline in nanoseconds since `origin`
    deadline: AtomicU64,
    expired: AtomicBool,
    /// Set when running work was stopped by the deadline
    tripped: AtomicBool,
    killed: AtomicBool,
}

/// Shared stop flags observed by running script code.
///
/// Cloning is cheap; all clones observe the same flags, which is how a
/// kill request from another thread reaches an in-flight run.
#[derive(Debug, Clone)]
pub struct Interrupt {
    state: Arc<InterruptState>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupt {
    pub fn new() -> Self {
        Self {
            state: Arc::new(InterruptState {
                origin: Instant::now(),
                deadline: AtomicU64::new(NO_DEADLINE),
                expired: AtomicBool::new(false),
                tripped: AtomicBool::new(false),
                killed: AtomicBool::new(false),
            }),
        }
    }

    /// Request termination of the in-flight run (best effort, returns at once)
    pub fn kill(&self) {
        self.state.killed.store(true, Ordering::SeqCst);
    }

    /// Mark the armed deadline as passed
    pub fn expire(&self) {
        self.state.expired.store(true, Ordering::SeqCst);
    }

    pub fn is_killed(&self) -> bool {
        self.state.killed.load(Ordering::SeqCst)
    }

    pub fn is_expired(&self) -> bool {
        self.state.expired.load(Ordering::SeqCst)
    }

    /// True once a `check` has reported the deadline to running work.
    ///
    /// A deadline that passes after the work finished leaves this unset.
    pub fn is_tripped(&self) -> bool {
        self.state.tripped.load(Ordering::SeqCst)
    }

    /// Clear all flags before a new run
    pub(crate) fn rearm(&self) {
        self.state.deadline.store(NO_DEADLINE, Ordering::SeqCst);
        self.state.expired.store(false, Ordering::SeqCst);
        self.state.tripped.store(false, Ordering::SeqCst);
        self.state.killed.store(false, Ordering::SeqCst);
    }

    fn set_deadline(&self, limit: Duration) {
        let at = self.state.origin.elapsed().saturating_add(limit);
        let nanos = u64::try_from(at.as_nanos()).unwrap_or(NO_DEADLINE - 1);
        self.state.deadline.store(nanos, Ordering::SeqCst);
    }

    fn clear_deadline(&self) {
        self.state.deadline.store(NO_DEADLINE, Ordering::SeqCst);
    }

    /// Poll the flags; a passed deadline is latched into `expired`.
    pub fn check(&self) -> Option<Halt> {
        if self.is_killed() {
            return Some(Halt::Killed);
        }
        if !self.is_expired() {
            let deadline = self.state.deadline.load(Ordering::SeqCst);
            if deadline == NO_DEADLINE {
                return None;
            }
            let now = u64::try_from(self.state.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
            if now < deadline {
                return None;
            }
            self.expire();
        }
        self.state.tripped.store(true, Ordering::SeqCst);
        Some(Halt::Timeout)
    }

    /// Wait for `duration`, waking early when the run must stop.
    pub fn sleep(&self, duration: Duration) -> Result<(), Halt> {
        // Past the clock's range only a halt ends the wait
        let until = Instant::now().checked_add(duration);
        loop {
            if let Some(halt) = self.check() {
                return Err(halt);
            }
            let now = Instant::now();
            let slice = match until {
                Some(until) if now >= until => return Ok(()),
                Some(until) => SLEEP_SLICE.min(until - now),
                None => SLEEP_SLICE,
            };
            thread::sleep(slice);
        }
    }
}

/// Which mechanism enforces the wall-clock limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutMode {
    /// Detect from the calling context once, at construction
    #[default]
    Auto,
    Interrupt,
    Watchdog,
}

impl std::str::FromStr for TimeoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(TimeoutMode::Auto),
            "interrupt" => Ok(TimeoutMode::Interrupt),
            "watchdog" => Ok(TimeoutMode::Watchdog),
            other => Err(format!("unknown timeout mode '{}'", other)),
        }
    }
}

/// Keeps a timer armed; dropping it disarms.
pub struct TimerGuard {
    interrupt: Interrupt,
    cancel: Option<mpsc::Sender<()>>,
    watchdog: Option<JoinHandle<()>>,
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.interrupt.clear_deadline();
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.watchdog.take() {
            if handle.join().is_err() {
                warn!("watchdog thread panicked");
            }
        }
    }
}

/// A way of delivering a deadline into an executing script.
///
/// Both implementations share one observable contract: once the limit has
/// elapsed, `Interrupt::check` reports `Halt::Timeout` to the running code.
pub trait TimeoutContext: Send + Sync + fmt::Debug {
    fn mode(&self) -> TimeoutMode;

    fn arm(&self, interrupt: &Interrupt, limit: Duration) -> TimerGuard;
}

/// Deadline checked inside the interpreter's progress hook on the
/// thread that runs the script. Only selected for the main thread.
#[derive(Debug, Default)]
pub struct InterruptTimer;

impl InterruptTimer {
    pub fn available() -> bool {
        thread::current().name() == Some("main")
    }
}

impl TimeoutContext for InterruptTimer {
    fn mode(&self) -> TimeoutMode {
        TimeoutMode::Interrupt
    }

    fn arm(&self, interrupt: &Interrupt, limit: Duration) -> TimerGuard {
        interrupt.set_deadline(limit);
        TimerGuard {
            interrupt: interrupt.clone(),
            cancel: None,
            watchdog: None,
        }
    }
}

/// Timer thread that trips the expired flag; usable from any thread.
#[derive(Debug, Default)]
pub struct WatchdogTimer;

impl TimeoutContext for WatchdogTimer {
    fn mode(&self) -> TimeoutMode {
        TimeoutMode::Watchdog
    }

    fn arm(&self, interrupt: &Interrupt, limit: Duration) -> TimerGuard {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let target = interrupt.clone();
        let watchdog = thread::Builder::new()
            .name("codeloop-watchdog".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(limit) {
                    debug!(limit_ms = limit.as_millis() as u64, "watchdog fired");
                    target.expire();
                }
            });

        match watchdog {
            Ok(handle) => TimerGuard {
                interrupt: interrupt.clone(),
                cancel: Some(cancel),
                watchdog: Some(handle),
            },
            Err(e) => {
                warn!(error = %e, "failed to spawn watchdog, falling back to inline deadline");
                InterruptTimer.arm(interrupt, limit)
            }
        }
    }
}

/// Pick the timeout mechanism for the current calling context
pub fn select_timeout_context(mode: TimeoutMode) -> Arc<dyn TimeoutContext> {
    let selected: Arc<dyn TimeoutContext> = match mode {
        TimeoutMode::Watchdog => Arc::new(WatchdogTimer),
        TimeoutMode::Interrupt if InterruptTimer::available() => Arc::new(InterruptTimer),
        TimeoutMode::Interrupt => {
            warn!("interrupt timer requested off the main thread, using watchdog");
            Arc::new(WatchdogTimer)
        }
        TimeoutMode::Auto if InterruptTimer::available() => Arc::new(InterruptTimer),
        TimeoutMode::Auto => Arc::new(WatchdogTimer),
    };
    debug!(requested = ?mode, selected = ?selected.mode(), "timeout mechanism selected");
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_without_deadline() {
        let interrupt = Interrupt::new();
        assert_eq!(interrupt.check(), None);
    }

    #[test]
    fn test_kill_wins_over_timeout() {
        let interrupt = Interrupt::new();
        interrupt.expire();
        interrupt.kill();
        assert_eq!(interrupt.check(), Some(Halt::Killed));

        interrupt.rearm();
        assert_eq!(interrupt.check(), None);
    }

    #[test]
    fn test_interrupt_timer_latches_deadline() {
        let interrupt = Interrupt::new();
        let _guard = InterruptTimer.arm(&interrupt, Duration::from_millis(20));
        assert_eq!(interrupt.check(), None);

        thread::sleep(Duration::from_millis(40));
        assert_eq!(interrupt.check(), Some(Halt::Timeout));
        assert!(interrupt.is_expired());
    }

    #[test]
    fn test_watchdog_fires() {
        let interrupt = Interrupt::new();
        let guard = WatchdogTimer.arm(&interrupt, Duration::from_millis(20));
        let result = interrupt.sleep(Duration::from_secs(2));
        drop(guard);
        assert_eq!(result, Err(Halt::Timeout));
    }

    #[test]
    fn test_watchdog_disarmed_on_drop() {
        let interrupt = Interrupt::new();
        let guard = WatchdogTimer.arm(&interrupt, Duration::from_millis(50));
        drop(guard);
        thread::sleep(Duration::from_millis(80));
        assert!(!interrupt.is_expired());
    }

    #[test]
    fn test_sleep_interrupted_by_kill() {
        let interrupt = Interrupt::new();
        let remote = interrupt.clone();
        let killer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.kill();
        });

        let started = Instant::now();
        assert_eq!(interrupt.sleep(Duration::from_secs(5)), Err(Halt::Killed));
        assert!(started.elapsed() < Duration::from_secs(1));
        killer.join().unwrap();
    }

    #[test]
    fn test_expiry_after_work_is_not_a_trip() {
        let interrupt = Interrupt::new();
        interrupt.expire();
        assert!(!interrupt.is_tripped());

        assert_eq!(interrupt.check(), Some(Halt::Timeout));
        assert!(interrupt.is_tripped());

        interrupt.rearm();
        assert!(!interrupt.is_tripped());
    }

    #[test]
    fn test_sleep_beyond_clock_range() {
        let interrupt = Interrupt::new();
        let _guard = InterruptTimer.arm(&interrupt, Duration::from_millis(20));
        assert_eq!(interrupt.sleep(Duration::MAX), Err(Halt::Timeout));
    }

    #[test]
    fn test_explicit_watchdog_selection() {
        let ctx = select_timeout_context(TimeoutMode::Watchdog);
        assert_eq!(ctx.mode(), TimeoutMode::Watchdog);
    }

    #[test]
    fn test_auto_selection_matches_context() {
        let ctx = select_timeout_context(TimeoutMode::Auto);
        let expected = if InterruptTimer::available() {
            TimeoutMode::Interrupt
        } else {
            TimeoutMode::Watchdog
        };
        assert_eq!(ctx.mode(), expected);

        let off_main = thread::spawn(|| select_timeout_context(TimeoutMode::Auto).mode())
            .join()
            .unwrap();
        assert_eq!(off_main, TimeoutMode::Watchdog);
    }
}

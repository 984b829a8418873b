// Limits module - per-run resource budgets

pub mod error;
pub mod timeout;

pub use error::{LimitError, LimitExceeded};
pub use timeout::{
    select_timeout_context, Halt, Interrupt, InterruptTimer, TimeoutContext, TimeoutMode,
    TimerGuard, WatchdogTimer,
};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Budgets applied to one run. Copied into the run at start, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Wall-clock limit for a single execution
    pub timeout_seconds: f64,
    /// Captured output budget per execution
    pub max_output_bytes: usize,
    /// Executions allowed per run (enforced by the control loop)
    pub max_steps: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout_seconds: 30.0,
            max_output_bytes: 10_000,
            max_steps: 100,
        }
    }
}

impl ResourceLimits {
    pub fn new(
        timeout_seconds: f64,
        max_output_bytes: usize,
        max_steps: u32,
    ) -> Result<Self, LimitError> {
        let limits = Self {
            timeout_seconds,
            max_output_bytes,
            max_steps,
        };
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> Result<(), LimitError> {
        if self.timeout_seconds <= 0.0 || Duration::try_from_secs_f64(self.timeout_seconds).is_err() {
            return Err(LimitError::InvalidTimeout(self.timeout_seconds));
        }
        if self.max_output_bytes == 0 {
            return Err(LimitError::ZeroOutputBudget);
        }
        if self.max_steps == 0 {
            return Err(LimitError::ZeroSteps);
        }
        Ok(())
    }

    /// The wall-clock limit. Values outside `Duration`'s range saturate.
    pub fn timeout(&self) -> Duration {
        match Duration::try_from_secs_f64(self.timeout_seconds) {
            Ok(limit) => limit,
            Err(_) if self.timeout_seconds > 0.0 => Duration::MAX,
            Err(_) => Duration::ZERO,
        }
    }

    /// Cut `text` to the output budget, annotating the original size.
    ///
    /// The cut lands on a UTF-8 boundary, so the kept prefix may be a few
    /// bytes shorter than `max_output_bytes`.
    pub fn truncate_output(&self, text: &str) -> (String, bool) {
        if text.len() <= self.max_output_bytes {
            return (text.to_string(), false);
        }

        let mut end = self.max_output_bytes;
        while !text.is_char_boundary(end) {
            end -= 1;
        }

        let truncated = format!(
            "{}\n... [truncated, original size {} bytes]",
            &text[..end],
            text.len()
        );
        (truncated, true)
    }

    /// Run `work` under the wall-clock limit.
    ///
    /// The timer only raises the interrupt; `work` must observe it (the
    /// script engine does so from its progress hook). When the work was
    /// stopped by the deadline its own result is discarded. A deadline that
    /// passes after `work` returned does not turn a completed run into a
    /// timeout.
    pub fn timed<T>(
        &self,
        ctx: &dyn TimeoutContext,
        interrupt: &Interrupt,
        work: impl FnOnce() -> T,
    ) -> Result<T, LimitExceeded> {
        let guard = ctx.arm(interrupt, self.timeout());
        let value = work();
        drop(guard);

        if interrupt.is_tripped() {
            return Err(LimitExceeded::Timeout {
                seconds: self.timeout_seconds,
            });
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_output_bytes: usize) -> ResourceLimits {
        ResourceLimits {
            max_output_bytes,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.timeout_seconds, 30.0);
        assert_eq!(limits.max_output_bytes, 10_000);
        assert_eq!(limits.max_steps, 100);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            ResourceLimits::new(0.0, 10, 1),
            Err(LimitError::InvalidTimeout(0.0))
        );
        assert_eq!(
            ResourceLimits::new(1.0, 0, 1),
            Err(LimitError::ZeroOutputBudget)
        );
        assert_eq!(ResourceLimits::new(1.0, 10, 0), Err(LimitError::ZeroSteps));
        assert!(ResourceLimits::new(f64::NAN, 10, 1).is_err());
        assert!(ResourceLimits::new(f64::INFINITY, 10, 1).is_err());
        assert!(ResourceLimits::new(-1.0, 10, 1).is_err());
    }

    #[test]
    fn test_timeout_beyond_duration_range_rejected() {
        let limits = ResourceLimits {
            timeout_seconds: 1e30,
            ..Default::default()
        };
        assert_eq!(limits.validate(), Err(LimitError::InvalidTimeout(1e30)));
        assert_eq!(limits.timeout(), Duration::MAX);
    }

    #[test]
    fn test_truncate_within_budget() {
        let (text, truncated) = limits(5).truncate_output("hello");
        assert_eq!(text, "hello");
        assert!(!truncated);
    }

    #[test]
    fn test_truncate_over_budget() {
        let original = "a".repeat(50);
        let (text, truncated) = limits(10).truncate_output(&original);
        assert!(truncated);
        assert!(text.starts_with(&"a".repeat(10)));
        assert!(text.ends_with("[truncated, original size 50 bytes]"));

        let annotation = "\n... [truncated, original size 50 bytes]";
        assert!(text.len() <= 10 + annotation.len());
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // Each 'é' is two bytes; a 3-byte budget must not split one
        let (text, truncated) = limits(3).truncate_output("éééé");
        assert!(truncated);
        assert!(text.starts_with("é\n"));
    }

    #[test]
    fn test_truncation_flag_matches_length() {
        let budget = limits(8);
        for len in [0usize, 7, 8, 9, 100] {
            let original = "x".repeat(len);
            let (_, truncated) = budget.truncate_output(&original);
            assert_eq!(truncated, len > 8, "length {len}");
        }
    }

    #[test]
    fn test_timed_completes() {
        let limits = ResourceLimits::default();
        let interrupt = Interrupt::new();
        let result = limits.timed(&WatchdogTimer, &interrupt, || 41 + 1);
        assert_eq!(result, Ok(42));
    }

    /// Expiry after the work returned keeps the completed result
    #[test]
    fn test_timed_late_expiry_keeps_result() {
        let limits = ResourceLimits::default();
        let interrupt = Interrupt::new();
        let result = limits.timed(&WatchdogTimer, &interrupt, || {
            interrupt.expire();
            "done"
        });
        assert_eq!(result, Ok("done"));
    }

    #[test]
    fn test_timed_reports_timeout() {
        let limits = ResourceLimits {
            timeout_seconds: 0.05,
            ..Default::default()
        };
        let interrupt = Interrupt::new();
        let result = limits.timed(&WatchdogTimer, &interrupt, || {
            interrupt.sleep(Duration::from_secs(5))
        });
        assert_eq!(result, Err(LimitExceeded::Timeout { seconds: 0.05 }));
    }
}

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Supervision decision applied to a failed child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Keep the child's mailbox and state; drop the failing message.
    Resume,

    /// Attempt to restart the child actor.
    Restart,

    /// Stop the child actor.
    Stop,

    /// Escalate the failure to the parent's own supervisor.
    Escalate,
}

/// Whether a decision applies to the failed child alone or to all of the
/// supervisor's children.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    OneForOne,
    AllForOne,
}

/// Returned by `Actor::supervision` to govern how the actor's failed
/// children are handled.
#[derive(Clone, Debug)]
pub struct SupervisionConfig {
    pub strategy: Strategy,
    pub scope: Scope,
    /// Failures tolerated within `window` before the scope is stopped.
    pub max_restarts: u32,
    pub window: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub backoff_factor: f64,
    /// Random jitter applied to each backoff delay, as a fraction of the
    /// delay in `[0, 1]`.
    pub jitter: f64,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        SupervisionConfig {
            strategy: Strategy::Restart,
            scope: Scope::OneForOne,
            max_restarts: 10,
            window: Duration::from_secs(10),
            backoff_min: Duration::from_millis(50),
            backoff_max: Duration::from_secs(5),
            backoff_factor: 2.0,
            jitter: 0.0,
        }
    }
}

impl SupervisionConfig {
    pub fn restart() -> Self {
        SupervisionConfig::default()
    }

    pub fn stop() -> Self {
        SupervisionConfig {
            strategy: Strategy::Stop,
            ..Default::default()
        }
    }

    pub fn resume() -> Self {
        SupervisionConfig {
            strategy: Strategy::Resume,
            ..Default::default()
        }
    }

    pub fn escalate() -> Self {
        SupervisionConfig {
            strategy: Strategy::Escalate,
            ..Default::default()
        }
    }

    /// Delay before restart attempt `k` (zero-based):
    /// `min(backoff_max, backoff_min * factor^k)` ± random jitter up to
    /// `jitter * delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_min.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.backoff_max.as_secs_f64());
        let delay = if self.jitter > 0.0 {
            let spread = capped * self.jitter;
            let offset = rand::random::<f64>() * 2.0 * spread - spread;
            (capped + offset).max(0.0)
        } else {
            capped
        };
        Duration::from_secs_f64(delay)
    }
}

/// Sliding window of failure instants for one child.
#[derive(Debug, Default)]
pub(crate) struct FailureWindow {
    failures: VecDeque<Instant>,
}

impl FailureWindow {
    /// Records a failure and returns how many fall within `window`,
    /// including this one.
    pub(crate) fn record(&mut self, now: Instant, window: Duration) -> u32 {
        while let Some(first) = self.failures.front() {
            if now.duration_since(*first) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        self.failures.push_back(now);
        self.failures.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_and_capped() {
        let cfg = SupervisionConfig {
            backoff_min: Duration::from_millis(20),
            backoff_max: Duration::from_millis(100),
            backoff_factor: 2.0,
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(cfg.backoff_delay(0), Duration::from_millis(20));
        assert_eq!(cfg.backoff_delay(1), Duration::from_millis(40));
        assert_eq!(cfg.backoff_delay(2), Duration::from_millis(80));
        assert_eq!(cfg.backoff_delay(3), Duration::from_millis(100));
        assert_eq!(cfg.backoff_delay(10), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let cfg = SupervisionConfig {
            backoff_min: Duration::from_millis(100),
            backoff_max: Duration::from_secs(1),
            backoff_factor: 1.0,
            jitter: 0.5,
            ..Default::default()
        };
        for _ in 0..100 {
            let d = cfg.backoff_delay(0);
            assert!(d >= Duration::from_millis(50));
            assert!(d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn window_slides() {
        let mut w = FailureWindow::default();
        let t0 = Instant::now();
        let window = Duration::from_millis(100);
        assert_eq!(w.record(t0, window), 1);
        assert_eq!(w.record(t0 + Duration::from_millis(10), window), 2);
        // outside the window: the first two fall off
        assert_eq!(w.record(t0 + Duration::from_millis(250), window), 1);
    }
}

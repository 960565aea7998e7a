use std::{env, num::NonZeroUsize, thread};
use tracing::{info, warn};

/// Environment variable overriding the detected thread budget.
pub const MAX_THREADS_ENV: &str = "FORK_MAX_THREADS";

pub const MIN_THREAD_BUDGET: usize = 2;
pub const MAX_THREAD_BUDGET: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Upper bound on statements running on dedicated workers at once.
    pub max_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::detect()
    }
}

impl RuntimeConfig {
    pub fn with_max_threads(max_threads: usize) -> Self {
        Self {
            max_threads: max_threads.max(1),
        }
    }

    pub fn detect() -> Self {
        let detected = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        let max_threads = clamp_budget(detected);
        info!(detected, max_threads, "thread budget detected");
        Self { max_threads }
    }

    pub fn from_env() -> Self {
        Self::from_override(env::var(MAX_THREADS_ENV).ok().as_deref())
    }

    /// Apply an optional override value; invalid values fall back to detection.
    pub fn from_override(value: Option<&str>) -> Self {
        let Some(raw) = value else {
            return Self::detect();
        };
        match raw.trim().parse::<usize>() {
            Ok(max_threads) if max_threads > 0 => {
                info!(max_threads, "thread budget overridden");
                Self { max_threads }
            }
            _ => {
                warn!(value = raw, variable = MAX_THREADS_ENV, "ignoring invalid thread budget");
                Self::detect()
            }
        }
    }
}

pub fn clamp_budget(hardware_threads: usize) -> usize {
    hardware_threads.clamp(MIN_THREAD_BUDGET, MAX_THREAD_BUDGET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_clamped_between_two_and_four() {
        assert_eq!(clamp_budget(1), 2);
        assert_eq!(clamp_budget(2), 2);
        assert_eq!(clamp_budget(3), 3);
        assert_eq!(clamp_budget(4), 4);
        assert_eq!(clamp_budget(64), 4);
    }

    #[test]
    fn detection_stays_inside_the_clamp() {
        let config = RuntimeConfig::detect();
        assert!((MIN_THREAD_BUDGET..=MAX_THREAD_BUDGET).contains(&config.max_threads));
    }

    #[test]
    fn overrides_accept_positive_integers_only() {
        assert_eq!(RuntimeConfig::from_override(Some("7")).max_threads, 7);
        assert_eq!(RuntimeConfig::from_override(Some(" 1 ")).max_threads, 1);
        let fallback = RuntimeConfig::from_override(Some("0")).max_threads;
        assert!((MIN_THREAD_BUDGET..=MAX_THREAD_BUDGET).contains(&fallback));
        let fallback = RuntimeConfig::from_override(Some("many")).max_threads;
        assert!((MIN_THREAD_BUDGET..=MAX_THREAD_BUDGET).contains(&fallback));
    }

    #[test]
    fn explicit_budgets_never_drop_to_zero() {
        assert_eq!(RuntimeConfig::with_max_threads(0).max_threads, 1);
    }
}

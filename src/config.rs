//! Run configuration from the environment.
//!
//! `warmup` sets the warm-up length in seconds and `samples` the number of
//! black/white frame pairs to measure. Both accept any decimal number. An infinite
//! sample count asks for as many pairs as a run allows.

use tracing::warn;

pub const WARMUP_VAR: &str = "warmup";
pub const SAMPLES_VAR: &str = "samples";

pub const DEFAULT_WARMUP_SECS: f64 = 1.0;
pub const DEFAULT_SAMPLES: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchConfig {
    /// Warm-up length in seconds, never negative
    pub warmup: f64,
    /// Number of frame pairs to measure
    pub samples: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            warmup: DEFAULT_WARMUP_SECS,
            samples: DEFAULT_SAMPLES,
        }
    }
}

impl BenchConfig {
    /// Reads the config from the environment, falling back to defaults for
    /// unset or invalid values.
    pub fn from_env() -> Self {
        let warmup = match read_number(WARMUP_VAR) {
            Some(warmup) if warmup == f64::INFINITY => {
                warn!("Endless `{WARMUP_VAR}` would never measure, using the default");
                DEFAULT_WARMUP_SECS
            }
            Some(warmup) => warmup.max(0.0),
            None => DEFAULT_WARMUP_SECS,
        };
        // Saturates, so `inf` becomes usize::MAX
        let samples = read_number(SAMPLES_VAR)
            .map(|samples| samples.max(0.0).trunc() as usize)
            .unwrap_or(DEFAULT_SAMPLES);

        Self { warmup, samples }
    }
}

fn read_number(var: &str) -> Option<f64> {
    let value = std::env::var(var).ok()?;
    match value.trim().parse::<f64>() {
        Ok(number) if !number.is_nan() => Some(number),
        _ => {
            warn!("Invalid value `{value}` for `{var}`, using the default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::{FrameTimer, MAX_SAMPLE_PAIRS};

    #[test]
    fn unset_vars_use_defaults() {
        temp_env::with_vars_unset([WARMUP_VAR, SAMPLES_VAR], || {
            assert_eq!(BenchConfig::from_env(), BenchConfig::default());
        });
    }

    #[test]
    fn values_are_read() {
        temp_env::with_vars(
            [(WARMUP_VAR, Some("2.5")), (SAMPLES_VAR, Some("120"))],
            || {
                assert_eq!(
                    BenchConfig::from_env(),
                    BenchConfig {
                        warmup: 2.5,
                        samples: 120
                    }
                );
            },
        );
    }

    #[test]
    fn samples_are_truncated() {
        temp_env::with_vars(
            [(WARMUP_VAR, None), (SAMPLES_VAR, Some("12.9"))],
            || {
                assert_eq!(BenchConfig::from_env().samples, 12);
            },
        );
    }

    #[test]
    fn negative_values_become_zero() {
        temp_env::with_vars(
            [(WARMUP_VAR, Some("-3")), (SAMPLES_VAR, Some("-8"))],
            || {
                let config = BenchConfig::from_env();
                assert_eq!(config.warmup, 0.0);
                assert_eq!(config.samples, 0);
            },
        );
    }

    #[test]
    fn invalid_values_fall_back() {
        temp_env::with_vars(
            [(WARMUP_VAR, Some("soon")), (SAMPLES_VAR, Some("NaN"))],
            || {
                assert_eq!(BenchConfig::from_env(), BenchConfig::default());
            },
        );
    }

    #[test]
    fn infinite_samples_saturate() {
        temp_env::with_vars(
            [(WARMUP_VAR, Some("inf")), (SAMPLES_VAR, Some("inf"))],
            || {
                let config = BenchConfig::from_env();
                assert_eq!(config.warmup, DEFAULT_WARMUP_SECS);
                assert_eq!(config.samples, usize::MAX);
                assert_eq!(FrameTimer::new(&config).samples(), MAX_SAMPLE_PAIRS);
            },
        );
    }

    #[test]
    fn negative_infinity_becomes_zero() {
        temp_env::with_vars(
            [(WARMUP_VAR, Some("-inf")), (SAMPLES_VAR, Some("-inf"))],
            || {
                let config = BenchConfig::from_env();
                assert_eq!(config.warmup, 0.0);
                assert_eq!(config.samples, 0);
            },
        );
    }

    #[test]
    fn large_sample_counts_are_kept_for_the_timer_to_clamp() {
        temp_env::with_var(SAMPLES_VAR, Some("5000"), || {
            assert_eq!(BenchConfig::from_env().samples, 5000);
        });
    }
}

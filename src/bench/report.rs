// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

/// Converts between a period in milliseconds and a frequency in Hz.
///
/// Non-positive inputs give infinity.
fn reciprocal_ms(value: f64) -> f64 {
    if value > 0.0 {
        1000.0 / value
    } else {
        f64::INFINITY
    }
}

/// The time between two consecutive presentations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub period_ms: f64,
    pub freq_hz: f64,
}

impl Interval {
    fn between(start_us: u64, end_us: u64) -> Self {
        let period_ms = (end_us as f64 - start_us as f64) / 1000.0;
        Self {
            period_ms,
            freq_hz: reciprocal_ms(period_ms),
        }
    }
}

/// Timing statistics derived from a run of presentation timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub intervals: Vec<Interval>,
    pub mean_period_ms: f64,
    pub mean_freq_hz: f64,
    pub ideal_period_ms: f64,
    pub ideal_freq_hz: f64,
}

impl Report {
    /// Derives statistics from timestamps in microseconds.
    ///
    /// The first interval and the last two are left out of the per-interval
    /// listing. The mean spans the whole log divided by the number of timestamps.
    pub fn new(stamps: &[u64], refresh_hz: f64) -> Self {
        let n = stamps.len();

        let intervals = (1..n.saturating_sub(2))
            .map(|i| Interval::between(stamps[i], stamps[i + 1]))
            .collect();

        let mean_period_ms = match (stamps.first(), stamps.last()) {
            (Some(&first), Some(&last)) => (last as f64 - first as f64) / (1000.0 * n as f64),
            _ => 0.0,
        };

        Self {
            intervals,
            mean_period_ms,
            mean_freq_hz: reciprocal_ms(mean_period_ms),
            ideal_period_ms: reciprocal_ms(refresh_hz),
            ideal_freq_hz: refresh_hz,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for interval in self.intervals.iter() {
            writeln!(f, "{:.2} ms \t{:.2} hz", interval.period_ms, interval.freq_hz)?;
        }
        writeln!(f, "------------------------")?;
        writeln!(
            f,
            "{:.4} ms \t{:.4} hz (mean)",
            self.mean_period_ms, self.mean_freq_hz
        )?;
        writeln!(
            f,
            "{:.4} ms \t{:.4} hz (ideal)",
            self.ideal_period_ms, self.ideal_freq_hz
        )
    }
}

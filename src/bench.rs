// SPDX-License-Identifier: GPL-3.0-or-later

//! The presentation timing loop.
//!
//! A run is made of three phases. Warm-up presents a ramp of dark frames to get
//! the display pipeline into a steady state. The measured phase alternates black
//! and white frames and timestamps every completed presentation. The report phase
//! turns those timestamps into per-interval and aggregate statistics.

mod report;

use tracing::{debug, info};

pub use self::report::{Interval, Report};
use crate::{
    backend::{Backend, BackendError},
    config::BenchConfig,
};

/// The most black/white frame pairs a run will measure.
pub const MAX_SAMPLE_PAIRS: usize = 500;
/// The most timestamps a [`FrameLog`] will hold.
pub const MAX_TIMESTAMPS: usize = MAX_SAMPLE_PAIRS * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WarmUp,
    Measured,
    Report,
}

/// An append-only log of presentation timestamps in microseconds.
///
/// The capacity is fixed when the log is created. Pushing past it is refused.
#[derive(Debug, Clone)]
pub struct FrameLog {
    stamps: Vec<u64>,
    capacity: usize,
}

impl FrameLog {
    /// Creates an empty log. The capacity is capped at [`MAX_TIMESTAMPS`].
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_TIMESTAMPS);
        Self {
            stamps: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a timestamp, returning `false` if the log is full.
    #[must_use]
    pub fn push(&mut self, stamp_us: u64) -> bool {
        if self.is_full() {
            return false;
        }
        self.stamps.push(stamp_us);
        true
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.stamps
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.stamps.len() >= self.capacity
    }
}

/// Drives a backend through the warm-up and measured phases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTimer {
    warmup_secs: f64,
    samples: usize,
}

impl FrameTimer {
    pub fn new(config: &BenchConfig) -> Self {
        Self {
            warmup_secs: config.warmup.max(0.0),
            samples: config.samples.min(MAX_SAMPLE_PAIRS),
        }
    }

    /// The number of black/white pairs the measured phase presents.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// The number of warm-up frames presented at `refresh_hz`.
    pub fn warmup_frames(&self, refresh_hz: f64) -> usize {
        let frames = (self.warmup_secs * refresh_hz).floor();
        if frames.is_finite() && frames > 0.0 {
            frames as usize
        } else {
            0
        }
    }

    /// Runs warm-up and then the measured phase, returning the measured timestamps.
    ///
    /// Any backend error ends the run.
    #[tracing::instrument(level = "debug", skip(self, backend))]
    pub fn run(&self, backend: &mut Backend, refresh_hz: f64) -> Result<FrameLog, BackendError> {
        let warmup_frames = self.warmup_frames(refresh_hz);
        info!(phase = ?Phase::WarmUp, frames = warmup_frames, "Warming up");

        for i in 0..warmup_frames {
            let intensity = i as f64 / (4.0 * refresh_hz);
            backend.draw(intensity as f32)?;
            backend.present()?;
        }

        info!(phase = ?Phase::Measured, pairs = self.samples, "Measuring");

        let mut log = FrameLog::with_capacity(self.samples * 2);
        for _ in 0..self.samples {
            for intensity in [0.0, 1.0] {
                backend.draw(intensity)?;
                backend.present()?;
                let pushed = log.push(backend.now_micros());
                debug_assert!(pushed, "frame log is sized for every sample");
            }
        }

        debug!(phase = ?Phase::Report, stamps = log.len());

        Ok(log)
    }
}

/// Runs a full measurement against `backend` and derives its report.
pub fn measure(
    backend: &mut Backend,
    refresh_hz: f64,
    config: &BenchConfig,
) -> Result<Report, BackendError> {
    let log = FrameTimer::new(config).run(backend, refresh_hz)?;
    Ok(Report::new(log.as_slice(), refresh_hz))
}

#[cfg(test)]
mod tests {
    use proptest::{prop_assert, prop_assert_eq, proptest};

    use super::*;
    use crate::{backend::dummy::Dummy, modeline::Modeline};

    fn dummy_backend() -> Backend {
        let mode: Modeline = "74.25 1280 1390 1430 1650 720 725 730 750 +hsync +vsync"
            .parse()
            .unwrap();
        Backend::Dummy(Dummy::new(mode))
    }

    #[test]
    fn frame_log_refuses_to_grow() {
        let mut log = FrameLog::with_capacity(2);

        assert!(log.push(1));
        assert!(log.push(2));
        assert!(!log.push(3));
        assert_eq!(log.as_slice(), &[1, 2]);
        assert!(log.is_full());
    }

    #[test]
    fn frame_log_capacity_is_capped() {
        let log = FrameLog::with_capacity(5000);
        assert_eq!(log.capacity(), MAX_TIMESTAMPS);
    }

    #[test]
    fn samples_are_clamped() {
        let timer = FrameTimer::new(&BenchConfig {
            warmup: 0.0,
            samples: 5000,
        });
        assert_eq!(timer.samples(), MAX_SAMPLE_PAIRS);

        let timer = FrameTimer::new(&BenchConfig {
            warmup: 0.0,
            samples: 0,
        });
        assert_eq!(timer.samples(), 0);
    }

    #[test]
    fn zero_samples_measure_nothing() {
        let mut backend = dummy_backend();
        let config = BenchConfig {
            warmup: 0.05,
            samples: 0,
        };

        let report = measure(&mut backend, 60.0, &config).unwrap();

        // Only the warm-up frames are presented
        assert_eq!(backend.dummy().presents, 3);
        assert!(report.intervals.is_empty());
        assert_eq!(report.mean_freq_hz, f64::INFINITY);
    }

    #[test]
    fn warmup_frames_round_down() {
        let timer = FrameTimer::new(&BenchConfig {
            warmup: 1.5,
            samples: 1,
        });

        assert_eq!(timer.warmup_frames(59.94), 89);
        assert_eq!(timer.warmup_frames(0.0), 0);
        assert_eq!(timer.warmup_frames(f64::NAN), 0);
    }

    #[test]
    fn run_draws_ramp_then_alternates() {
        let mut backend = dummy_backend();
        let config = BenchConfig {
            warmup: 0.05,
            samples: 2,
        };

        let log = FrameTimer::new(&config).run(&mut backend, 60.0).unwrap();
        assert_eq!(log.len(), 4);

        let dummy = backend.dummy();
        // floor(0.05 * 60) warm-up frames
        assert_eq!(dummy.draws.len(), 3 + 4);
        assert_eq!(dummy.presents, 7);

        let ramp = &dummy.draws[..3];
        assert_eq!(ramp[0], 0.0);
        assert!((ramp[1] - 1.0 / 240.0).abs() < 1e-6);
        assert!((ramp[2] - 2.0 / 240.0).abs() < 1e-6);

        assert_eq!(&dummy.draws[3..], &[0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn backend_errors_end_the_run() {
        let mode: Modeline = "25.175 640 656 752 800 480 490 492 525".parse().unwrap();
        let mut backend = Backend::Dummy(Dummy::new(mode).fail_on_present(3));

        let result = FrameTimer::new(&BenchConfig {
            warmup: 0.0,
            samples: 10,
        })
        .run(&mut backend, 60.0);

        assert!(matches!(result, Err(BackendError::Injected(3))));
        assert_eq!(backend.dummy().presents, 3);
    }

    #[test]
    fn measure_reports_the_simulated_rate() {
        let mut backend = dummy_backend();
        let config = BenchConfig {
            warmup: 0.0,
            samples: 30,
        };

        let report = measure(&mut backend, 60.0, &config).unwrap();

        assert_eq!(report.intervals.len(), 57);
        for interval in report.intervals.iter() {
            assert!((interval.period_ms - 1000.0 / 60.0).abs() < 1e-3);
        }
        assert_eq!(report.ideal_freq_hz, 60.0);
    }

    proptest! {
        #[test]
        fn log_is_sized_and_ordered(samples in 0usize..1200) {
            let mut backend = dummy_backend();
            let config = BenchConfig { warmup: 0.0, samples };

            let log = FrameTimer::new(&config).run(&mut backend, 60.0).unwrap();

            prop_assert_eq!(log.len(), 2 * samples.min(MAX_SAMPLE_PAIRS));
            prop_assert!(log.as_slice().windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later

//! Display timings in X11 modeline form.
//!
//! A modeline looks like
//!
//! ```text
//! 13.5 720 739 801 858 480 488 494 525 -hsync -vsync interlace
//! ```
//!
//! where the first number is the pixel clock in MHz, followed by the horizontal and
//! vertical display, sync start, sync end and total values, and then any flags.

mod flags;

use std::{fmt, str::FromStr, time::Duration};

use tracing::warn;

pub use self::flags::{ModeFlag, ModeFlags};

/// Only this many trailing flag tokens are looked at.
pub const MAX_FLAG_TOKENS: usize = 5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelineError {
    #[error("no {0} specified")]
    MissingField(&'static str),
    #[error("failed to parse {field} from `{value}`")]
    InvalidField { field: &'static str, value: String },
    #[error("pixel clock must be a positive number of MHz, got `{0}`")]
    InvalidClock(String),
    #[error(
        "{axis} timings must satisfy display < sync start < sync end <= total, \
        got {display} {sync_start} {sync_end} {total}"
    )]
    Timing {
        axis: &'static str,
        display: u16,
        sync_start: u16,
        sync_end: u16,
        total: u16,
    },
}

/// Timings for a single display mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modeline {
    pub name: String,
    /// Pixel clock in kHz
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    /// How many times each line is scanned out. 0 and 1 both mean once.
    pub vscan: u16,
    pub flags: ModeFlags,
    /// Rounded refresh rate as advertised by the display, or as computed when parsed.
    ///
    /// This is only for display. Use [`Modeline::refresh_hz`] for calculations.
    pub vrefresh: u32,
    /// Whether this mode came from the user rather than the display.
    pub user_defined: bool,
}

impl Modeline {
    /// Computes the vertical refresh rate in Hz.
    ///
    /// Returns 0 for modes with a zero htotal or vtotal.
    pub fn refresh_hz(&self) -> f64 {
        let total = self.htotal as f64 * self.vtotal as f64;
        if total == 0.0 {
            return 0.0;
        }

        let mut refresh = self.clock as f64 * 1000.0 / total;

        if self.flags.contains(ModeFlag::Interlace) {
            refresh *= 2.0;
        }
        if self.flags.contains(ModeFlag::DblScan) {
            refresh /= 2.0;
        }
        if self.vscan > 1 {
            refresh /= self.vscan as f64;
        }

        refresh
    }

    /// Returns the time between two vblanks, rounded to the nearest nanosecond.
    pub fn refresh_interval(&self) -> Duration {
        let clock = self.clock as u64;
        if clock == 0 {
            return Duration::ZERO;
        }

        let mut numerator = self.htotal as u64 * self.vtotal as u64 * 1_000_000;
        let mut denominator = clock;

        if self.flags.contains(ModeFlag::Interlace) {
            denominator *= 2;
        }

        if self.flags.contains(ModeFlag::DblScan) {
            numerator *= 2;
        }

        if self.vscan > 1 {
            numerator *= self.vscan as u64;
        }

        Duration::from_nanos((numerator + denominator / 2) / denominator)
    }

    /// The pixel clock in MHz.
    pub fn clock_mhz(&self) -> f64 {
        self.clock as f64 / 1000.0
    }

    fn generated_name(&self) -> String {
        let interlaced = if self.flags.contains(ModeFlag::Interlace) {
            "i"
        } else {
            ""
        };
        format!("{}x{}{interlaced}", self.hdisplay, self.vdisplay)
    }
}

fn next_field<'a, T: FromStr>(
    args: &mut impl Iterator<Item = &'a str>,
    field: &'static str,
) -> Result<T, ModelineError> {
    let value = args.next().ok_or(ModelineError::MissingField(field))?;
    value.parse().map_err(|_| ModelineError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn check_axis(
    axis: &'static str,
    display: u16,
    sync_start: u16,
    sync_end: u16,
    total: u16,
) -> Result<(), ModelineError> {
    if display > 0 && display < sync_start && sync_start < sync_end && sync_end <= total {
        Ok(())
    } else {
        Err(ModelineError::Timing {
            axis,
            display,
            sync_start,
            sync_end,
            total,
        })
    }
}

impl FromStr for Modeline {
    type Err = ModelineError;

    fn from_str(modeline: &str) -> Result<Self, Self::Err> {
        let mut args = modeline.split_whitespace();

        let clock_mhz: f64 = next_field(&mut args, "clock")?;
        let clock = (clock_mhz * 1000.0).round();
        if !clock.is_finite() || clock < 1.0 || clock > u32::MAX as f64 {
            return Err(ModelineError::InvalidClock(clock_mhz.to_string()));
        }

        let hdisplay = next_field(&mut args, "hdisplay")?;
        let hsync_start = next_field(&mut args, "hsync_start")?;
        let hsync_end = next_field(&mut args, "hsync_end")?;
        let htotal = next_field(&mut args, "htotal")?;
        let vdisplay = next_field(&mut args, "vdisplay")?;
        let vsync_start = next_field(&mut args, "vsync_start")?;
        let vsync_end = next_field(&mut args, "vsync_end")?;
        let vtotal = next_field(&mut args, "vtotal")?;

        check_axis("horizontal", hdisplay, hsync_start, hsync_end, htotal)?;
        check_axis("vertical", vdisplay, vsync_start, vsync_end, vtotal)?;

        let mut flags = ModeFlags::new();
        for token in args.by_ref().take(MAX_FLAG_TOKENS) {
            match ModeFlag::from_token(token) {
                Some(flag) => {
                    flags.insert(flag);
                }
                None => warn!(token, "Ignoring unknown modeline flag"),
            }
        }

        let ignored = args.collect::<Vec<_>>();
        if !ignored.is_empty() {
            warn!(
                ?ignored,
                "Only {MAX_FLAG_TOKENS} modeline flags are supported, ignoring the rest"
            );
        }

        let mut modeline = Modeline {
            name: String::new(),
            clock: clock as u32,
            hdisplay,
            hsync_start,
            hsync_end,
            htotal,
            hskew: 0,
            vdisplay,
            vsync_start,
            vsync_end,
            vtotal,
            vscan: 0,
            flags,
            vrefresh: 0,
            user_defined: true,
        };

        modeline.vrefresh = modeline.refresh_hz().round() as u32;
        modeline.name = modeline.generated_name();

        Ok(modeline)
    }
}

impl fmt::Display for Modeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:.2}hz({}): {:.3} {} {} {} {} {} {} {} {}",
            self.name,
            self.refresh_hz(),
            self.vrefresh,
            self.clock_mhz(),
            self.hdisplay,
            self.hsync_start,
            self.hsync_end,
            self.htotal,
            self.vdisplay,
            self.vsync_start,
            self.vsync_end,
            self.vtotal,
        )?;

        for flag in self.flags.iter() {
            write!(f, " {flag}")?;
        }

        Ok(())
    }
}

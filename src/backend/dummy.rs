use std::{cell::RefCell, rc::Rc, time::Duration};

use tracing::trace;

use super::{BackendError, TeardownStep, TEARDOWN_ORDER};
use crate::modeline::Modeline;

/// A backend with no display that paces presentation on a simulated clock.
///
/// Every present advances the clock by one refresh interval of the mode.
#[derive(Debug)]
pub struct Dummy {
    refresh_interval: Duration,
    now: Duration,
    fail_on_present: Option<usize>,
    drawn: bool,
    teardown: Rc<RefCell<Vec<TeardownStep>>>,
    /// Every intensity drawn so far
    pub draws: Vec<f32>,
    /// How many frames were presented
    pub presents: usize,
}

impl Dummy {
    pub fn new(mode: Modeline) -> Self {
        Dummy {
            refresh_interval: mode.refresh_interval(),
            now: Duration::ZERO,
            fail_on_present: None,
            drawn: false,
            teardown: Rc::default(),
            draws: Vec::new(),
            presents: 0,
        }
    }

    /// Makes the given present (counting from 0) fail.
    pub fn fail_on_present(mut self, present: usize) -> Self {
        self.fail_on_present = Some(present);
        self
    }

    /// The steps this backend has torn down, filled in when it is dropped.
    pub fn teardown_log(&self) -> Rc<RefCell<Vec<TeardownStep>>> {
        self.teardown.clone()
    }

    pub(super) fn draw(&mut self, intensity: f32) -> Result<(), BackendError> {
        self.draws.push(intensity);
        self.drawn = true;
        Ok(())
    }

    pub(super) fn present(&mut self) -> Result<(), BackendError> {
        if !self.drawn {
            return Err(BackendError::NoFrame);
        }
        if self.fail_on_present == Some(self.presents) {
            return Err(BackendError::Injected(self.presents));
        }

        self.drawn = false;
        self.now += self.refresh_interval;
        self.presents += 1;
        trace!(presents = self.presents, now = ?self.now, "Presented dummy frame");

        Ok(())
    }

    pub(super) fn now_micros(&self) -> u64 {
        self.now.as_micros() as u64
    }
}

impl Drop for Dummy {
    fn drop(&mut self) {
        let mut teardown = self.teardown.borrow_mut();
        for step in TEARDOWN_ORDER {
            trace!(?step, "Tearing down dummy backend");
            teardown.push(step);
        }
    }
}

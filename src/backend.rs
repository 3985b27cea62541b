// SPDX-License-Identifier: GPL-3.0-or-later

use std::{io, path::PathBuf};

use smithay::backend::{egl, renderer::gles::GlesError};

#[cfg(any(test, feature = "testing"))]
use self::dummy::Dummy;
use self::kms::Kms;

#[cfg(any(test, feature = "testing"))]
pub mod dummy;
pub mod kms;

/// Something frames can be drawn into and presented on.
pub enum Backend {
    /// Frames are scanned out on a real display through KMS
    Kms(Box<Kms>),
    #[cfg(any(test, feature = "testing"))]
    Dummy(Dummy),
}

impl Backend {
    /// Fills the next frame with a gray of the given intensity, from 0.0 (black) to 1.0 (white).
    pub fn draw(&mut self, intensity: f32) -> Result<(), BackendError> {
        match self {
            Backend::Kms(kms) => kms.draw(intensity),
            #[cfg(any(test, feature = "testing"))]
            Backend::Dummy(dummy) => dummy.draw(intensity),
        }
    }

    /// Presents the last drawn frame, blocking until it is on screen.
    ///
    /// The previously presented frame is released afterwards.
    pub fn present(&mut self) -> Result<(), BackendError> {
        match self {
            Backend::Kms(kms) => kms.present(),
            #[cfg(any(test, feature = "testing"))]
            Backend::Dummy(dummy) => dummy.present(),
        }
    }

    /// The current time on a monotonic clock, in microseconds.
    pub fn now_micros(&self) -> u64 {
        match self {
            Backend::Kms(kms) => kms.now_micros(),
            #[cfg(any(test, feature = "testing"))]
            Backend::Dummy(dummy) => dummy.now_micros(),
        }
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn dummy(&self) -> &Dummy {
        let Backend::Dummy(dummy) = self else {
            unreachable!("only tests construct a dummy backend")
        };
        dummy
    }
}

/// What a backend releases when dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    /// A drawn frame that was never presented
    PendingFrame,
    /// The render context and the display connection it holds
    Renderer,
    /// The display mode that was active before the backend took over
    RestoreMode,
    /// The framebuffer still on screen
    Scanout,
}

/// The order backends tear down in.
///
/// Rendering is shut down before the old mode comes back, and the last frame
/// stays on screen until then. The device handle is released after every step.
pub const TEARDOWN_ORDER: [TeardownStep; 4] = [
    TeardownStep::PendingFrame,
    TeardownStep::Renderer,
    TeardownStep::RestoreMode,
    TeardownStep::Scanout,
];

/// The broad category of a [`BackendError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A device, connector, mode, encoder or CRTC could not be found
    ResourceUnavailable,
    /// The display stack could not do what was asked of it
    CapabilityMismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("No DRM device with mode setting resources found, tried {0:?}")]
    NoDevice(Vec<PathBuf>),
    #[error("Failed to query drm resources: {0}")]
    Query(io::Error),
    #[error("No connected connector found")]
    NoConnector,
    #[error("Mode {index} does not exist, the connector has {count} modes")]
    ModeIndex { index: usize, count: usize },
    #[error("No encoder found for {0}")]
    NoEncoder(String),
    #[error("No crtc available for {0}")]
    NoCrtc(String),
    #[error("Failed to initialize gbm device: {0}")]
    GbmDevice(io::Error),
    #[error("Failed to initialize egl: {0}")]
    Egl(#[from] egl::Error),
    #[error("Renderer error: {0}")]
    Renderer(#[from] GlesError),
    #[error("Failed to allocate a scanout buffer: {0}")]
    Allocate(String),
    #[error("No free scanout buffer")]
    SwapchainExhausted,
    #[error("Failed to export a scanout buffer: {0}")]
    Export(String),
    #[error("Scanout buffer is {actual:?} but the mode is {expected:?}")]
    BufferSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("Failed to create framebuffer: {0}")]
    Framebuffer(io::Error),
    #[error("Failed to set mode: {0}")]
    Modeset(io::Error),
    #[error("Page flip failed: {0}")]
    PageFlip(io::Error),
    #[error("Nothing was drawn since the last present")]
    NoFrame,
    #[error("The renderer has already been torn down")]
    RendererGone,
    #[cfg(any(test, feature = "testing"))]
    #[error("Injected failure on present {0}")]
    Injected(usize),
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Open { .. }
            | BackendError::NoDevice(_)
            | BackendError::Query(_)
            | BackendError::NoConnector
            | BackendError::ModeIndex { .. }
            | BackendError::NoEncoder(_)
            | BackendError::NoCrtc(_) => ErrorKind::ResourceUnavailable,
            BackendError::GbmDevice(_)
            | BackendError::Egl(_)
            | BackendError::Renderer(_)
            | BackendError::Allocate(_)
            | BackendError::SwapchainExhausted
            | BackendError::Export(_)
            | BackendError::BufferSize { .. }
            | BackendError::Framebuffer(_)
            | BackendError::Modeset(_)
            | BackendError::PageFlip(_)
            | BackendError::NoFrame
            | BackendError::RendererGone => ErrorKind::CapabilityMismatch,
            #[cfg(any(test, feature = "testing"))]
            BackendError::Injected(_) => ErrorKind::CapabilityMismatch,
        }
    }
}

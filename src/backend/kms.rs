// SPDX-License-Identifier: GPL-3.0-or-later

//! Presentation straight to a display through the kernel's mode setting API.
//!
//! Frames are cleared with GLES into GBM buffers from a small swapchain and put on
//! screen with page flips. The first presented frame performs the modeset. The
//! CRTC's previous configuration is restored when the backend is dropped.

mod drm_util;

use std::{
    ffi::{CStr, c_char},
    fs::OpenOptions,
    io,
    os::fd::OwnedFd,
    path::{Path, PathBuf},
    time::Duration,
};

use smithay::{
    backend::{
        allocator::{
            Buffer, Fourcc, Modifier, Slot, Swapchain,
            dmabuf::AsDmabuf,
            gbm::{GbmAllocator, GbmBuffer, GbmBufferFlags, GbmDevice},
        },
        drm::DrmDeviceFd,
        egl::{EGLContext, EGLDisplay},
        renderer::{
            Bind, Color32F, Frame, Renderer,
            gles::{GlesRenderer, ffi},
        },
    },
    reexports::drm::control::{
        Device as ControlDevice, Event, Mode, PageFlipFlags, ResourceHandles, connector, crtc,
        framebuffer,
    },
    utils::{Clock, DeviceFd, Monotonic, Physical, Rectangle, Size, Transform},
};
use tracing::{debug, info, trace, warn};

pub use self::drm_util::{connector_name, drm_mode_from_modeline, modeline_from_drm};
use super::{BackendError, TeardownStep, TEARDOWN_ORDER};
use crate::modeline::Modeline;

/// Devices tried in order when none is given.
pub const DEFAULT_DEVICES: [&str; 2] = ["/dev/dri/card0", "/dev/dri/card1"];

fn open_drm_fd(path: &Path) -> Result<DrmDeviceFd, BackendError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| BackendError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(DrmDeviceFd::new(DeviceFd::from(OwnedFd::from(file))))
}

/// Opens the first candidate that has mode setting resources.
fn open_device(
    candidates: &[PathBuf],
) -> Result<(PathBuf, DrmDeviceFd, ResourceHandles), BackendError> {
    for path in candidates {
        let fd = match open_drm_fd(path) {
            Ok(fd) => fd,
            Err(err) => {
                warn!("{err}");
                continue;
            }
        };

        match fd.resource_handles() {
            Ok(resources) => return Ok((path.clone(), fd, resources)),
            Err(err) => warn!(
                device = %path.display(),
                "Device has no mode setting resources: {err}"
            ),
        }
    }

    Err(BackendError::NoDevice(candidates.to_vec()))
}

/// A DRM device and the connected connector frames will be shown on.
pub struct KmsOutput {
    path: PathBuf,
    fd: DrmDeviceFd,
    resources: ResourceHandles,
    connector: connector::Info,
    name: String,
}

impl KmsOutput {
    /// Opens `device`, or the first of [`DEFAULT_DEVICES`] with mode setting resources,
    /// and picks its first connected connector.
    pub fn open(device: Option<&Path>) -> Result<Self, BackendError> {
        let candidates = match device {
            Some(path) => vec![path.to_path_buf()],
            None => DEFAULT_DEVICES.iter().map(PathBuf::from).collect(),
        };

        let (path, fd, resources) = open_device(&candidates)?;
        println!("using {}", path.display());

        let connector = resources
            .connectors()
            .iter()
            .filter_map(|&handle| match fd.get_connector(handle, true) {
                Ok(info) => Some(info),
                Err(err) => {
                    warn!(?handle, "Failed to query connector: {err}");
                    None
                }
            })
            .find(|info| info.state() == connector::State::Connected)
            .ok_or(BackendError::NoConnector)?;

        let name = connector_name(&connector);
        info!(
            connector = %name,
            modes = connector.modes().len(),
            "Found connected connector"
        );

        Ok(Self {
            path,
            fd,
            resources,
            connector,
            name,
        })
    }

    pub fn connector_name(&self) -> &str {
        &self.name
    }

    /// Every mode the connector advertises, in the kernel's order.
    pub fn modes(&self) -> Vec<Modeline> {
        self.connector.modes().iter().map(modeline_from_drm).collect()
    }

    pub fn mode(&self, index: usize) -> Result<Modeline, BackendError> {
        let modes = self.connector.modes();
        modes
            .get(index)
            .map(modeline_from_drm)
            .ok_or(BackendError::ModeIndex {
                index,
                count: modes.len(),
            })
    }
}

/// A buffer that is currently on screen.
struct Scanout {
    slot: Slot<GbmBuffer>,
    framebuffer: framebuffer::Handle,
}

/// Draws and presents frames on one connector.
///
/// [`Drop`] tears down in [`TEARDOWN_ORDER`]. The swapchain and then the device
/// handle drop last, as fields.
pub struct Kms {
    clock: Clock<Monotonic>,
    mode: Modeline,
    drm_mode: Mode,
    connector: connector::Handle,
    connector_name: String,
    crtc: crtc::Handle,
    saved_crtc: crtc::Info,
    /// Whether the mode has been applied yet
    modeset: bool,
    /// Drawn but not yet presented
    pending: Option<Slot<GbmBuffer>>,
    scanout: Option<Scanout>,
    /// Taken on drop, before the CRTC is restored
    renderer: Option<GlesRenderer>,
    swapchain: Swapchain<GbmAllocator<DrmDeviceFd>>,
    fd: DrmDeviceFd,
}

impl Kms {
    /// Sets up rendering for `mode` on the output's connector.
    ///
    /// The mode itself is only applied with the first present.
    pub fn new(output: KmsOutput, mode: Modeline) -> Result<Self, BackendError> {
        let KmsOutput {
            path,
            fd,
            resources,
            connector,
            name,
        } = output;

        let encoder = connector
            .current_encoder()
            .or_else(|| connector.encoders().first().copied())
            .ok_or_else(|| BackendError::NoEncoder(name.clone()))?;
        let encoder = fd.get_encoder(encoder).map_err(BackendError::Query)?;

        let crtc = encoder
            .crtc()
            .or_else(|| {
                resources
                    .filter_crtcs(encoder.possible_crtcs())
                    .first()
                    .copied()
            })
            .ok_or_else(|| BackendError::NoCrtc(name.clone()))?;
        let saved_crtc = fd.get_crtc(crtc).map_err(BackendError::Query)?;
        debug!(connector = %name, ?crtc, saved_mode = ?saved_crtc.mode(), "Selected crtc");

        let gbm = GbmDevice::new(fd.clone()).map_err(BackendError::GbmDevice)?;
        // SAFETY: the gbm device is kept alive by the allocator for as long as the display
        let display = unsafe { EGLDisplay::new(gbm.clone()) }?;
        let context = EGLContext::new(&display)?;
        // SAFETY: the context is fresh and only ever made current by this renderer
        let mut renderer = unsafe { GlesRenderer::new(context) }?;

        let gl_version = renderer.with_context(|gl| {
            // SAFETY: is an ffi function
            unsafe { CStr::from_ptr(gl.GetString(ffi::VERSION) as *const c_char) }
                .to_string_lossy()
                .into_owned()
        })?;
        println!("Initialized GL version: {gl_version}");

        let (width, height) = (mode.hdisplay as u32, mode.vdisplay as u32);
        let allocator = GbmAllocator::new(
            gbm,
            GbmBufferFlags::RENDERING | GbmBufferFlags::SCANOUT,
        );
        let mut swapchain = Swapchain::new(
            allocator,
            width,
            height,
            Fourcc::Xrgb8888,
            vec![Modifier::Invalid],
        );

        // Scanout buffers must cover the mode exactly
        let first = swapchain
            .acquire()
            .map_err(|err| BackendError::Allocate(err.to_string()))?
            .ok_or(BackendError::SwapchainExhausted)?;
        let actual = (first.width(), first.height());
        if actual != (width, height) {
            return Err(BackendError::BufferSize {
                expected: (width, height),
                actual,
            });
        }
        drop(first);

        info!(
            device = %path.display(),
            connector = %name,
            %mode,
            refresh_interval = ?mode.refresh_interval(),
            "Output ready"
        );

        Ok(Kms {
            clock: Clock::<Monotonic>::new(),
            drm_mode: drm_mode_from_modeline(&mode),
            mode,
            connector: connector.handle(),
            connector_name: name,
            crtc,
            saved_crtc,
            modeset: false,
            pending: None,
            scanout: None,
            renderer: Some(renderer),
            swapchain,
            fd,
        })
    }

    pub(super) fn draw(&mut self, intensity: f32) -> Result<(), BackendError> {
        let slot = self
            .swapchain
            .acquire()
            .map_err(|err| BackendError::Allocate(err.to_string()))?
            .ok_or(BackendError::SwapchainExhausted)?;
        let mut dmabuf = slot
            .export()
            .map_err(|err| BackendError::Export(err.to_string()))?;

        let size = Size::<i32, Physical>::from((
            self.mode.hdisplay as i32,
            self.mode.vdisplay as i32,
        ));
        let renderer = self.renderer.as_mut().ok_or(BackendError::RendererGone)?;
        let sync = {
            let mut target = renderer.bind(&mut dmabuf)?;
            let mut frame = renderer.render(&mut target, size, Transform::Normal)?;
            frame.clear(
                Color32F::new(intensity, intensity, intensity, 1.0),
                &[Rectangle::from_size(size)],
            )?;
            frame.finish()?
        };
        if let Err(err) = sync.wait() {
            trace!(?err, "Render fence wait was interrupted");
        }

        // A drawn frame that never got presented is simply replaced.
        self.pending = Some(slot);

        Ok(())
    }

    pub(super) fn present(&mut self) -> Result<(), BackendError> {
        let slot = self.pending.take().ok_or(BackendError::NoFrame)?;

        let framebuffer = self
            .fd
            .add_framebuffer(&**slot, 24, 32)
            .map_err(BackendError::Framebuffer)?;

        let presented = if self.modeset {
            self.fd
                .page_flip(self.crtc, framebuffer, PageFlipFlags::EVENT, None)
                .and_then(|()| self.wait_for_flip())
                .map_err(BackendError::PageFlip)
        } else {
            self.fd
                .set_crtc(
                    self.crtc,
                    Some(framebuffer),
                    (0, 0),
                    &[self.connector],
                    Some(self.drm_mode),
                )
                .map_err(BackendError::Modeset)
        };

        if let Err(err) = presented {
            if let Err(err) = self.fd.destroy_framebuffer(framebuffer) {
                warn!("Failed to destroy framebuffer: {err}");
            }
            return Err(err);
        }

        if !self.modeset {
            info!(connector = %self.connector_name, mode = %self.mode, "Mode set");
            self.modeset = true;
        }

        if let Some(previous) = self.scanout.replace(Scanout { slot, framebuffer }) {
            self.release(previous);
        }

        Ok(())
    }

    pub(super) fn now_micros(&self) -> u64 {
        let now: Duration = self.clock.now().into();
        now.as_micros() as u64
    }

    /// Blocks until the kernel reports the flip on our crtc completed.
    fn wait_for_flip(&self) -> io::Result<()> {
        loop {
            for event in self.fd.receive_events()? {
                match event {
                    Event::PageFlip(flip) if flip.crtc == self.crtc => {
                        trace!(frame = flip.frame, "Page flip complete");
                        return Ok(());
                    }
                    _ => (),
                }
            }
        }
    }

    fn release(&self, scanout: Scanout) {
        if let Err(err) = self.fd.destroy_framebuffer(scanout.framebuffer) {
            warn!("Failed to destroy framebuffer: {err}");
        }
        // Dropping the slot hands the buffer back to the swapchain.
        drop(scanout.slot);
    }

    /// Puts back the CRTC configuration that was active before we took over.
    fn restore_crtc(&self) {
        let restored = match self.saved_crtc.mode() {
            Some(mode) => self.fd.set_crtc(
                self.crtc,
                self.saved_crtc.framebuffer(),
                self.saved_crtc.position(),
                &[self.connector],
                Some(mode),
            ),
            None => self.fd.set_crtc(self.crtc, None, (0, 0), &[], None),
        };

        match restored {
            Ok(()) => debug!(connector = %self.connector_name, "Restored crtc"),
            Err(err) => warn!(connector = %self.connector_name, "Failed to restore crtc: {err}"),
        }
    }
}

impl Drop for Kms {
    fn drop(&mut self) {
        for step in TEARDOWN_ORDER {
            trace!(?step, connector = %self.connector_name, "Tearing down");
            match step {
                TeardownStep::PendingFrame => drop(self.pending.take()),
                TeardownStep::Renderer => drop(self.renderer.take()),
                TeardownStep::RestoreMode => self.restore_crtc(),
                TeardownStep::Scanout => {
                    if let Some(scanout) = self.scanout.take() {
                        self.release(scanout);
                    }
                }
            }
        }
    }
}

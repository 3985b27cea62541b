// SPDX-License-Identifier: GPL-3.0-or-later

use std::{ffi::c_char, io::Write};

use drm_sys::{DRM_MODE_TYPE_DRIVER, DRM_MODE_TYPE_USERDEF, drm_mode_modeinfo};
use smithay::reexports::drm::control::{Mode, ModeTypeFlags, connector};

use crate::modeline::{ModeFlags, Modeline};

/// Names a connector the way the kernel does, e.g. `HDMI-A-1`.
pub fn connector_name(connector: &connector::Info) -> String {
    format!(
        "{}-{}",
        connector.interface().as_str(),
        connector.interface_id()
    )
}

/// Converts a mode advertised by the kernel into a [`Modeline`].
pub fn modeline_from_drm(mode: &Mode) -> Modeline {
    let (hdisplay, vdisplay) = mode.size();
    let (hsync_start, hsync_end, htotal) = mode.hsync();
    let (vsync_start, vsync_end, vtotal) = mode.vsync();

    Modeline {
        name: mode.name().to_string_lossy().into_owned(),
        clock: mode.clock(),
        hdisplay,
        hsync_start,
        hsync_end,
        htotal,
        hskew: mode.hskew(),
        vdisplay,
        vsync_start,
        vsync_end,
        vtotal,
        vscan: mode.vscan(),
        flags: ModeFlags::from_bits(mode.flags().bits()),
        vrefresh: mode.vrefresh(),
        user_defined: mode.mode_type().contains(ModeTypeFlags::USERDEF),
    }
}

/// Builds the kernel mode struct for a [`Modeline`].
///
/// Names longer than the kernel's 31 byte limit are truncated.
pub fn drm_mode_from_modeline(modeline: &Modeline) -> Mode {
    let mut name_buf = [0u8; 32];
    let _ = (&mut name_buf[..31]).write_all(modeline.name.as_bytes());
    let name: [c_char; 32] = bytemuck::cast(name_buf);

    let type_ = if modeline.user_defined {
        DRM_MODE_TYPE_USERDEF
    } else {
        DRM_MODE_TYPE_DRIVER
    };

    drm_mode_modeinfo {
        clock: modeline.clock,
        hdisplay: modeline.hdisplay,
        hsync_start: modeline.hsync_start,
        hsync_end: modeline.hsync_end,
        htotal: modeline.htotal,
        hskew: modeline.hskew,
        vdisplay: modeline.vdisplay,
        vsync_start: modeline.vsync_start,
        vsync_end: modeline.vsync_end,
        vtotal: modeline.vtotal,
        vscan: modeline.vscan,
        vrefresh: modeline.vrefresh,
        flags: modeline.flags.bits(),
        type_,
        name,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use drm_sys::{DRM_MODE_FLAG_INTERLACE, DRM_MODE_FLAG_NHSYNC, DRM_MODE_FLAG_NVSYNC};

    use super::*;
    use crate::modeline::ModeFlag;

    #[test]
    fn parsed_modelines_become_userdef_modes() {
        let modeline: Modeline = "13.5 720 739 801 858 480 488 494 525 -hsync -vsync interlace"
            .parse()
            .unwrap();

        let mode = drm_mode_from_modeline(&modeline);

        assert_eq!(mode.clock(), 13_500);
        assert_eq!(mode.size(), (720, 480));
        assert_eq!(mode.hsync(), (739, 801, 858));
        assert_eq!(mode.vsync(), (488, 494, 525));
        assert_eq!(mode.vrefresh(), 60);
        assert_eq!(
            mode.flags().bits(),
            DRM_MODE_FLAG_NHSYNC | DRM_MODE_FLAG_NVSYNC | DRM_MODE_FLAG_INTERLACE
        );
        assert!(mode.mode_type().contains(ModeTypeFlags::USERDEF));
        assert_eq!(mode.name().to_str().unwrap(), "720x480i");
    }

    #[test]
    fn conversion_round_trips() {
        let mut modeline: Modeline = "148.5 1920 2008 2052 2200 1080 1084 1089 1125 +hsync +vsync"
            .parse()
            .unwrap();
        modeline.user_defined = false;
        modeline.hskew = 4;
        modeline.vscan = 1;
        modeline.flags.insert(ModeFlag::HSkew);

        let converted = modeline_from_drm(&drm_mode_from_modeline(&modeline));

        assert_eq!(converted, modeline);
    }

    #[test]
    fn long_names_are_truncated() {
        let mut modeline: Modeline = "25.175 640 656 752 800 480 490 492 525".parse().unwrap();
        modeline.name = "x".repeat(40);

        let mode = drm_mode_from_modeline(&modeline);

        assert_eq!(mode.name().to_bytes().len(), 31);
    }
}

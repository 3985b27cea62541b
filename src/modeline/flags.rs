// SPDX-License-Identifier: GPL-3.0-or-later

use std::{collections::BTreeSet, fmt};

use drm_sys::{
    DRM_MODE_FLAG_BCAST, DRM_MODE_FLAG_CLKDIV2, DRM_MODE_FLAG_CSYNC, DRM_MODE_FLAG_DBLCLK,
    DRM_MODE_FLAG_DBLSCAN, DRM_MODE_FLAG_HSKEW, DRM_MODE_FLAG_INTERLACE, DRM_MODE_FLAG_NCSYNC,
    DRM_MODE_FLAG_NHSYNC, DRM_MODE_FLAG_NVSYNC, DRM_MODE_FLAG_PCSYNC, DRM_MODE_FLAG_PHSYNC,
    DRM_MODE_FLAG_PIXMUX, DRM_MODE_FLAG_PVSYNC,
};

/// A single timing flag of a modeline.
///
/// Variants are declared in modeline order, so a [`ModeFlags`] set always
/// iterates in the order the flags are written in a modeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModeFlag {
    /// Positive horizontal sync
    PHSync,
    /// Negative horizontal sync
    NHSync,
    /// Positive vertical sync
    PVSync,
    /// Negative vertical sync
    NVSync,
    Interlace,
    /// Every line is scanned out twice
    DblScan,
    /// Composite sync
    CSync,
    /// Positive composite sync
    PCSync,
    /// Negative composite sync
    NCSync,
    HSkew,
    /// Unused by the kernel
    Bcast,
    /// Unused by the kernel
    PixMux,
    /// Double-clocked mode
    DblClk,
    /// Half-clocked mode
    ClkDiv2,
}

impl ModeFlag {
    pub const ALL: [ModeFlag; 14] = [
        ModeFlag::PHSync,
        ModeFlag::NHSync,
        ModeFlag::PVSync,
        ModeFlag::NVSync,
        ModeFlag::Interlace,
        ModeFlag::DblScan,
        ModeFlag::CSync,
        ModeFlag::PCSync,
        ModeFlag::NCSync,
        ModeFlag::HSkew,
        ModeFlag::Bcast,
        ModeFlag::PixMux,
        ModeFlag::DblClk,
        ModeFlag::ClkDiv2,
    ];

    /// The token used for this flag in a modeline.
    pub fn name(self) -> &'static str {
        match self {
            ModeFlag::PHSync => "+hsync",
            ModeFlag::NHSync => "-hsync",
            ModeFlag::PVSync => "+vsync",
            ModeFlag::NVSync => "-vsync",
            ModeFlag::Interlace => "interlace",
            ModeFlag::DblScan => "dblscan",
            ModeFlag::CSync => "csync",
            ModeFlag::PCSync => "pcsync",
            ModeFlag::NCSync => "ncsync",
            ModeFlag::HSkew => "hskew",
            ModeFlag::Bcast => "bcast",
            ModeFlag::PixMux => "pixmux",
            ModeFlag::DblClk => "dblclk",
            ModeFlag::ClkDiv2 => "clkdiv2",
        }
    }

    /// Looks up a flag by its modeline token, ignoring ASCII case.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|flag| flag.name().eq_ignore_ascii_case(token))
    }

    /// The kernel's `DRM_MODE_FLAG_*` bit for this flag.
    pub fn bits(self) -> u32 {
        match self {
            ModeFlag::PHSync => DRM_MODE_FLAG_PHSYNC,
            ModeFlag::NHSync => DRM_MODE_FLAG_NHSYNC,
            ModeFlag::PVSync => DRM_MODE_FLAG_PVSYNC,
            ModeFlag::NVSync => DRM_MODE_FLAG_NVSYNC,
            ModeFlag::Interlace => DRM_MODE_FLAG_INTERLACE,
            ModeFlag::DblScan => DRM_MODE_FLAG_DBLSCAN,
            ModeFlag::CSync => DRM_MODE_FLAG_CSYNC,
            ModeFlag::PCSync => DRM_MODE_FLAG_PCSYNC,
            ModeFlag::NCSync => DRM_MODE_FLAG_NCSYNC,
            ModeFlag::HSkew => DRM_MODE_FLAG_HSKEW,
            ModeFlag::Bcast => DRM_MODE_FLAG_BCAST,
            ModeFlag::PixMux => DRM_MODE_FLAG_PIXMUX,
            ModeFlag::DblClk => DRM_MODE_FLAG_DBLCLK,
            ModeFlag::ClkDiv2 => DRM_MODE_FLAG_CLKDIV2,
        }
    }
}

impl fmt::Display for ModeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of flags on a modeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ModeFlags(BTreeSet<ModeFlag>);

impl ModeFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the flag was newly inserted.
    pub fn insert(&mut self, flag: ModeFlag) -> bool {
        self.0.insert(flag)
    }

    pub fn contains(&self, flag: ModeFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ModeFlag> + '_ {
        self.0.iter().copied()
    }

    /// Decodes a `DRM_MODE_FLAG_*` bitmask.
    ///
    /// Bits outside the modeline vocabulary (stereo 3D layouts, picture aspect ratio)
    /// are dropped.
    pub fn from_bits(bits: u32) -> Self {
        ModeFlag::ALL
            .into_iter()
            .filter(|flag| bits & flag.bits() != 0)
            .collect()
    }

    /// Encodes this set as a `DRM_MODE_FLAG_*` bitmask.
    pub fn bits(&self) -> u32 {
        self.iter().fold(0, |bits, flag| bits | flag.bits())
    }
}

impl FromIterator<ModeFlag> for ModeFlags {
    fn from_iter<T: IntoIterator<Item = ModeFlag>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ModeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = self.iter();
        if let Some(first) = flags.next() {
            write!(f, "{first}")?;
            for flag in flags {
                write!(f, " {flag}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_match_case_insensitively() {
        assert_eq!(ModeFlag::from_token("+HSync"), Some(ModeFlag::PHSync));
        assert_eq!(ModeFlag::from_token("-vsync"), Some(ModeFlag::NVSync));
        assert_eq!(ModeFlag::from_token("Interlace"), Some(ModeFlag::Interlace));
        assert_eq!(ModeFlag::from_token("DBLCLK"), Some(ModeFlag::DblClk));
        assert_eq!(ModeFlag::from_token("hsync"), None);
        assert_eq!(ModeFlag::from_token(""), None);
    }

    #[test]
    fn every_flag_has_a_distinct_bit() {
        let all = ModeFlag::ALL.iter().fold(0u32, |acc, flag| {
            assert_eq!(acc & flag.bits(), 0, "{flag} overlaps another flag");
            acc | flag.bits()
        });

        assert_eq!(ModeFlags::from_bits(all).len(), ModeFlag::ALL.len());
    }

    #[test]
    fn bits_round_trip() {
        let flags: ModeFlags = [ModeFlag::NHSync, ModeFlag::NVSync, ModeFlag::Interlace]
            .into_iter()
            .collect();

        assert_eq!(
            flags.bits(),
            DRM_MODE_FLAG_NHSYNC | DRM_MODE_FLAG_NVSYNC | DRM_MODE_FLAG_INTERLACE
        );
        assert_eq!(ModeFlags::from_bits(flags.bits()), flags);
    }

    #[test]
    fn unknown_bits_are_dropped() {
        // 3D frame packing layout
        let flags = ModeFlags::from_bits(DRM_MODE_FLAG_PHSYNC | (1 << 14));
        assert_eq!(flags.iter().collect::<Vec<_>>(), vec![ModeFlag::PHSync]);
    }

    #[test]
    fn display_uses_modeline_order() {
        let mut flags = ModeFlags::new();
        flags.insert(ModeFlag::DblClk);
        flags.insert(ModeFlag::Interlace);
        flags.insert(ModeFlag::NVSync);
        flags.insert(ModeFlag::NHSync);

        assert_eq!(flags.to_string(), "-hsync -vsync interlace dblclk");
        assert_eq!(ModeFlags::new().to_string(), "");
    }
}

use std::path::PathBuf;

use clap::ValueHint;

/// Measure how fast a display really refreshes by flipping frames on it through KMS.
///
/// Must be run from a VT with no compositor holding the display.
#[derive(clap::Parser, Debug, Clone, PartialEq)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Index of the connector mode to use
    ///
    /// Defaults to 0, the first mode the display advertises.
    pub mode_index: Option<usize>,

    /// Modeline to apply instead of the selected mode
    ///
    /// Uses X11 modeline syntax without the name, for example
    /// "13.5 720 739 801 858 480 488 494 525 -hsync -vsync interlace".
    /// The clock is in MHz.
    pub modeline: Option<String>,

    /// Use this DRM device instead of trying /dev/dri/card0 and /dev/dri/card1
    #[arg(short, long, value_name("PATH"), value_hint(ValueHint::FilePath))]
    pub device: Option<PathBuf>,

    /// Print the modes the display advertises and exit
    #[arg(short, long)]
    pub list_modes: bool,
}

impl Cli {
    /// The selected mode index, or 0 if none was given.
    pub fn mode_index(&self) -> usize {
        self.mode_index.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn no_args_defaults_to_first_mode() {
        let cli = Cli::parse_from(["kms-refresh"]);

        assert_eq!(cli.mode_index, None);
        assert_eq!(cli.mode_index(), 0);
        assert_eq!(cli.modeline, None);
        assert!(!cli.list_modes);
    }

    #[test]
    fn positionals_parse() {
        let cli = Cli::parse_from(["kms-refresh", "3"]);
        assert_eq!(cli.mode_index(), 3);
        assert_eq!(cli.modeline, None);

        let cli = Cli::parse_from([
            "kms-refresh",
            "1",
            "13.5 720 739 801 858 480 488 494 525 -hsync -vsync interlace",
        ]);
        assert_eq!(cli.mode_index(), 1);
        assert_eq!(
            cli.modeline.as_deref(),
            Some("13.5 720 739 801 858 480 488 494 525 -hsync -vsync interlace")
        );
    }

    #[test]
    fn third_positional_is_rejected() {
        let result = Cli::try_parse_from([
            "kms-refresh",
            "0",
            "13.5 720 739 801 858 480 488 494 525",
            "extra",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn non_numeric_mode_index_is_rejected() {
        assert!(Cli::try_parse_from(["kms-refresh", "first"]).is_err());
    }

    #[test]
    fn device_and_list_flags_parse() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let device = temp_dir.path().join("card7");

        let cli = Cli::parse_from([
            "kms-refresh",
            "--list-modes",
            "-d",
            device.to_str().ok_or(anyhow::anyhow!("not valid unicode"))?,
        ]);

        assert_eq!(
            cli,
            Cli {
                mode_index: None,
                modeline: None,
                device: Some(device),
                list_modes: true,
            }
        );

        Ok(())
    }
}

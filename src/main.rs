// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::Context;
use clap::Parser;
use kms_refresh::{
    backend::{
        Backend,
        kms::{Kms, KmsOutput},
    },
    bench,
    cli::Cli,
    config::BenchConfig,
    modeline::Modeline,
};
use tracing::info;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout only carries the report
    match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(env_filter) => {
            tracing_subscriber::fmt()
                .compact()
                .with_writer(std::io::stderr)
                .with_env_filter(env_filter)
                .init();
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .compact()
                .with_writer(std::io::stderr)
                .init();
        }
    }

    let cli = Cli::parse();
    let config = BenchConfig::from_env();

    let override_mode = cli
        .modeline
        .as_deref()
        .map(str::parse::<Modeline>)
        .transpose()
        .context("invalid modeline")?;

    let output = KmsOutput::open(cli.device.as_deref()).context("failed to find a display")?;

    if cli.list_modes {
        for (index, mode) in output.modes().iter().enumerate() {
            println!("{index}: {mode}");
        }
        return Ok(());
    }

    if cli.mode_index.is_none() {
        println!("defaulting to graphics mode 0");
    }

    let base_mode = output.mode(cli.mode_index())?;
    println!("{base_mode}");

    let mode = match override_mode {
        Some(mode) => {
            println!("{mode}");
            mode
        }
        None => base_mode,
    };

    let refresh_hz = mode.refresh_hz();
    info!(
        connector = output.connector_name(),
        ?config,
        refresh_hz,
        "Starting measurement"
    );

    let mut backend = Backend::Kms(Box::new(
        Kms::new(output, mode).context("failed to set up the display")?,
    ));

    let report = bench::measure(&mut backend, refresh_hz, &config).context("measurement failed")?;
    print!("{report}");

    Ok(())
}

#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays a chart through the hold judgment engine.

mod chart;
mod config;
mod report;
mod session;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, LevelFilter};
use release_judge_core::VeryHardOverride;

use crate::{chart::Chart, config::SessionConfig, session::Session};

#[derive(Debug, Parser)]
#[command(name = "release-judge", about = "Plays a hold chart and reports release timing", version)]
struct Args {
    /// Chart to play.
    #[arg(long, value_name = "FILE")]
    chart: PathBuf,

    /// Configuration file with feature toggles and host settings.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Forces players onto the Very Hard hit window.
    #[arg(long, value_enum)]
    very_hard: Option<VeryHardArg>,

    /// Lets the host play every row perfectly.
    #[arg(long)]
    auto: bool,

    /// Overrides the chart's tick length in milliseconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    tick_ms: Option<u64>,

    /// Output format of the summary.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "warn")]
    log_level: LevelFilter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum VeryHardArg {
    P1,
    P2,
    Both,
}

impl From<VeryHardArg> for VeryHardOverride {
    fn from(value: VeryHardArg) -> Self {
        match value {
            VeryHardArg::P1 => Self::P1,
            VeryHardArg::P2 => Self::P2,
            VeryHardArg::Both => Self::Both,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Entry point for the release judge command-line interface.
fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(very_hard) = args.very_hard {
        config.gameplay.very_hard_mode = very_hard.into();
    }
    if args.auto {
        config.host.auto_play = true;
    }

    let mut chart = Chart::load(&args.chart)
        .with_context(|| format!("failed to load chart {}", args.chart.display()))?;
    if let Some(tick_ms) = args.tick_ms {
        chart
            .set_tick(Duration::from_millis(tick_ms))
            .context("invalid tick length")?;
    }
    info!(
        "playing {} with {:?} and {:?}",
        args.chart.display(),
        config.gameplay,
        config.host
    );

    let report = Session::new(&config.gameplay, config.host).run_chart(&chart);
    match args.format {
        OutputFormat::Text => print!("{report}"),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to encode report")?
        ),
    }
    Ok(())
}

fn init_logging(level: LevelFilter) {
    let filters = std::env::var("RUST_LOG").unwrap_or_default();
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_filters(&filters)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse_into_overrides() {
        let args = Args::try_parse_from([
            "release-judge",
            "--chart",
            "hold.toml",
            "--very-hard",
            "both",
            "--auto",
            "--tick-ms",
            "5",
            "--format",
            "json",
        ])
        .expect("arguments parse");

        assert_eq!(args.chart, PathBuf::from("hold.toml"));
        assert_eq!(
            args.very_hard.map(VeryHardOverride::from),
            Some(VeryHardOverride::Both)
        );
        assert!(args.auto);
        assert_eq!(args.tick_ms, Some(5));
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.log_level, LevelFilter::Warn);
    }

    #[test]
    fn zero_tick_is_rejected() {
        let parsed =
            Args::try_parse_from(["release-judge", "--chart", "c.toml", "--tick-ms", "0"]);
        assert!(parsed.is_err());
    }
}

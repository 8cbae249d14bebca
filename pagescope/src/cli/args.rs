//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::TimelineConfig;
use crate::domain::ConfigError;

#[derive(Parser)]
#[command(
    name = "pagescope",
    about = "Page load activity timeline: network phases, cache hits and script activity",
    after_help = "\
EXAMPLES:
    pagescope replay session.json                           Replay and print a summary
    pagescope replay session.json --headless                Print every committed batch
    pagescope replay session.json --export trace.json       Write a Chrome trace
    pagescope replay session.json --realtime                Pace ticks at the refresh delay"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay a recorded session through the timeline engine
    Replay(ReplayArgs),
}

#[derive(clap::Args)]
pub struct ReplayArgs {
    /// Recorded session (JSON)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Export the timeline as a Chrome trace (Perfetto, chrome://tracing)
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Timeline configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the bucket width
    #[arg(long, value_name = "N")]
    pub resolution_msec: Option<u64>,

    /// Override the delay between ticks
    #[arg(long, value_name = "N")]
    pub refresh_delay_msec: Option<u64>,

    /// Print every committed batch to stdout
    #[arg(long)]
    pub headless: bool,

    /// Wait the refresh delay between ticks (Ctrl+C stops)
    #[arg(long)]
    pub realtime: bool,
}

impl ReplayArgs {
    /// Config file (or defaults) with command-line overrides applied
    pub fn timeline_config(&self) -> Result<TimelineConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => TimelineConfig::from_file(path)?,
            None => TimelineConfig::default(),
        };
        if let Some(resolution_msec) = self.resolution_msec {
            config.resolution_msec = resolution_msec;
        }
        if let Some(refresh_delay_msec) = self.refresh_delay_msec {
            config.refresh_delay_msec = refresh_delay_msec;
        }
        Ok(config.clamped())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_overrides_apply_and_clamp() {
        let args = Args::parse_from([
            "pagescope",
            "replay",
            "session.json",
            "--resolution-msec",
            "1",
            "--refresh-delay-msec",
            "40",
        ]);
        let Command::Replay(replay) = args.command;
        let config = replay.timeline_config().unwrap();
        assert_eq!(config.resolution_msec, 2);
        assert_eq!(config.refresh_delay_msec, 40);
        assert!(!replay.headless);
    }
}

use crate::model::ResourceKind;
use clap::{Args, Parser};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "stevedore",
    version,
    about = "A terminal dashboard for Docker containers, images and volumes."
)]
pub struct CliArgs {
    #[command(flatten)]
    pub start: StartView,

    /// Snapshot refresh interval in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub refresh_ms: u64,

    /// Log view refresh interval in milliseconds
    #[arg(long, default_value_t = 2_000)]
    pub logs_refresh_ms: u64,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write tracing output to this file instead of discarding it
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Args)]
#[group(multiple = false)]
pub struct StartView {
    /// Start in the containers view (default)
    #[arg(long)]
    pub containers: bool,

    /// Start in the images view
    #[arg(long)]
    pub images: bool,

    /// Start in the volumes view
    #[arg(long)]
    pub volumes: bool,
}

impl StartView {
    pub fn kind(&self) -> ResourceKind {
        if self.images {
            ResourceKind::Images
        } else if self.volumes {
            ResourceKind::Volumes
        } else {
            ResourceKind::Containers
        }
    }
}

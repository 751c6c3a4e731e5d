use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use snapsort_library::Mode;

/// Organize a media library by capture date and resolved location.
#[derive(Debug, Parser)]
#[command(name = "snapsort", version, about)]
pub struct Cli {
    /// Directory scanned for media files.
    #[arg(long, short = 's')]
    pub source: PathBuf,

    /// Library root the files are organized into.
    #[arg(long, short = 'd')]
    pub destination: PathBuf,

    /// Whether files are moved out of the source tree or copied.
    #[arg(long, value_enum, default_value_t = ModeArg::Move)]
    pub mode: ModeArg,

    /// Log every intended operation without touching any file.
    #[arg(long)]
    pub dry_run: bool,

    /// Override the configured recursive scan setting.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub recursive: Option<bool>,

    /// Glob pattern excluded from the scan; repeatable.
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Configuration file (YAML, TOML or JSON by extension).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Worker-pool size override.
    #[arg(long, short = 't')]
    pub threads: Option<usize>,

    /// Log filter directive, e.g. `info` or `snapsort=debug`.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Move,
    Copy,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Move => Mode::Move,
            ModeArg::Copy => Mode::Copy,
        }
    }
}

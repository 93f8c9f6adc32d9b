use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::core::tools::AnalyzerKind;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // --quiet
    pub no_color: bool, // --no-color
    pub verbose: bool,  // --verbose
}

#[derive(Parser, Debug)]
#[command(name = "generate-index")]
#[command(
    about = "Generate a SCIP index for a Rust project and export it as JSON",
    long_about = "Copies PROJECT into an isolated workspace, runs the SCIP analyzer there, \
                  and converts the resulting binary index to JSON. The source project is never modified."
)]
#[command(version)]
pub struct Cli {
    /// Path to the project to index
    #[arg(
        value_name = "PROJECT",
        required_unless_present_any = ["check_tools", "completions", "print_config"]
    )]
    pub project: Option<PathBuf>,

    /// Analyzer to use (default from config: primary)
    #[arg(short, long, value_enum)]
    pub analyzer: Option<AnalyzerArg>,

    /// Copy the project under this directory instead of a temp dir
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Where to write the JSON export (default: next to the index)
    #[arg(short, long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,

    /// Keep the project copy after the run
    #[arg(short, long)]
    pub keep_copy: bool,

    /// Only check that the required tools are installed
    #[arg(short, long)]
    pub check_tools: bool,

    /// Kill an external tool after this many seconds (0 = no limit)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print a JSON summary on stdout instead of human text
    #[arg(long)]
    pub json: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Print a shell completion script and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<Shell>,

    /// Suppress progress output
    #[arg(long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Debug-level logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn context(&self) -> AppContext {
        AppContext {
            quiet: self.quiet,
            no_color: self.no_color,
            verbose: self.verbose,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnalyzerArg {
    /// verus-analyzer
    #[value(alias = "verus-analyzer", alias = "verus")]
    Primary,
    /// rust-analyzer
    #[value(alias = "rust-analyzer")]
    Secondary,
}

impl From<AnalyzerArg> for AnalyzerKind {
    fn from(arg: AnalyzerArg) -> Self {
        match arg {
            AnalyzerArg::Primary => AnalyzerKind::Primary,
            AnalyzerArg::Secondary => AnalyzerKind::Secondary,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

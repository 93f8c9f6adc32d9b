//! Error taxonomy for the index pipeline.
//!
//! Each stage owns a typed error; `PipelineError` wraps them and names the
//! stage that failed. Every variant is fatal for the run: nothing here is
//! retried, re-running the whole pipeline is the recovery path.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use crate::core::pipeline::Stage;

/// Bad CLI input or configuration. Raised before any filesystem mutation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError
{
    #[error("source project not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("source is not a directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),

    #[error("unknown analyzer kind `{0}` (expected `primary` or `secondary`)")]
    UnknownAnalyzer(String),

    #[error("cannot resolve path {}: {source}", .path.display())]
    Resolve
    {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("missing PROJECT argument")]
    MissingProject,

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to render configuration: {0}")]
    Render(String),
}

/// Role a required external tool plays in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolRole
{
    Analyzer(crate::core::tools::AnalyzerKind),
    Exporter,
}

impl ToolRole
{
    /// Installer to run when the tool is missing
    pub fn install_hint(self) -> &'static str
    {
        use crate::core::tools::AnalyzerKind;

        match self
        {
            ToolRole::Analyzer(AnalyzerKind::Primary) => "./verus_analyzer_installer.py",
            ToolRole::Analyzer(AnalyzerKind::Secondary) => "./rust_analyzer_installer.py",
            ToolRole::Exporter => "./scip_installer.py",
        }
    }
}

impl fmt::Display for ToolRole
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        match self
        {
            ToolRole::Analyzer(kind) => write!(f, "{kind} analyzer"),
            ToolRole::Exporter => f.write_str("SCIP exporter"),
        }
    }
}

/// A required tool cannot be resolved or does not answer its probe.
#[derive(Debug, thiserror::Error)]
#[error("{role} `{name}` is not available: {reason}\n  Install it using: {}", .role.install_hint())]
pub struct ToolUnavailable
{
    pub role: ToolRole,
    pub name: String,
    pub reason: String,
}

/// Failure running a child process, shared by both tool stages
#[derive(Debug, thiserror::Error)]
pub enum ProcessError
{
    #[error("failed to start `{program}`: {source}")]
    Spawn
    {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed while waiting for `{program}`: {source}")]
    Wait
    {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot capture output of `{program}`: {source}")]
    Capture
    {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` did not finish within {}s and was killed", .limit.as_secs())]
    TimedOut
    {
        program: String,
        limit: Duration,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError
{
    #[error("source project not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("source is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("destination {} overlaps the source project {}", .destination.display(), .source_dir.display())]
    OverlapsSource
    {
        destination: PathBuf,
        source_dir: PathBuf,
    },

    #[error("project path has no final component: {}", .0.display())]
    NoProjectName(PathBuf),

    #[error("cannot create temporary directory: {0}")]
    TempDir(#[source] io::Error),

    #[error("cannot resolve destination {}: {source}", .path.display())]
    Resolve
    {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot remove existing destination {}: {source}", .path.display())]
    Remove
    {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot create directory {}: {source}", .path.display())]
    CreateDir
    {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot copy {} to {}: {source}", .from.display(), .to.display())]
    Copy
    {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot walk source tree: {0}")]
    Walk(#[from] ignore::Error),

    #[error("invalid copy exclusion pattern: {0}")]
    Exclude(#[from] globset::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError
{
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("analyzer exited with {status}{}", diagnostics(.stderr))]
    Failed
    {
        status: ExitStatus,
        stderr: String,
    },

    #[error("no `*.{extension}` index produced under {}", .root.display())]
    IndexNotProduced
    {
        root: PathBuf,
        extension: String,
    },

    #[error("fallback index search failed: {0}")]
    Search(#[from] ignore::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError
{
    #[error("index file not found: {}", .0.display())]
    MissingIndex(PathBuf),

    #[error("JSON output path is the index file itself: {}", .0.display())]
    OutputIsIndex(PathBuf),

    #[error("cannot create output file {}: {source}", .path.display())]
    CreateOutput
    {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("exporter exited with {status}{}{}", partial_note(.partial), diagnostics(.stderr))]
    Failed
    {
        status: ExitStatus,
        stderr: String,
        /// Non-empty partial output kept for inspection
        partial: Option<PathBuf>,
    },

    #[error("exporter produced an empty file (removed): {}", .0.display())]
    EmptyOutput(PathBuf),

    #[error("cannot inspect output file {}: {source}", .path.display())]
    Inspect
    {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Terminal failure of a run, tagged with the failing stage
#[derive(Debug, thiserror::Error)]
pub enum PipelineError
{
    #[error("copying failed: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("analyzing failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("converting failed: {0}")]
    Conversion(#[from] ConversionError),
}

impl PipelineError
{
    pub fn stage(&self) -> Stage
    {
        match self
        {
            PipelineError::Workspace(_) => Stage::Copying,
            PipelineError::Analysis(_) => Stage::Analyzing,
            PipelineError::Conversion(_) => Stage::Converting,
        }
    }
}

fn diagnostics(stderr: &str) -> String
{
    let trimmed = stderr.trim();
    if trimmed.is_empty()
    {
        String::new()
    }
    else
    {
        format!("\n{trimmed}")
    }
}

fn partial_note(partial: &Option<PathBuf>) -> String
{
    match partial
    {
        Some(p) => format!(" (partial output kept at {})", p.display()),
        None => String::new(),
    }
}

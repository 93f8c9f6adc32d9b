//! Runs the SCIP analyzer inside a workspace and locates the index it wrote.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::core::error::AnalysisError;
use crate::core::process::{self, Sink};
use crate::core::tools::Tool;
use crate::core::workspace::Workspace;
use crate::infra::walk::TreeWalker;

/// How the index file was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexLocation {
    /// `index.<ext>` at the workspace root
    Conventional,
    /// Found by searching the workspace
    Fallback,
}

#[derive(Debug)]
pub struct AnalysisResult {
    /// Absolute path of the binary index
    pub index_path: PathBuf,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub located_by: IndexLocation,
}

/// Analyzer command line and limits
#[derive(Debug, Clone)]
pub struct AnalyzerInvocation<'a> {
    pub tool: &'a Tool,
    /// e.g. `scip`, run as `<tool> <subcommand> .`
    pub subcommand: &'a str,
    /// Index extension without the dot
    pub extension: &'a str,
    pub timeout: Option<Duration>,
}

impl AnalyzerInvocation<'_> {
    pub fn expected_file_name(&self) -> String {
        format!("index.{}", self.extension)
    }
}

/// Run the analyzer with the workspace root as its working directory.
/// Nothing is retried: a non-zero exit fails the stage.
#[instrument(skip_all, fields(analyzer = %invocation.tool.name, workspace = %workspace.path().display()))]
pub fn run_analysis(workspace: &Workspace, invocation: &AnalyzerInvocation<'_>) -> Result<AnalysisResult, AnalysisError> {
    let root = workspace.path();

    let mut cmd = Command::new(&invocation.tool.path);
    cmd.current_dir(root).arg(invocation.subcommand).arg(".");

    let out = process::run(&mut cmd, &invocation.tool.name, Sink::Capture, invocation.timeout)?;

    if !out.status.success() {
        return Err(AnalysisError::Failed {
            status: out.status,
            stderr: out.stderr,
        });
    }

    let expected = root.join(invocation.expected_file_name());
    let (index_path, located_by) = if expected.is_file() {
        (expected, IndexLocation::Conventional)
    } else {
        debug!(expected = %expected.display(), "index not at the conventional path, searching");
        match find_index_fallback(root, invocation.extension)? {
            Some(found) => {
                info!(found = %found.display(), "index located by fallback search");
                (found, IndexLocation::Fallback)
            }
            None => {
                return Err(AnalysisError::IndexNotProduced {
                    root: root.to_path_buf(),
                    extension: invocation.extension.to_string(),
                });
            }
        }
    };

    Ok(AnalysisResult {
        index_path,
        status: out.status,
        stdout: out.stdout,
        stderr: out.stderr,
        located_by,
    })
}

/// Search `root` for any regular file with `extension`; shallowest match
/// wins, ties broken by path order.
pub fn find_index_fallback(root: &Path, extension: &str) -> Result<Option<PathBuf>, ignore::Error> {
    Ok(TreeWalker::all().files_with_extension(root, extension)?.into_iter().next())
}

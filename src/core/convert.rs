//! Exports a binary SCIP index to JSON with the exporter tool.
//!
//! The exporter's stdout is the JSON document and is written straight into
//! the destination file; its stderr is captured separately so diagnostics
//! can never end up inside the artifact.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::analyzer::AnalysisResult;
use crate::core::error::ConversionError;
use crate::core::process::{self, Sink};
use crate::core::tools::Tool;

#[derive(Debug)]
pub struct ConversionResult {
    pub output_path: PathBuf,
    pub bytes: u64,
    pub success: bool,
    /// Exporter stderr (warnings), kept for the caller
    pub diagnostics: String,
}

/// Exporter command line and limits
#[derive(Debug, Clone)]
pub struct ExportInvocation<'a> {
    pub tool: &'a Tool,
    /// Default output name, placed next to the index
    pub json_file_name: &'a str,
    pub timeout: Option<Duration>,
}

/// `<index dir>/<json_file_name>`
pub fn default_output_path(index_path: &Path, json_file_name: &str) -> PathBuf {
    index_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(json_file_name)
}

/// Convert the analyzer's index into a JSON file.
///
/// The exporter runs in the index's directory and receives the bare file
/// name. Empty output never survives: on success it is an error, on
/// failure it is removed. A non-empty partial file from a failed run is
/// kept for inspection.
#[instrument(skip_all, fields(index = %analysis.index_path.display()))]
pub fn convert_to_json(
    analysis: &AnalysisResult,
    output_override: Option<&Path>,
    invocation: &ExportInvocation<'_>,
) -> Result<ConversionResult, ConversionError> {
    let index = &analysis.index_path;
    let (Some(index_dir), Some(index_name)) = (index.parent(), index.file_name()) else {
        return Err(ConversionError::MissingIndex(index.clone()));
    };
    if !index.is_file() {
        return Err(ConversionError::MissingIndex(index.clone()));
    }

    let output = match output_override {
        Some(p) => std::path::absolute(p).map_err(|e| ConversionError::CreateOutput {
            path: p.to_path_buf(),
            source: e,
        })?,
        None => default_output_path(index, invocation.json_file_name),
    };

    // Creating the sink truncates; never let it clobber the input
    if same_file(&output, index) {
        return Err(ConversionError::OutputIsIndex(output));
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| ConversionError::CreateOutput {
            path: output.clone(),
            source: e,
        })?;
    }
    let sink = File::create(&output).map_err(|e| ConversionError::CreateOutput {
        path: output.clone(),
        source: e,
    })?;

    let mut cmd = Command::new(&invocation.tool.path);
    cmd.current_dir(index_dir).arg("print").arg("--json").arg(index_name);

    let run = process::run(&mut cmd, &invocation.tool.name, Sink::File(sink), invocation.timeout);

    let out = match run {
        Ok(out) => out,
        Err(e) => {
            discard_if_empty(&output);
            return Err(e.into());
        }
    };

    if !out.status.success() {
        let partial = match discard_if_empty(&output) {
            Some(bytes) if bytes > 0 => {
                info!(path = %output.display(), bytes, "keeping partial exporter output");
                Some(output)
            }
            _ => None,
        };
        return Err(ConversionError::Failed {
            status: out.status,
            stderr: out.stderr,
            partial,
        });
    }

    let bytes = fs::metadata(&output)
        .map_err(|e| ConversionError::Inspect {
            path: output.clone(),
            source: e,
        })?
        .len();

    if bytes == 0 {
        if let Err(e) = fs::remove_file(&output) {
            warn!(path = %output.display(), error = %e, "cannot remove empty output");
        }
        return Err(ConversionError::EmptyOutput(output));
    }

    debug!(path = %output.display(), bytes, "json export written");
    Ok(ConversionResult {
        output_path: output,
        bytes,
        success: true,
        diagnostics: out.stderr,
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (dunce::canonicalize(a), dunce::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Remove `path` if it is a zero-byte file. Returns the size observed, or
/// `None` when the file is gone.
fn discard_if_empty(path: &Path) -> Option<u64> {
    let len = fs::metadata(path).ok()?.len();
    if len == 0 {
        match fs::remove_file(path) {
            Ok(()) => return None,
            Err(e) => warn!(path = %path.display(), error = %e, "cannot remove empty output"),
        }
    }
    Some(len)
}

/// Human-readable size, e.g. `1.25 MB`
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let b = bytes as f64;
    if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.2} KB", b / KB)
    } else {
        format!("{bytes} bytes")
    }
}

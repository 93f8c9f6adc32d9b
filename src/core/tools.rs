//! External tool resolution and availability probing.
//!
//! The analyzer and the exporter are resolved by name on PATH (or taken as
//! a path when the configured name contains a separator) and probed with a
//! version query before a run.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::error::{ConfigError, ToolRole, ToolUnavailable};
use crate::core::process::{self, Sink};
use crate::infra::config::Settings;

/// Which of the two interchangeable analyzers to invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind
{
    /// verus-analyzer by default
    Primary,
    /// rust-analyzer by default
    Secondary,
}

impl fmt::Display for AnalyzerKind
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        match self
        {
            AnalyzerKind::Primary => f.write_str("primary"),
            AnalyzerKind::Secondary => f.write_str("secondary"),
        }
    }
}

impl FromStr for AnalyzerKind
{
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "primary" | "verus-analyzer" | "verus" => Ok(AnalyzerKind::Primary),
            "secondary" | "rust-analyzer" => Ok(AnalyzerKind::Secondary),
            other => Err(ConfigError::UnknownAnalyzer(other.to_string())),
        }
    }
}

/// A resolved external tool
#[derive(Debug, Clone)]
pub struct Tool
{
    pub role: ToolRole,
    /// Configured name, kept for messages
    pub name: String,
    /// Absolute path of the executable
    pub path: PathBuf,
}

/// The two tools a run needs
#[derive(Debug, Clone)]
pub struct ToolSet
{
    pub analyzer: Tool,
    pub exporter: Tool,
}

/// Availability of one tool
#[derive(Debug)]
pub struct ToolStatus
{
    pub role: ToolRole,
    pub name: String,
    pub outcome: Result<(Tool, Option<String>), ToolUnavailable>,
}

impl ToolStatus
{
    pub fn is_available(&self) -> bool
    {
        self.outcome
            .is_ok()
    }
}

/// Result of probing the analyzer and the exporter
#[derive(Debug)]
pub struct ToolCheck
{
    pub analyzer: ToolStatus,
    pub exporter: ToolStatus,
}

impl ToolCheck
{
    pub fn all_available(&self) -> bool
    {
        self.analyzer
            .is_available()
            && self
                .exporter
                .is_available()
    }

    /// Consume the check; the first unavailable tool becomes the error
    pub fn into_tool_set(self) -> Result<ToolSet, ToolUnavailable>
    {
        let (analyzer, _) = self
            .analyzer
            .outcome?;
        let (exporter, _) = self
            .exporter
            .outcome?;
        Ok(ToolSet { analyzer, exporter })
    }
}

/// Resolve `name` to an executable path
pub fn resolve(
    role: ToolRole,
    name: &str,
) -> Result<Tool, ToolUnavailable>
{
    let path = which::which(name).map_err(|e| ToolUnavailable {
        role,
        name: name.to_string(),
        reason: format!("not found in PATH ({e})"),
    })?;

    debug!(%role, name, path = %path.display(), "resolved tool");
    Ok(Tool { role, name: name.to_string(), path })
}

/// Run `tool <flag>` and return its trimmed stdout on success
fn query(
    tool: &Tool,
    flag: &str,
    limit: Duration,
) -> Result<String, String>
{
    let mut cmd = Command::new(&tool.path);
    cmd.arg(flag);

    let out = process::run(&mut cmd, &tool.name, Sink::Capture, Some(limit))
        .map_err(|e| e.to_string())?;

    if out
        .status
        .success()
    {
        Ok(out
            .stdout
            .trim()
            .to_string())
    }
    else
    {
        Err(format!(
            "`{} {flag}` returned error: {}",
            tool.name,
            out.stderr
                .trim()
        ))
    }
}

/// Analyzers must answer `--version`.
#[instrument(skip_all, fields(tool = %tool.name))]
pub fn probe_analyzer(
    tool: &Tool,
    limit: Duration,
) -> Result<String, ToolUnavailable>
{
    query(tool, "--version", limit).map_err(|reason| ToolUnavailable {
        role: tool.role,
        name: tool
            .name
            .clone(),
        reason,
    })
}

/// The exporter answers `--version`, or at least `--help`.
#[instrument(skip_all, fields(tool = %tool.name))]
pub fn probe_exporter(
    tool: &Tool,
    limit: Duration,
) -> Result<Option<String>, ToolUnavailable>
{
    match query(tool, "--version", limit)
    {
        Ok(version) => Ok(Some(version)),
        Err(first) =>
        {
            debug!(reason = %first, "--version failed, trying --help");
            query(tool, "--help", limit)
                .map(|_| None)
                .map_err(|reason| ToolUnavailable {
                    role: tool.role,
                    name: tool
                        .name
                        .clone(),
                    reason,
                })
        }
    }
}

/// Resolve and probe both tools for `kind`. Never touches the filesystem
/// beyond executing the probes.
pub fn check_tools(
    settings: &Settings,
    kind: AnalyzerKind,
) -> ToolCheck
{
    let limit = settings.probe_timeout();

    let analyzer_name = settings.analyzer_binary(kind);
    let analyzer_role = ToolRole::Analyzer(kind);
    let analyzer = ToolStatus {
        role: analyzer_role,
        name: analyzer_name.to_string(),
        outcome: resolve(analyzer_role, analyzer_name).and_then(|tool| {
            let version = probe_analyzer(&tool, limit)?;
            Ok((tool, Some(version)))
        }),
    };

    let exporter_name = settings
        .tools
        .exporter
        .as_str();
    let exporter = ToolStatus {
        role: ToolRole::Exporter,
        name: exporter_name.to_string(),
        outcome: resolve(ToolRole::Exporter, exporter_name).and_then(|tool| {
            let version = probe_exporter(&tool, limit)?;
            Ok((tool, version))
        }),
    };

    ToolCheck { analyzer, exporter }
}

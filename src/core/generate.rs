//! The `generate-index` command: argument handling, tool checks, the
//! pipeline run and the final summary.

use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::cli::{AppContext, Cli};
use crate::completion;
use crate::core::convert::format_size;
use crate::core::observer::ConsoleReporter;
use crate::core::pipeline::{Pipeline, PipelineConfig, PipelineOptions, PipelineReport, Stage};
use crate::core::tools::{AnalyzerKind, ToolCheck, ToolStatus, check_tools};
use crate::infra::config::{load_settings, render_settings};

/// Machine-readable result for `--json`
#[derive(Debug, Serialize)]
struct JsonSummary<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a PipelineReport>,
}

#[derive(Debug, Serialize)]
struct JsonToolStatus {
    role: String,
    name: String,
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&ToolStatus> for JsonToolStatus {
    fn from(status: &ToolStatus) -> Self {
        let (path, version, error) = match &status.outcome {
            Ok((tool, version)) => (Some(tool.path.display().to_string()), version.clone(), None),
            Err(e) => (None, None, Some(e.to_string())),
        };
        Self {
            role: status.role.to_string(),
            name: status.name.clone(),
            available: status.outcome.is_ok(),
            path,
            version,
            error,
        }
    }
}

pub fn run(cli: Cli, ctx: &AppContext) -> Result<ExitCode> {
    if let Some(shell) = cli.completions {
        completion::run(shell);
        return Ok(ExitCode::SUCCESS);
    }

    let settings = load_settings().context("load configuration")?;

    if cli.print_config {
        print!("{}", render_settings(&settings)?);
        return Ok(ExitCode::SUCCESS);
    }

    let kind = match cli.analyzer {
        Some(arg) => AnalyzerKind::from(arg),
        None => settings.default_analyzer_kind()?,
    };

    let color = !ctx.no_color && std::io::stdout().is_terminal();
    // --json keeps stdout for the summary alone
    let mut reporter = ConsoleReporter::new(ctx.quiet, color, cli.json);

    if cli.check_tools {
        return Ok(report_tool_check(&check_tools(&settings, kind), &reporter, cli.json));
    }

    // Validate everything before the first filesystem mutation
    let Some(project) = cli.project.as_deref() else {
        return Err(crate::core::error::ConfigError::MissingProject.into());
    };
    let config = PipelineConfig::new(
        project,
        kind,
        PipelineOptions {
            destination: cli.output_dir.clone(),
            json_output: cli.json_output.clone(),
            keep_copy: cli.keep_copy,
            timeout: settings.tool_timeout(cli.timeout),
        },
    )?;
    debug!(?config, "run configuration");

    let check = check_tools(&settings, kind);
    if !check.all_available() {
        report_tool_check(&check, &reporter, false);
        return Ok(ExitCode::FAILURE);
    }
    let tools = check.into_tool_set()?;

    reporter.heading("SCIP Index Generation");
    reporter.info_line(&format!("Project: {}", config.source().display()));
    reporter.info_line(&format!("Analyzer: {} ({})", tools.analyzer.name, kind));

    let outcome = Pipeline::new(config, &settings, tools, &mut reporter).run();

    match outcome {
        Ok(report) => {
            if cli.json {
                print_json(&JsonSummary {
                    success: true,
                    stage: None,
                    error: None,
                    report: Some(&report),
                })?;
            } else {
                print_summary(&report, &reporter);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            // The observer already reported the failing stage
            if cli.json {
                print_json(&JsonSummary {
                    success: false,
                    stage: Some(e.stage()),
                    error: Some(e.to_string()),
                    report: None,
                })?;
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value).context("serialize summary")?;
    println!("{line}");
    Ok(())
}

fn report_tool_check(check: &ToolCheck, reporter: &ConsoleReporter, json: bool) -> ExitCode {
    let code = if check.all_available() { ExitCode::SUCCESS } else { ExitCode::FAILURE };

    if json {
        let statuses = [JsonToolStatus::from(&check.analyzer), JsonToolStatus::from(&check.exporter)];
        match serde_json::to_string(&statuses) {
            Ok(line) => println!("{line}"),
            Err(e) => {
                eprintln!("cannot serialize tool check: {e}");
                return ExitCode::FAILURE;
            }
        }
        return code;
    }

    for status in [&check.analyzer, &check.exporter] {
        match &status.outcome {
            Ok((tool, version)) => {
                let version = version.as_deref().unwrap_or("available");
                reporter.info_line(&format!(
                    "{} {} ({}): {}",
                    reporter.ok_mark(),
                    status.name,
                    tool.path.display(),
                    version
                ));
            }
            // Errors are never silenced by --quiet
            Err(e) => eprintln!("{} {e}", reporter.fail_mark()),
        }
    }

    if check.all_available() {
        reporter.info_line("All required tools are available");
    }
    code
}

fn print_summary(report: &PipelineReport, reporter: &ConsoleReporter) {
    reporter.heading("Summary");
    if report.workspace_retained {
        reporter.line(&format!("{} SCIP index: {}", reporter.ok_mark(), report.index.display()));
    }
    if report.json_retained {
        reporter.line(&format!(
            "{} JSON export: {} ({})",
            reporter.ok_mark(),
            report.json_output.display(),
            format_size(report.json_bytes)
        ));
    } else {
        reporter.line(&format!(
            "{} JSON export ({}) was removed with the temporary workspace; use --keep-copy or -j <FILE> to keep it",
            reporter.warn_mark(),
            format_size(report.json_bytes)
        ));
    }
    if report.workspace_retained {
        reporter.info_line(&format!("Project copy: {}", report.workspace.display()));
    }
    for warning in &report.warnings {
        reporter.info_line(&format!("{} {warning}", reporter.warn_mark()));
    }
}

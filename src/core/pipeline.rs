//! Index generation pipeline: copy → analyze → convert, then clean up.
//!
//! ```text
//! Init ─▶ Copying ─▶ Analyzing ─▶ Converting ─▶ Done
//!            │           │             │
//!            └───────────┴─────────────┴──▶ Failed(stage)
//! ```
//!
//! Stages run strictly in order, each consuming the previous stage's
//! result. The first failure stops the run; nothing is retried. Ephemeral
//! workspaces are removed on every exit path unless the copy is kept.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::core::analyzer::{AnalyzerInvocation, IndexLocation, run_analysis};
use crate::core::convert::{ExportInvocation, convert_to_json, format_size};
use crate::core::error::{ConfigError, PipelineError};
use crate::core::observer::PipelineObserver;
use crate::core::tools::{AnalyzerKind, ToolSet};
use crate::core::workspace::{CleanupOutcome, Workspace, cleanup, create_workspace};
use crate::infra::config::Settings;

/// A running stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Copying,
    Analyzing,
    Converting,
}

impl Stage {
    pub fn ordinal(self) -> u8 {
        match self {
            Stage::Copying => 1,
            Stage::Analyzing => 2,
            Stage::Converting => 3,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::Copying => "Copying project",
            Stage::Analyzing => "Running SCIP analysis",
            Stage::Converting => "Exporting SCIP index to JSON",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Copying => f.write_str("copying"),
            Stage::Analyzing => f.write_str("analyzing"),
            Stage::Converting => f.write_str("converting"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Copying,
    Analyzing,
    Converting,
    Done,
    Failed(Stage),
}

impl From<Stage> for PipelineState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Copying => PipelineState::Copying,
            Stage::Analyzing => PipelineState::Analyzing,
            Stage::Converting => PipelineState::Converting,
        }
    }
}

/// Optional parts of a run
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Copy under this directory instead of a temp dir
    pub destination: Option<PathBuf>,
    /// Write the JSON here instead of next to the index
    pub json_output: Option<PathBuf>,
    pub keep_copy: bool,
    /// Bound on each external tool run
    pub timeout: Option<Duration>,
}

/// Validated, immutable run configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    source: PathBuf,
    analyzer: AnalyzerKind,
    destination: Option<PathBuf>,
    json_output: Option<PathBuf>,
    keep_copy: bool,
    timeout: Option<Duration>,
}

impl PipelineConfig {
    /// Validate `source` (must be an existing directory) and absolutize
    /// paths. Reads the filesystem, never writes it.
    pub fn new(source: impl AsRef<Path>, analyzer: AnalyzerKind, options: PipelineOptions) -> Result<Self, ConfigError> {
        let source = source.as_ref();
        if !source.exists() {
            return Err(ConfigError::SourceNotFound(source.to_path_buf()));
        }
        if !source.is_dir() {
            return Err(ConfigError::SourceNotDirectory(source.to_path_buf()));
        }
        let source = dunce::canonicalize(source).map_err(|e| ConfigError::Resolve {
            path: source.to_path_buf(),
            source: e,
        })?;

        let json_output = options.json_output.map(|p| absolutize(&p)).transpose()?;

        Ok(Self {
            source,
            analyzer,
            destination: options.destination,
            json_output,
            keep_copy: options.keep_copy,
            timeout: options.timeout,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn analyzer(&self) -> AnalyzerKind {
        self.analyzer
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    pub fn json_output(&self) -> Option<&Path> {
        self.json_output.as_deref()
    }

    pub fn keep_copy(&self) -> bool {
        self.keep_copy
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

fn absolutize(path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|e| ConfigError::Resolve {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub project: PathBuf,
    pub analyzer_kind: AnalyzerKind,
    /// Configured analyzer binary name
    pub analyzer: String,
    pub workspace: PathBuf,
    /// False when the ephemeral copy was removed after the run
    pub workspace_retained: bool,
    pub index: PathBuf,
    pub index_found_by_fallback: bool,
    pub json_output: PathBuf,
    pub json_bytes: u64,
    /// False when the JSON lived inside a removed ephemeral workspace
    pub json_retained: bool,
    pub warnings: Vec<String>,
}

pub struct Pipeline<'a> {
    config: PipelineConfig,
    settings: &'a Settings,
    tools: ToolSet,
    observer: &'a mut dyn PipelineObserver,
    state: PipelineState,
    warnings: Vec<String>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: PipelineConfig, settings: &'a Settings, tools: ToolSet, observer: &'a mut dyn PipelineObserver) -> Self {
        Self {
            config,
            settings,
            tools,
            observer,
            state: PipelineState::Init,
            warnings: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = ?self.state, to = ?PipelineState::from(stage), "transition");
        self.state = stage.into();
        self.observer.stage_started(stage);
    }

    fn fail(&mut self, error: PipelineError) -> PipelineError {
        let stage = error.stage();
        self.state = PipelineState::Failed(stage);
        self.observer.stage_failed(stage, &error);
        error
    }

    fn warn(&mut self, message: String) {
        self.observer.warning(&message);
        self.warnings.push(message);
    }

    /// Apply the cleanup contract; returns whether the copy is still on disk
    fn finish_workspace(&mut self, workspace: &Workspace) -> bool {
        match cleanup(workspace, self.config.keep_copy()) {
            CleanupOutcome::Removed(root) => {
                self.observer.info(&format!("Cleaned up temporary workspace {}", root.display()));
                false
            }
            CleanupOutcome::Retained { path, notice } => {
                if notice {
                    self.observer.info(&format!(
                        "Note: project copy kept at {} (use --keep-copy to suppress this message)",
                        path.display()
                    ));
                } else {
                    self.observer.info(&format!("Project copy kept at {}", path.display()));
                }
                true
            }
            CleanupOutcome::Failed { path, error } => {
                self.warn(format!("could not remove temporary workspace {}: {error}", path.display()));
                true
            }
        }
    }

    /// Run all stages. The state ends in `Done` or `Failed(stage)`.
    #[instrument(skip_all, fields(project = %self.config.source().display(), analyzer = %self.config.analyzer()))]
    pub fn run(&mut self) -> Result<PipelineReport, PipelineError> {
        // Copying
        self.enter(Stage::Copying);
        self.observer.info(&format!("Copying project from {}", self.config.source().display()));
        let workspace = match create_workspace(&self.config, self.settings) {
            Ok(ws) => ws,
            Err(e) => return Err(self.fail(e.into())),
        };
        self.observer
            .stage_finished(Stage::Copying, &format!("Project copied to {}", workspace.path().display()));

        // Analyzing
        self.enter(Stage::Analyzing);
        let invocation = AnalyzerInvocation {
            tool: &self.tools.analyzer,
            subcommand: &self.settings.tools.analyzer_subcommand,
            extension: &self.settings.index_extension,
            timeout: self.config.timeout(),
        };
        self.observer.info(&format!(
            "Executing: {} {} . (in {})",
            invocation.tool.name,
            invocation.subcommand,
            workspace.path().display()
        ));
        let analysis = match run_analysis(&workspace, &invocation) {
            Ok(a) => a,
            Err(e) => {
                let err = self.fail(e.into());
                self.finish_workspace(&workspace);
                return Err(err);
            }
        };
        if analysis.located_by == IndexLocation::Fallback {
            self.warn(format!(
                "index not at {}, found by search: {}",
                workspace.path().join(invocation.expected_file_name()).display(),
                analysis.index_path.display()
            ));
        }
        self.observer
            .stage_finished(Stage::Analyzing, &format!("SCIP index: {}", analysis.index_path.display()));

        // Converting: only the analysis result crosses this boundary
        self.enter(Stage::Converting);
        let export = ExportInvocation {
            tool: &self.tools.exporter,
            json_file_name: &self.settings.json_file_name,
            timeout: self.config.timeout(),
        };
        let conversion = match convert_to_json(&analysis, self.config.json_output(), &export) {
            Ok(c) => c,
            Err(e) => {
                let err = self.fail(e.into());
                self.finish_workspace(&workspace);
                return Err(err);
            }
        };
        if !conversion.diagnostics.trim().is_empty() {
            debug!(diagnostics = %conversion.diagnostics.trim(), "exporter stderr");
        }
        self.observer.stage_finished(
            Stage::Converting,
            &format!(
                "JSON export: {} ({})",
                conversion.output_path.display(),
                format_size(conversion.bytes)
            ),
        );

        self.state = PipelineState::Done;
        info!(json = %conversion.output_path.display(), bytes = conversion.bytes, "pipeline done");

        let retained = self.finish_workspace(&workspace);
        let json_retained = retained || !conversion.output_path.starts_with(workspace.path());

        Ok(PipelineReport {
            project: self.config.source().to_path_buf(),
            analyzer_kind: self.config.analyzer(),
            analyzer: self.tools.analyzer.name.clone(),
            workspace: workspace.path().to_path_buf(),
            workspace_retained: retained,
            index: analysis.index_path,
            index_found_by_fallback: analysis.located_by == IndexLocation::Fallback,
            json_output: conversion.output_path,
            json_bytes: conversion.bytes,
            json_retained,
            warnings: std::mem::take(&mut self.warnings),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::error::{AnalysisError, ConversionError, ToolRole};
    use crate::core::test_support::{Recorder, snapshot_tree, write_file, write_script};
    use crate::core::tools::{Tool, resolve};
    use crate::core::workspace::Provenance;
    use tempfile::TempDir;

    const EXPORT_OK: &str = "printf '{\"documents\":[]}'\n";

    struct Harness {
        tmp: TempDir,
        source: PathBuf,
        settings: Settings,
    }

    impl Harness {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let source = tmp.path().join("proj");
            write_file(&source, "Cargo.toml", "[package]\nname = \"proj\"\n");
            write_file(&source, "src/lib.rs", "pub fn f() {}\n");

            // Unique per fixture so leak checks ignore concurrent tests
            let tag = tmp.path().file_name().unwrap().to_string_lossy().trim_start_matches('.').to_string();
            let settings = Settings {
                temp_prefix: format!("scip_test_{tag}_"),
                ..Settings::default()
            };
            Self { tmp, source, settings }
        }

        fn tools(&self, analyzer: &str, exporter: &str) -> ToolSet {
            let a = write_script(self.tmp.path(), "analyzer", analyzer);
            let e = write_script(self.tmp.path(), "exporter", exporter);
            ToolSet {
                analyzer: tool(ToolRole::Analyzer(AnalyzerKind::Primary), &a),
                exporter: tool(ToolRole::Exporter, &e),
            }
        }

        fn config(&self, options: PipelineOptions) -> PipelineConfig {
            PipelineConfig::new(&self.source, AnalyzerKind::Primary, options).unwrap()
        }
    }

    fn tool(role: ToolRole, path: &Path) -> Tool {
        resolve(role, path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn config_validation_rejects_bad_sources() {
        let h = Harness::new();

        let err = PipelineConfig::new(h.tmp.path().join("missing"), AnalyzerKind::Primary, PipelineOptions::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::SourceNotFound(_)));

        let file = h.source.join("Cargo.toml");
        let err = PipelineConfig::new(&file, AnalyzerKind::Primary, PipelineOptions::default()).unwrap_err();
        assert!(matches!(err, ConfigError::SourceNotDirectory(_)));
    }

    #[test]
    fn successful_run_with_kept_destination() {
        let h = Harness::new();
        let tools = h.tools("printf 'IDX' > index.scip\n", EXPORT_OK);
        let before = snapshot_tree(&h.source);
        let dest = h.tmp.path().join("run1");
        let mut rec = Recorder::default();

        let mut p = Pipeline::new(
            h.config(PipelineOptions {
                destination: Some(dest.clone()),
                keep_copy: true,
                ..Default::default()
            }),
            &h.settings,
            tools,
            &mut rec,
        );
        let report = p.run().unwrap();
        assert_eq!(p.state(), PipelineState::Done);

        assert!(report.workspace_retained);
        assert!(report.json_retained);
        assert_eq!(report.analyzer_kind, AnalyzerKind::Primary);
        assert!(report.workspace.ends_with("run1/proj"));
        assert_eq!(report.index, report.workspace.join("index.scip"));
        assert_eq!(report.json_output, report.workspace.join("index_scip.json"));
        assert_eq!(report.json_bytes, 16);
        assert_eq!(std::fs::metadata(&report.json_output).unwrap().len(), 16);
        assert!(report.warnings.is_empty());
        assert_eq!(snapshot_tree(&h.source), before);

        assert_eq!(
            rec.stages_started(),
            vec![Stage::Copying, Stage::Analyzing, Stage::Converting]
        );
    }

    #[test]
    fn analyzer_failure_cleans_ephemeral_workspace() {
        let h = Harness::new();
        let tools = h.tools("echo 'analysis exploded' >&2\nexit 1\n", EXPORT_OK);
        let mut rec = Recorder::default();

        let mut p = Pipeline::new(h.config(PipelineOptions::default()), &h.settings, tools, &mut rec);
        let err = p.run().unwrap_err();

        assert_eq!(p.state(), PipelineState::Failed(Stage::Analyzing));
        assert!(matches!(err, PipelineError::Analysis(AnalysisError::Failed { .. })));
        assert!(err.to_string().contains("analysis exploded"));
        assert_eq!(rec.failed, vec![Stage::Analyzing]);

        let leaked = std::fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(Result::ok)
            .any(|e| e.file_name().to_string_lossy().starts_with(&h.settings.temp_prefix));
        assert!(!leaked, "temp workspace leaked");
    }

    #[test]
    fn analyzer_failure_leaves_user_destination() {
        let h = Harness::new();
        let tools = h.tools("exit 1\n", EXPORT_OK);
        let dest = h.tmp.path().join("post-mortem");
        let mut rec = Recorder::default();

        let mut p = Pipeline::new(
            h.config(PipelineOptions {
                destination: Some(dest.clone()),
                ..Default::default()
            }),
            &h.settings,
            tools,
            &mut rec,
        );
        p.run().unwrap_err();

        assert!(dest.join("proj/src/lib.rs").exists());
        assert!(!dest.join("proj/index_scip.json").exists());
    }

    #[test]
    fn empty_export_fails_converting_and_leaves_no_file() {
        let h = Harness::new();
        let tools = h.tools("printf 'IDX' > index.scip\n", "exit 0\n");
        let json = h.tmp.path().join("out/index.json");
        let mut rec = Recorder::default();

        let mut p = Pipeline::new(
            h.config(PipelineOptions {
                json_output: Some(json.clone()),
                ..Default::default()
            }),
            &h.settings,
            tools,
            &mut rec,
        );
        let err = p.run().unwrap_err();

        assert_eq!(p.state(), PipelineState::Failed(Stage::Converting));
        assert!(matches!(err, PipelineError::Conversion(ConversionError::EmptyOutput(_))));
        assert!(!json.exists());
    }

    #[test]
    fn fallback_index_is_a_warning_not_a_failure() {
        let h = Harness::new();
        let tools = h.tools("mkdir -p out\nprintf 'IDX' > out/custom.scip\n", EXPORT_OK);
        let json = h.tmp.path().join("index.json");
        let mut rec = Recorder::default();

        let mut p = Pipeline::new(
            h.config(PipelineOptions {
                json_output: Some(json.clone()),
                ..Default::default()
            }),
            &h.settings,
            tools,
            &mut rec,
        );
        let report = p.run().unwrap();

        assert!(report.index_found_by_fallback);
        assert!(report.index.ends_with("out/custom.scip"));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(rec.warnings.len(), 1);
        // Ephemeral copy removed, external JSON kept
        assert!(!report.workspace_retained);
        assert!(report.json_retained);
        assert!(!report.workspace.exists());
        assert_eq!(std::fs::read_to_string(&json).unwrap(), "{\"documents\":[]}");
    }

    #[test]
    fn default_json_goes_away_with_ephemeral_workspace() {
        let h = Harness::new();
        let tools = h.tools("printf 'IDX' > index.scip\n", EXPORT_OK);
        let mut rec = Recorder::default();

        let mut p = Pipeline::new(h.config(PipelineOptions::default()), &h.settings, tools, &mut rec);
        let report = p.run().unwrap();

        assert!(!report.workspace_retained);
        assert!(!report.json_retained);
        assert!(report.json_output.starts_with(&report.workspace));
        assert!(!report.json_output.exists());
    }

    #[test]
    fn ephemeral_workspace_provenance_is_reported() {
        let h = Harness::new();
        let config = h.config(PipelineOptions {
            keep_copy: true,
            ..Default::default()
        });
        let ws = create_workspace(&config, &h.settings).unwrap();

        let Provenance::Ephemeral { temp_root } = ws.provenance() else {
            panic!("expected ephemeral");
        };
        assert!(temp_root.file_name().unwrap().to_string_lossy().starts_with(&h.settings.temp_prefix));
        std::fs::remove_dir_all(temp_root).unwrap();
    }
}

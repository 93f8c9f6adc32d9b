use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::core::tools::AnalyzerKind;

/// Config file names probed in the working directory, first match wins
pub const CONFIG_FILES: [&str; 2] = ["generate-index.toml", ".generate-index.toml"];

/// Environment prefix; nested keys use `__` (e.g. GENERATE_INDEX_TOOLS__EXPORTER)
pub const ENV_PREFIX: &str = "GENERATE_INDEX";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings
{
    /// Analyzer used when `--analyzer` is not given (primary | secondary)
    pub default_analyzer: String,

    /// Extension of the analyzer's index file (`index.<ext>`)
    pub index_extension: String,

    /// File name of the JSON export written next to the index
    pub json_file_name: String,

    /// Prefix for ephemeral workspace directories
    pub temp_prefix: String,

    /// Bound on each external tool run in seconds (0 = unbounded)
    pub timeout_secs: u64,

    /// Bound on `--version` / `--help` probes in seconds
    pub probe_timeout_secs: u64,

    /// Glob patterns skipped while copying the project (relative paths)
    pub copy_exclude: Vec<String>,

    /// External tool names or paths
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig
{
    pub primary: String,
    pub secondary: String,
    pub exporter: String,
    pub analyzer_subcommand: String,
}

impl Default for Settings
{
    fn default() -> Self
    {
        Self {
            default_analyzer: "primary".to_string(),
            index_extension: "scip".to_string(),
            json_file_name: "index_scip.json".to_string(),
            temp_prefix: "scip_analysis_".to_string(),
            timeout_secs: 0,
            probe_timeout_secs: 10,
            copy_exclude: Vec::new(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Default for ToolsConfig
{
    fn default() -> Self
    {
        Self {
            primary: "verus-analyzer".to_string(),
            secondary: "rust-analyzer".to_string(),
            exporter: "scip".to_string(),
            analyzer_subcommand: "scip".to_string(),
        }
    }
}

impl Settings
{
    /// Binary name configured for the given analyzer kind
    pub fn analyzer_binary(
        &self,
        kind: AnalyzerKind,
    ) -> &str
    {
        match kind
        {
            AnalyzerKind::Primary => &self.tools.primary,
            AnalyzerKind::Secondary => &self.tools.secondary,
        }
    }

    /// Parsed `default_analyzer`
    pub fn default_analyzer_kind(&self) -> Result<AnalyzerKind, ConfigError>
    {
        self.default_analyzer
            .parse()
    }

    /// Effective tool timeout; a CLI override beats the config value
    pub fn tool_timeout(
        &self,
        cli_override: Option<u64>,
    ) -> Option<Duration>
    {
        match cli_override.unwrap_or(self.timeout_secs)
        {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn probe_timeout(&self) -> Duration
    {
        Duration::from_secs(
            self.probe_timeout_secs
                .max(1),
        )
    }
}

/// Load settings from the current directory and the process environment
pub fn load_settings() -> Result<Settings, ConfigError>
{
    load_settings_from(Path::new("."), None)
}

/// Load settings from `dir`. When `env` is given it replaces the process
/// environment as the variable source.
pub fn load_settings_from(
    dir: &Path,
    env: Option<HashMap<String, String>>,
) -> Result<Settings, ConfigError>
{
    let mut builder = config::Config::builder();

    if let Some(path) = find_config_file(dir)
    {
        tracing::debug!(path = %path.display(), "loading config file");
        builder = builder.add_source(config::File::from(path.as_path()));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env),
    );

    let cfg = builder.build()?;
    let parsed: Settings = cfg.try_deserialize()?;

    // Reject a bad default early, before any run starts
    parsed.default_analyzer_kind()?;

    Ok(parsed)
}

fn find_config_file(dir: &Path) -> Option<PathBuf>
{
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// Render the effective settings as TOML
pub fn render_settings(settings: &Settings) -> Result<String, ConfigError>
{
    toml::to_string_pretty(settings).map_err(|e| ConfigError::Render(e.to_string()))
}

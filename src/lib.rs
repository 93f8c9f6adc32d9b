//! **scip-index** - Generate SCIP code-intelligence indexes for Rust projects
//!
//! Copies a project into an isolated workspace, runs a SCIP analyzer there and
//! exports the binary index to JSON. The source tree is never written to.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Index pipeline - workspace, analysis, conversion and orchestration
pub mod core {
    /// Typed errors per stage, tool hints
    pub mod error;

    /// Child process execution with separate stream capture and timeouts
    pub mod process;

    /// Analyzer/exporter resolution and probing
    pub mod tools;
    pub use tools::{AnalyzerKind, ToolSet, check_tools};

    /// Isolated project copies with provenance-based cleanup
    pub mod workspace;
    pub use workspace::{Workspace, cleanup, create_workspace};

    /// SCIP analyzer invocation and index location
    pub mod analyzer;
    pub use analyzer::{AnalysisResult, run_analysis};

    /// Binary index to JSON export
    pub mod convert;
    pub use convert::{ConversionResult, convert_to_json};

    /// Progress reporting seam
    pub mod observer;

    /// Stage sequencing and cleanup policy
    pub mod pipeline;
    pub use pipeline::{Pipeline, PipelineConfig, PipelineOptions, PipelineReport};

    /// The `generate-index` command
    pub mod generate;
    pub use generate::run as generate_run;

    #[cfg(test)]
    pub(crate) mod test_support;
}

/// Infrastructure - configuration and filesystem walking
pub mod infra {
    /// Layered configuration: file, then environment
    pub mod config;
    pub use config::{Settings, load_settings};

    /// Ordered, non-filtering tree walks
    pub mod walk;
    pub use walk::TreeWalker;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli};
pub use crate::core::generate_run;
pub use crate::infra::{Settings, load_settings};

//! Progress reporting for pipeline runs.
//!
//! The pipeline talks to an injected `PipelineObserver`; presentation
//! (colors, quiet mode, which stream) stays out of the core.

use owo_colors::OwoColorize;

use crate::core::pipeline::Stage;

/// Receives pipeline progress. Every method defaults to a no-op.
pub trait PipelineObserver {
    fn stage_started(&mut self, _stage: Stage) {}

    fn info(&mut self, _message: &str) {}

    /// Non-fatal condition; never changes the exit status
    fn warning(&mut self, _message: &str) {}

    fn stage_finished(&mut self, _stage: Stage, _detail: &str) {}

    fn stage_failed(&mut self, _stage: Stage, _error: &dyn std::error::Error) {}
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullObserver;

impl PipelineObserver for NullObserver {}

/// Line-oriented terminal output
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    quiet: bool,
    color: bool,
    /// Keep stdout clean (e.g. for `--json`)
    to_stderr: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool, color: bool, to_stderr: bool) -> Self {
        Self { quiet, color, to_stderr }
    }

    fn emit(&self, line: &str) {
        if self.to_stderr {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }

    pub fn ok_mark(&self) -> String {
        if self.color { "✓".green().to_string() } else { "✓".to_string() }
    }

    pub fn warn_mark(&self) -> String {
        if self.color { "⚠".yellow().to_string() } else { "⚠".to_string() }
    }

    pub fn fail_mark(&self) -> String {
        if self.color { "✗".red().to_string() } else { "✗".to_string() }
    }

    pub fn heading(&self, title: &str) {
        if self.quiet {
            return;
        }
        let rule = "=".repeat(60);
        self.emit("");
        self.emit(&rule);
        if self.color {
            self.emit(&title.bold().to_string());
        } else {
            self.emit(title);
        }
        self.emit(&rule);
    }

    /// Suppressed by --quiet
    pub fn info_line(&self, text: &str) {
        if !self.quiet {
            self.emit(text);
        }
    }

    /// Always printed, even when quiet
    pub fn line(&self, text: &str) {
        self.emit(text);
    }
}

impl PipelineObserver for ConsoleReporter {
    fn stage_started(&mut self, stage: Stage) {
        if !self.quiet {
            self.emit(&format!("\n{}. {}...", stage.ordinal(), stage.title()));
        }
    }

    fn info(&mut self, message: &str) {
        self.info_line(message);
    }

    fn warning(&mut self, message: &str) {
        // Warnings survive --quiet but always go to stderr
        eprintln!("{} {message}", self.warn_mark());
    }

    fn stage_finished(&mut self, _stage: Stage, detail: &str) {
        if !self.quiet {
            self.emit(&format!("{} {detail}", self.ok_mark()));
        }
    }

    fn stage_failed(&mut self, stage: Stage, error: &dyn std::error::Error) {
        eprintln!("{} {} failed: {error}", self.fail_mark(), stage.title());
    }
}

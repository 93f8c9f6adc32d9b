//! Shell completion generation using clap_complete.

use clap::{Command, CommandFactory};
use clap_complete::{Shell as CompletionShell, generate};
use std::io;

use crate::cli::{Cli, Shell};

pub const BIN_NAME: &str = "generate-index";

impl From<Shell> for CompletionShell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => CompletionShell::Bash,
            Shell::Zsh => CompletionShell::Zsh,
            Shell::Fish => CompletionShell::Fish,
            Shell::PowerShell => CompletionShell::PowerShell,
            Shell::Elvish => CompletionShell::Elvish,
        }
    }
}

/// Write the completion script for `shell` into `out`
pub fn write(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd: Command = Cli::command();
    generate(CompletionShell::from(shell), &mut cmd, BIN_NAME, out);
}

pub fn run(shell: Shell) {
    write(shell, &mut io::stdout());
}

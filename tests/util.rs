//! Shared sandbox for integration tests
//!
//! Every test gets its own directory holding the source project, a stub
//! `bin/` prepended to PATH, a private TMPDIR and a working directory
//! without any config file.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;

pub const ANALYZER_OK: &str = "case \"$1\" in --version) echo 'verus-analyzer 0.0.1'; exit 0;; esac\nprintf 'IDX' > index.scip\n";
pub const RA_OK: &str = "case \"$1\" in --version) echo 'rust-analyzer 1.0.0'; exit 0;; esac\nprintf 'IDX' > index.scip\n";
pub const EXPORTER_OK: &str = "case \"$1\" in --version) echo 'scip v0.5.0'; exit 0;; esac\nprintf '{\"documents\":[]}'\n";

pub struct Sandbox
{
    pub root: assert_fs::TempDir,
}

impl Sandbox
{
    /// Project at `proj/` plus the default analyzer and exporter stubs
    pub fn new() -> Self
    {
        let root = assert_fs::TempDir::new().expect("tempdir");

        root.child("proj/Cargo.toml")
            .write_str("[package]\nname = \"proj\"\nversion = \"0.1.0\"\n")
            .expect("write Cargo.toml");
        root.child("proj/src/lib.rs")
            .write_str("pub fn alpha() {}\n")
            .expect("write lib.rs");
        root.child("proj/.gitignore")
            .write_str("target/\n")
            .expect("write .gitignore");

        for dir in ["bin", "tmp", "work"]
        {
            root.child(dir)
                .create_dir_all()
                .expect("mkdir");
        }

        let sb = Self { root };
        sb.stub("verus-analyzer", ANALYZER_OK);
        sb.stub("rust-analyzer", RA_OK);
        sb.stub("scip", EXPORTER_OK);
        sb
    }

    pub fn path(&self) -> &Path
    {
        self.root
            .path()
    }

    pub fn project(&self) -> PathBuf
    {
        self.path()
            .join("proj")
    }

    /// Private TMPDIR of the binary under test
    pub fn tmp(&self) -> PathBuf
    {
        self.path()
            .join("tmp")
    }

    /// Install (or replace) an executable stub on the sandbox PATH
    pub fn stub(
        &self,
        name: &str,
        body: &str,
    )
    {
        let path = self
            .path()
            .join("bin")
            .join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write stub");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod stub");
    }

    /// `generate-index` with the sandbox PATH, TMPDIR and working directory
    pub fn cmd(&self) -> Command
    {
        let mut path = std::ffi::OsString::from(
            self.path()
                .join("bin"),
        );
        if let Some(existing) = std::env::var_os("PATH")
        {
            path.push(":");
            path.push(existing);
        }

        let mut cmd = Command::cargo_bin("generate-index").expect("bin");
        cmd.current_dir(
            self.path()
                .join("work"),
        )
        .env("PATH", path)
        .env("TMPDIR", self.tmp())
        .env_remove("GENERATE_INDEX_LOG");
        cmd
    }
}

/// Relative paths and contents below `root`, sorted
pub fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)>
{
    let mut out = Vec::new();
    collect(root, root, &mut out);
    out.sort();
    out
}

fn collect(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, Vec<u8>)>,
)
{
    for entry in fs::read_dir(dir).expect("read_dir")
    {
        let path = entry
            .expect("entry")
            .path();
        let rel = path
            .strip_prefix(root)
            .expect("prefix")
            .to_string_lossy()
            .into_owned();
        if path.is_dir()
        {
            out.push((rel + "/", Vec::new()));
            collect(root, &path, out);
        }
        else
        {
            out.push((rel, fs::read(&path).expect("read")));
        }
    }
}

/// Entries directly under `dir`
pub fn entries(dir: &Path) -> Vec<String>
{
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read_dir")
        .map(|e| {
            e.expect("entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

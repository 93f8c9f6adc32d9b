//! Fixtures shared by unit tests.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::observer::PipelineObserver;
use crate::core::pipeline::Stage;

/// Write `contents` to `root/rel`, creating parents
pub fn write_file(root: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

/// Executable `/bin/sh` script standing in for an external tool
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
pub fn exit_ok() -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(0)
}

/// Relative path and contents of every entry below `root`, sorted.
/// Directories carry `None`.
pub fn snapshot_tree(root: &Path) -> Vec<(String, Option<Vec<u8>>)> {
    let mut out = Vec::new();
    collect(root, root, &mut out);
    out.sort();
    out
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<(String, Option<Vec<u8>>)>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
        let meta = fs::symlink_metadata(&path).unwrap();
        if meta.is_dir() {
            out.push((rel, None));
            collect(root, &path, out);
        } else if meta.file_type().is_symlink() {
            let target = fs::read_link(&path).unwrap();
            out.push((rel, Some(target.to_string_lossy().into_owned().into_bytes())));
        } else {
            out.push((rel, Some(fs::read(&path).unwrap())));
        }
    }
}

/// Observer that remembers what it was told
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<(Stage, &'static str)>,
    pub infos: Vec<String>,
    pub warnings: Vec<String>,
    pub failed: Vec<Stage>,
}

impl Recorder {
    pub fn stages_started(&self) -> Vec<Stage> {
        self.events
            .iter()
            .filter(|(_, kind)| *kind == "started")
            .map(|(stage, _)| *stage)
            .collect()
    }
}

impl PipelineObserver for Recorder {
    fn stage_started(&mut self, stage: Stage) {
        self.events.push((stage, "started"));
    }

    fn info(&mut self, message: &str) {
        self.infos.push(message.to_string());
    }

    fn warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn stage_finished(&mut self, stage: Stage, _detail: &str) {
        self.events.push((stage, "finished"));
    }

    fn stage_failed(&mut self, stage: Stage, _error: &dyn std::error::Error) {
        self.failed.push(stage);
    }
}

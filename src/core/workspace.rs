//! Isolated, disposable project copies.
//!
//! A workspace lives either in a fresh temp directory
//! (`<tmp>/scip_analysis_XXXX/<project>`) or under a user-given destination
//! (`<dest>/<project>`). The source tree is only ever read.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::core::error::WorkspaceError;
use crate::core::pipeline::PipelineConfig;
use crate::infra::config::Settings;
use crate::infra::walk::{EntryKind, TreeWalker};

/// Where a workspace came from; decides cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// Backed by a temp directory owned by this run
    Ephemeral { temp_root: PathBuf },
    /// Under a destination the user chose; never auto-removed
    UserSpecified { destination: PathBuf },
}

#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    provenance: Provenance,
}

impl Workspace {
    /// Absolute path of the project copy
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self.provenance, Provenance::Ephemeral { .. })
    }
}

/// What `cleanup` did
#[derive(Debug)]
pub enum CleanupOutcome {
    /// Temp root removed
    Removed(PathBuf),
    /// Left on disk; `notice` is set when the user did not ask for it
    Retained { path: PathBuf, notice: bool },
    /// Removal attempted and failed
    Failed { path: PathBuf, error: io::Error },
}

/// Copy the source project into a fresh workspace.
#[instrument(skip_all, fields(source = %config.source().display()))]
pub fn create_workspace(config: &PipelineConfig, settings: &Settings) -> Result<Workspace, WorkspaceError> {
    let source = config.source();
    if !source.exists() {
        return Err(WorkspaceError::SourceMissing(source.to_path_buf()));
    }
    if !source.is_dir() {
        return Err(WorkspaceError::NotADirectory(source.to_path_buf()));
    }

    let name = source
        .file_name()
        .ok_or_else(|| WorkspaceError::NoProjectName(source.to_path_buf()))?
        .to_owned();

    // Compile exclusions before creating anything on disk
    let walker = TreeWalker::new(&settings.copy_exclude)?;

    let workspace = match config.destination() {
        None => {
            let temp_root = tempfile::Builder::new()
                .prefix(&settings.temp_prefix)
                .tempdir()
                .map_err(WorkspaceError::TempDir)?
                .keep();
            Workspace {
                path: temp_root.join(&name),
                provenance: Provenance::Ephemeral { temp_root },
            }
        }
        Some(dest) => {
            let destination = resolve_destination(dest)?;
            let path = destination.join(&name);
            reject_overlap(&path, source)?;

            if fs::symlink_metadata(&path).is_ok() {
                debug!(path = %path.display(), "removing existing workspace");
                remove_any(&path).map_err(|e| WorkspaceError::Remove {
                    path: path.clone(),
                    source: e,
                })?;
            }
            fs::create_dir_all(&destination).map_err(|e| WorkspaceError::CreateDir {
                path: destination.clone(),
                source: e,
            })?;
            Workspace {
                path,
                provenance: Provenance::UserSpecified { destination },
            }
        }
    };

    if let Err(e) = copy_tree(source, &workspace.path, &walker) {
        // A half-built temp copy is useless to anyone
        if let Provenance::Ephemeral { temp_root } = &workspace.provenance {
            let _ = fs::remove_dir_all(temp_root);
        }
        return Err(e);
    }

    debug!(workspace = %workspace.path.display(), "workspace ready");
    Ok(workspace)
}

/// Remove an ephemeral workspace unless asked to keep it. User-specified
/// destinations are never removed.
pub fn cleanup(workspace: &Workspace, keep_copy: bool) -> CleanupOutcome {
    match &workspace.provenance {
        Provenance::Ephemeral { temp_root } if !keep_copy => match fs::remove_dir_all(temp_root) {
            Ok(()) => CleanupOutcome::Removed(temp_root.clone()),
            Err(error) => {
                debug!(path = %temp_root.display(), %error, "temp workspace cleanup failed");
                CleanupOutcome::Failed {
                    path: temp_root.clone(),
                    error,
                }
            }
        },
        Provenance::Ephemeral { .. } => CleanupOutcome::Retained {
            path: workspace.path.clone(),
            notice: false,
        },
        Provenance::UserSpecified { .. } => CleanupOutcome::Retained {
            path: workspace.path.clone(),
            notice: !keep_copy,
        },
    }
}

/// Absolute, symlink-resolved form of a destination that may not exist yet.
fn resolve_destination(dest: &Path) -> Result<PathBuf, WorkspaceError> {
    let resolve_err = |e| WorkspaceError::Resolve {
        path: dest.to_path_buf(),
        source: e,
    };

    let absolute = std::path::absolute(dest).map_err(resolve_err)?;

    // Canonicalize the deepest existing ancestor, re-append the rest
    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_owned());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = dunce::canonicalize(existing).map_err(resolve_err)?;
    for part in rest.into_iter().rev() {
        resolved.push(part);
    }
    Ok(resolved)
}

/// Neither path may contain the other: removing or filling `target` must
/// never touch the source tree.
fn reject_overlap(target: &Path, source: &Path) -> Result<(), WorkspaceError> {
    if target.starts_with(source) || source.starts_with(target) {
        return Err(WorkspaceError::OverlapsSource {
            destination: target.to_path_buf(),
            source_dir: source.to_path_buf(),
        });
    }
    Ok(())
}

fn remove_any(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Recursive copy preserving structure; symlinks are recreated, not followed.
fn copy_tree(source: &Path, target: &Path, walker: &TreeWalker) -> Result<(), WorkspaceError> {
    fs::create_dir_all(target).map_err(|e| WorkspaceError::CreateDir {
        path: target.to_path_buf(),
        source: e,
    })?;

    let entries = walker.walk(source)?;
    let mut files = 0usize;

    for entry in entries {
        let from = source.join(&entry.rel);
        let to = target.join(&entry.rel);
        let copy_err = |e| WorkspaceError::Copy {
            from: from.clone(),
            to: to.clone(),
            source: e,
        };

        match entry.kind {
            EntryKind::Dir => fs::create_dir_all(&to).map_err(copy_err)?,
            EntryKind::File => {
                fs::copy(&from, &to).map_err(copy_err)?;
                files += 1;
            }
            EntryKind::Symlink => copy_symlink(&from, &to).map_err(copy_err)?,
        }
    }

    debug!(files, target = %target.display(), "copied project tree");
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let link = fs::read_link(from)?;
    std::os::unix::fs::symlink(link, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    // No portable symlink creation; copy what it points at
    if from.is_dir() {
        fs::create_dir_all(to)
    } else {
        fs::copy(from, to).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::PipelineOptions;
    use crate::core::test_support::{snapshot_tree, write_file};
    use crate::core::tools::AnalyzerKind;
    use tempfile::TempDir;

    fn project(tmp: &TempDir) -> PathBuf {
        let root = tmp.path().join("proj");
        write_file(&root, "Cargo.toml", "[package]\nname = \"proj\"\n");
        write_file(&root, "src/main.rs", "fn main() {}\n");
        write_file(&root, ".hidden/config", "x = 1\n");
        root
    }

    fn config(source: &Path, destination: Option<PathBuf>) -> PipelineConfig {
        PipelineConfig::new(
            source,
            AnalyzerKind::Primary,
            PipelineOptions {
                destination,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn ephemeral_copy_and_cleanup() {
        let tmp = TempDir::new().unwrap();
        let source = project(&tmp);
        let before = snapshot_tree(&source);

        let ws = create_workspace(&config(&source, None), &Settings::default()).unwrap();

        assert!(ws.is_ephemeral());
        assert_eq!(ws.path().file_name().unwrap(), "proj");
        assert_eq!(snapshot_tree(ws.path()), before);
        assert_eq!(snapshot_tree(&source), before);

        let Provenance::Ephemeral { temp_root } = ws.provenance().clone() else {
            panic!("expected ephemeral workspace");
        };
        assert!(
            temp_root
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("scip_analysis_")
        );

        match cleanup(&ws, false) {
            CleanupOutcome::Removed(p) => assert_eq!(p, temp_root),
            other => panic!("unexpected cleanup outcome: {other:?}"),
        }
        assert!(!temp_root.exists());
    }

    #[test]
    fn keep_copy_retains_ephemeral_workspace() {
        let tmp = TempDir::new().unwrap();
        let source = project(&tmp);
        let ws = create_workspace(&config(&source, None), &Settings::default()).unwrap();

        assert!(matches!(cleanup(&ws, true), CleanupOutcome::Retained { notice: false, .. }));
        assert!(ws.path().join("src/main.rs").exists());

        if let Provenance::Ephemeral { temp_root } = ws.provenance() {
            fs::remove_dir_all(temp_root).unwrap();
        }
    }

    #[test]
    fn destination_is_overwritten_not_merged() {
        let tmp = TempDir::new().unwrap();
        let source = project(&tmp);
        let dest = tmp.path().join("out");

        write_file(&source, "stale.txt", "old run\n");
        let ws = create_workspace(&config(&source, Some(dest.clone())), &Settings::default()).unwrap();
        assert!(ws.path().join("stale.txt").exists());

        fs::remove_file(source.join("stale.txt")).unwrap();
        let ws = create_workspace(&config(&source, Some(dest.clone())), &Settings::default()).unwrap();

        assert!(!ws.path().join("stale.txt").exists());
        assert_eq!(snapshot_tree(ws.path()), snapshot_tree(&source));
        assert!(ws.path().starts_with(dunce::canonicalize(&dest).unwrap()));

        // User-specified copies are never removed
        assert!(matches!(cleanup(&ws, false), CleanupOutcome::Retained { notice: true, .. }));
        assert!(ws.path().exists());
    }

    #[test]
    fn destination_parents_are_created() {
        let tmp = TempDir::new().unwrap();
        let source = project(&tmp);
        let dest = tmp.path().join("a/b/c");

        let ws = create_workspace(&config(&source, Some(dest)), &Settings::default()).unwrap();
        assert!(ws.path().ends_with("a/b/c/proj"));
        assert!(ws.path().join("Cargo.toml").is_file());
    }

    #[test]
    fn destination_inside_source_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let source = project(&tmp);
        let before = snapshot_tree(&source);

        let err = create_workspace(&config(&source, Some(source.join("copy"))), &Settings::default()).unwrap_err();
        assert!(matches!(err, WorkspaceError::OverlapsSource { .. }));

        // Destination whose workspace path would be the source itself
        let err = create_workspace(&config(&source, Some(tmp.path().to_path_buf())), &Settings::default()).unwrap_err();
        assert!(matches!(err, WorkspaceError::OverlapsSource { .. }));

        assert_eq!(snapshot_tree(&source), before);
    }

    #[test]
    fn copy_exclusions_are_honored() {
        let tmp = TempDir::new().unwrap();
        let source = project(&tmp);
        write_file(&source, "target/debug/big.bin", "0000");

        let settings = Settings {
            copy_exclude: vec!["target".to_string()],
            ..Settings::default()
        };
        let ws = create_workspace(&config(&source, Some(tmp.path().join("out"))), &settings).unwrap();

        assert!(!ws.path().join("target").exists());
        assert!(ws.path().join("src/main.rs").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failed_copy_removes_ephemeral_temp_root() {
        let tmp = TempDir::new().unwrap();
        let source = project(&tmp);
        // A socket cannot be opened for reading, even by root
        let _listener = std::os::unix::net::UnixListener::bind(source.join("sock")).unwrap();

        let tag = tmp.path().file_name().unwrap().to_string_lossy().trim_start_matches('.').to_string();
        let settings = Settings {
            temp_prefix: format!("scip_copyfail_{tag}_"),
            ..Settings::default()
        };

        let err = create_workspace(&config(&source, None), &settings).unwrap_err();
        assert!(matches!(err, WorkspaceError::Copy { ref from, .. } if from.ends_with("sock")));

        let leaked: Vec<_> = fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(&settings.temp_prefix))
            .collect();
        assert!(leaked.is_empty(), "temp root leaked: {leaked:?}");
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_recreated() {
        let tmp = TempDir::new().unwrap();
        let source = project(&tmp);
        std::os::unix::fs::symlink("src/main.rs", source.join("entry.rs")).unwrap();

        let ws = create_workspace(&config(&source, Some(tmp.path().join("out"))), &Settings::default()).unwrap();
        let copied = ws.path().join("entry.rs");

        assert!(fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&copied).unwrap(), PathBuf::from("src/main.rs"));
    }
}

//! Filepath: src/infra/walk.rs
//! Full-tree walker used for project copies and index lookup.
//! - Ignore files are NOT honored: a copy must include everything the
//!   analyzer could need (hidden files, `.gitignore`d build inputs)
//! - Optional exclusion globs (early prune + late filter)
//! - Symlinks are reported, never followed
//! - Deterministic ordering for stable tests/CI
//!
//! Backed by ripgrep's `ignore` crate (with its standard filters switched
//! off) and `globset`.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};

/// Kind of a walked entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind
{
    Dir,
    File,
    Symlink,
}

/// A walked entry, relative to the walk root (sorts by path first)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TreeEntry
{
    pub rel: PathBuf,
    pub kind: EntryKind,
}

/// Walker over every entry of a tree, minus optional exclusion globs.
/// Globs are applied in two places:
///   1) Early: prune directories during traversal (filter_entry).
///   2) Late: filter out entries that still slipped through.
pub struct TreeWalker
{
    /// Compiled set of exclusion patterns (matched on relative paths)
    exclude: GlobSet,
}

impl TreeWalker
{
    /// Build a walker with exclusion patterns (e.g. "target/**").
    pub fn new(exclude: &[String]) -> Result<Self, globset::Error>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in exclude
        {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self { exclude: builder.build()? })
    }

    /// Walker without exclusions
    pub fn all() -> Self
    {
        Self { exclude: GlobSet::empty() }
    }

    /// Internal: construct a configured WalkBuilder for `root`.
    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // No hidden/ignore/gitignore/parent filtering
        b.standard_filters(false);
        b.follow_links(false);

        // Early directory pruning using exclusion globs
        let extra = self
            .exclude
            .clone();
        let root_owned = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .map(|ft| ft.is_dir())
                .unwrap_or(false);

            if !is_dir
            {
                return true;
            }

            let rel = ent
                .path()
                .strip_prefix(&root_owned)
                .unwrap_or(ent.path());
            rel.as_os_str()
                .is_empty()
                || !extra.is_match(rel)
        });

        b
    }

    /// Walk all entries under `root` (the root itself excluded).
    /// Returns a **sorted** list; parents always precede their children.
    pub fn walk(
        &self,
        root: &Path,
    ) -> Result<Vec<TreeEntry>, ignore::Error>
    {
        let mut out = Vec::new();

        for res in self
            .build_walk(root)
            .build()
        {
            let entry = res?;

            if entry.depth() == 0
            {
                continue;
            }

            let Some(ft) = entry.file_type()
            else
            {
                continue;
            };

            let kind = if ft.is_symlink()
            {
                EntryKind::Symlink
            }
            else if ft.is_dir()
            {
                EntryKind::Dir
            }
            else
            {
                EntryKind::File
            };

            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();

            // Late filter for files that matched an exclusion glob
            if self
                .exclude
                .is_match(&rel)
            {
                continue;
            }

            out.push(TreeEntry { rel, kind });
        }

        // Deterministic order (stable CLI & tests)
        out.sort();

        Ok(out)
    }

    /// Regular files under `root` with the given extension, as absolute
    /// paths, shallowest first and then lexicographic.
    pub fn files_with_extension(
        &self,
        root: &Path,
        extension: &str,
    ) -> Result<Vec<PathBuf>, ignore::Error>
    {
        let mut hits: Vec<PathBuf> = self
            .walk(root)?
            .into_iter()
            .filter(|e| e.kind == EntryKind::File)
            .filter(|e| {
                e.rel
                    .extension()
                    .is_some_and(|ext| ext == extension)
            })
            .map(|e| e.rel)
            .collect();

        hits.sort_by(|a, b| {
            a.components()
                .count()
                .cmp(
                    &b.components()
                        .count(),
                )
                .then_with(|| a.cmp(b))
        });

        Ok(hits
            .into_iter()
            .map(|rel| root.join(rel))
            .collect())
    }
}

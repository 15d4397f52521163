/*!
This module produces the deterministic, ordered file set belonging to a build
context: a Dockerfile's context directory, honoring the applicable
`.dockerignore`-style ignore file.

Modeled on the `find_files` helper in `buildsys`'s `builder.rs`, which walks a
directory with `walkdir` to locate build artifacts; here the walk instead
locates context members and feeds the ignore matcher.
*/
pub mod error;

use crate::ignore::IgnoreMatcher;
use error::Result;
use snafu::{ensure, ResultExt};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Converts a path to a `/`-separated string regardless of host OS, as the
/// fingerprint and ignore matching must be host-independent.
pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Enumerate the absolute paths of regular files under `root`, honoring
/// `ignore_file` if present. Symlinks are followed and treated as files;
/// directories are never emitted. The ignore file itself, if it exists inside
/// `root`, is always included regardless of whether it would otherwise match
/// its own patterns.
pub fn enumerate_context_files(
    root: &Path,
    ignore_file: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    ensure!(root.is_dir(), error::ContextNotFoundSnafu { path: root });

    let matcher = match ignore_file {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .context(error::IgnoreFileReadSnafu { path })?;
            IgnoreMatcher::from_lines(contents)
                .context(error::IgnoreFileParseSnafu { path })?
        }
        None => IgnoreMatcher::empty(),
    };

    let ignore_rel = ignore_file
        .map(|p| p.canonicalize().unwrap_or_else(|_| p.to_path_buf()))
        .and_then(|p| p.strip_prefix(root).ok().map(|p| p.to_path_buf()));

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).min_depth(1) {
        let entry = entry.context(error::ContextWalkSnafu { root })?;
        if entry.file_type().is_dir() {
            continue;
        }

        let abs_path = entry.path().to_path_buf();
        let rel_path = abs_path
            .strip_prefix(root)
            .context(error::PathEscapesRootSnafu {
                path: &abs_path,
                root,
            })?
            .to_path_buf();

        let is_ignore_file = ignore_rel.as_deref() == Some(rel_path.as_path());
        if !is_ignore_file && matcher.is_path_excluded(&rel_path) {
            continue;
        }

        paths.push(abs_path);
    }

    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// The effective set of files belonging to a build context: relative paths
/// (forward-slash separated) mapped to their content bytes. Ordering is
/// irrelevant to callers; iteration order is the `BTreeMap`'s sorted order,
/// which keeps it deterministic without anyone needing to rely on it.
#[derive(Debug, Default, Clone)]
pub struct BuildContext {
    files: BTreeMap<String, Vec<u8>>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a set of absolute paths known to be under
    /// `root`, reading each file's contents.
    pub fn from_paths(root: &Path, paths: &[PathBuf]) -> Result<Self> {
        let mut files = BTreeMap::new();
        for path in paths {
            let rel = path
                .strip_prefix(root)
                .context(error::PathEscapesRootSnafu { path, root })?;
            let contents = fs::read(path).context(error::FileReadSnafu { path })?;
            files.insert(to_slash_path(rel), contents);
        }
        Ok(Self { files })
    }

    /// Add a file whose path is expressed outside the context root (for
    /// example a `-f`/`--file` Dockerfile that lives above the context),
    /// keyed by an explicit logical name instead of a root-relative path.
    pub fn insert_external(&mut self, logical_name: impl Into<String>, contents: Vec<u8>) {
        self.files.insert(logical_name.into(), contents);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut f = File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn enumerates_all_files_without_ignore_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Dockerfile", "FROM alpine\n");
        write(dir.path(), "src/main.rs", "fn main() {}");

        let paths = enumerate_context_files(dir.path(), None).unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn honors_dockerignore_and_always_includes_it() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Dockerfile", "FROM alpine\n");
        write(dir.path(), "README.md", "hello");
        write(dir.path(), ".dockerignore", "*.md\n");

        let ignore_path = dir.path().join(".dockerignore");
        let paths = enumerate_context_files(dir.path(), Some(&ignore_path)).unwrap();
        let rels: Vec<String> = paths
            .iter()
            .map(|p| to_slash_path(p.strip_prefix(dir.path()).unwrap()))
            .collect();

        assert!(rels.contains(&"Dockerfile".to_string()));
        assert!(rels.contains(&".dockerignore".to_string()));
        assert!(!rels.contains(&"README.md".to_string()));
    }

    #[test]
    fn missing_context_root_is_an_error() {
        let err = enumerate_context_files(Path::new("/no/such/directory"), None).unwrap_err();
        assert!(matches!(err, error::Error::ContextNotFound { .. }));
    }

    #[test]
    fn build_context_reads_file_contents() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Dockerfile", "FROM alpine\n");

        let paths = enumerate_context_files(dir.path(), None).unwrap();
        let ctx = BuildContext::from_paths(dir.path(), &paths).unwrap();
        assert_eq!(ctx.len(), 1);
        let (_, bytes) = ctx.iter().next().unwrap();
        assert_eq!(bytes, b"FROM alpine\n");
    }
}

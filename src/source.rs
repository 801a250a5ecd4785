//! # Source Packaging
//!
//! Zips a bot's source directory for upload and fingerprints it.
//!
//! The archive and the digest are both independent of filesystem walk order
//! and modification times, so an unchanged tree always yields the same
//! digest and the function reconciler can skip the upload entirely.

use crate::error::{ProvisionError, Result};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Directory names never shipped to the function runtime
const SKIPPED_DIRS: &[&str] = &["__pycache__", ".venv", ".git", "test"];

/// File extensions never shipped to the function runtime
const SKIPPED_EXTENSIONS: &[&str] = &["pyc"];

/// A packaged source tree ready for upload
#[derive(Clone, PartialEq, Eq)]
pub struct PackagedSource {
    /// Zip archive bytes
    pub archive: Vec<u8>,
    /// Lowercase hex SHA-256 over relative paths and contents
    pub digest: String,
    pub file_count: usize,
}

impl std::fmt::Debug for PackagedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackagedSource")
            .field("archive_bytes", &self.archive.len())
            .field("digest", &self.digest)
            .field("file_count", &self.file_count)
            .finish()
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        return entry.depth() > 0 && SKIPPED_DIRS.contains(&name.as_ref());
    }
    entry
        .path()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SKIPPED_EXTENSIONS.contains(&ext))
}

/// Relative path with `/` separators, as stored in the archive
fn archive_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// List shipped files as `(archive name, absolute path)`, sorted by name
///
/// # Errors
/// Returns [`ProvisionError::Source`] if the tree cannot be walked
pub fn collect_files(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry));

    for entry in walker {
        let entry = entry.map_err(|e| ProvisionError::Source {
            path: root.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = archive_name(root, entry.path()) {
            files.push((name, entry.into_path()));
        }
    }

    // Walk order is per-directory; the archive wants one global order
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Package `root` into a deterministic zip archive
///
/// # Errors
/// Returns an error if a file cannot be read or the archive cannot be written
pub fn package(root: &Path) -> Result<PackagedSource> {
    let files = collect_files(root)?;
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let archive_err = |source| ProvisionError::Archive {
        path: root.to_path_buf(),
        source,
    };

    let mut hasher = Sha256::new();
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, path) in &files {
        let contents = std::fs::read(path).map_err(|source| ProvisionError::Source {
            path: path.clone(),
            source,
        })?;

        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(&contents);
        hasher.update([0u8]);

        writer.start_file(name.as_str(), options).map_err(archive_err)?;
        writer
            .write_all(&contents)
            .map_err(|source| ProvisionError::Source {
                path: path.clone(),
                source,
            })?;
    }

    let archive = writer.finish().map_err(archive_err)?.into_inner();
    let digest = format!("{:x}", hasher.finalize());

    debug!(
        source.dir = %root.display(),
        files = files.len(),
        bytes = archive.len(),
        digest = %digest,
        "Packaged source tree"
    );

    Ok(PackagedSource {
        archive,
        digest,
        file_count: files.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn bot_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("main.py"), "def main(request):\n    return 'ok'\n").unwrap();
        fs::write(root.join("requirements.txt"), "functions-framework==3.*\n").unwrap();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("lib/parse.py"), "X = 1\n").unwrap();
        fs::create_dir_all(root.join("__pycache__")).unwrap();
        fs::write(root.join("__pycache__/main.cpython-312.pyc"), [0u8, 1, 2]).unwrap();
        fs::create_dir_all(root.join("test")).unwrap();
        fs::write(root.join("test/test_parsing.py"), "def test(): pass\n").unwrap();
        fs::create_dir_all(root.join(".venv/bin")).unwrap();
        fs::write(root.join(".venv/bin/python"), "").unwrap();
        fs::write(root.join("lib/stale.pyc"), [9u8]).unwrap();
        dir
    }

    #[test]
    fn test_skips_caches_venv_and_tests() {
        let dir = bot_tree();
        let names: Vec<String> = collect_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["lib/parse.py", "main.py", "requirements.txt"]);
    }

    #[test]
    fn test_archive_contains_shipped_files() {
        let dir = bot_tree();
        let packaged = package(dir.path()).unwrap();
        assert_eq!(packaged.file_count, 3);

        let archive = zip::ZipArchive::new(Cursor::new(packaged.archive)).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["lib/parse.py", "main.py", "requirements.txt"]);
    }

    #[test]
    fn test_digest_is_stable_and_tracks_content() {
        let dir = bot_tree();
        let first = package(dir.path()).unwrap();
        let second = package(dir.path()).unwrap();
        assert_eq!(first.digest, second.digest);
        assert_eq!(first.archive, second.archive);
        assert_eq!(first.digest.len(), 64);

        fs::write(dir.path().join("main.py"), "def main(request):\n    return 'v2'\n").unwrap();
        let changed = package(dir.path()).unwrap();
        assert_ne!(first.digest, changed.digest);
    }

    #[test]
    fn test_skipped_files_do_not_affect_digest() {
        let dir = bot_tree();
        let before = package(dir.path()).unwrap();
        fs::write(dir.path().join("__pycache__/other.pyc"), [7u8]).unwrap();
        fs::write(dir.path().join("test/test_more.py"), "x = 2\n").unwrap();
        let after = package(dir.path()).unwrap();
        assert_eq!(before.digest, after.digest);
    }

    #[test]
    fn test_renaming_a_file_changes_digest() {
        let dir = bot_tree();
        let before = package(dir.path()).unwrap();
        fs::rename(dir.path().join("lib/parse.py"), dir.path().join("lib/parsing.py")).unwrap();
        let after = package(dir.path()).unwrap();
        assert_ne!(before.digest, after.digest);
    }

    #[test]
    fn test_missing_directory_is_a_source_error() {
        let dir = TempDir::new().unwrap();
        let err = package(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ProvisionError::Source { .. }));
    }
}

//! Deployment archive builder.
//!
//! Mirrors a source tree into a staging directory, leaving out build
//! artifacts and caches, then zips the staging tree into a single archive.
//! The staging directory is a [`tempfile::TempDir`] so it disappears whether
//! the build succeeds or fails.

use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub fn default_exclude_extensions() -> Vec<String> {
    [".pyc", ".pyo", ".pyd"].iter().map(|s| s.to_string()).collect()
}

pub fn default_exclude_dirs() -> Vec<String> {
    [
        "__pycache__",
        ".venv",
        "venv",
        ".git",
        ".vscode",
        ".pytest_cache",
        ".python_packages",
        "node_modules",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ---------------------------------------------------------------------------
// Exclusions
// ---------------------------------------------------------------------------

/// File-selection rules for a package build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusions {
    extensions: Vec<String>,
    dir_fragments: Vec<String>,
}

impl Exclusions {
    /// Extensions match case-insensitively with or without a leading dot.
    /// Directory fragments match as substrings of the `/`-separated path
    /// relative to the source root.
    pub fn new(extensions: &[String], dir_fragments: &[String]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            dir_fragments: dir_fragments
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn path_excluded(&self, rel: &str) -> bool {
        self.dir_fragments.iter().any(|frag| rel.contains(frag.as_str()))
    }

    pub fn file_excluded(&self, rel: &str) -> bool {
        if self.path_excluded(rel) {
            return true;
        }
        let ext = Path::new(rel)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext {
            Some(ext) => self.extensions.iter().any(|x| *x == ext),
            None => false,
        }
    }
}

impl Default for Exclusions {
    fn default() -> Self {
        Self::new(&default_exclude_extensions(), &default_exclude_dirs())
    }
}

// ---------------------------------------------------------------------------
// PackageReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageReport {
    pub archive: PathBuf,
    pub size_bytes: u64,
    /// File entries in the archive, sorted.
    pub entries: Vec<String>,
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// build_archive
// ---------------------------------------------------------------------------

/// Build `archive` from `source`, replacing any archive already there.
///
/// Fails before touching the filesystem when `source` is not a directory.
/// The zip is written to a temporary file beside `archive` and renamed over
/// it, so a failed build leaves the previous archive in place.
pub fn build_archive(
    source: &Path,
    archive: &Path,
    exclusions: &Exclusions,
) -> Result<PackageReport> {
    if !source.is_dir() {
        return Err(DeployError::SourceNotFound(source.display().to_string()));
    }
    let file_name = archive
        .file_name()
        .ok_or_else(|| DeployError::InvalidName(archive.display().to_string()))?;
    let parent = archive
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;

    let staging = tempfile::Builder::new()
        .prefix("secagent-package-")
        .tempdir()?;
    tracing::debug!(staging = %staging.path().display(), "created staging directory");

    // The archive may live inside the source tree; never package it. Both
    // sides are canonical so `..` segments and linked directories still match.
    let archive_canonical = std::fs::canonicalize(parent)?.join(file_name);
    let mut walk = Mirror {
        exclusions,
        archive: &archive_canonical,
        ancestors: vec![std::fs::canonicalize(source)?],
        skipped: 0,
    };
    walk.copy_dir(source, staging.path(), "")?;
    let skipped = walk.skipped;

    let mut pending = NamedTempFile::new_in(parent)?;
    write_zip(staging.path(), pending.as_file_mut())?;
    pending.persist(archive).map_err(|e| e.error)?;
    staging.close()?;

    let size_bytes = std::fs::metadata(archive)?.len();
    let entries = list_entries(archive)?;
    tracing::info!(
        archive = %archive.display(),
        size_bytes,
        files = entries.len(),
        skipped,
        "package built"
    );

    Ok(PackageReport {
        archive: archive.to_path_buf(),
        size_bytes,
        entries,
        skipped,
    })
}

/// Flat, sorted listing of the file entries in `archive`.
pub fn list_entries(archive: &Path) -> Result<Vec<String>> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut entries = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        if !entry.is_dir() {
            entries.push(entry.name().to_string());
        }
    }
    entries.sort();
    Ok(entries)
}

fn sorted_children(dir: &Path) -> Result<Vec<std::fs::DirEntry>> {
    let mut children: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    children.sort_by_key(|e| e.file_name());
    Ok(children)
}

fn join_rel(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

// ---------------------------------------------------------------------------
// Mirror
// ---------------------------------------------------------------------------

/// Copies the included part of a source tree into staging. Symlinks are
/// followed, so linked files and directories are packaged as their targets.
struct Mirror<'a> {
    exclusions: &'a Exclusions,
    archive: &'a Path,
    /// Canonical directories on the current walk path; a link back to one of
    /// them would recurse forever.
    ancestors: Vec<PathBuf>,
    skipped: usize,
}

impl Mirror<'_> {
    fn copy_dir(&mut self, src_dir: &Path, dst_dir: &Path, rel_prefix: &str) -> Result<()> {
        for entry in sorted_children(src_dir)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = join_rel(rel_prefix, &name);
            let path = entry.path();

            let meta = match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %rel, error = %e, "skipping unreadable entry");
                    self.skipped += 1;
                    continue;
                }
            };

            if meta.is_dir() {
                if self.exclusions.path_excluded(&rel) {
                    tracing::debug!(path = %rel, "skipping excluded directory");
                    continue;
                }
                let canonical = std::fs::canonicalize(&path)?;
                if self.ancestors.contains(&canonical) {
                    tracing::warn!(path = %rel, "skipping symlink cycle");
                    continue;
                }
                let target = dst_dir.join(&name);
                std::fs::create_dir_all(&target)?;
                self.ancestors.push(canonical);
                self.copy_dir(&path, &target, &rel)?;
                self.ancestors.pop();
            } else if meta.is_file() {
                if self.exclusions.file_excluded(&rel)
                    || std::fs::canonicalize(&path)? == self.archive
                {
                    self.skipped += 1;
                    continue;
                }
                std::fs::copy(&path, dst_dir.join(&name))?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Zip
// ---------------------------------------------------------------------------

fn write_zip<W: Write + Seek>(staging: &Path, out: W) -> Result<()> {
    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    add_dir(&mut zip, staging, "", options)?;
    zip.finish()?;
    Ok(())
}

fn add_dir<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    rel_prefix: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    for entry in sorted_children(dir)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = join_rel(rel_prefix, &name);
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            zip.add_directory(format!("{rel}/"), options)?;
            add_dir(zip, &path, &rel, options)?;
        } else {
            zip.start_file(rel, options)?;
            zip.write_all(&std::fs::read(&path)?)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, rel.as_bytes()).unwrap();
    }

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let src = dir.path();
        touch(src, "function_app.py");
        touch(src, "host.json");
        touch(src, "requirements.txt");
        touch(src, "shared/cosmos.py");
        touch(src, "shared/cosmos.pyc");
        touch(src, "shared/__pycache__/cosmos.cpython-311.pyc");
        touch(src, "__pycache__/function_app.cpython-311.pyc");
        touch(src, ".venv/lib/site.py");
        touch(src, ".vscode/settings.json");
        touch(src, "native/ext.PYD");
        touch(src, "README");
        dir
    }

    #[test]
    fn archive_contains_exactly_included_files() {
        let src = sample_tree();
        let out = TempDir::new().unwrap();
        let archive = out.path().join("app.zip");

        let report = build_archive(src.path(), &archive, &Exclusions::default()).unwrap();

        assert_eq!(
            report.entries,
            vec![
                "README",
                "function_app.py",
                "host.json",
                "requirements.txt",
                "shared/cosmos.py",
            ]
        );
        assert_eq!(list_entries(&archive).unwrap(), report.entries);
        assert_eq!(report.size_bytes, std::fs::metadata(&archive).unwrap().len());
        assert!(report.skipped >= 2);
    }

    #[test]
    fn membership_is_stable_across_builds() {
        let src = sample_tree();
        let out = TempDir::new().unwrap();
        let archive = out.path().join("app.zip");

        let first = build_archive(src.path(), &archive, &Exclusions::default()).unwrap();
        let second = build_archive(src.path(), &archive, &Exclusions::default()).unwrap();
        assert_eq!(first.entries, second.entries);
    }

    #[test]
    fn missing_source_creates_nothing() {
        let out = TempDir::new().unwrap();
        let archive = out.path().join("app.zip");
        let err = build_archive(&out.path().join("nope"), &archive, &Exclusions::default())
            .unwrap_err();
        assert!(matches!(err, DeployError::SourceNotFound(_)));
        assert!(!archive.exists());
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn replaces_previous_archive() {
        let src = sample_tree();
        let out = TempDir::new().unwrap();
        let archive = out.path().join("app.zip");
        std::fs::write(&archive, b"not a zip").unwrap();

        let report = build_archive(src.path(), &archive, &Exclusions::default()).unwrap();
        assert!(report.entries.contains(&"host.json".to_string()));
    }

    #[test]
    fn archive_inside_source_is_not_packaged() {
        let src = sample_tree();
        let archive = src.path().join("function_app.zip");
        build_archive(src.path(), &archive, &Exclusions::default()).unwrap();
        let report = build_archive(src.path(), &archive, &Exclusions::default()).unwrap();
        assert!(!report.entries.iter().any(|e| e.ends_with(".zip")));
    }

    #[test]
    fn extension_matching_ignores_case_and_dot() {
        let ex = Exclusions::new(&["PYC".to_string(), ".log".to_string()], &[]);
        assert!(ex.file_excluded("a/b.pyc"));
        assert!(ex.file_excluded("run.LOG"));
        assert!(!ex.file_excluded("main.py"));
        assert!(!ex.file_excluded("Makefile"));
    }

    #[test]
    fn directory_fragments_match_relative_path() {
        let ex = Exclusions::new(&[], &["tests".to_string()]);
        assert!(ex.path_excluded("tests/test_app.py"));
        assert!(ex.path_excluded("pkg/unit_tests/x.py"));
        assert!(!ex.path_excluded("pkg/test.py"));
    }

    #[test]
    fn custom_exclusions_are_honoured() {
        let src = sample_tree();
        touch(src.path(), "local.settings.json");
        let out = TempDir::new().unwrap();
        let archive = out.path().join("app.zip");
        let dirs: Vec<String> = ["shared", ".venv", "__pycache__", ".vscode", "local.settings"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let ex = Exclusions::new(&[".txt".to_string()], &dirs);

        let report = build_archive(src.path(), &archive, &ex).unwrap();
        assert_eq!(
            report.entries,
            vec!["README", "function_app.py", "host.json", "native/ext.PYD"]
        );
    }

    #[test]
    fn failed_build_leaves_existing_path_alone() {
        let src = sample_tree();
        let out = TempDir::new().unwrap();
        // A directory where the archive should go makes the final rename fail.
        let archive = out.path().join("app.zip");
        std::fs::create_dir(&archive).unwrap();
        std::fs::write(archive.join("keep.txt"), "previous").unwrap();

        assert!(build_archive(src.path(), &archive, &Exclusions::default()).is_err());
        assert_eq!(
            std::fs::read_to_string(archive.join("keep.txt")).unwrap(),
            "previous"
        );
        let names: Vec<_> = std::fs::read_dir(out.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("app.zip")]);
    }

    #[test]
    fn successful_build_leaves_only_the_archive() {
        let src = sample_tree();
        let out = TempDir::new().unwrap();
        let archive = out.path().join("app.zip");
        build_archive(src.path(), &archive, &Exclusions::default()).unwrap();
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 1);
    }

    #[test]
    fn archive_path_with_parent_segments_is_not_packaged() {
        let src = sample_tree();
        let archive = src.path().join("shared/../function_app.zip");
        build_archive(src.path(), &archive, &Exclusions::default()).unwrap();
        let report = build_archive(src.path(), &archive, &Exclusions::default()).unwrap();
        assert!(!report.entries.iter().any(|e| e.ends_with(".zip")));
        assert!(src.path().join("function_app.zip").is_file());
    }

    #[cfg(unix)]
    mod symlinks {
        use super::*;
        use std::os::unix::fs::symlink;

        #[test]
        fn linked_file_and_directory_are_packaged() {
            let root = TempDir::new().unwrap();
            touch(root.path(), "shared_lib.py");
            touch(root.path(), "common/util.py");
            touch(root.path(), "src/function_app.py");
            let src = root.path().join("src");
            symlink("../shared_lib.py", src.join("helpers.py")).unwrap();
            symlink("../common", src.join("common")).unwrap();

            let out = TempDir::new().unwrap();
            let report =
                build_archive(&src, &out.path().join("app.zip"), &Exclusions::default()).unwrap();
            assert_eq!(
                report.entries,
                vec!["common/util.py", "function_app.py", "helpers.py"]
            );
            assert_eq!(report.skipped, 0);
        }

        #[test]
        fn linked_archive_directory_is_recognised() {
            let src = sample_tree();
            let elsewhere = TempDir::new().unwrap();
            let link = elsewhere.path().join("src-link");
            symlink(src.path(), &link).unwrap();
            let archive = link.join("function_app.zip");

            build_archive(src.path(), &archive, &Exclusions::default()).unwrap();
            let report = build_archive(src.path(), &archive, &Exclusions::default()).unwrap();
            assert!(!report.entries.iter().any(|e| e.ends_with(".zip")));
        }

        #[test]
        fn link_cycle_is_not_followed() {
            let src = TempDir::new().unwrap();
            touch(src.path(), "function_app.py");
            symlink(".", src.path().join("loop")).unwrap();

            let out = TempDir::new().unwrap();
            let report =
                build_archive(src.path(), &out.path().join("app.zip"), &Exclusions::default())
                    .unwrap();
            assert_eq!(report.entries, vec!["function_app.py"]);
        }

        #[test]
        fn dangling_link_is_counted_as_skipped() {
            let src = TempDir::new().unwrap();
            touch(src.path(), "function_app.py");
            symlink("missing.py", src.path().join("gone.py")).unwrap();

            let out = TempDir::new().unwrap();
            let report =
                build_archive(src.path(), &out.path().join("app.zip"), &Exclusions::default())
                    .unwrap();
            assert_eq!(report.entries, vec!["function_app.py"]);
            assert_eq!(report.skipped, 1);
        }
    }
}

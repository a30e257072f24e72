use std::fs;
use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::TaskError;

/// Files under a base directory selected by include and exclude globs.
///
/// Patterns are relative to `base`. A single `*` never crosses a path
/// separator, so `*.scss` only matches files directly under `base` while
/// `**/*.scss` matches at any depth.
#[derive(Debug, Clone)]
pub struct FileSet {
    base: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

fn build_globs(patterns: &[&str]) -> Result<GlobSet, TaskError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| TaskError::InvalidPattern {
                pattern: (*pattern).to_string(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| TaskError::InvalidPattern {
        pattern: patterns.join(", "),
        source,
    })
}

impl FileSet {
    pub fn new(base: impl Into<PathBuf>, include: &[&str], exclude: &[&str]) -> Result<Self, TaskError> {
        Ok(Self {
            base: base.into(),
            include: build_globs(include)?,
            exclude: build_globs(exclude)?,
        })
    }

    /// Every file under `base`
    pub fn all(base: impl Into<PathBuf>) -> Result<Self, TaskError> {
        Self::new(base, &["**/*"], &[])
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of `path` relative to the base, if it lies under it
    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.base).ok()
    }

    /// Check a path (absolute under `base`, or already relative) against the globs
    pub fn matches(&self, path: &Path) -> bool {
        let relative = if path.is_absolute() {
            match self.relative(path) {
                Some(r) => r,
                None => return false,
            }
        } else {
            path
        };

        if relative.as_os_str().is_empty() {
            return false;
        }

        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }

    /// Walk `base` and return the matched files in walk order.
    /// A missing base yields no files.
    pub fn files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.base)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                self.relative(e.path())
                    .map(|r| self.include.is_match(r) && !self.exclude.is_match(r))
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect()
    }

    /// Destination of a matched file when mirrored under `dest`
    pub fn destination(&self, file: &Path, dest: &Path) -> Option<PathBuf> {
        self.relative(file).map(|r| dest.join(r))
    }
}

/// Files and bytes written by a copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

impl Add for CopyStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            files: self.files + rhs.files,
            bytes: self.bytes + rhs.bytes,
        }
    }
}

impl AddAssign for CopyStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Create a directory and its parents
pub fn ensure_dir(path: &Path) -> Result<(), TaskError> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| {
        // Check for disk full error
        if e.raw_os_error() == Some(28) {
            // ENOSPC on Unix
            return TaskError::DiskFull {
                path: path.to_path_buf(),
            };
        }
        TaskError::CreateDirFailed {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

/// Copy a single file from src to dst
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64, TaskError> {
    // Create parent directory if needed
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }

    fs::copy(src, dst).map_err(|e| {
        // Check for disk full error (ENOSPC = 28 on Unix)
        if e.raw_os_error() == Some(28) {
            return TaskError::DiskFull {
                path: dst.to_path_buf(),
            };
        }
        TaskError::CopyFailed {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            source: e,
        }
    })
}

/// Copy every file in the set to `dest`, preserving relative paths.
/// Existing destination files are overwritten.
pub fn copy_fileset(set: &FileSet, dest: &Path) -> Result<CopyStats, TaskError> {
    let mut stats = CopyStats::default();

    for src_path in set.files() {
        let Some(dst_path) = set.destination(&src_path, dest) else {
            continue;
        };

        stats.bytes += copy_file(&src_path, &dst_path)?;
        stats.files += 1;
    }

    Ok(stats)
}

/// Copy one changed file of the set into the mirrored location under `dest`.
///
/// Files outside the set, and files removed since the change was seen,
/// copy nothing.
pub fn copy_matched(set: &FileSet, file: &Path, dest: &Path) -> Result<CopyStats, TaskError> {
    if !set.matches(file) || !file.is_file() {
        return Ok(CopyStats::default());
    }

    let Some(dst_path) = set.destination(file, dest) else {
        return Ok(CopyStats::default());
    };

    let bytes = copy_file(file, &dst_path)?;
    Ok(CopyStats { files: 1, bytes })
}

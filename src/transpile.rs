//! Per-file transpilation of development scripts.
//!
//! Unlike the bundler, each file is lowered on its own with no dependency
//! resolution, keeping its path relative to the set base and getting its
//! own source map.

use std::ffi::OsString;
use std::path::Path;

use rayon::prelude::*;
use tracing::warn;

use crate::copier::{ensure_dir, FileSet};
use crate::error::TaskError;
use crate::toolchain::{flag, Toolchain};

/// Files written by a transpile run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranspileStats {
    pub files: u64,
    pub failed: u64,
}

/// esbuild arguments for transpiling one file to `outfile`
pub fn transpile_args(toolchain: &Toolchain, file: &Path, outfile: &Path) -> Vec<OsString> {
    vec![
        file.as_os_str().to_os_string(),
        OsString::from("--sourcemap"),
        flag("--target", &toolchain.target),
        flag("--outfile", outfile),
        OsString::from("--log-level=warning"),
    ]
}

/// Transpile a single file of the set into its mirrored location under `dest`
pub fn transpile_file(toolchain: &Toolchain, set: &FileSet, file: &Path, dest: &Path) -> Result<(), TaskError> {
    let Some(outfile) = set.destination(file, dest) else {
        return Ok(());
    };
    if let Some(parent) = outfile.parent() {
        ensure_dir(parent)?;
    }

    toolchain.esbuild(&transpile_args(toolchain, file, &outfile), set.base())
}

/// Transpile every file of the set in parallel.
///
/// A file that fails is logged and counted; the rest still run. A missing
/// tool fails the whole run since no file could succeed.
pub fn transpile_fileset(toolchain: &Toolchain, set: &FileSet, dest: &Path) -> Result<TranspileStats, TaskError> {
    let files = set.files();
    let results: Vec<_> = files
        .par_iter()
        .map(|file| (file, transpile_file(toolchain, set, file, dest)))
        .collect();

    let mut stats = TranspileStats::default();
    for (file, result) in results {
        match result {
            Ok(()) => stats.files += 1,
            Err(e @ TaskError::ToolMissing { .. }) => return Err(e),
            Err(e) => {
                warn!(path = %file.display(), error = %e, "transpile failed");
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

/// Transpile one changed file, skipping files outside the set or removed
pub fn transpile_matched(toolchain: &Toolchain, set: &FileSet, file: &Path, dest: &Path) -> Result<bool, TaskError> {
    if !set.matches(file) || !file.is_file() {
        return Ok(false);
    }
    transpile_file(toolchain, set, file, dest)?;
    Ok(true)
}

//! Distributable packaging.
//!
//! The build output directory is archived in full on every run. Entry
//! names are relative to the packaged directory, so the archive's top
//! level mirrors its contents.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::copier::ensure_dir;
use crate::error::TaskError;

/// Entries written to an archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
}

/// Archive entry name for a relative path, always `/`-separated
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn entry_options(mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(mode)
}

/// Zip everything under `src_dir` into `archive_path`, replacing any
/// existing archive
pub fn zip_directory(src_dir: &Path, archive_path: &Path) -> Result<ArchiveStats, TaskError> {
    let archive_error = |source| TaskError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };

    if let Some(parent) = archive_path.parent() {
        ensure_dir(parent)?;
    }

    let file = File::create(archive_path)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));

    let mut stats = ArchiveStats::default();

    for entry in WalkDir::new(src_dir)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let Ok(relative) = entry.path().strip_prefix(src_dir) else {
            continue;
        };
        let name = entry_name(relative);

        if entry.file_type().is_dir() {
            writer
                .add_directory(name, entry_options(0o755))
                .map_err(archive_error)?;
            stats.directories += 1;
        } else if entry.file_type().is_file() {
            writer.start_file(name, entry_options(0o644)).map_err(archive_error)?;
            let mut input = File::open(entry.path())?;
            stats.bytes += io::copy(&mut input, &mut writer)?;
            stats.files += 1;
        }
    }

    writer.finish().map_err(archive_error)?;
    Ok(stats)
}

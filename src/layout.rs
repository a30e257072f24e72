//! Project directory layout.
//!
//! Every path the serve and build flows read from or write to is derived
//! here from the project root, so flows never join path strings by hand.

use std::path::{Path, PathBuf};

use crate::theme::ThemeName;

/// Directory under `src/` holding the swappable themes
pub const THEME_DIR: &str = "theme";

/// Sass entry compiled by the style tasks
pub const STYLE_ENTRY: &str = "theme.scss";

/// Script entry bundled by the bundle tasks
pub const SCRIPT_ENTRY: &str = "VideoCompoLib.js";

/// Prefix of the build output directory under `dist/`
pub const PACKAGE_PREFIX: &str = "VideoPlayer";

/// Prefix of the distributable archive under `dist/`
pub const ARCHIVE_PREFIX: &str = "VideoCompoLib";

/// Resolved project directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Project root (holds package.json)
    pub root: PathBuf,
    /// Main sources: themes, style and script entries, images, assets
    pub src: PathBuf,
    /// Development-only scripts and pages
    pub src_dev: PathBuf,
    /// Vendored third-party runtime files
    pub lib: PathBuf,
    /// Serve flow output, served over HTTP
    pub devserver: PathBuf,
    /// Build flow output
    pub dist: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            src: root.join("src"),
            src_dev: root.join("src-dev"),
            lib: root.join("lib"),
            devserver: root.join("devserver"),
            dist: root.join("dist"),
            root,
        }
    }

    /// Root of all themes: src/theme
    pub fn themes_root(&self) -> PathBuf {
        self.src.join(THEME_DIR)
    }

    /// Directory of a single theme: src/theme/{name}
    pub fn theme_dir(&self, theme: &ThemeName) -> PathBuf {
        self.themes_root().join(theme.as_str())
    }

    pub fn style_entry(&self) -> PathBuf {
        self.src.join(STYLE_ENTRY)
    }

    pub fn script_entry(&self) -> PathBuf {
        self.src.join(SCRIPT_ENTRY)
    }

    /// Build output directory: dist/VideoPlayer-{version}
    pub fn package_dir(&self, version: &str) -> PathBuf {
        self.dist.join(format!("{PACKAGE_PREFIX}-{version}"))
    }

    /// Distributable archive: dist/VideoCompoLib-{version}.zip
    pub fn archive_path(&self, version: &str) -> PathBuf {
        self.dist.join(archive_name(version))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("package.json")
    }
}

/// Archive file name for a version
pub fn archive_name(version: &str) -> String {
    format!("{ARCHIVE_PREFIX}-{version}.zip")
}

/// Remove a directory tree if present
pub fn clean_dir(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

//! Theme selection and presetting.
//!
//! A theme is a directory under `src/theme/` whose files are copied over
//! `src/` before anything is compiled, so partials and assets in the theme
//! replace the base ones.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::copier::{copy_fileset, copy_matched, CopyStats, FileSet};
use crate::error::TaskError;
use crate::layout::Layout;

/// Theme used when none is selected
pub const DEFAULT_THEME: &str = "default";

/// Name of a theme directory under src/theme.
/// Newtype wrapper restricted to a single path segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThemeName(Arc<str>);

impl ThemeName {
    /// Parse an optional theme selector.
    /// `None` and the empty string select the default theme
    pub fn parse(s: Option<&str>) -> Result<Self, TaskError> {
        let name = match s.map(str::trim) {
            None | Some("") => DEFAULT_THEME,
            Some(name) => name,
        };

        if name == "." || name == ".." {
            return Err(TaskError::InvalidTheme {
                name: name.to_string(),
                reason: "must not refer to a parent or current directory",
            });
        }
        if name.contains(['/', '\\']) {
            return Err(TaskError::InvalidTheme {
                name: name.to_string(),
                reason: "must be a single directory name",
            });
        }

        Ok(Self(Arc::from(name)))
    }

    /// Get the inner string reference
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_default(&self) -> bool {
        &*self.0 == DEFAULT_THEME
    }
}

impl Default for ThemeName {
    fn default() -> Self {
        Self(Arc::from(DEFAULT_THEME))
    }
}

impl fmt::Display for ThemeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// All files of the selected theme
pub fn theme_fileset(layout: &Layout, theme: &ThemeName) -> Result<FileSet, TaskError> {
    FileSet::all(layout.theme_dir(theme))
}

/// Copy the selected theme over src/.
/// A missing theme directory copies nothing
pub fn preset_theme(layout: &Layout, theme: &ThemeName) -> Result<CopyStats, TaskError> {
    let set = theme_fileset(layout, theme)?;
    if !set.base().is_dir() {
        debug!(theme = %theme, path = %set.base().display(), "theme directory not found");
    }
    copy_fileset(&set, &layout.src)
}

/// Re-copy a single changed theme file into src/
pub fn preset_changed(layout: &Layout, theme: &ThemeName, file: &Path) -> Result<CopyStats, TaskError> {
    copy_matched(&theme_fileset(layout, theme)?, file, &layout.src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project_with_themes(temp: &TempDir) -> Layout {
        let layout = Layout::new(temp.path());
        let default = layout.themes_root().join("default");
        let custom = layout.themes_root().join("custom");
        fs::create_dir_all(default.join("sass")).unwrap();
        fs::create_dir_all(custom.join("image")).unwrap();
        fs::write(default.join("sass").join("_vars.scss"), "$accent: red;").unwrap();
        fs::write(custom.join("image").join("logo.png"), "logo").unwrap();
        fs::write(custom.join("_vars.scss"), "$accent: blue;").unwrap();
        layout
    }

    // ==================== ThemeName tests ====================

    #[test]
    fn test_theme_name_default_when_absent() {
        let theme = ThemeName::parse(None).unwrap();
        assert_eq!(theme.as_str(), "default");
        assert!(theme.is_default());
    }

    #[test]
    fn test_theme_name_default_when_empty() {
        assert_eq!(ThemeName::parse(Some("")).unwrap(), ThemeName::default());
        assert_eq!(ThemeName::parse(Some("  ")).unwrap(), ThemeName::default());
    }

    #[test]
    fn test_theme_name_custom() {
        let theme = ThemeName::parse(Some("custom")).unwrap();
        assert_eq!(theme.to_string(), "custom");
        assert!(!theme.is_default());
    }

    #[test]
    fn test_theme_name_rejects_paths() {
        assert!(ThemeName::parse(Some("../etc")).is_err());
        assert!(ThemeName::parse(Some("a/b")).is_err());
        assert!(ThemeName::parse(Some("a\\b")).is_err());
        assert!(ThemeName::parse(Some("..")).is_err());
    }

    // ==================== preset_theme tests ====================

    #[test]
    fn test_preset_default_theme() {
        let temp = TempDir::new().unwrap();
        let layout = project_with_themes(&temp);

        let stats = preset_theme(&layout, &ThemeName::default()).unwrap();

        assert_eq!(stats.files, 1);
        assert_eq!(
            fs::read_to_string(layout.src.join("sass").join("_vars.scss")).unwrap(),
            "$accent: red;"
        );
        assert!(!layout.src.join("image").join("logo.png").exists());
    }

    #[test]
    fn test_preset_custom_theme() {
        let temp = TempDir::new().unwrap();
        let layout = project_with_themes(&temp);
        let theme = ThemeName::parse(Some("custom")).unwrap();

        let stats = preset_theme(&layout, &theme).unwrap();

        assert_eq!(stats.files, 2);
        assert!(layout.src.join("image").join("logo.png").exists());
        assert_eq!(
            fs::read_to_string(layout.src.join("_vars.scss")).unwrap(),
            "$accent: blue;"
        );
    }

    #[test]
    fn test_preset_missing_theme_copies_nothing() {
        let temp = TempDir::new().unwrap();
        let layout = project_with_themes(&temp);
        let theme = ThemeName::parse(Some("missing")).unwrap();

        let stats = preset_theme(&layout, &theme).unwrap();

        assert_eq!(stats, CopyStats::default());
    }

    #[test]
    fn test_preset_changed_single_file() {
        let temp = TempDir::new().unwrap();
        let layout = project_with_themes(&temp);
        let theme = ThemeName::parse(Some("custom")).unwrap();
        let changed = layout.theme_dir(&theme).join("image").join("logo.png");

        let stats = preset_changed(&layout, &theme, &changed).unwrap();

        assert_eq!(stats.files, 1);
        assert!(layout.src.join("image").join("logo.png").exists());
        assert!(!layout.src.join("_vars.scss").exists());
    }
}

//! External tool invocation.
//!
//! Script bundling and transpilation are handed to an `esbuild`
//! executable; this module locates it, runs it, and turns its exit status
//! into a typed error carrying stderr.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::error::TaskError;

/// Language level scripts are lowered to
pub const DEFAULT_TARGET: &str = "es2015";

/// External tools used by the script tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// esbuild executable (name resolved through PATH, or a path)
    pub esbuild: PathBuf,
    /// Transpilation target passed as --target
    pub target: String,
}

impl Toolchain {
    pub fn new(esbuild: impl Into<PathBuf>) -> Self {
        Self {
            esbuild: esbuild.into(),
            target: DEFAULT_TARGET.to_string(),
        }
    }

    /// Run esbuild with the given arguments from `cwd`
    pub fn esbuild(&self, args: &[OsString], cwd: &Path) -> Result<(), TaskError> {
        run_tool(&self.esbuild, args, cwd)
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::new("esbuild")
    }
}

/// Run an external tool to completion, mapping failures to errors
pub fn run_tool(tool: &Path, args: &[OsString], cwd: &Path) -> Result<(), TaskError> {
    debug!(tool = %tool.display(), ?args, "running tool");

    let output = Command::new(tool)
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                TaskError::ToolMissing {
                    tool: tool.to_path_buf(),
                }
            } else {
                TaskError::Io(e)
            }
        })?;

    if !output.stderr.is_empty() && output.status.success() {
        warn!(tool = %tool.display(), "{}", String::from_utf8_lossy(&output.stderr).trim_end());
    }

    if output.status.success() {
        Ok(())
    } else {
        Err(TaskError::ToolFailed {
            tool: tool.display().to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        })
    }
}

/// Build a `--flag=value` argument
pub(crate) fn flag(name: &str, value: impl AsRef<std::ffi::OsStr>) -> OsString {
    let mut arg = OsString::from(name);
    arg.push("=");
    arg.push(value);
    arg
}

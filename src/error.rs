use std::path::PathBuf;
use thiserror::Error;

/// Task error types
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Failed to copy {src} to {dst}")]
    CopyFailed {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory: {path}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No space left on device for {path}")]
    DiskFull { path: PathBuf },

    #[error("Invalid glob pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Invalid theme name '{name}': {reason}")]
    InvalidTheme { name: String, reason: &'static str },

    #[error("Invalid package manifest: {path}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to compile {path}: {message}")]
    StyleCompile { path: PathBuf, message: String },

    #[error("Tool not found: {tool}")]
    ToolMissing { tool: PathBuf },

    #[error("{tool} failed with exit code {code}: {stderr}")]
    ToolFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to write archive {path}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to watch {path}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Failed to bind dev server on {addr}: {message}")]
    ServerBind { addr: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

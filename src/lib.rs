//! # VideoCompoLib Build
//!
//! Task runner for the VideoCompoLib player: assembles a live-reloading
//! development tree and produces the versioned distributable archive.
//!
//! ## Features
//!
//! - Theme presets copied over the main sources
//! - Sass compilation with vendor prefixing, minification and source maps
//! - Script bundling and transpiling through esbuild
//! - Staged task graphs run in parallel using Rayon
//! - Filesystem watches and a static dev server with live reload
//! - Zip packaging of the build output
//!
//! ## Usage
//!
//! ```ignore
//! use videocompo_build::flows::Project;
//!
//! let project = Arc::new(Project::load(layout, theme, toolchain)?);
//! let reports = project.build_graph().run(&stats, &|_| {});
//! ```

/// Zip packaging of the build output
pub mod archive;

/// CLI configuration and argument parsing
pub mod config;

/// Glob-selected file sets and buffered copying
pub mod copier;

/// Error types for task operations
pub mod error;

/// Serve and build flows
pub mod flows;

/// Project directory layout
pub mod layout;

/// package.json metadata
pub mod manifest;

/// Script bundling and banner
pub mod script;

/// Static dev server with live reload
pub mod server;

/// Sass compilation and CSS post-processing
pub mod style;

/// Staged task graph execution
pub mod tasks;

/// Theme selection and preset
pub mod theme;

/// External tool invocation
pub mod toolchain;

/// Development script transpiling
pub mod transpile;

/// Filesystem watches
pub mod watcher;

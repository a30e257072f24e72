//! Script bundling.
//!
//! The entry module and its dependency graph are bundled, transpiled and
//! optionally minified by esbuild into a single file with an external
//! source map. A comment banner carrying the package version and the build
//! time is placed at the top of the bundle.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};

use crate::copier::ensure_dir;
use crate::error::TaskError;
use crate::manifest::Manifest;
use crate::toolchain::{flag, Toolchain};

/// Bundle banner: version, build time, and the runtime libraries the page
/// must provide. Date fields are not zero-padded.
pub fn banner<Tz: TimeZone>(manifest: &Manifest, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut lines = vec![
        "/**".to_string(),
        format!(" * @version v{}", manifest.version),
        format!(" * @Date <{}>", at.format("%Y-%-m-%-d %-H:%-M:%-S")),
    ];
    for (name, range) in &manifest.peer_dependencies {
        lines.push(format!(" * @require {name}: {range}"));
    }
    lines.push(" */".to_string());
    lines.join("\n")
}

/// Bundles the script entry with esbuild
#[derive(Debug, Clone)]
pub struct ScriptBundler {
    entry: PathBuf,
    minify: bool,
}

impl ScriptBundler {
    pub fn new(entry: impl Into<PathBuf>, minify: bool) -> Self {
        Self {
            entry: entry.into(),
            minify,
        }
    }

    /// Bundle output path under `dest`, named after the entry
    pub fn output_path(&self, dest: &Path) -> PathBuf {
        match self.entry.file_name() {
            Some(name) => dest.join(name),
            None => dest.join("bundle.js"),
        }
    }

    /// esbuild arguments for a bundle written to `outfile`
    pub fn args(&self, toolchain: &Toolchain, outfile: &Path, banner: &str) -> Vec<OsString> {
        let mut args = vec![
            self.entry.clone().into_os_string(),
            OsString::from("--bundle"),
            OsString::from("--sourcemap"),
            flag("--target", &toolchain.target),
            flag("--outfile", outfile),
            flag("--banner:js", banner),
            OsString::from("--log-level=warning"),
        ];
        if self.minify {
            args.push(OsString::from("--minify"));
        }
        args
    }

    /// Bundle into `dest`, returning the bundle path.
    /// On failure the previous bundle is left untouched
    pub fn bundle(&self, toolchain: &Toolchain, manifest: &Manifest, dest: &Path) -> Result<PathBuf, TaskError> {
        ensure_dir(dest)?;

        let outfile = self.output_path(dest);
        let banner = banner(manifest, &Local::now());
        let cwd = self.entry.parent().unwrap_or(dest);

        toolchain.esbuild(&self.args(toolchain, &outfile, &banner), cwd)?;
        Ok(outfile)
    }
}

//! Stylesheet compilation.
//!
//! The Sass entry (and everything it imports) is compiled with `grass`.
//! Compressed output is then parsed, prefixed and minified as a whole by
//! `lightningcss`. Readable output keeps grass's declarations as written
//! and only gains the vendor-prefixed variants `lightningcss` produces for
//! each one. Neither mode rewrites `z-index` values.
//!
//! The source map's single source is the intermediate CSS grass emitted,
//! named after the output file and embedded as its content.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::{OriginalLocation, SourceMap};

use crate::copier::ensure_dir;
use crate::error::TaskError;

/// Encode a browser version the way lightningcss expects
const fn version(major: u32, minor: u32) -> Option<u32> {
    Some((major << 16) | (minor << 8))
}

/// Oldest browsers the player supports
fn browser_targets() -> Targets {
    Targets::from(Browsers {
        android: version(4, 4),
        chrome: version(49, 0),
        edge: version(16, 0),
        firefox: version(52, 0),
        ie: version(11, 0),
        ios_saf: version(9, 0),
        safari: version(9, 0),
        ..Browsers::default()
    })
}

/// Split an expanded-style declaration line into its indent and
/// `name: value` body. Custom properties are left alone.
fn declaration(line: &str) -> Option<(&str, &str)> {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    if indent.is_empty() {
        return None;
    }

    let body = body.trim_end().strip_suffix(';')?;
    let (name, _) = body.split_once(':')?;
    let name = name.trim();
    let is_property = !name.is_empty()
        && !name.starts_with("--")
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    is_property.then_some((indent, body))
}

/// Declarations lightningcss prints for a single `name: value`, with the
/// prefixing pass applied when `prefix` is set
fn printed_declarations(body: &str, prefix: bool) -> Option<Vec<String>> {
    let source = format!("a {{ {body}; }}");
    let mut sheet = StyleSheet::parse(&source, ParserOptions::default()).ok()?;
    if prefix {
        sheet
            .minify(MinifyOptions {
                targets: browser_targets(),
                ..MinifyOptions::default()
            })
            .ok()?;
    }
    let printed = sheet
        .to_css(PrinterOptions {
            targets: browser_targets(),
            ..PrinterOptions::default()
        })
        .ok()?;

    Some(
        printed
            .code
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.ends_with('{') && *l != "}")
            .map(|l| l.trim_end_matches(';').to_string())
            .collect(),
    )
}

/// Vendor-prefixed variants of a declaration, without the declaration itself
fn prefixed_variants(body: &str) -> Vec<String> {
    let (Some(plain), Some(prefixed)) = (printed_declarations(body, false), printed_declarations(body, true)) else {
        return Vec::new();
    };
    prefixed.into_iter().filter(|d| !plain.contains(d)).collect()
}

/// Paths written by a compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleOutput {
    pub css_path: PathBuf,
    pub map_path: PathBuf,
    pub bytes: u64,
}

/// Compiled stylesheet and its source map, not yet written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedStyle {
    pub css: String,
    pub map: String,
}

/// Compiles a Sass entry file to CSS
#[derive(Debug, Clone)]
pub struct StyleCompiler {
    entry: PathBuf,
    compress: bool,
}

impl StyleCompiler {
    pub fn new(entry: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            entry: entry.into(),
            compress,
        }
    }

    /// Output file name: the entry stem with a .css extension
    pub fn output_name(&self) -> String {
        let stem = self
            .entry
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "style".to_string());
        format!("{stem}.css")
    }

    fn compile_error(&self, message: impl Into<String>) -> TaskError {
        TaskError::StyleCompile {
            path: self.entry.clone(),
            message: message.into(),
        }
    }

    /// Compile, prefix and (optionally) minify without touching the disk
    pub fn render(&self) -> Result<RenderedStyle, TaskError> {
        let options = grass::Options::default().style(grass::OutputStyle::Expanded);
        let compiled = grass::from_path(&self.entry, &options).map_err(|e| self.compile_error(e.to_string()))?;

        let mut source_map = SourceMap::new("/");
        let source = source_map.add_source(&self.output_name());
        source_map
            .set_source_content(source as usize, &compiled)
            .map_err(|e| self.compile_error(format!("{e:?}")))?;

        let code = if self.compress {
            self.minified(&compiled, &mut source_map)?
        } else {
            readable(&compiled, source, &mut source_map)
        };

        let map = source_map
            .to_json(None)
            .map_err(|e| self.compile_error(format!("{e:?}")))?;

        let css = format!("{}\n/*# sourceMappingURL={}.map */\n", code, self.output_name());

        Ok(RenderedStyle { css, map })
    }

    fn minified(&self, compiled: &str, source_map: &mut SourceMap) -> Result<String, TaskError> {
        let mut sheet = StyleSheet::parse(
            compiled,
            ParserOptions {
                filename: self.output_name(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| self.compile_error(e.to_string()))?;

        sheet
            .minify(MinifyOptions {
                targets: browser_targets(),
                ..MinifyOptions::default()
            })
            .map_err(|e| self.compile_error(e.to_string()))?;

        let printed = sheet
            .to_css(PrinterOptions {
                minify: true,
                source_map: Some(source_map),
                targets: browser_targets(),
                ..PrinterOptions::default()
            })
            .map_err(|e| self.compile_error(e.to_string()))?;

        Ok(printed.code)
    }

    /// Compile into `dest`. Nothing is written unless compilation succeeds,
    /// so a bad edit leaves the previous stylesheet in place
    pub fn compile(&self, dest: &Path) -> Result<StyleOutput, TaskError> {
        let rendered = self.render()?;

        ensure_dir(dest)?;
        let css_path = dest.join(self.output_name());
        let map_path = dest.join(format!("{}.map", self.output_name()));

        fs::write(&css_path, &rendered.css)?;
        fs::write(&map_path, &rendered.map)?;

        Ok(StyleOutput {
            css_path,
            map_path,
            bytes: (rendered.css.len() + rendered.map.len()) as u64,
        })
    }
}

/// Copy grass output line by line, inserting prefixed variants ahead of
/// each declaration that needs them. Every output line maps to the line
/// it came from.
fn readable(compiled: &str, source: u32, source_map: &mut SourceMap) -> String {
    let mut variants: HashMap<&str, Vec<String>> = HashMap::new();
    let mut css = String::with_capacity(compiled.len());
    let mut generated_line = 0u32;

    for (original_line, line) in compiled.lines().enumerate() {
        let original_line = original_line as u32;

        if let Some((indent, body)) = declaration(line) {
            let column = indent.len() as u32;
            for variant in variants.entry(body).or_insert_with(|| prefixed_variants(body)).iter() {
                let original = OriginalLocation::new(original_line, column, source, None);
                source_map.add_mapping(generated_line, column, Some(original));
                css.push_str(indent);
                css.push_str(variant);
                css.push_str(";\n");
                generated_line += 1;
            }
        }

        if !line.trim().is_empty() {
            let column = (line.len() - line.trim_start().len()) as u32;
            let original = OriginalLocation::new(original_line, column, source, None);
            source_map.add_mapping(generated_line, column, Some(original));
        }
        css.push_str(line);
        css.push('\n');
        generated_line += 1;
    }

    css.truncate(css.trim_end().len());
    css
}

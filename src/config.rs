//! CLI configuration and runtime settings for the player task runner.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::layout::Layout;
use crate::server::ServeConfig;
use crate::theme::ThemeName;
use crate::toolchain::Toolchain;

/// Build, serve and package the VideoCompoLib player
#[derive(Parser, Debug)]
#[command(name = "videocompo-build")]
#[command(version)]
#[command(about = "Build, serve and package the VideoCompoLib player")]
pub struct Cli {
    /// Project root containing package.json
    #[arg(short = 'C', long = "root", global = true, default_value = ".")]
    pub root: PathBuf,

    /// Theme preset copied into src/ before compiling
    #[arg(short, long, global = true)]
    pub theme: Option<String>,

    /// Number of parallel workers
    #[arg(short, long, global = true, default_value_t = num_cpus::get())]
    pub jobs: usize,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// esbuild executable used for bundling and transpiling
    #[arg(long, global = true, env = "ESBUILD", default_value = "esbuild")]
    pub esbuild: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Assemble devserver/, watch sources and serve with live reload
    Serve(ServeArgs),
    /// Compile the distributable package and zip it
    Build,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Do not inject the live reload client
    #[arg(long)]
    pub no_livereload: bool,

    /// Write readable scripts and styles to devserver/
    #[arg(long)]
    pub no_minify: bool,
}

/// What the binary was asked to do, validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Serve { server: ServeConfig, minify: bool },
    Build,
}

/// Runtime configuration parsed from CLI
#[derive(Debug, Clone)]
pub struct Config {
    /// Project layout rooted at the canonical project root
    pub layout: Layout,
    /// Selected theme preset
    pub theme: ThemeName,
    /// External tools
    pub toolchain: Toolchain,
    /// Number of parallel workers
    pub jobs: usize,
    /// Enable verbose output
    pub verbose: bool,
    pub mode: Mode,
}

impl Config {
    /// Create Config from CLI arguments
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let root = cli.root.canonicalize().unwrap_or(cli.root);
        let theme = ThemeName::parse(cli.theme.as_deref())?;

        let mode = match cli.command {
            Command::Serve(args) => Mode::Serve {
                server: ServeConfig {
                    host: args.host,
                    port: args.port,
                    livereload: !args.no_livereload,
                },
                minify: !args.no_minify,
            },
            Command::Build => Mode::Build,
        };

        Ok(Config {
            layout: Layout::new(root),
            theme,
            toolchain: Toolchain::new(cli.esbuild),
            jobs: cli.jobs.max(1),
            verbose: cli.verbose,
            mode,
        })
    }
}

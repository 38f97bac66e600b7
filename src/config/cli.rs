//! Command-line argument definitions for stevedore.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use super::BuildDefaults;
use crate::build::BuildImageOptions;

/// Context argument that reads a tar stream from standard input.
pub const STDIN_CONTEXT: &str = "-";

/// Command-line interface for stevedore.
#[derive(Debug, Parser)]
#[command(name = "stevedore")]
#[command(
    author,
    version,
    about = "Build container images through a remote engine API"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,

    /// Log engine requests and connection lifecycle at debug level.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build an image from a context directory or a tar stream.
    Build(BuildArgs),

    /// Check that the container engine is responding.
    Ping,
}

/// Arguments for the `build` subcommand.
#[derive(Debug, Parser)]
pub struct BuildArgs {
    /// Build context directory, or `-` to read a tar archive from stdin.
    #[arg(default_value = ".")]
    pub context: String,

    /// Name and optional tag for the image (`name:tag`).
    #[arg(long, short = 't')]
    pub tag: Option<String>,

    /// Path of the Dockerfile within the build context.
    #[arg(long, short = 'f')]
    pub dockerfile: Option<String>,

    /// Do not use the build cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Always attempt to pull newer base images.
    #[arg(long)]
    pub pull: bool,

    /// Always remove intermediate containers.
    #[arg(long)]
    pub force_rm: bool,

    /// Suppress verbose build output.
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// URL of a remote build context.
    #[arg(long)]
    pub remote: Option<String>,

    /// Build-time variable in `KEY=VALUE` form.
    #[arg(long = "build-arg", value_parser = parse_key_value)]
    pub build_args: Vec<(String, String)>,

    /// Image label in `KEY=VALUE` form.
    #[arg(long = "label", value_parser = parse_key_value)]
    pub labels: Vec<(String, String)>,

    /// Memory limit in bytes.
    #[arg(long, short = 'm')]
    pub memory: Option<i64>,

    /// Print progress events as raw JSON.
    #[arg(long)]
    pub raw_json: bool,
}

impl BuildArgs {
    /// Returns true when the build context is read from standard input.
    #[must_use]
    pub fn reads_stdin(&self) -> bool {
        self.context == STDIN_CONTEXT
    }

    /// Combine these arguments with configured defaults.
    ///
    /// A flag set on the command line always enables the option; an absent
    /// flag leaves the configured default in place.
    #[must_use]
    pub fn to_options(&self, defaults: &BuildDefaults) -> BuildImageOptions {
        BuildImageOptions {
            name: self.tag.clone().unwrap_or_default(),
            dockerfile: self.dockerfile.clone().unwrap_or_default(),
            suppress_output: self.quiet,
            no_cache: self.no_cache || defaults.no_cache,
            pull: self.pull || defaults.pull,
            remove_intermediate: defaults.remove_intermediate,
            force_remove_intermediate: self.force_rm || defaults.force_remove,
            remote: self.remote.clone().unwrap_or_default(),
            memory: self.memory.unwrap_or_default(),
            build_args: self.build_args.iter().cloned().collect(),
            labels: self.labels.iter().cloned().collect(),
            ..BuildImageOptions::default()
        }
    }

    /// Returns true when progress events should be printed verbatim.
    #[must_use]
    pub const fn raw_json(&self, defaults: &BuildDefaults) -> bool {
        self.raw_json || defaults.raw_json
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((String::from(key), String::from(value))),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

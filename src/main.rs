//! `stevedore` application entry point.
//!
//! This binary builds container images through a remote engine API and
//! streams build progress to the terminal. It uses `eyre` for opaque error
//! handling at the application boundary, converting domain-specific errors
//! into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/stevedore/config.toml` or path from `STEVEDORE_CONFIG_PATH`)
//! 3. Environment variables (`STEVEDORE_*`)
//! 4. Command-line arguments

use camino::Utf8PathBuf;
use clap::Parser;
use eyre::{Report, Result as EyreResult};
use mockable::DefaultEnv;
use stevedore::api::{self, BuildContext, BuildParams, PingParams};
use stevedore::config::{AppConfig, BuildArgs, Cli, Commands, load_config};
use stevedore::engine::create_runtime;
use stevedore::error::{Result as StevedoreResult, StevedoreError, StreamError};
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Installs logging, loads configuration with layered precedence, then
/// dispatches to the appropriate subcommand handler.
fn main() -> EyreResult<()> {
    // Parse CLI first (for subcommand dispatch and global options).
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load configuration with layered precedence: defaults < file < env < CLI.
    let config = load_config(&cli).map_err(Report::from)?;

    run(&cli, &config).map_err(Report::from)
}

/// Install a `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` selects the filter, defaulting to `warn`. `--verbose` forces
/// `debug`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the CLI command, returning domain-specific errors.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to `eyre::Report`.
fn run(cli: &Cli, config: &AppConfig) -> StevedoreResult<()> {
    let runtime = create_runtime()?;
    let env = DefaultEnv::new();

    match &cli.command {
        Commands::Build(args) => build_image(cli, config, args, runtime.handle(), &env),
        Commands::Ping => ping_engine(cli, config, runtime.handle(), &env),
    }
}

/// Build an image, streaming engine output to stdout.
fn build_image(
    cli: &Cli,
    config: &AppConfig,
    args: &BuildArgs,
    runtime_handle: &Handle,
    env: &DefaultEnv,
) -> StevedoreResult<()> {
    let context = if args.reads_stdin() {
        BuildContext::Stream(Box::new(tokio::io::stdin()))
    } else {
        BuildContext::Directory(Utf8PathBuf::from(&args.context))
    };

    let mut stdout = tokio::io::stdout();
    let result = api::build(BuildParams {
        config,
        options: args.to_options(&config.build),
        context,
        output: &mut stdout,
        raw_json: args.raw_json(&config.build),
        verbose: cli.verbose,
        runtime_handle,
        env,
    });
    let flushed = runtime_handle.block_on(stdout.flush());
    result?;
    flushed.map_err(|error| {
        StevedoreError::from(StreamError::WriteFailed {
            sink: "stdout",
            message: error.to_string(),
        })
    })
}

/// Check engine health and report it on stdout.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn ping_engine(
    cli: &Cli,
    config: &AppConfig,
    runtime_handle: &Handle,
    env: &DefaultEnv,
) -> StevedoreResult<()> {
    api::ping(PingParams {
        config,
        verbose: cli.verbose,
        runtime_handle,
        env,
    })?;
    println!("OK");
    Ok(())
}

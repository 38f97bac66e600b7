//! Orchestration API for stevedore commands.
//!
//! This module provides the library-facing orchestration for each command:
//! [`build`] and [`ping`]. Both resolve the engine endpoint from
//! configuration and the environment, connect, and run the blocking engine
//! operation on the caller's runtime.
//!
//! All functions accept library-owned types (not clap types) and return
//! [`crate::error::Result`]. They do not print to stdout/stderr or call
//! `std::process::exit`.

mod build;
mod ping;

use std::sync::Arc;

pub use build::{BuildContext, BuildParams, build};
pub use ping::{PingParams, ping};

use crate::config::AppConfig;
use crate::engine::{EngineClient, SocketResolver, TracingLogger};
use crate::error::Result as StevedoreResult;

/// Connect to the engine named by `config`, falling back to the
/// environment and then the platform default socket.
///
/// TLS client files from `config.tls` are loaded when present. With
/// `verbose` set, every request is logged through `tracing`.
///
/// # Errors
///
/// Returns `EngineError::InvalidEndpoint` for a malformed endpoint,
/// `FilesystemError` when TLS files cannot be read, and
/// `EngineError::TlsSetupFailed` when TLS is configured for a Unix socket or
/// the PEM material is rejected.
pub fn connect<E: mockable::Env>(
    config: &AppConfig,
    env: &E,
    verbose: bool,
) -> StevedoreResult<EngineClient> {
    let resolver = SocketResolver::new(env);
    let endpoint = resolver.resolve(config.engine_endpoint());

    let client = match config.tls.files() {
        Some(files) => EngineClient::connect_tls(&endpoint, &files)?,
        None => EngineClient::connect(&endpoint)?,
    };
    tracing::debug!(
        endpoint = %client.endpoint(),
        tls = config.tls.files().is_some(),
        "engine client ready"
    );

    if verbose {
        Ok(client.with_logger(Arc::new(TracingLogger)))
    } else {
        Ok(client)
    }
}

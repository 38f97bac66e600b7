//! Image build orchestration.
//!
//! This module connects to the engine and runs one build, with the context
//! taken from a local directory or a caller-supplied tar stream.

use camino::Utf8PathBuf;
use tokio::io::AsyncWrite;

use crate::build::{BuildImageOptions, BuildRequest, ContextStream, build_image};
use crate::config::AppConfig;
use crate::error::Result as StevedoreResult;

use super::connect;

/// Where the build context comes from.
pub enum BuildContext {
    /// A directory packaged into a tar archive before sending.
    Directory(Utf8PathBuf),
    /// A tar archive supplied as a byte stream.
    Stream(ContextStream),
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Directory(path) => f.debug_tuple("Directory").field(path).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Parameters for building an image.
///
/// Groups the arguments required by [`build`] into a single struct to
/// satisfy the "no more than four parameters" convention.
pub struct BuildParams<'a, E: mockable::Env> {
    /// Application configuration (provides engine socket and TLS files).
    pub config: &'a AppConfig,
    /// Build flags encoded into the request query.
    pub options: BuildImageOptions,
    /// The build context source.
    pub context: BuildContext,
    /// Sink receiving decoded build output.
    pub output: &'a mut (dyn AsyncWrite + Send + Unpin),
    /// Copy progress JSON verbatim instead of rendering it.
    pub raw_json: bool,
    /// Log every engine request through `tracing`.
    pub verbose: bool,
    /// Tokio runtime handle for blocking execution.
    pub runtime_handle: &'a tokio::runtime::Handle,
    /// Environment variable provider for socket resolution.
    pub env: &'a E,
}

/// Build an image and stream its output into `params.output`.
///
/// # Errors
///
/// Returns connection errors from [`connect`], `FilesystemError` when the
/// context directory cannot be packaged, and every error documented on
/// [`crate::build::build_image_async`].
pub fn build<E: mockable::Env>(params: BuildParams<'_, E>) -> StevedoreResult<()> {
    let BuildParams {
        config,
        options,
        context,
        output,
        raw_json,
        verbose,
        runtime_handle,
        env,
    } = params;

    let client = connect(config, env, verbose)?;

    let base_request = BuildRequest::new(options)
        .with_raw_json_stream(raw_json)
        .with_output(output);
    let request = match context {
        BuildContext::Directory(dir) => base_request.with_context_dir(dir),
        BuildContext::Stream(stream) => base_request.with_input_stream(stream),
    };

    build_image(runtime_handle, &client, request)
}

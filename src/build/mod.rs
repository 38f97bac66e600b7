//! Image build requests.
//!
//! A build sends one `POST /build` request whose body is a tar build context,
//! either supplied by the caller as a byte stream or packaged from a local
//! directory. Build options travel in the query string and registry
//! credentials in two headers. The response is decoded into the caller's
//! output sink as it arrives.

mod archive;
mod auth;
mod query;

use std::collections::BTreeMap;
use std::fmt;

use camino::Utf8PathBuf;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;

pub use self::archive::{PackagingTask, PackedContext, pack_directory, stream_directory};
pub use self::auth::{
    AuthConfig, AuthConfigSet, REGISTRY_AUTH_HEADER, REGISTRY_CONFIG_HEADER, RegistryAuth,
    auth_headers,
};
pub use self::query::{QueryEncoder, QueryParams, query_string, with_query};
use crate::engine::{EngineClient, RequestBody, StreamOptions, StreamParams, Transport};
use crate::error::{BuildError, Result};

/// Path of the engine's image build endpoint.
pub const BUILD_PATH: &str = "/build";

/// Content type of a build context body.
pub const TAR_CONTENT_TYPE: &str = "application/tar";

/// Tunable flags of an image build, encoded into the request query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildImageOptions {
    /// Repository name and optional tag for the resulting image (`t`).
    pub name: String,
    /// Path of the Dockerfile within the build context.
    pub dockerfile: String,
    /// Suppress verbose build output (`q`).
    pub suppress_output: bool,
    /// Do not use the build cache (`nocache`).
    pub no_cache: bool,
    /// Always attempt to pull newer base images.
    pub pull: bool,
    /// Remove intermediate containers after a successful build (`rm`).
    pub remove_intermediate: bool,
    /// Always remove intermediate containers (`forcerm`).
    pub force_remove_intermediate: bool,
    /// URL of a remote build context.
    pub remote: String,
    /// Memory limit in bytes.
    pub memory: i64,
    /// Total memory plus swap limit in bytes.
    pub memswap: i64,
    /// Relative CPU weight (`cpushares`).
    pub cpu_shares: i64,
    /// CPUs the build may run on (`cpusetcpus`).
    pub cpuset_cpus: String,
    /// Build-time variables (`buildargs`).
    pub build_args: BTreeMap<String, String>,
    /// Labels applied to the resulting image.
    pub labels: BTreeMap<String, String>,
}

impl QueryParams for BuildImageOptions {
    fn encode_query(&self, query: &mut QueryEncoder) -> std::result::Result<(), BuildError> {
        query
            .text("t", &self.name)
            .text("dockerfile", &self.dockerfile)
            .flag("q", self.suppress_output)
            .flag("nocache", self.no_cache)
            .flag("pull", self.pull)
            .flag("rm", self.remove_intermediate)
            .flag("forcerm", self.force_remove_intermediate)
            .text("remote", &self.remote)
            .number("memory", self.memory)
            .number("memswap", self.memswap)
            .number("cpushares", self.cpu_shares)
            .text("cpusetcpus", &self.cpuset_cpus)
            .json_map("buildargs", &self.build_args)?
            .json_map("labels", &self.labels)?;
        Ok(())
    }
}

/// Caller-supplied build context byte stream.
pub type ContextStream = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// One image build: options, a context source, credentials and an output
/// sink.
///
/// Exactly one of [`Self::with_input_stream`] and [`Self::with_context_dir`]
/// must be used. The output sink is borrowed for the duration of the build.
#[derive(Default)]
pub struct BuildRequest<'a> {
    /// Flags encoded into the query string.
    pub options: BuildImageOptions,
    input_stream: Option<ContextStream>,
    context_dir: Option<Utf8PathBuf>,
    output: Option<&'a mut (dyn AsyncWrite + Send + Unpin)>,
    raw_json_stream: bool,
    auth: AuthConfig,
    auth_configs: AuthConfigSet,
}

impl<'a> BuildRequest<'a> {
    /// Create a request with the given options and no context or output.
    #[must_use]
    pub fn new(options: BuildImageOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Use a tar byte stream as the build context.
    #[must_use]
    pub fn with_input_stream(
        mut self,
        stream: impl AsyncRead + Send + Sync + Unpin + 'static,
    ) -> Self {
        self.input_stream = Some(Box::new(stream));
        self
    }

    /// Package a local directory as the build context.
    #[must_use]
    pub fn with_context_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.context_dir = Some(dir.into());
        self
    }

    /// Write build output to `output`.
    #[must_use]
    pub const fn with_output(mut self, output: &'a mut (dyn AsyncWrite + Send + Unpin)) -> Self {
        self.output = Some(output);
        self
    }

    /// Copy progress JSON verbatim instead of rendering it.
    #[must_use]
    pub const fn with_raw_json_stream(mut self, raw: bool) -> Self {
        self.raw_json_stream = raw;
        self
    }

    /// Send a single registry credential.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Send per-registry credentials.
    #[must_use]
    pub fn with_auth_configs(mut self, auth_configs: AuthConfigSet) -> Self {
        self.auth_configs = auth_configs;
        self
    }
}

impl fmt::Debug for BuildRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildRequest")
            .field("options", &self.options)
            .field("input_stream", &self.input_stream.is_some())
            .field("context_dir", &self.context_dir)
            .field("output", &self.output.is_some())
            .field("raw_json_stream", &self.raw_json_stream)
            .field("auth", &self.auth)
            .field("auth_configs", &self.auth_configs)
            .finish()
    }
}

/// Build an image and stream its progress into the request's output sink
/// (async version).
///
/// Validation happens before any network I/O: the output sink is required,
/// credentials must encode, and exactly one context source must be present.
///
/// # Errors
///
/// Returns `BuildError::MissingOutputStream`, `BuildError::MissingContext`
/// or `BuildError::MultipleContexts` for an incomplete request,
/// `FilesystemError` if the context directory cannot be packaged, any
/// transport or API error from the engine, `BuildError::RemoteBuild` when
/// the engine reports a failed build, and `StreamError` when the response
/// cannot be decoded. Output written before a failure is not rolled back.
pub async fn build_image_async<T: Transport>(
    client: &EngineClient<T>,
    request: BuildRequest<'_>,
) -> Result<()> {
    let BuildRequest {
        options,
        input_stream,
        context_dir,
        output,
        raw_json_stream,
        auth,
        auth_configs,
    } = request;

    let stdout = output.ok_or(BuildError::MissingOutputStream)?;
    let mut headers = auth_headers(&[
        RegistryAuth::Single(&auth),
        RegistryAuth::Set(&auth_configs),
    ])?;

    let (body, packaging) = match (input_stream, context_dir) {
        (None, None) => return Err(BuildError::MissingContext.into()),
        (Some(_), Some(_)) => return Err(BuildError::MultipleContexts.into()),
        (Some(stream), None) => (RequestBody::Reader(stream), None),
        (None, Some(dir)) => {
            tracing::debug!(context = %dir, "packaging build context");
            let (reader, task) = stream_directory(&dir, &Handle::current())?.into_parts();
            (RequestBody::Reader(Box::new(reader)), Some(task))
        }
    };
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(TAR_CONTENT_TYPE));

    let query = query_string(&options)?;
    let params = StreamParams {
        method: Method::POST,
        path: with_query(BUILD_PATH, &query),
        headers,
        body,
        options: StreamOptions {
            raw_json: raw_json_stream,
            raw_terminal: true,
        },
    };

    let streamed = client.stream(params, stdout, &mut tokio::io::sink()).await;
    let Some(task) = packaging else {
        return streamed;
    };

    // A packaging failure outranks whatever the engine made of the truncated body.
    match (streamed, task.finish().await) {
        (_, Err(packaging_error)) => Err(packaging_error.into()),
        (streamed_result, Ok(())) => streamed_result,
    }
}

/// Build an image and stream its progress into the request's output sink.
///
/// This is the blocking variant. It runs [`build_image_async`] on the
/// supplied runtime handle and must not be called from within an async
/// context.
///
/// # Errors
///
/// Returns the same errors as [`build_image_async`].
pub fn build_image<T: Transport>(
    runtime: &Handle,
    client: &EngineClient<T>,
    request: BuildRequest<'_>,
) -> Result<()> {
    runtime.block_on(build_image_async(client, request))
}

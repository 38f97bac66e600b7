//! Engine health check orchestration.

use crate::config::AppConfig;
use crate::error::Result as StevedoreResult;

use super::connect;

/// Parameters for checking engine health.
pub struct PingParams<'a, E: mockable::Env> {
    /// Application configuration (provides engine socket and TLS files).
    pub config: &'a AppConfig,
    /// Log every engine request through `tracing`.
    pub verbose: bool,
    /// Tokio runtime handle for blocking execution.
    pub runtime_handle: &'a tokio::runtime::Handle,
    /// Environment variable provider for socket resolution.
    pub env: &'a E,
}

/// Check that the container engine answers `GET /_ping`.
///
/// # Errors
///
/// Returns connection errors from [`connect`], `EngineError::ConnectionRefused`
/// when the engine refuses the connection, and `EngineError::HealthCheckFailed`
/// or `EngineError::HealthCheckTimeout` when the engine does not answer
/// correctly.
pub fn ping<E: mockable::Env>(params: PingParams<'_, E>) -> StevedoreResult<()> {
    let PingParams {
        config,
        verbose,
        runtime_handle,
        env,
    } = params;

    let client = connect(config, env, verbose)?;
    client.ping(runtime_handle)
}

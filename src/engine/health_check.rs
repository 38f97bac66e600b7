//! Engine health check.
//!
//! Provides async and blocking variants of a `GET /_ping` probe bounded by a
//! fixed timeout.

use std::time::Duration;

use http::{HeaderMap, Method};
use tokio::runtime::Handle;

use super::client::EngineClient;
use super::transport::{RequestBody, Transport};
use crate::error::{EngineError, Result, StevedoreError};

/// Timeout in seconds for health check operations.
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 10;

/// Path probed by the health check.
const PING_PATH: &str = "/_ping";

impl<T: Transport> EngineClient<T> {
    /// Verify the container engine is responsive (async version).
    ///
    /// Sends a ping request to the engine and waits for a successful
    /// response. This confirms the engine is operational, not just that the
    /// socket is reachable.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConnectionRefused` when the engine refuses the
    /// connection, `EngineError::HealthCheckTimeout` when no response arrives
    /// in time, and `EngineError::HealthCheckFailed` for any other failure.
    pub async fn ping_async(&self) -> Result<()> {
        let timeout = Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS);
        let probe = self.send(Method::GET, PING_PATH, HeaderMap::new(), RequestBody::Empty);

        match tokio::time::timeout(timeout, probe).await {
            Err(_) => Err(StevedoreError::from(EngineError::HealthCheckTimeout {
                seconds: HEALTH_CHECK_TIMEOUT_SECS,
            })),
            Ok(Ok(_response)) => Ok(()),
            Ok(Err(error)) if error.is_connection_refused() => Err(error),
            Ok(Err(error)) => Err(StevedoreError::from(EngineError::HealthCheckFailed {
                message: error.to_string(),
            })),
        }
    }

    /// Verify the container engine is responsive.
    ///
    /// This is the blocking variant. It runs [`Self::ping_async`] on the
    /// supplied runtime handle and must not be called from within an async
    /// context.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::ping_async`].
    pub fn ping(&self, runtime: &Handle) -> Result<()> {
        runtime.block_on(self.ping_async())
    }
}

/// Create a tokio runtime for blocking callers that do not own one.
///
/// # Errors
///
/// Returns `EngineError::RuntimeCreationFailed` if the runtime cannot be
/// created.
pub fn create_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|error| {
        StevedoreError::from(EngineError::RuntimeCreationFailed {
            message: error.to_string(),
        })
    })
}

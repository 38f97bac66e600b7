//! Container engine connection and request streaming.
//!
//! This module provides the interface for talking to a Docker or Podman
//! compatible engine over its HTTP control API. The endpoint is resolved
//! through a priority-based fallback chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `STEVEDORE_ENGINE_SOCKET` environment variable
//! 4. `DOCKER_HOST` environment variable
//! 5. `CONTAINER_HOST` environment variable
//! 6. `PODMAN_HOST` environment variable
//! 7. Platform default (`/var/run/docker.sock`)

mod client;
mod endpoint;
mod health_check;
pub mod stream;
mod transport;

pub use client::{CLIENT_USER_AGENT, EngineClient, StreamParams, TlsFiles};
pub use endpoint::{Endpoint, SECURE_API_PORT, Scheme, SocketResolver};
pub use health_check::{HEALTH_CHECK_TIMEOUT_SECS, create_runtime};
pub use stream::{ProgressEvent, StreamChannel, StreamFrame, StreamOptions};
pub use transport::{
    EngineRequest, EngineResponse, EngineTransport, HttpTransport, NoopLogger, RequestBody,
    RequestLogger, ResponseBody, SendFuture, TlsMaterial, TracingLogger, Transport,
    UnixSocketTransport,
};

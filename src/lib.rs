//! Client for container engine image builds with streamed progress.
//!
//! `stevedore` talks to a Docker-compatible engine over its HTTP API, either
//! through a Unix domain socket or over TCP with optional TLS. It sends a
//! build context as a tar stream and decodes the response as it arrives:
//! JSON progress events are rendered as terminal output, and multiplexed
//! stdout/stderr streams are split into separate sinks.
//!
//! # Modules
//!
//! - [`api`]: Command orchestration used by the CLI and embedders
//! - [`build`]: Build options, credentials, context packaging and the build call
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`engine`]: Endpoint resolution, transports, response decoding and the client
//! - [`error`]: Semantic error types for the application

pub mod api;
pub mod build;
pub mod config;
pub mod engine;
pub mod error;

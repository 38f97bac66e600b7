//! Configuration system for stevedore.
//!
//! This module provides the configuration structures and CLI definitions for the
//! stevedore application. Configuration loading and precedence merging is handled
//! by the `ortho_config` crate. Precedence: CLI flags override environment
//! variables, which override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/stevedore/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "tcp://build-host:2376"
//!
//! [tls]
//! cert_path = "/home/user/.config/stevedore/cert.pem"
//! key_path = "/home/user/.config/stevedore/key.pem"
//! ca_path = "/home/user/.config/stevedore/ca.pem"
//!
//! [build]
//! pull = true
//! remove_intermediate = true
//! ```

mod cli;
mod loader;
mod types;


pub use cli::{BuildArgs, Cli, Commands, STDIN_CONTEXT};
pub use loader::{env_var_names, load_config};
pub use types::{AppConfig, BuildDefaults, TlsConfig};

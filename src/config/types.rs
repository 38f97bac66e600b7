//! Configuration data types for stevedore.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::engine::TlsFiles;
use crate::error::ConfigError;

/// TLS client material used for `https` engine endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to the PEM-encoded client certificate.
    pub cert_path: Option<Utf8PathBuf>,

    /// Path to the PEM-encoded client private key.
    pub key_path: Option<Utf8PathBuf>,

    /// Path to the PEM-encoded certificate authority bundle.
    pub ca_path: Option<Utf8PathBuf>,
}

impl TlsConfig {
    /// Validates that the client certificate and key are configured together.
    ///
    /// A CA bundle without a certificate and key pair is rejected.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` naming the absent half when
    /// exactly one of `cert_path` and `key_path` is set, or both halves when
    /// only `ca_path` is set.
    pub fn validate(&self) -> crate::error::Result<()> {
        let mut missing = Vec::new();
        if self.cert_path.is_none() && (self.key_path.is_some() || self.ca_path.is_some()) {
            missing.push("tls.cert_path");
        }
        if self.key_path.is_none() && (self.cert_path.is_some() || self.ca_path.is_some()) {
            missing.push("tls.key_path");
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: missing.join(", "),
            }
            .into());
        }
        Ok(())
    }

    /// Returns the file set to load, or `None` when TLS is not configured.
    ///
    /// Call [`validate()`](Self::validate) first; a half-configured pair also
    /// yields `None`.
    #[must_use]
    pub fn files(&self) -> Option<TlsFiles> {
        let (Some(cert_path), Some(key_path)) = (&self.cert_path, &self.key_path) else {
            return None;
        };
        Some(TlsFiles {
            cert_path: cert_path.clone(),
            key_path: key_path.clone(),
            ca_path: self.ca_path.clone(),
        })
    }
}

/// Defaults applied to every `build` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildDefaults {
    /// Do not use the build cache.
    pub no_cache: bool,

    /// Always attempt to pull newer base images.
    pub pull: bool,

    /// Remove intermediate containers after a successful build.
    pub remove_intermediate: bool,

    /// Always remove intermediate containers, even after a failed build.
    pub force_remove: bool,

    /// Print progress events as raw JSON instead of rendering them.
    pub raw_json: bool,
}

impl Default for BuildDefaults {
    fn default() -> Self {
        Self {
            no_cache: false,
            pull: false,
            remove_intermediate: true,
            force_remove: false,
            raw_json: false,
        }
    }
}

impl AppConfig {
    /// Returns the configured endpoint, ignoring blank values.
    #[must_use]
    pub fn engine_endpoint(&self) -> Option<&str> {
        self.engine_socket
            .as_deref()
            .filter(|socket| !socket.trim().is_empty())
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `STEVEDORE_CONFIG_PATH` environment variable
/// 2. `.stevedore.toml` in the current working directory
/// 3. `.stevedore.toml` in the home directory
/// 4. `~/.config/stevedore/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "STEVEDORE",
    discovery(
        app_name = "stevedore",
        env_var = "STEVEDORE_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".stevedore.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine endpoint: a socket path or URL.
    ///
    /// A blank value is treated as unset and falls back to environment
    /// discovery.
    pub engine_socket: Option<String>,

    /// TLS client configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub tls: TlsConfig,

    /// Build defaults.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub build: BuildDefaults,
}

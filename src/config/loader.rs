//! Configuration loading with layered precedence.
//!
//! This module provides functions to load configuration with the precedence order
//! (lowest to highest): application defaults, configuration file, environment
//! variables, command-line arguments.
//!
//! # Architecture Note: Why Manual Layer Composition?
//!
//! The `OrthoConfig` derive macro provides `load()` and `compose_layers()` methods
//! that handle discovery, environment variables, and CLI parsing automatically.
//! However, this loader uses `MergeComposer` manually because:
//!
//! 1. **Subcommand separation**: The CLI (`Cli` struct) handles subcommand dispatch
//!    via clap's `#[command(subcommand)]`, while `AppConfig` holds configuration
//!    values. `OrthoConfig`'s `load()` expects to own the entire CLI parsing.
//!
//! 2. **Environment variable validation**: `OrthoConfig`'s environment layer uses
//!    Figment, which silently ignores unparseable values. This loader implements
//!    fail-fast validation that returns errors for invalid typed values.
//!
//! 3. **Custom discovery integration**: The `Cli` struct already accepts `--config`
//!    via clap, so discovery must honour that path before falling back to XDG paths.
//!
//! # Environment Variable Handling
//!
//! Environment variables with unparseable values (e.g., `STEVEDORE_BUILD_PULL=maybe`
//! instead of `true`/`false`) return an error immediately rather than falling
//! back to defaults.
//!
//! String fields (e.g., `STEVEDORE_ENGINE_SOCKET`) are always accepted. Boolean
//! fields (`STEVEDORE_BUILD_*`) must have valid values or loading fails.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

// ============================================================================
// Environment Variable Specification Table
// ============================================================================

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Boolean value (`true`/`false`). Invalid values return an error.
    Bool,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `STEVEDORE_ENGINE_SOCKET`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["build", "pull"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all environment variables and their JSON paths.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "STEVEDORE_ENGINE_SOCKET",
        path: &["engine_socket"],
        var_type: EnvVarType::String,
    },
    // TLS fields
    EnvVarSpec {
        env_var: "STEVEDORE_TLS_CERT_PATH",
        path: &["tls", "cert_path"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "STEVEDORE_TLS_KEY_PATH",
        path: &["tls", "key_path"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "STEVEDORE_TLS_CA_PATH",
        path: &["tls", "ca_path"],
        var_type: EnvVarType::String,
    },
    // Build fields
    EnvVarSpec {
        env_var: "STEVEDORE_BUILD_NO_CACHE",
        path: &["build", "no_cache"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "STEVEDORE_BUILD_PULL",
        path: &["build", "pull"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "STEVEDORE_BUILD_REMOVE_INTERMEDIATE",
        path: &["build", "remove_intermediate"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "STEVEDORE_BUILD_FORCE_REMOVE",
        path: &["build", "force_remove"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "STEVEDORE_BUILD_RAW_JSON",
        path: &["build", "raw_json"],
        var_type: EnvVarType::Bool,
    },
];

/// Returns the list of environment variable names recognised by the config loader.
///
/// Tests use this to clear every `STEVEDORE_*` variable the loader reads.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
///
/// Uses `cap_std::fs_utf8` for capability-oriented filesystem access as per
/// project conventions. The function opens the parent directory of the config
/// file and reads from there.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    // Open the parent directory using ambient authority, then read the file.
    let current_dir = Utf8PathBuf::from(".");
    let parent = path.parent().unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence.
///
/// This function loads configuration from all available sources:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (discovered via XDG paths or `STEVEDORE_CONFIG_PATH`)
/// 3. Environment variables prefixed with `STEVEDORE_`
/// 4. Command-line arguments (from the provided `Cli`)
///
/// Later sources override earlier ones.
///
/// # Errors
///
/// Returns `ConfigError` if configuration loading fails due to:
/// - Malformed configuration files
/// - Invalid typed environment variable values (e.g., non-boolean for
///   `STEVEDORE_BUILD_PULL`)
/// - An incomplete TLS client certificate and key pair
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    // Layer 1: Defaults (serialised from AppConfig::default()).
    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    // Layer 2: Configuration file.
    // An explicit --config path must exist; otherwise discover via XDG paths.
    let config_path = match cli.config.clone() {
        Some(path) if path.exists() => Some(path),
        Some(path) => {
            return Err(ConfigError::FileNotFound {
                path: path.into_std_path_buf(),
            }
            .into());
        }
        None => discover_config_file(),
    };

    if let Some(ref path) = config_path {
        load_config_file(path, &mut composer)?;
    }

    // Layer 3: Environment variables.
    let env_values = collect_env_vars()?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    // Layer 4: CLI overrides.
    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    // Merge all layers into the final configuration.
    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.tls.validate()?;

    Ok(config)
}

/// Find the first existing configuration file among the discovery candidates.
fn discover_config_file() -> Option<Utf8PathBuf> {
    let discovery = ConfigDiscovery::builder("stevedore")
        .env_var("STEVEDORE_CONFIG_PATH")
        .config_file_name("config.toml")
        .dotfile_name(".stevedore.toml")
        .build();
    discovery
        .candidates()
        .into_iter()
        .filter(|p| p.exists())
        .find_map(|p| Utf8PathBuf::try_from(p).ok())
}

/// Collect environment variables with the `STEVEDORE_` prefix into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a boolean environment variable has an
/// unparseable value.
fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Ok(raw_value) = std::env::var(spec.env_var) else {
            continue;
        };

        // Parse the value according to its expected type.
        // Invalid values return an error immediately (fail-fast).
        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::Bool => match raw_value.parse::<bool>() {
                Ok(b) => Value::Bool(b),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected bool (true/false), got '{raw_value}'"),
                    }
                    .into());
                }
            },
        };

        // Insert at the appropriate path (supports arbitrary nesting depth).
        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Insert a value at a nested path in a JSON map.
///
/// For a path like `["build", "pull"]`, this creates the intermediate `build`
/// object if needed and inserts `pull` within it.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    // Navigate to the parent object, creating intermediate objects as needed.
    let mut current = root;
    for &segment in parents {
        // Ensure the entry is an object; if it's not (shouldn't happen with our
        // controlled path specs), skip this insertion.
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    // Insert the final field.
    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> serde_json::Value {
    let mut overrides = serde_json::Map::new();

    if let Some(ref socket) = cli.engine_socket {
        overrides.insert(
            "engine_socket".to_owned(),
            serde_json::Value::String(socket.clone()),
        );
    }

    if overrides.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::Object(overrides)
    }
}

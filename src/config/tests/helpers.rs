//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use ortho_config::MergeComposer;
use rstest::fixture;

use crate::config::AppConfig;

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "tcp://build-host:2376"

        [tls]
        cert_path = "/etc/stevedore/cert.pem"
        key_path = "/etc/stevedore/key.pem"
        ca_path = "/etc/stevedore/ca.pem"

        [build]
        no_cache = true
        pull = true
        remove_intermediate = false
        force_remove = true
        raw_json = true
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "unix:///tmp/docker.sock"
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config's build section has default values.
pub fn assert_build_defaults(config: &AppConfig) {
    assert!(!config.build.no_cache, "build.no_cache should be false");
    assert!(!config.build.pull, "build.pull should be false");
    assert!(
        config.build.remove_intermediate,
        "build.remove_intermediate should be true"
    );
    assert!(!config.build.force_remove, "build.force_remove should be false");
    assert!(!config.build.raw_json, "build.raw_json should be false");
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(
        config.engine_socket.is_none(),
        "engine_socket should be None"
    );
    assert!(config.tls.cert_path.is_none(), "tls.cert_path should be None");
    assert!(config.tls.key_path.is_none(), "tls.key_path should be None");
    assert!(config.tls.ca_path.is_none(), "tls.ca_path should be None");
    assert_build_defaults(config);
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers for testing layer precedence.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    use ortho_config::serde_json::json;

    let mut composer = create_composer_with_defaults()?;

    composer.push_file(
        json!({
            "engine_socket": "unix:///from/file.sock",
            "build": { "pull": true }
        }),
        None,
    );

    composer.push_environment(json!({
        "engine_socket": "unix:///from/env.sock"
    }));

    Ok(composer)
}

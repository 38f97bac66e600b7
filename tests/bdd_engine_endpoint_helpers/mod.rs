//! Behavioural test helpers for engine endpoint resolution.

// rstest-bdd macros generate internal code that triggers these lints for unused state parameters
#![allow(
    clippy::used_underscore_binding,
    reason = "rstest-bdd requires state parameter in macro-generated code"
)]
#![allow(
    non_snake_case,
    reason = "rstest-bdd generates non-snake-case internal variables"
)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mockable::MockEnv;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, then, when};
use stevedore::engine::{EngineClient, SocketResolver};
use stevedore::error::{EngineError, StevedoreError};

/// Step result type for BDD tests, using a static string for errors.
pub type StepResult<T> = Result<T, &'static str>;

/// Thread-safe environment variable storage for BDD tests.
type EnvVars = Arc<Mutex<HashMap<String, String>>>;

/// Outcome of resolving and parsing an endpoint.
#[derive(Clone)]
pub enum ResolutionOutcome {
    /// The endpoint parsed; holds its display form.
    Resolved(String),
    /// The endpoint string was rejected.
    Invalid(String),
    /// Connecting failed for another reason.
    Failed(String),
}

/// State shared across endpoint resolution scenarios.
#[derive(Default, ScenarioState)]
pub struct EngineEndpointState {
    /// The environment variables to mock.
    env_vars: Slot<EnvVars>,
    /// The configured endpoint (CLI, config file, `STEVEDORE_ENGINE_SOCKET`).
    config_socket: Slot<Option<String>>,
    /// The outcome of the resolution step.
    outcome: Slot<ResolutionOutcome>,
}

/// Fixture providing a fresh endpoint resolution state.
#[fixture]
pub fn engine_endpoint_state() -> EngineEndpointState {
    let state = EngineEndpointState::default();
    state.env_vars.set(Arc::new(Mutex::new(HashMap::new())));
    state
}

fn set_env_var(state: &EngineEndpointState, key: &str, value: &str) -> StepResult<()> {
    let env_vars = state.env_vars.get().ok_or("env_vars should be initialised")?;
    let mut vars = env_vars.lock().map_err(|_| "mutex poisoned")?;
    vars.insert(String::from(key), String::from(value));
    Ok(())
}

/// Snapshot the scenario's variables into a `MockEnv`.
///
/// Every "Given" step runs before the "When" step that calls this.
fn create_mock_env(state: &EngineEndpointState) -> StepResult<MockEnv> {
    let env_vars = state.env_vars.get().ok_or("env_vars should be initialised")?;
    let vars = env_vars.lock().map_err(|_| "mutex poisoned")?.clone();

    let mut mock = MockEnv::new();
    mock.expect_string()
        .returning(move |key| vars.get(key).cloned());
    Ok(mock)
}

// Given step definitions

#[given("no engine socket is configured")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult for consistency"
)]
fn no_engine_socket_configured(engine_endpoint_state: &EngineEndpointState) -> StepResult<()> {
    engine_endpoint_state.config_socket.set(None);
    Ok(())
}

#[given("engine socket is configured as {socket}")]
#[expect(
    clippy::unnecessary_wraps,
    reason = "rstest-bdd step functions must return StepResult for consistency"
)]
fn engine_socket_configured_as(
    engine_endpoint_state: &EngineEndpointState,
    socket: String,
) -> StepResult<()> {
    engine_endpoint_state.config_socket.set(Some(socket));
    Ok(())
}

#[given("DOCKER_HOST is empty")]
fn docker_host_is_empty(engine_endpoint_state: &EngineEndpointState) -> StepResult<()> {
    set_env_var(engine_endpoint_state, "DOCKER_HOST", "")
}

#[given("DOCKER_HOST is set to {value}")]
fn docker_host_is_set_to(
    engine_endpoint_state: &EngineEndpointState,
    value: String,
) -> StepResult<()> {
    set_env_var(engine_endpoint_state, "DOCKER_HOST", &value)
}

#[given("PODMAN_HOST is set to {value}")]
fn podman_host_is_set_to(
    engine_endpoint_state: &EngineEndpointState,
    value: String,
) -> StepResult<()> {
    set_env_var(engine_endpoint_state, "PODMAN_HOST", &value)
}

// When step definitions

#[when("the endpoint is resolved")]
fn the_endpoint_is_resolved(engine_endpoint_state: &EngineEndpointState) -> StepResult<()> {
    let env = create_mock_env(engine_endpoint_state)?;
    let resolver = SocketResolver::new(&env);
    let config_socket = engine_endpoint_state.config_socket.get().flatten();

    let outcome = match EngineClient::connect_with_fallback(config_socket.as_deref(), &resolver) {
        Ok(client) => ResolutionOutcome::Resolved(client.endpoint().to_string()),
        Err(StevedoreError::Engine(EngineError::InvalidEndpoint { endpoint })) => {
            ResolutionOutcome::Invalid(endpoint)
        }
        Err(error) => ResolutionOutcome::Failed(error.to_string()),
    };
    engine_endpoint_state.outcome.set(outcome);
    Ok(())
}

// Then step definitions

#[then("the resolved endpoint is {expected}")]
fn the_endpoint_is(
    engine_endpoint_state: &EngineEndpointState,
    expected: String,
) -> StepResult<()> {
    match engine_endpoint_state
        .outcome
        .get()
        .ok_or("resolution outcome should be set")?
    {
        ResolutionOutcome::Resolved(endpoint) => {
            assert_eq!(
                endpoint, expected,
                "Expected endpoint '{expected}', but got '{endpoint}'"
            );
            Ok(())
        }
        ResolutionOutcome::Invalid(_) => Err("Expected a resolved endpoint, but it was rejected"),
        ResolutionOutcome::Failed(_) => Err("Expected a resolved endpoint, but connecting failed"),
    }
}

#[then("an invalid endpoint error is returned")]
fn invalid_endpoint_error_is_returned(
    engine_endpoint_state: &EngineEndpointState,
) -> StepResult<()> {
    match engine_endpoint_state
        .outcome
        .get()
        .ok_or("resolution outcome should be set")?
    {
        ResolutionOutcome::Invalid(_) => Ok(()),
        ResolutionOutcome::Resolved(_) => Err("Expected an invalid endpoint, but it resolved"),
        ResolutionOutcome::Failed(_) => {
            Err("Expected an invalid endpoint error, but got a different failure")
        }
    }
}

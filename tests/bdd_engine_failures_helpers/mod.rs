//! Behavioural test helpers for engine failure reporting.

// rstest-bdd macros generate internal code that triggers these lints for unused state parameters
#![allow(
    clippy::used_underscore_binding,
    reason = "rstest-bdd requires state parameter in macro-generated code"
)]
#![allow(
    non_snake_case,
    reason = "rstest-bdd generates non-snake-case internal variables"
)]

use std::io::Cursor;

use camino::Utf8PathBuf;
use eyre::Report;
use http::Method;
use mockable::MockEnv;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, then, when};
use stevedore::api::{BuildContext, BuildParams, build, connect};
use stevedore::build::BuildImageOptions;
use stevedore::config::AppConfig;
use stevedore::engine::StreamParams;
use stevedore::error::Result as StevedoreResult;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::runtime::Runtime;

use crate::test_utils::{answer_once, frame};

/// Step result type for BDD tests, using a static string for errors.
pub type StepResult<T> = Result<T, &'static str>;

/// The line an erroring engine writes before its error event.
const PRIOR_OUTPUT: &str = "Step 1/1 : FROM private/app\n";

/// How the in-process engine behaves for a scenario.
#[derive(Clone, Debug)]
pub enum EngineBehaviour {
    /// A socket file exists but nothing accepts on it.
    Refusing,
    /// The client is pointed at this endpoint string and no engine runs.
    Endpoint(String),
    /// The engine answers the first request with these raw HTTP bytes.
    Replying(Vec<u8>),
}

/// State shared across engine failure scenarios.
#[derive(Default, ScenarioState)]
pub struct EngineFailureState {
    /// What the engine does when contacted.
    behaviour: Slot<EngineBehaviour>,
    /// The reported failure, or `None` when the operation succeeded.
    failure: Slot<Option<String>>,
    /// Output written by the operation.
    output: Slot<Vec<u8>>,
}

/// Fixture providing a fresh engine failure state.
#[fixture]
pub fn engine_failure_state() -> EngineFailureState {
    EngineFailureState::default()
}

#[derive(Clone, Copy)]
enum Operation {
    BuildFromStream,
    StreamLogs,
}

fn http_reply(status_line: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut reply = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    reply.extend_from_slice(body);
    reply
}

fn quiet_env() -> MockEnv {
    let mut env = MockEnv::new();
    env.expect_string().returning(|_| None);
    env
}

/// Start the scenario's engine and return the endpoint string to dial.
fn start_engine(
    runtime: &Runtime,
    behaviour: EngineBehaviour,
    socket: &Utf8PathBuf,
) -> StepResult<String> {
    match behaviour {
        EngineBehaviour::Endpoint(endpoint) => Ok(endpoint),
        EngineBehaviour::Refusing => {
            let _guard = runtime.enter();
            let listener = UnixListener::bind(socket.as_std_path())
                .map_err(|_| "listener should bind")?;
            drop(listener);
            Ok(format!("unix://{socket}"))
        }
        EngineBehaviour::Replying(reply) => {
            let listener = {
                let _guard = runtime.enter();
                UnixListener::bind(socket.as_std_path()).map_err(|_| "listener should bind")?
            };
            let _server = runtime.spawn(async move {
                if let Ok((stream, _)) = listener.accept().await {
                    let _request = answer_once(stream, &reply).await;
                }
            });
            Ok(format!("unix://{socket}"))
        }
    }
}

fn stream_logs(
    runtime: &Runtime,
    config: &AppConfig,
    env: &MockEnv,
    output: &mut Vec<u8>,
) -> StevedoreResult<()> {
    let client = connect(config, env, false)?;
    let mut stderr = tokio::io::sink();
    runtime.block_on(client.stream(
        StreamParams {
            method: Method::GET,
            path: String::from("/logs"),
            ..StreamParams::default()
        },
        output,
        &mut stderr,
    ))
}

fn run_operation(state: &EngineFailureState, operation: Operation) -> StepResult<()> {
    let behaviour = state
        .behaviour
        .get()
        .ok_or("engine behaviour should be set")?;
    let runtime = Runtime::new().map_err(|_| "runtime should be created")?;
    let dir = TempDir::new().map_err(|_| "temp dir should be created")?;
    let socket = Utf8PathBuf::from_path_buf(dir.path().join("engine.sock"))
        .map_err(|_| "temp path should be UTF-8")?;
    let endpoint = start_engine(&runtime, behaviour, &socket)?;

    let config = AppConfig {
        engine_socket: Some(endpoint),
        ..AppConfig::default()
    };
    let env = quiet_env();
    let mut output = Vec::new();

    let result = match operation {
        Operation::BuildFromStream => build(BuildParams {
            config: &config,
            options: BuildImageOptions {
                name: String::from("demo"),
                ..BuildImageOptions::default()
            },
            context: BuildContext::Stream(Box::new(Cursor::new(b"context tar".to_vec()))),
            output: &mut output,
            raw_json: false,
            verbose: false,
            runtime_handle: runtime.handle(),
            env: &env,
        }),
        Operation::StreamLogs => stream_logs(&runtime, &config, &env, &mut output),
    };

    state
        .failure
        .set(result.err().map(|error| Report::from(error).to_string()));
    state.output.set(output);
    Ok(())
}

fn failure_message(state: &EngineFailureState) -> StepResult<String> {
    state
        .failure
        .get()
        .ok_or("the operation should have run")?
        .ok_or("expected the operation to fail, but it succeeded")
}

// Given step definitions

#[given("an engine socket that refuses connections")]
fn engine_refuses(engine_failure_state: &EngineFailureState) {
    engine_failure_state
        .behaviour
        .set(EngineBehaviour::Refusing);
}

#[given("the engine endpoint {endpoint}")]
fn engine_endpoint(engine_failure_state: &EngineFailureState, endpoint: String) {
    engine_failure_state
        .behaviour
        .set(EngineBehaviour::Endpoint(endpoint));
}

#[given("an engine that reports the build error {message}")]
fn engine_reports_error(engine_failure_state: &EngineFailureState, message: String) {
    let events = format!(
        "{}\r\n{}\r\n",
        serde_json::json!({ "stream": PRIOR_OUTPUT }),
        serde_json::json!({ "error": message }),
    );
    engine_failure_state
        .behaviour
        .set(EngineBehaviour::Replying(http_reply(
            "200 OK",
            "application/json",
            events.as_bytes(),
        )));
}

#[given("an engine that answers status {status} with {message}")]
fn engine_answers_status(engine_failure_state: &EngineFailureState, status: u16, message: String) {
    engine_failure_state
        .behaviour
        .set(EngineBehaviour::Replying(http_reply(
            &format!("{status} Engine Error"),
            "text/plain",
            message.as_bytes(),
        )));
}

#[given("an engine whose log stream stops after {received} of {expected} payload bytes")]
fn engine_stream_stops_early(
    engine_failure_state: &EngineFailureState,
    received: usize,
    expected: usize,
) {
    let mut body = frame(1, &vec![b'x'; expected]);
    body.truncate(8 + received);
    engine_failure_state
        .behaviour
        .set(EngineBehaviour::Replying(http_reply(
            "200 OK",
            "application/vnd.docker.multiplexed-stream",
            &body,
        )));
}

// When step definitions

#[when("an image is built from a tar stream")]
fn image_is_built(engine_failure_state: &EngineFailureState) -> StepResult<()> {
    run_operation(engine_failure_state, Operation::BuildFromStream)
}

#[when("the engine logs are streamed")]
fn logs_are_streamed(engine_failure_state: &EngineFailureState) -> StepResult<()> {
    run_operation(engine_failure_state, Operation::StreamLogs)
}

// Then step definitions

#[then("the failure reads {expected}")]
fn failure_reads(engine_failure_state: &EngineFailureState, expected: String) -> StepResult<()> {
    let message = failure_message(engine_failure_state)?;
    assert_eq!(message, expected, "unexpected failure message");
    Ok(())
}

#[then("the failure starts with {prefix}")]
fn failure_starts_with(
    engine_failure_state: &EngineFailureState,
    prefix: String,
) -> StepResult<()> {
    let message = failure_message(engine_failure_state)?;
    assert!(
        message.starts_with(&prefix),
        "expected a failure starting with '{prefix}', got '{message}'"
    );
    Ok(())
}

#[then("the output holds the lines written before the error")]
fn output_holds_prior_lines(engine_failure_state: &EngineFailureState) -> StepResult<()> {
    let output = engine_failure_state
        .output
        .get()
        .ok_or("output should be recorded")?;
    assert_eq!(String::from_utf8_lossy(&output), PRIOR_OUTPUT);
    Ok(())
}

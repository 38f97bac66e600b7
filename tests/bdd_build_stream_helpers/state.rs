//! Scenario state for image build behavioural tests.

use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tempfile::TempDir;

/// Canned engine replies used by the scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineReply {
    /// Log lines followed by a success status.
    Success,
    /// A log line followed by an error event.
    Failure,
}

/// The progress stream sent for a successful build.
pub(crate) const SUCCESS_EVENTS: &str = concat!(
    r#"{"stream":"Step 1/2 : FROM alpine\n"}"#,
    "\r\n",
    r#"{"status":"Downloading","progress":"[=====>   ]"}"#,
    "\r\n",
    r#"{"stream":"Successfully built 0123abcd\n"}"#,
    "\r\n",
);

/// The progress stream sent for a failed build.
pub(crate) const FAILURE_EVENTS: &str = concat!(
    r#"{"stream":"Step 1/2 : FROM missing\n"}"#,
    "\r\n",
    r#"{"error":"pull access denied for missing"}"#,
    "\r\n",
    r#"{"stream":"never rendered\n"}"#,
);

impl EngineReply {
    /// Returns the response body for this reply.
    pub(crate) const fn body(self) -> &'static str {
        match self {
            Self::Success => SUCCESS_EVENTS,
            Self::Failure => FAILURE_EVENTS,
        }
    }
}

/// What the canned engine saw for one request.
#[derive(Debug, Clone)]
pub(crate) struct ReceivedRequest {
    pub(crate) url: String,
    pub(crate) content_type: Option<String>,
    pub(crate) body: Vec<u8>,
}

/// Requests received by the canned engine, shared with the transport.
pub(crate) type ReceivedRequests = Arc<Mutex<Vec<ReceivedRequest>>>;

/// High-level outcome of a build call.
#[derive(Debug, Clone)]
pub(crate) enum BuildOutcome {
    /// The build completed.
    Succeeded,
    /// The engine reported a failed build.
    RemoteFailure(String),
    /// The request was rejected locally, holding the error text.
    Rejected(String),
}

#[derive(Default, ScenarioState)]
pub(crate) struct BuildStreamState {
    pub(crate) reply: Slot<EngineReply>,
    pub(crate) stream_context: Slot<bool>,
    pub(crate) context_dir: Slot<Utf8PathBuf>,
    pub(crate) context_tempdir: Slot<Arc<TempDir>>,
    pub(crate) raw_json: Slot<bool>,
    pub(crate) supply_output: Slot<bool>,
    pub(crate) received: Slot<ReceivedRequests>,
    pub(crate) output: Slot<Vec<u8>>,
    pub(crate) outcome: Slot<BuildOutcome>,
}

#[fixture]
pub(crate) fn build_stream_state() -> BuildStreamState {
    let state = BuildStreamState::default();
    state.reply.set(EngineReply::Success);
    state.stream_context.set(false);
    state.raw_json.set(false);
    state.supply_output.set(true);
    state.received.set(Arc::new(Mutex::new(Vec::new())));
    state
}

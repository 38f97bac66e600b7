//! Given/when steps for image build scenarios.

use std::io::Write;
use std::sync::Arc;

use camino::Utf8PathBuf;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use rstest_bdd_macros::{given, when};
use stevedore::build::{BuildImageOptions, BuildRequest, build_image};
use stevedore::engine::{
    Endpoint, EngineClient, EngineRequest, EngineResponse, RequestBody, ResponseBody, SendFuture,
    Transport,
};
use stevedore::error::{BuildError, EngineError, StevedoreError};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use super::StepResult;
use super::state::{
    BuildOutcome, BuildStreamState, EngineReply, ReceivedRequest, ReceivedRequests,
};

/// Engine stand-in that records each request and answers with a fixed
/// progress stream.
struct CannedEngine {
    reply: EngineReply,
    received: ReceivedRequests,
}

impl CannedEngine {
    async fn answer(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
        let EngineRequest {
            url, headers, body, ..
        } = request;
        let body_bytes = match body {
            RequestBody::Empty => Vec::new(),
            RequestBody::Bytes(bytes) => bytes.to_vec(),
            RequestBody::Reader(mut reader) => {
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer).await.map_err(|error| {
                    EngineError::RequestFailed {
                        message: error.to_string(),
                    }
                })?;
                buffer
            }
        };
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(String::from);

        self.received
            .lock()
            .map_err(|_| EngineError::RequestFailed {
                message: String::from("received requests mutex poisoned"),
            })?
            .push(ReceivedRequest {
                url,
                content_type,
                body: body_bytes,
            });

        Ok(EngineResponse::new(
            StatusCode::OK,
            Some(String::from("application/json")),
            ResponseBody::from_bytes(self.reply.body()),
        ))
    }
}

impl Transport for CannedEngine {
    fn send(&self, request: EngineRequest) -> SendFuture<'_> {
        Box::pin(self.answer(request))
    }
}

#[given("the engine reports a successful build")]
fn engine_reports_success(build_stream_state: &BuildStreamState) {
    build_stream_state.reply.set(EngineReply::Success);
}

#[given("the engine reports a failed build")]
fn engine_reports_failure(build_stream_state: &BuildStreamState) {
    build_stream_state.reply.set(EngineReply::Failure);
}

#[given("the build context is a tar stream")]
fn context_is_tar_stream(build_stream_state: &BuildStreamState) {
    build_stream_state.stream_context.set(true);
}

#[given("the build context is a directory containing a Dockerfile")]
fn context_is_directory(build_stream_state: &BuildStreamState) -> StepResult<()> {
    let dir = TempDir::new().map_err(|error| format!("temp dir: {error}"))?;
    let mut dockerfile = std::fs::File::create(dir.path().join("Dockerfile"))
        .map_err(|error| format!("create Dockerfile: {error}"))?;
    dockerfile
        .write_all(b"FROM alpine\nRUN true\n")
        .map_err(|error| format!("write Dockerfile: {error}"))?;
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .map_err(|path| format!("non UTF-8 temp path: {}", path.display()))?;

    build_stream_state.context_dir.set(path);
    build_stream_state.context_tempdir.set(Arc::new(dir));
    Ok(())
}

#[given("raw JSON output is requested")]
fn raw_json_is_requested(build_stream_state: &BuildStreamState) {
    build_stream_state.raw_json.set(true);
}

#[given("no output sink is supplied")]
fn no_output_sink(build_stream_state: &BuildStreamState) {
    build_stream_state.supply_output.set(false);
}

#[when("the image is built")]
fn image_is_built(build_stream_state: &BuildStreamState) -> StepResult<()> {
    let runtime =
        tokio::runtime::Runtime::new().map_err(|error| format!("runtime: {error}"))?;
    let received = build_stream_state
        .received
        .get()
        .ok_or_else(|| String::from("received requests should be initialised"))?;
    let endpoint = Endpoint::parse("unix:///var/run/docker.sock")
        .map_err(|error| format!("endpoint: {error}"))?;
    let client = EngineClient::with_transport(
        endpoint,
        CannedEngine {
            reply: build_stream_state.reply.get().unwrap_or(EngineReply::Success),
            received,
        },
    );

    let mut request = BuildRequest::new(BuildImageOptions {
        name: String::from("demo:latest"),
        ..BuildImageOptions::default()
    })
    .with_raw_json_stream(build_stream_state.raw_json.get().unwrap_or(false));
    if build_stream_state.stream_context.get().unwrap_or(false) {
        request = request.with_input_stream(std::io::Cursor::new(b"context tar".to_vec()));
    }
    if let Some(dir) = build_stream_state.context_dir.get() {
        request = request.with_context_dir(dir);
    }

    let mut output = Vec::new();
    if build_stream_state.supply_output.get().unwrap_or(true) {
        request = request.with_output(&mut output);
    }
    let result = build_image(runtime.handle(), &client, request);

    build_stream_state.outcome.set(match result {
        Ok(()) => BuildOutcome::Succeeded,
        Err(StevedoreError::Build(BuildError::RemoteBuild { message })) => {
            BuildOutcome::RemoteFailure(message)
        }
        Err(error) => BuildOutcome::Rejected(error.to_string()),
    });
    build_stream_state.output.set(output);
    Ok(())
}

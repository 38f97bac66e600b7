//! Progress-event decoding for `application/json` bodies.
//!
//! The body is a concatenation of JSON objects with no delimiter guarantee,
//! so events are parsed incrementally from a growing buffer and each one is
//! rendered to the output sink as soon as it is complete.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{read_failed, write_failed};
use crate::error::{BuildError, Result, StreamError};

/// Minimum spare capacity requested before each body read.
const READ_CHUNK: usize = 4 * 1024;

/// One decoded progress message.
///
/// At most one of `error`, `stream` and `progress` is expected per event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressEvent {
    /// Status line, such as `Downloading` or `Successfully built`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Progress counter rendered alongside `status`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub progress: String,
    /// Terminal error reported by the engine.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Log output, written verbatim.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stream: String,
}

impl ProgressEvent {
    /// Render the event as terminal output.
    ///
    /// Log output is written verbatim. Progress updates end in a carriage
    /// return so successive updates overwrite one line. A non-empty status is
    /// then written on its own line.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::RemoteBuild` when the event carries an error.
    pub fn render(&self) -> std::result::Result<String, BuildError> {
        if !self.error.is_empty() {
            return Err(BuildError::RemoteBuild {
                message: self.error.clone(),
            });
        }

        let mut rendered = String::new();
        if !self.stream.is_empty() {
            rendered.push_str(&self.stream);
        } else if !self.progress.is_empty() {
            rendered.push_str(&self.status);
            rendered.push(' ');
            rendered.push_str(&self.progress);
            rendered.push('\r');
        }
        if !self.status.is_empty() {
            rendered.push_str(&self.status);
            rendered.push('\n');
        }
        Ok(rendered)
    }
}

/// Decode progress events from `body` and render them to `stdout`.
///
/// Decoding stops at the first event carrying an error; later events are
/// never read.
///
/// # Errors
///
/// Returns `BuildError::RemoteBuild` for an error event,
/// `StreamError::MalformedJson` for invalid or truncated JSON, and
/// `StreamError::ReadFailed` or `StreamError::WriteFailed` for I/O failures.
pub async fn decode_progress<R, W>(body: &mut R, stdout: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut decoder = EventDecoder::default();
    while let Some(event) = decoder.next_event(body).await? {
        let rendered = event.render()?;
        if rendered.is_empty() {
            continue;
        }
        stdout
            .write_all(rendered.as_bytes())
            .await
            .map_err(|error| write_failed("stdout", &error))?;
        stdout
            .flush()
            .await
            .map_err(|error| write_failed("stdout", &error))?;
    }
    Ok(())
}

/// Incremental parser over a byte buffer refilled from the body.
#[derive(Debug, Default)]
struct EventDecoder {
    buffer: Vec<u8>,
    eof: bool,
}

impl EventDecoder {
    async fn next_event<R>(
        &mut self,
        body: &mut R,
    ) -> std::result::Result<Option<ProgressEvent>, StreamError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        loop {
            let parsed = {
                let mut events =
                    serde_json::Deserializer::from_slice(&self.buffer).into_iter::<ProgressEvent>();
                events
                    .next()
                    .map(|result| result.map(|event| (event, events.byte_offset())))
            };

            match parsed {
                Some(Ok((event, consumed))) => {
                    self.buffer.drain(..consumed);
                    return Ok(Some(event));
                }
                Some(Err(error)) if error.is_eof() && !self.eof => {}
                Some(Err(error)) => {
                    return Err(StreamError::MalformedJson {
                        message: error.to_string(),
                    });
                }
                None if self.eof => return Ok(None),
                None => {}
            }

            self.fill(body).await?;
        }
    }

    async fn fill<R>(&mut self, body: &mut R) -> std::result::Result<(), StreamError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.buffer.reserve(READ_CHUNK);
        let read = body
            .read_buf(&mut self.buffer)
            .await
            .map_err(|error| read_failed(&error))?;
        if read == 0 {
            self.eof = true;
        }
        Ok(())
    }
}

//! Response stream decoding.
//!
//! The engine reuses one streaming endpoint for two payload shapes. A body
//! declared as `application/json` carries concatenated progress events; any
//! other body carries either raw terminal output or stdout and stderr
//! multiplexed into 8-byte-header frames.

mod demux;
mod json;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub use self::demux::{FRAME_HEADER_LEN, StreamChannel, StreamFrame, demux};
pub use self::json::{ProgressEvent, decode_progress};
use crate::error::{Result, StreamError};

/// Content type that selects progress-event decoding.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Bytes moved per read when copying a body to a sink.
const COPY_CHUNK: usize = 8 * 1024;

/// Decoding switches for a response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Copy a JSON body verbatim instead of rendering its events.
    pub raw_json: bool,
    /// Copy a non-JSON body verbatim instead of demultiplexing it.
    pub raw_terminal: bool,
}

/// Returns true when `content_type` selects progress-event decoding.
#[must_use]
pub fn is_json_stream(content_type: Option<&str>) -> bool {
    content_type == Some(JSON_CONTENT_TYPE)
}

/// Decode a successful response body into the caller's sinks.
///
/// Output already written before a failure is not rolled back.
///
/// # Errors
///
/// Returns `BuildError::RemoteBuild` when a progress event carries an error,
/// and a `StreamError` when the body is malformed, truncated, unreadable, or
/// a sink rejects a write.
pub async fn decode<R, O, E>(
    content_type: Option<&str>,
    body: &mut R,
    stdout: &mut O,
    stderr: &mut E,
    options: StreamOptions,
) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    if is_json_stream(content_type) {
        if options.raw_json {
            copy_to_sink(body, stdout, "stdout").await?;
            return Ok(());
        }
        return decode_progress(body, stdout).await;
    }

    if options.raw_terminal {
        copy_to_sink(body, stdout, "stdout").await?;
        return Ok(());
    }

    demux(body, stdout, stderr).await?;
    Ok(())
}

/// Copy `reader` to `sink` in bounded chunks, returning the byte count.
async fn copy_to_sink<R, W>(
    reader: &mut R,
    sink: &mut W,
    sink_name: &'static str,
) -> std::result::Result<u64, StreamError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0_u8; COPY_CHUNK];
    let mut copied: u64 = 0;
    loop {
        let read = reader
            .read(&mut buffer)
            .await
            .map_err(|error| read_failed(&error))?;
        if read == 0 {
            break;
        }
        let chunk = buffer.get(..read).unwrap_or_default();
        sink.write_all(chunk)
            .await
            .map_err(|error| write_failed(sink_name, &error))?;
        copied = copied.saturating_add(read as u64);
    }
    sink.flush()
        .await
        .map_err(|error| write_failed(sink_name, &error))?;
    Ok(copied)
}

fn read_failed(error: &std::io::Error) -> StreamError {
    StreamError::ReadFailed {
        message: error.to_string(),
    }
}

fn write_failed(sink: &'static str, error: &std::io::Error) -> StreamError {
    StreamError::WriteFailed {
        sink,
        message: error.to_string(),
    }
}

//! Demultiplexing of combined stdout/stderr bodies.
//!
//! Each frame is an 8-byte header `[channel][0 0 0][length: u32 BE]` followed
//! by `length` payload bytes. The stream must end exactly on a frame
//! boundary.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use super::{copy_to_sink, read_failed};
use crate::error::StreamError;

/// Size of a frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 8;

/// Output channel named by a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamChannel {
    /// Standard output, selector `1`.
    Stdout,
    /// Standard error, selector `2`.
    Stderr,
}

impl StreamChannel {
    /// Map a selector byte to its channel.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::InvalidChannel` for any selector other than `1`
    /// or `2`.
    pub const fn from_selector(selector: u8) -> Result<Self, StreamError> {
        match selector {
            1 => Ok(Self::Stdout),
            2 => Ok(Self::Stderr),
            _ => Err(StreamError::InvalidChannel { selector }),
        }
    }

    /// Returns the sink name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFrame {
    /// Sink the payload belongs to.
    pub channel: StreamChannel,
    /// Payload length in bytes.
    pub length: u32,
}

impl StreamFrame {
    /// Parse a frame header. The three reserved bytes are ignored.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::InvalidChannel` for an unknown selector.
    pub fn parse(header: [u8; FRAME_HEADER_LEN]) -> Result<Self, StreamError> {
        let [selector, _, _, _, len0, len1, len2, len3] = header;
        let channel = StreamChannel::from_selector(selector)?;
        #[expect(
            clippy::big_endian_bytes,
            reason = "frame lengths are big-endian on the wire"
        )]
        let length = u32::from_be_bytes([len0, len1, len2, len3]);
        Ok(Self { channel, length })
    }
}

/// Split a multiplexed body into `stdout` and `stderr`.
///
/// Payloads are copied in bounded chunks, never buffered whole.
///
/// # Errors
///
/// Returns `StreamError::InvalidChannel` for an unknown selector,
/// `StreamError::TruncatedFrame` when the body ends inside a header or
/// payload, and `StreamError::ReadFailed` or `StreamError::WriteFailed` for
/// I/O failures.
pub async fn demux<R, O, E>(
    body: &mut R,
    stdout: &mut O,
    stderr: &mut E,
) -> Result<(), StreamError>
where
    R: AsyncRead + Unpin + ?Sized,
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    while let Some(header) = read_header(body).await? {
        let frame = StreamFrame::parse(header)?;
        let expected = u64::from(frame.length);
        let mut payload = (&mut *body).take(expected);
        let received = match frame.channel {
            StreamChannel::Stdout => {
                copy_to_sink(&mut payload, stdout, frame.channel.name()).await?
            }
            StreamChannel::Stderr => {
                copy_to_sink(&mut payload, stderr, frame.channel.name()).await?
            }
        };
        if received < expected {
            return Err(StreamError::TruncatedFrame { expected, received });
        }
    }
    Ok(())
}

/// Read one frame header, returning `None` on a clean end of stream.
async fn read_header<R>(body: &mut R) -> Result<Option<[u8; FRAME_HEADER_LEN]>, StreamError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0_u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while let Some(unfilled) = header.get_mut(filled..).filter(|rest| !rest.is_empty()) {
        let read = body
            .read(unfilled)
            .await
            .map_err(|error| read_failed(&error))?;
        if read == 0 {
            break;
        }
        filled += read;
    }

    match filled {
        0 => Ok(None),
        FRAME_HEADER_LEN => Ok(Some(header)),
        partial => Err(StreamError::TruncatedFrame {
            expected: FRAME_HEADER_LEN as u64,
            received: partial as u64,
        }),
    }
}

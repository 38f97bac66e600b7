//! Error classification helpers for engine transport failures.
//!
//! This module converts low-level socket and HTTP client errors into semantic
//! `EngineError` variants so callers receive actionable diagnostics. Refused
//! connections are singled out so callers can apply their own retry policy.

use std::io::{self, ErrorKind};

use camino::Utf8Path;

use crate::error::EngineError;

/// Classify a failed Unix-socket dial into a semantic `EngineError`.
pub(super) fn classify_socket_error(error: &io::Error, socket_path: &Utf8Path) -> EngineError {
    match error.kind() {
        ErrorKind::NotFound => EngineError::SocketNotFound {
            path: socket_path.as_std_path().to_path_buf(),
        },
        ErrorKind::PermissionDenied => EngineError::PermissionDenied {
            path: socket_path.as_std_path().to_path_buf(),
        },
        ErrorKind::ConnectionRefused => EngineError::ConnectionRefused {
            endpoint: format!("unix://{socket_path}"),
        },
        _ => EngineError::ConnectionFailed {
            message: error.to_string(),
        },
    }
}

/// Classify a pooled HTTP client error into a semantic `EngineError`.
///
/// Connect-phase failures whose cause is a refused connection become
/// `ConnectionRefused`. Other connect failures become `ConnectionFailed`, and
/// failures after the connection was established become `RequestFailed`.
pub(super) fn classify_http_error(error: &reqwest::Error, endpoint: &str) -> EngineError {
    let message = error_chain_message(error);

    if error.is_connect() {
        if is_connection_refused(error) {
            return EngineError::ConnectionRefused {
                endpoint: endpoint.to_owned(),
            };
        }
        return EngineError::ConnectionFailed { message };
    }

    EngineError::RequestFailed { message }
}

fn is_connection_refused(error: &(dyn std::error::Error + 'static)) -> bool {
    io_error_kind_in_chain(error) == Some(ErrorKind::ConnectionRefused)
        || error_chain_message(error)
            .to_ascii_lowercase()
            .contains("connection refused")
}

/// Walk the error source chain looking for an `io::Error` kind.
fn io_error_kind_in_chain(error: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = err.source();
    }
    None
}

/// Join the messages of an error and all of its sources.
fn error_chain_message(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(err) = current {
        message.push_str(": ");
        message.push_str(&err.to_string());
        current = err.source();
    }
    message
}

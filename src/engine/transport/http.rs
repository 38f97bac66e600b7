//! Pooled HTTP and HTTPS transport.

use std::fmt;

use futures_util::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Certificate, Client, Identity};
use tokio_util::io::{ReaderStream, StreamReader};

use super::error_classification::classify_http_error;
use super::{EngineRequest, EngineResponse, RequestBody, ResponseBody, SendFuture, Transport};
use crate::engine::endpoint::Endpoint;
use crate::error::EngineError;

/// PEM-encoded TLS material for an HTTPS engine endpoint.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsMaterial {
    /// Client certificate chain.
    pub cert_pem: Vec<u8>,
    /// Private key matching the client certificate.
    pub key_pem: Vec<u8>,
    /// Trust root used to verify the engine. Peer verification is disabled
    /// when absent.
    pub ca_pem: Option<Vec<u8>>,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("cert_pem", &self.cert_pem.len())
            .field("key_pem", &"<redacted>")
            .field("ca_pem", &self.ca_pem.as_ref().map(Vec::len))
            .finish()
    }
}

/// Transport backed by a shared, pooled `reqwest` client.
///
/// The client owns connection reuse and is safe to share between concurrent
/// callers.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    /// Build a transport for a network endpoint.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::TlsSetupFailed` when the TLS material cannot be
    /// parsed, and `EngineError::ConnectionFailed` when the client cannot be
    /// built.
    pub fn new(endpoint: &Endpoint, tls: Option<&TlsMaterial>) -> Result<Self, EngineError> {
        let builder = Client::builder().use_rustls_tls();
        let configured = match tls {
            Some(material) => apply_tls(builder, material)?,
            None => builder,
        };
        let client = configured
            .build()
            .map_err(|error| EngineError::ConnectionFailed {
                message: error.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    async fn send_async(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
        let EngineRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let builder = self.client.request(method, url.as_str()).headers(headers);
        let prepared = match body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Reader(reader) => builder.body(Body::wrap_stream(ReaderStream::new(reader))),
        };

        let response = prepared
            .send()
            .await
            .map_err(|error| classify_http_error(&error, &self.endpoint))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));

        Ok(EngineResponse::new(
            status,
            content_type,
            ResponseBody::new(reader),
        ))
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: EngineRequest) -> SendFuture<'_> {
        Box::pin(self.send_async(request))
    }
}

fn apply_tls(
    builder: reqwest::ClientBuilder,
    material: &TlsMaterial,
) -> Result<reqwest::ClientBuilder, EngineError> {
    let mut identity_pem = material.key_pem.clone();
    identity_pem.push(b'\n');
    identity_pem.extend_from_slice(&material.cert_pem);
    let identity = Identity::from_pem(&identity_pem).map_err(tls_setup_failed)?;
    let with_identity = builder.identity(identity);

    match &material.ca_pem {
        Some(ca_pem) => {
            let root = Certificate::from_pem(ca_pem).map_err(tls_setup_failed)?;
            Ok(with_identity.add_root_certificate(root))
        }
        None => {
            tracing::warn!("no CA certificate configured; engine certificate will not be verified");
            Ok(with_identity.danger_accept_invalid_certs(true))
        }
    }
}

fn tls_setup_failed(error: reqwest::Error) -> EngineError {
    EngineError::TlsSetupFailed {
        message: error.to_string(),
    }
}

//! Registry credential headers.
//!
//! Credentials are never interpreted by the client. They are serialised to
//! JSON, encoded with URL-safe base64 and forwarded in one of two headers:
//! `X-Registry-Auth` for a single credential and `X-Registry-Config` for a
//! per-registry map.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Header carrying a single registry credential.
pub const REGISTRY_AUTH_HEADER: &str = "x-registry-auth";

/// Header carrying credentials for several registries.
pub const REGISTRY_CONFIG_HEADER: &str = "x-registry-config";

/// Credentials for one registry.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Registry user name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    /// Registry password or token.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Account e-mail address.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
    /// Registry server address.
    #[serde(rename = "serveraddress", skip_serializing_if = "String::is_empty")]
    pub server_address: String,
}

impl AuthConfig {
    /// Decode a credential from its header value.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::AuthEncoding` when the value is not URL-safe
    /// base64 of a JSON credential.
    pub fn from_header(value: &str) -> Result<Self, BuildError> {
        decode_header(value)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &password)
            .field("email", &self.email)
            .field("server_address", &self.server_address)
            .finish()
    }
}

/// Credentials keyed by registry server address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfigSet {
    /// One credential per registry.
    #[serde(default)]
    pub configs: BTreeMap<String, AuthConfig>,
}

impl AuthConfigSet {
    /// Decode a credential set from its header value.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::AuthEncoding` when the value is not URL-safe
    /// base64 of a JSON credential set.
    pub fn from_header(value: &str) -> Result<Self, BuildError> {
        decode_header(value)
    }
}

/// The two credential shapes a request can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryAuth<'a> {
    /// A single credential, sent as `X-Registry-Auth`.
    Single(&'a AuthConfig),
    /// A per-registry map, sent as `X-Registry-Config`.
    Set(&'a AuthConfigSet),
}

impl RegistryAuth<'_> {
    /// Returns the header this credential travels in.
    #[must_use]
    pub const fn header_name(self) -> &'static str {
        match self {
            Self::Single(_) => REGISTRY_AUTH_HEADER,
            Self::Set(_) => REGISTRY_CONFIG_HEADER,
        }
    }

    /// Encode the credential as a header value.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::AuthEncoding` if serialisation fails.
    pub fn encode(self) -> Result<String, BuildError> {
        let json = match self {
            Self::Single(config) => serde_json::to_vec(config),
            Self::Set(configs) => serde_json::to_vec(configs),
        }
        .map_err(|error| BuildError::AuthEncoding {
            message: error.to_string(),
        })?;
        Ok(URL_SAFE.encode(json))
    }
}

/// Build the header map for a list of credentials.
///
/// Every credential produces a header, including empty ones.
///
/// # Errors
///
/// Returns `BuildError::AuthEncoding` if a credential cannot be encoded.
pub fn auth_headers(auths: &[RegistryAuth<'_>]) -> Result<HeaderMap, BuildError> {
    let mut headers = HeaderMap::new();
    for auth in auths {
        let encoded = auth.encode()?;
        let value = HeaderValue::from_str(&encoded).map_err(|error| BuildError::AuthEncoding {
            message: error.to_string(),
        })?;
        headers.insert(HeaderName::from_static(auth.header_name()), value);
    }
    Ok(headers)
}

fn decode_header<T: for<'de> Deserialize<'de>>(value: &str) -> Result<T, BuildError> {
    let json = URL_SAFE
        .decode(value.trim())
        .map_err(|error| BuildError::AuthEncoding {
            message: format!("invalid base64: {error}"),
        })?;
    serde_json::from_slice(&json).map_err(|error| BuildError::AuthEncoding {
        message: format!("invalid credential JSON: {error}"),
    })
}

//! Endpoint parsing and socket fallback resolution.
//!
//! An endpoint string is validated once, when a client is constructed, and
//! the resulting [`Endpoint`] is immutable for the lifetime of that client.
//! When no endpoint is configured explicitly, [`SocketResolver`] walks the
//! conventional environment variables before falling back to the platform
//! default socket.

use std::fmt;

use camino::Utf8Path;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::EngineError;

/// Port conventionally used by engines serving their API over TLS.
pub const SECURE_API_PORT: u16 = 2376;

/// Environment variable names checked in fallback order after configuration sources.
const FALLBACK_ENV_VARS: &[&str] = &["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Default socket path for Unix platforms.
const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";

/// Transport scheme of a resolved endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP over TCP.
    Http,
    /// HTTP over TLS.
    Https,
    /// HTTP over a Unix-domain socket.
    Unix,
}

impl Scheme {
    /// Returns the URI scheme name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Unix => "unix",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated container engine address.
///
/// `unix` endpoints carry a socket path and never a port. `http` and `https`
/// endpoints carry a non-empty host and, when one was given, a port in
/// `1..=65535`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    path: String,
}

impl Endpoint {
    /// Parse and validate an endpoint string.
    ///
    /// `tcp://` endpoints are reinterpreted as `https` when the port is
    /// [`SECURE_API_PORT`] and as `http` otherwise. A missing port is
    /// tolerated and left unresolved.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidEndpoint` when the string is not a URI,
    /// uses a scheme other than `tcp`, `http`, `https` or `unix`, names port
    /// `0`, lacks the host (network schemes) or path (`unix`) it needs, or
    /// carries a `unix` socket path that does not decode to UTF-8.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let url = Url::parse(raw).map_err(|_| invalid_endpoint(raw))?;
        let port = url.port();

        let scheme = match url.scheme() {
            "tcp" if port == Some(SECURE_API_PORT) => Scheme::Https,
            "tcp" | "http" => Scheme::Http,
            "https" => Scheme::Https,
            "unix" => Scheme::Unix,
            _ => return Err(invalid_endpoint(raw)),
        };

        let host = url.host_str().unwrap_or_default().to_owned();
        let path = url.path().to_owned();

        if scheme == Scheme::Unix {
            // The socket path is all a unix endpoint needs; ports are meaningless.
            if path.is_empty() || path == "/" {
                return Err(invalid_endpoint(raw));
            }
            let socket_path = percent_decode_str(&path)
                .decode_utf8()
                .map_err(|_| invalid_endpoint(raw))?
                .into_owned();
            return Ok(Self {
                scheme,
                host,
                port: None,
                path: socket_path,
            });
        }

        if host.is_empty() || port == Some(0) {
            return Err(invalid_endpoint(raw));
        }

        Ok(Self {
            scheme,
            host,
            port,
            path,
        })
    }

    /// Returns the resolved scheme.
    #[must_use]
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns the host component (empty for most `unix` endpoints).
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the explicit port, if one was given.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the path component. For `unix` endpoints this is the socket path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true when requests travel over a Unix-domain socket.
    #[must_use]
    pub fn is_unix(&self) -> bool {
        self.scheme == Scheme::Unix
    }

    /// Returns the socket path for `unix` endpoints.
    #[must_use]
    pub fn socket_path(&self) -> Option<&Utf8Path> {
        self.is_unix().then(|| Utf8Path::new(&self.path))
    }

    /// Returns the prefix joined with a request path to form the request target.
    ///
    /// Unix endpoints yield an empty base because the socket path is not
    /// part of the HTTP request line.
    #[must_use]
    pub fn base_url(&self) -> String {
        if self.is_unix() {
            return String::new();
        }

        let authority = self.port.map_or_else(
            || self.host.clone(),
            |port| format!("{}:{port}", self.host),
        );
        let base = format!("{}://{authority}{}", self.scheme, self.path);
        base.trim_end_matches('/').to_owned()
    }

    /// Returns the full request target for `path`.
    #[must_use]
    pub fn request_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.scheme, self.port) {
            (Scheme::Unix, _) => write!(f, "unix://{}", self.path),
            (scheme, Some(port)) => write!(f, "{scheme}://{}:{port}{}", self.host, self.path),
            (scheme, None) => write!(f, "{scheme}://{}{}", self.host, self.path),
        }
    }
}

fn invalid_endpoint(raw: &str) -> EngineError {
    EngineError::InvalidEndpoint {
        endpoint: raw.to_owned(),
    }
}

/// Resolves container engine socket endpoints from environment variables.
///
/// The resolver checks a prioritised list of environment variables to find
/// the socket endpoint when no explicit configuration is provided.
///
/// # Type Parameters
///
/// * `E` - An environment provider implementing the `mockable::Env` trait,
///   allowing for testable environment variable access.
///
/// # Example
///
/// ```ignore
/// use mockable::DefaultEnv;
/// use stevedore::engine::SocketResolver;
///
/// let env = DefaultEnv::new();
/// let resolver = SocketResolver::new(&env);
/// let socket = resolver.resolve(None);
/// ```
pub struct SocketResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> SocketResolver<'a, E> {
    /// Creates a new socket resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Resolves the socket endpoint from fallback environment variables.
    ///
    /// Checks `DOCKER_HOST`, `CONTAINER_HOST` and `PODMAN_HOST` in order and
    /// returns the first non-empty value.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<String> {
        FALLBACK_ENV_VARS
            .iter()
            .filter_map(|var_name| self.env.string(var_name))
            .find(|value| !value.is_empty())
    }

    /// Resolves the endpoint string to connect to.
    ///
    /// Resolution order:
    /// 1. `config_socket` (from CLI, config file, or `STEVEDORE_ENGINE_SOCKET`)
    /// 2. `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST`
    /// 3. Platform default socket
    ///
    /// Bare absolute paths are normalised to `unix://` URIs.
    #[must_use]
    pub fn resolve(&self, config_socket: Option<&str>) -> String {
        let socket = config_socket
            .filter(|s| !s.is_empty())
            .map(String::from)
            .or_else(|| self.resolve_from_env())
            .unwrap_or_else(|| Self::default_socket().to_owned());
        normalize_bare_path(&socket)
    }

    /// Returns the platform default socket, `unix:///var/run/docker.sock`.
    #[must_use]
    pub const fn default_socket() -> &'static str {
        DEFAULT_SOCKET
    }
}

/// Prefix a bare socket path with the `unix://` scheme.
///
/// Strings that already carry a scheme are returned unchanged.
fn normalize_bare_path(socket: &str) -> String {
    if socket.starts_with('/') {
        format!("unix://{socket}")
    } else {
        socket.to_owned()
    }
}

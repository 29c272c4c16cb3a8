//! Connection configuration for the vector backend.
//!
//! [`VectorConfig`] is built through a validating builder or from the
//! environment. Endpoint URLs are resolved into explicit scheme/host/port
//! parts rather than handed to the HTTP client verbatim: TLS deployments
//! behind gateways commonly omit the port and carry a path prefix, and
//! URL auto-parsing gets both wrong.

use std::time::Duration;

use crate::error::{Result, VectorError};

/// Default request timeout for backend calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default interval between real health-check probes.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of connection attempts before entering degraded mode.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Default base delay for connection backoff (doubles per attempt).
pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Default bound on idle pooled sockets per backend host.
pub const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 4;

/// Backend port assumed for plain endpoints without an explicit port.
const DEFAULT_HTTP_PORT: u16 = 6333;

/// Port assumed for TLS endpoints without an explicit port (cloud/gateway
/// deployments terminate TLS on 443, not on the backend default port).
const DEFAULT_HTTPS_PORT: u16 = 443;

/// An optional basic-auth credential layered under the API-key header for
/// network-level gateways in front of the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    /// Gateway username.
    pub username: String,
    /// Gateway password.
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth").field("username", &self.username).finish_non_exhaustive()
    }
}

/// Configuration for connecting to the vector backend.
///
/// Construct via [`VectorConfig::builder()`] or [`VectorConfig::from_env()`].
#[derive(Clone)]
pub struct VectorConfig {
    /// Backend URL, e.g. `https://vectors.internal.example.com`.
    pub url: String,
    /// Required API key, sent as the `api-key` header on every request.
    pub api_key: String,
    /// Optional gateway basic-auth credential.
    pub basic_auth: Option<BasicAuth>,
    /// Optional path prefix for reverse-proxied deployments, e.g. `/qdrant`.
    pub path_prefix: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Bound on idle pooled sockets kept alive to the backend.
    pub max_idle_connections: usize,
    /// Minimum interval between real health-check probes.
    pub health_check_interval: Duration,
    /// Connection attempts before the layer enters degraded mode.
    pub connect_attempts: u32,
    /// Base backoff delay between connection attempts (doubles per attempt).
    pub connect_backoff: Duration,
}

impl std::fmt::Debug for VectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("basic_auth", &self.basic_auth)
            .field("path_prefix", &self.path_prefix)
            .field("timeout", &self.timeout)
            .field("max_idle_connections", &self.max_idle_connections)
            .field("health_check_interval", &self.health_check_interval)
            .field("connect_attempts", &self.connect_attempts)
            .field("connect_backoff", &self.connect_backoff)
            .finish()
    }
}

impl VectorConfig {
    /// Create a new builder for constructing a [`VectorConfig`].
    pub fn builder() -> VectorConfigBuilder {
        VectorConfigBuilder::default()
    }

    /// Build a configuration from the environment.
    ///
    /// Reads `QDRANT_URL` and `QDRANT_API_KEY` (required), plus the optional
    /// `QDRANT_BASIC_AUTH` (`user:password`) and `QDRANT_PATH_PREFIX`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("QDRANT_URL")
            .map_err(|_| VectorError::Config("QDRANT_URL environment variable not set".into()))?;
        let api_key = std::env::var("QDRANT_API_KEY").map_err(|_| {
            VectorError::Config("QDRANT_API_KEY environment variable not set".into())
        })?;

        let mut builder = Self::builder().url(url).api_key(api_key);
        if let Ok(credential) = std::env::var("QDRANT_BASIC_AUTH") {
            let (username, password) = credential.split_once(':').ok_or_else(|| {
                VectorError::Config("QDRANT_BASIC_AUTH must be 'user:password'".into())
            })?;
            builder = builder.basic_auth(username, password);
        }
        if let Ok(prefix) = std::env::var("QDRANT_PATH_PREFIX") {
            builder = builder.path_prefix(prefix);
        }
        builder.build()
    }

    /// Resolve the configured URL and path prefix into an explicit endpoint.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::resolve(&self.url, self.path_prefix.as_deref())
    }
}

/// Builder for constructing a validated [`VectorConfig`].
#[derive(Debug, Clone)]
pub struct VectorConfigBuilder {
    config: VectorConfig,
}

impl Default for VectorConfigBuilder {
    fn default() -> Self {
        Self {
            config: VectorConfig {
                url: String::new(),
                api_key: String::new(),
                basic_auth: None,
                path_prefix: None,
                timeout: DEFAULT_TIMEOUT,
                max_idle_connections: DEFAULT_MAX_IDLE_CONNECTIONS,
                health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
                connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
                connect_backoff: DEFAULT_CONNECT_BACKOFF,
            },
        }
    }
}

impl VectorConfigBuilder {
    /// Set the backend URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Set the API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = api_key.into();
        self
    }

    /// Set a gateway basic-auth credential, layered under the API key.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.basic_auth =
            Some(BasicAuth { username: username.into(), password: password.into() });
        self
    }

    /// Set a path prefix for reverse-proxied deployments.
    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.path_prefix = Some(prefix.into());
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the bound on idle pooled sockets.
    pub fn max_idle_connections(mut self, max: usize) -> Self {
        self.config.max_idle_connections = max;
        self
    }

    /// Set the minimum interval between real health-check probes.
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.config.health_check_interval = interval;
        self
    }

    /// Set the number of connection attempts before degraded mode.
    pub fn connect_attempts(mut self, attempts: u32) -> Self {
        self.config.connect_attempts = attempts;
        self
    }

    /// Set the base backoff delay between connection attempts.
    pub fn connect_backoff(mut self, delay: Duration) -> Self {
        self.config.connect_backoff = delay;
        self
    }

    /// Build the [`VectorConfig`], validating required fields.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::Config`] if the URL or API key is missing or
    /// empty, or if `connect_attempts` is zero. A missing API key fails here,
    /// before any network call is made.
    pub fn build(self) -> Result<VectorConfig> {
        if self.config.url.trim().is_empty() {
            return Err(VectorError::Config("backend URL must not be empty".into()));
        }
        if self.config.api_key.trim().is_empty() {
            return Err(VectorError::Config("API key must not be empty".into()));
        }
        if self.config.connect_attempts == 0 {
            return Err(VectorError::Config("connect_attempts must be at least 1".into()));
        }
        // Validate the URL shape up front so a malformed endpoint fails at
        // startup, not on the first query.
        Endpoint::resolve(&self.config.url, self.config.path_prefix.as_deref())?;
        Ok(self.config)
    }
}

/// An explicitly resolved backend endpoint.
///
/// The backend URL is decomposed by hand: TLS endpoints without an explicit
/// port resolve to 443 (gateway convention), plain endpoints to the backend
/// default 6333, and any path carried by the URL is normalized and joined
/// with the configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `true` for `https` endpoints.
    pub tls: bool,
    /// Host name or address.
    pub host: String,
    /// Resolved port.
    pub port: u16,
    /// Normalized path prefix: empty, or `/`-prefixed without a trailing `/`.
    pub prefix: String,
}

impl Endpoint {
    /// Resolve a URL plus an optional extra path prefix.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::Config`] for unsupported schemes, empty hosts,
    /// or unparseable ports.
    pub fn resolve(url: &str, extra_prefix: Option<&str>) -> Result<Self> {
        let url = url.trim();
        let (tls, rest) = if let Some(rest) = url.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            (false, rest)
        } else {
            return Err(VectorError::Config(format!(
                "backend URL '{url}' must start with http:// or https://"
            )));
        };

        let (authority, url_path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (rest, ""),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port_text)) => {
                let port = port_text.parse::<u16>().map_err(|_| {
                    VectorError::Config(format!("invalid port '{port_text}' in backend URL"))
                })?;
                (host, port)
            }
            None => (authority, if tls { DEFAULT_HTTPS_PORT } else { DEFAULT_HTTP_PORT }),
        };
        if host.is_empty() {
            return Err(VectorError::Config("backend URL has an empty host".into()));
        }

        let mut prefix = String::new();
        for segment in url_path.split('/').chain(extra_prefix.unwrap_or("").split('/')) {
            if !segment.is_empty() {
                prefix.push('/');
                prefix.push_str(segment);
            }
        }

        Ok(Self { tls, host: host.to_string(), port, prefix })
    }

    /// The base URL all request paths are appended to.
    pub fn base_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_empty_api_key() {
        let err = VectorConfig::builder().url("http://localhost:6333").api_key("").build();
        assert!(matches!(err, Err(VectorError::Config(_))));
    }

    #[test]
    fn build_rejects_missing_url() {
        let err = VectorConfig::builder().api_key("key").build();
        assert!(matches!(err, Err(VectorError::Config(_))));
    }

    #[test]
    fn tls_endpoint_defaults_to_gateway_port() {
        let endpoint = Endpoint::resolve("https://vectors.example.com", None).unwrap();
        assert!(endpoint.tls);
        assert_eq!(endpoint.port, 443);
        assert_eq!(endpoint.base_url(), "https://vectors.example.com:443");
    }

    #[test]
    fn plain_endpoint_defaults_to_backend_port() {
        let endpoint = Endpoint::resolve("http://localhost", None).unwrap();
        assert_eq!(endpoint.port, 6333);
    }

    #[test]
    fn explicit_port_wins() {
        let endpoint = Endpoint::resolve("https://vectors.example.com:6333", None).unwrap();
        assert_eq!(endpoint.port, 6333);
    }

    #[test]
    fn url_path_and_prefix_are_joined_and_normalized() {
        let endpoint =
            Endpoint::resolve("https://gw.example.com/vectors/", Some("qdrant/")).unwrap();
        assert_eq!(endpoint.prefix, "/vectors/qdrant");
        assert_eq!(endpoint.base_url(), "https://gw.example.com:443/vectors/qdrant");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(Endpoint::resolve("grpc://localhost:6334", None).is_err());
        assert!(Endpoint::resolve("https://:6333", None).is_err());
    }
}

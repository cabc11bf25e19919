//! Client configuration and builder

use std::fmt;
use std::time::Duration;

use rsa::RsaPrivateKey;

use super::retry::RetryPolicy;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable configuration for an [`AuthClient`](super::AuthClient)
#[derive(Clone)]
pub struct ClientConfig {
    /// Verifier base URL, e.g. `https://auth.example.workers.dev`
    pub base_url: String,
    /// Client identifier registered with the verifier
    pub client_id: String,
    /// Signing key (required)
    pub signing_key: Option<RsaPrivateKey>,
    /// Timeout applied to each individual request
    pub timeout: Duration,
    /// Retry policy for [`authenticate`](super::AuthClient::authenticate)
    pub retry: RetryPolicy,
    /// Secret keys to keep from the verify response (empty = all)
    pub secret_keys: Vec<String>,
    /// Repository URL hint sent on verify
    pub repo_url: Option<String>,
    /// RPC endpoint hint sent on verify
    pub grpc_endpoint: Option<String>,
    /// Request the verifier's repository list
    pub include_repo_list: bool,
    /// Tunnel URL hint sent on verify
    pub tunnel_url: Option<String>,
    /// Custom HTTP client (a default one is built otherwise)
    pub http_client: Option<reqwest::Client>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("secret_keys", &self.secret_keys)
            .field("repo_url", &self.repo_url)
            .field("grpc_endpoint", &self.grpc_endpoint)
            .field("include_repo_list", &self.include_repo_list)
            .field("tunnel_url", &self.tunnel_url)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Start a builder
    pub fn builder(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
    ) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self {
                base_url: base_url.into(),
                client_id: client_id.into(),
                signing_key: None,
                timeout: DEFAULT_TIMEOUT,
                retry: RetryPolicy::default(),
                secret_keys: Vec::new(),
                repo_url: None,
                grpc_endpoint: None,
                include_repo_list: false,
                tunnel_url: None,
                http_client: None,
            },
        }
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the signing key
    #[must_use]
    pub fn signing_key(mut self, key: RsaPrivateKey) -> Self {
        self.config.signing_key = Some(key);
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the retry budget and constant backoff
    #[must_use]
    pub fn retry(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.config.retry = RetryPolicy::new(max_retries, backoff);
        self
    }

    /// Restrict returned secrets to these keys
    #[must_use]
    pub fn secret_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.secret_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Send a repository URL hint
    #[must_use]
    pub fn repo_url(mut self, url: impl Into<String>) -> Self {
        self.config.repo_url = Some(url.into());
        self
    }

    /// Send an RPC endpoint hint
    #[must_use]
    pub fn grpc_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.grpc_endpoint = Some(endpoint.into());
        self
    }

    /// Ask for the repository list
    #[must_use]
    pub fn include_repo_list(mut self, include: bool) -> Self {
        self.config.include_repo_list = include;
        self
    }

    /// Send a tunnel URL hint
    #[must_use]
    pub fn tunnel_url(mut self, url: impl Into<String>) -> Self {
        self.config.tunnel_url = Some(url.into());
        self
    }

    /// Use a caller-provided HTTP client
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.config.http_client = Some(client);
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

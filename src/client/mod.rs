//! Challenge-response authentication client
//!
//! Each [`AuthClient::authenticate`] call runs the full exchange:
//!
//! 1. `POST /challenge` with the client id, receiving a one-time challenge
//! 2. sign the challenge (SHA-256, RSASSA-PKCS1-v1_5)
//! 3. `POST /verify` with the signature, receiving a token and secrets
//!
//! A transient failure in step 1 or 3 restarts from step 1, so a challenge
//! is never submitted twice.

mod config;
mod retry;
mod types;

pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_TIMEOUT};
pub use retry::{DEFAULT_BACKOFF, RetryPolicy, with_retry};
pub use types::{Challenge, HealthResponse, Session};

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use reqwest::{Client, Response};
use rsa::RsaPrivateKey;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::gate::SharedToken;
use crate::signing;
use crate::{Error, Result};
use types::{ChallengeRequest, ErrorResponse, VerifyRequest, VerifyResponse};

/// Client for a remote challenge-response verifier
pub struct AuthClient {
    http: Client,
    base_url: String,
    client_id: String,
    signing_key: RsaPrivateKey,
    timeout: Duration,
    retry: RetryPolicy,
    secret_keys: Vec<String>,
    repo_url: Option<String>,
    grpc_endpoint: Option<String>,
    include_repo_list: bool,
    tunnel_url: Option<String>,
    insecure_transport: bool,
    exchange_lock: Mutex<()>,
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl AuthClient {
    /// Create a client from configuration.
    ///
    /// Fails with [`Error::InvalidConfig`] when the base URL or client id is
    /// empty, the base URL does not parse, or no signing key is set. A
    /// non-HTTPS, non-loopback base URL only logs a warning.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(Error::InvalidConfig("base URL is required".to_string()));
        }
        if config.client_id.is_empty() {
            return Err(Error::InvalidConfig("client id is required".to_string()));
        }
        let Some(signing_key) = config.signing_key else {
            return Err(Error::InvalidConfig("signing key is required".to_string()));
        };

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| Error::InvalidConfig(format!("invalid base URL {base_url}: {e}")))?;

        let insecure_transport = !is_secure_transport(&parsed);
        if insecure_transport {
            warn!(base_url = %base_url, "Verifier base URL is not HTTPS");
        }

        let http = match config.http_client {
            Some(client) => client,
            None => Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?,
        };

        Ok(Self {
            http,
            base_url,
            client_id: config.client_id,
            signing_key,
            timeout: config.timeout,
            retry: config.retry,
            secret_keys: config.secret_keys,
            repo_url: config.repo_url,
            grpc_endpoint: config.grpc_endpoint,
            include_repo_list: config.include_repo_list,
            tunnel_url: config.tunnel_url,
            insecure_transport,
            exchange_lock: Mutex::new(()),
        })
    }

    /// Normalized base URL (no trailing slash)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Client identifier
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Retry policy used by [`authenticate`](Self::authenticate)
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Whether the base URL was accepted without secure transport
    pub fn is_insecure_transport(&self) -> bool {
        self.insecure_transport
    }

    /// Run the full exchange under the configured retry policy
    pub async fn authenticate(&self) -> Result<Session> {
        self.authenticate_with(&self.retry).await
    }

    /// Run the full exchange under an explicit retry policy.
    ///
    /// Concurrent calls on one client wait for each other, so at most one
    /// exchange (including its retries) is in flight at a time.
    pub async fn authenticate_with(&self, policy: &RetryPolicy) -> Result<Session> {
        let _in_flight = self.exchange_lock.lock().await;
        let session = with_retry(policy, "authenticate", move || self.exchange()).await?;
        info!(
            client_id = %self.client_id,
            secrets = session.secret_data.len(),
            "Authenticated with verifier"
        );
        Ok(session)
    }

    /// Authenticate and publish the new token into `token`
    pub async fn authenticate_into(&self, token: &SharedToken) -> Result<Session> {
        let session = self.authenticate().await?;
        token.set(session.token.clone());
        Ok(session)
    }

    /// Blocking variant of [`authenticate`](Self::authenticate).
    ///
    /// Drives the exchange on a private current-thread runtime; the calling
    /// thread sleeps through any backoff. Must not be called from inside an
    /// async runtime.
    pub fn authenticate_blocking(&self) -> Result<Session> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.authenticate())
    }

    /// One pass of challenge, sign, verify
    async fn exchange(&self) -> Result<Session> {
        let challenge = self.request_challenge().await?;
        let signature = self.sign(&challenge)?;
        self.submit_verification(&challenge, &signature).await
    }

    /// Fetch a fresh challenge
    pub async fn request_challenge(&self) -> Result<Challenge> {
        let url = format!("{}/challenge", self.base_url);
        debug!(url = %url, client_id = %self.client_id, "Requesting challenge");

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&ChallengeRequest {
                client_id: &self.client_id,
            })
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let challenge: Challenge = read_json(response).await?;
        debug!(expires_at = challenge.expires_at, "Received challenge");
        Ok(challenge)
    }

    /// Sign a challenge with the held key
    pub fn sign(&self, challenge: &Challenge) -> Result<String> {
        signing::sign_challenge(Some(&self.signing_key), &challenge.challenge)
    }

    /// Submit a signed challenge and collect the session
    pub async fn submit_verification(
        &self,
        challenge: &Challenge,
        signature: &str,
    ) -> Result<Session> {
        let url = format!("{}/verify", self.base_url);
        debug!(url = %url, client_id = %self.client_id, "Submitting signature");

        let body = VerifyRequest {
            client_id: &self.client_id,
            challenge: &challenge.challenge,
            signature,
            repo_url: self.repo_url.as_deref(),
            grpc_endpoint: self.grpc_endpoint.as_deref(),
            include_repo_list: self.include_repo_list,
            tunnel_url: self.tunnel_url.as_deref(),
        };

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let verified: VerifyResponse = read_json(response).await?;
        if !verified.success {
            warn!(client_id = %self.client_id, error = %verified.error, "Verifier rejected signature");
            return Err(Error::Unauthorized(verified.error));
        }

        let mut session = Session::from(verified);
        session.retain_secrets(&self.secret_keys);
        Ok(session)
    }

    /// Best-effort health probe of the verifier
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        read_json(response).await
    }
}

/// HTTPS, or plain HTTP to a loopback host
fn is_secure_transport(url: &Url) -> bool {
    if url.scheme() == "https" {
        return true;
    }
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}

/// Read a response body, mapping non-2xx statuses and decode failures
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(http_error(status.as_u16(), &body));
    }

    serde_json::from_slice(&body).map_err(|e| Error::Decode(e.to_string()))
}

/// Build an HTTP error, preferring the server's `{"error": ...}` message
fn http_error(status: u16, body: &[u8]) -> Error {
    let message = match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    };
    Error::http(status, message)
}

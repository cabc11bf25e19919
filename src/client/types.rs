//! Wire types for the verifier's JSON endpoints

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `POST /challenge` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest<'a> {
    /// Client identifier
    pub client_id: &'a str,
}

/// One-time challenge issued by the verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    /// Opaque value to sign
    pub challenge: String,
    /// Expiry as a unix timestamp (seconds)
    #[serde(default)]
    pub expires_at: i64,
}

/// `POST /verify` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest<'a> {
    /// Client identifier
    pub client_id: &'a str,
    /// The challenge being answered
    pub challenge: &'a str,
    /// Base64 signature over the challenge
    pub signature: &'a str,
    /// Repository URL hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<&'a str>,
    /// RPC endpoint hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grpc_endpoint: Option<&'a str>,
    /// Ask the verifier to enumerate repositories
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_repo_list: bool,
    /// Tunnel URL hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tunnel_url: Option<&'a str>,
}

/// `POST /verify` response body, success or failure
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the signature was accepted
    pub success: bool,
    /// Bearer token
    #[serde(default)]
    pub token: String,
    /// Secret material released to this client
    #[serde(default)]
    pub secret_data: HashMap<String, String>,
    /// Repository list, present when requested
    #[serde(default)]
    pub repo_list: Vec<String>,
    /// Failure reason when `success` is false
    #[serde(default)]
    pub error: String,
}

/// Error body the verifier sends alongside non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

/// `GET /health` response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status string, usually `"ok"`
    pub status: String,
}

/// Result of a successful verification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque bearer token
    pub token: String,
    /// Secret material, filtered to the configured keys if any
    pub secret_data: HashMap<String, String>,
    /// Repository list (empty unless requested)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repo_list: Vec<String>,
}

impl Session {
    /// Keep only the secrets named in `keys`; an empty filter keeps everything
    pub(crate) fn retain_secrets(&mut self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        self.secret_data.retain(|k, _| keys.iter().any(|wanted| wanted == k));
    }
}

impl From<VerifyResponse> for Session {
    fn from(resp: VerifyResponse) -> Self {
        Self {
            token: resp.token,
            secret_data: resp.secret_data,
            repo_list: resp.repo_list,
        }
    }
}

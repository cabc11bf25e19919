//! Configuration management

use std::{path::Path, path::PathBuf, time::Duration};

use axum::http::HeaderName;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};

use crate::client::{ClientConfig, DEFAULT_BACKOFF, DEFAULT_TIMEOUT};
use crate::gate::{DEFAULT_TRUSTED_ORIGIN_HEADER, GateConfig, TokenSupplier};
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Verifier client settings
    pub client: ClientSettings,
    /// Key file locations
    pub keys: KeySettings,
    /// Access gate settings for `serve`
    pub gate: GateSettings,
    /// Listener settings for `serve`
    pub server: ServerSettings,
}

/// Verifier client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Verifier base URL
    pub base_url: String,
    /// Client identifier
    pub client_id: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Constant pause between attempts
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
    /// Secret keys to keep (empty = all)
    pub secret_keys: Vec<String>,
    /// Repository URL hint
    pub repo_url: Option<String>,
    /// RPC endpoint hint
    pub grpc_endpoint: Option<String>,
    /// Request the repository list
    pub include_repo_list: bool,
    /// Tunnel URL hint
    pub tunnel_url: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            client_id: String::new(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: 0,
            retry_backoff: DEFAULT_BACKOFF,
            secret_keys: Vec::new(),
            repo_url: None,
            grpc_endpoint: None,
            include_repo_list: false,
            tunnel_url: None,
        }
    }
}

impl ClientSettings {
    /// Build a [`ClientConfig`] using `signing_key`
    #[must_use]
    pub fn to_client_config(&self, signing_key: RsaPrivateKey) -> ClientConfig {
        let mut builder = ClientConfig::builder(&self.base_url, &self.client_id)
            .signing_key(signing_key)
            .timeout(self.timeout)
            .retry(self.max_retries, self.retry_backoff)
            .secret_keys(self.secret_keys.iter().cloned())
            .include_repo_list(self.include_repo_list);

        if let Some(url) = &self.repo_url {
            builder = builder.repo_url(url);
        }
        if let Some(endpoint) = &self.grpc_endpoint {
            builder = builder.grpc_endpoint(endpoint);
        }
        if let Some(url) = &self.tunnel_url {
            builder = builder.tunnel_url(url);
        }
        builder.build()
    }
}

/// Key file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    /// Private key PEM path
    pub private_key: PathBuf,
    /// Public key PEM path
    pub public_key: PathBuf,
    /// Key size for generation
    pub bits: usize,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            private_key: PathBuf::from("private.pem"),
            public_key: PathBuf::from("public.pem"),
            bits: 2048,
        }
    }
}

/// Access gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Paths that bypass authentication (default: `["/health"]`)
    pub whitelist: Vec<String>,
    /// Only accept requests that came through the trusted proxy
    pub require_trusted_origin: bool,
    /// Header marking trusted-proxy traversal
    pub trusted_origin_header: String,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            whitelist: vec!["/health".to_string()],
            require_trusted_origin: false,
            trusted_origin_header: DEFAULT_TRUSTED_ORIGIN_HEADER.to_string(),
        }
    }
}

impl GateSettings {
    /// Build a [`GateConfig`] around `supplier`
    pub fn to_gate_config(&self, supplier: impl TokenSupplier + 'static) -> Result<GateConfig> {
        let header = HeaderName::try_from(self.trusted_origin_header.as_str()).map_err(|e| {
            Error::Config(format!(
                "Invalid trusted origin header {:?}: {e}",
                self.trusted_origin_header
            ))
        })?;

        Ok(GateConfig::new(supplier)
            .whitelist(self.whitelist.iter().cloned())
            .require_trusted_origin(self.require_trusted_origin)
            .trusted_origin_header(header))
    }
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Environment variables use the `CHALLENGE_AUTH_` prefix with `__` for
    /// nesting, e.g. `CHALLENGE_AUTH_CLIENT__BASE_URL`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("CHALLENGE_AUTH_").split("__"));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }
}

/// Duration (de)serialization as `"30s"`, `"5m"` or `"500ms"`
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize as whole seconds when exact, milliseconds otherwise
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Either an unquoted integer or a suffixed string
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    /// Deserialize `"500ms"`, `"30s"`, `"5m"`, or a bare number of seconds
    /// (quoted or not)
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => return Ok(Duration::from_secs(secs)),
            Raw::Text(text) => text,
        };
        let s = text.trim();

        // "ms" before "s"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

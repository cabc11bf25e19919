//! Bearer-token access gate for protected services
//!
//! Decision order per request, first match wins:
//! - `OPTIONS` (CORS preflight) passes
//! - whitelisted path prefixes pass
//! - with `require_trusted_origin`, a missing proxy marker header is `403`
//! - missing or malformed `Authorization: Bearer <token>` is `401`
//! - no current token from the supplier (upstream not authenticated yet) is `500`
//! - token mismatch is `401`, match passes the request through unmodified

use std::fmt;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, Method, Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use parking_lot::RwLock;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Marker header set by the trusted tunnel in front of the service
pub const DEFAULT_TRUSTED_ORIGIN_HEADER: &str = "cloudflare-cdn-loop";

/// Live source of the token inbound requests must present
pub trait TokenSupplier: Send + Sync {
    /// Current token, or `None` while the service has not authenticated upstream
    fn current_token(&self) -> Option<String>;
}

impl<F> TokenSupplier for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn current_token(&self) -> Option<String> {
        self()
    }
}

/// Shared, updatable token slot
///
/// Cloning shares the slot; a token set through one handle is seen by all.
#[derive(Debug, Clone, Default)]
pub struct SharedToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    /// Create an empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current token
    pub fn set(&self, token: impl Into<String>) {
        *self.inner.write() = Some(token.into());
    }

    /// Forget the current token
    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    /// Current token, if any
    pub fn get(&self) -> Option<String> {
        self.inner.read().clone()
    }
}

impl TokenSupplier for SharedToken {
    fn current_token(&self) -> Option<String> {
        self.get()
    }
}

/// Gate configuration
#[derive(Clone)]
pub struct GateConfig {
    /// Source of the expected token
    pub token_supplier: Arc<dyn TokenSupplier>,
    /// Path prefixes that bypass authentication
    pub whitelist: Vec<String>,
    /// Reject requests that did not come through the trusted proxy
    pub require_trusted_origin: bool,
    /// Header whose presence marks trusted-proxy traversal
    pub trusted_origin_header: HeaderName,
}

impl fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateConfig")
            .field("whitelist", &self.whitelist)
            .field("require_trusted_origin", &self.require_trusted_origin)
            .field("trusted_origin_header", &self.trusted_origin_header)
            .finish_non_exhaustive()
    }
}

impl GateConfig {
    /// Config with no whitelist and no origin restriction
    pub fn new(token_supplier: impl TokenSupplier + 'static) -> Self {
        Self {
            token_supplier: Arc::new(token_supplier),
            whitelist: Vec::new(),
            require_trusted_origin: false,
            trusted_origin_header: HeaderName::from_static(DEFAULT_TRUSTED_ORIGIN_HEADER),
        }
    }

    /// Set the whitelisted path prefixes
    #[must_use]
    pub fn whitelist<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Require the trusted-origin marker header
    #[must_use]
    pub fn require_trusted_origin(mut self, require: bool) -> Self {
        self.require_trusted_origin = require;
        self
    }

    /// Override the trusted-origin marker header
    #[must_use]
    pub fn trusted_origin_header(mut self, name: HeaderName) -> Self {
        self.trusted_origin_header = name;
        self
    }
}

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    /// Trusted-origin marker missing (403)
    Forbidden,
    /// No `Authorization` header (401)
    MissingAuthorization,
    /// `Authorization` is not `Bearer <token>` (401)
    MalformedAuthorization,
    /// Presented token does not match (401)
    InvalidToken,
    /// Supplier has no token yet (500)
    NotReady,
}

impl GateRejection {
    /// HTTP status for this rejection
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::MissingAuthorization | Self::MalformedAuthorization | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotReady => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short client-facing message
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Forbidden => "Access denied: not from trusted origin",
            Self::MissingAuthorization => "Authorization header required",
            Self::MalformedAuthorization => "Invalid authorization header format",
            Self::InvalidToken => "Invalid access token",
            Self::NotReady => "Server authentication not initialized",
        }
    }

    fn code(self) -> &'static str {
        match self {
            Self::Forbidden => "forbidden",
            Self::MissingAuthorization | Self::MalformedAuthorization | Self::InvalidToken => {
                "unauthorized"
            }
            Self::NotReady => "not_ready",
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code(),
            "message": self.message(),
        }));
        if self.status() == StatusCode::UNAUTHORIZED {
            (self.status(), [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (self.status(), body).into_response()
        }
    }
}

/// Stateless request filter over an immutable [`GateConfig`]
#[derive(Debug, Clone)]
pub struct AccessGate {
    config: GateConfig,
}

impl AccessGate {
    /// Create a gate
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Check if a path is whitelisted (exact or prefix match)
    #[must_use]
    pub fn is_whitelisted(&self, path: &str) -> bool {
        self.config
            .whitelist
            .iter()
            .any(|p| path == p || path.starts_with(p.as_str()))
    }

    /// Decide whether a request may proceed
    pub fn check(&self, method: &Method, path: &str, headers: &HeaderMap) -> Result<(), GateRejection> {
        if method == Method::OPTIONS {
            return Ok(());
        }

        if self.is_whitelisted(path) {
            debug!(path = %path, "Whitelisted path, skipping auth");
            return Ok(());
        }

        if self.config.require_trusted_origin
            && !headers.contains_key(&self.config.trusted_origin_header)
        {
            return Err(GateRejection::Forbidden);
        }

        let authorization = headers
            .get(header::AUTHORIZATION)
            .filter(|v| !v.is_empty())
            .ok_or(GateRejection::MissingAuthorization)?
            .to_str()
            .map_err(|_| GateRejection::MalformedAuthorization)?;

        let presented = match authorization.split_once(' ') {
            Some(("Bearer", token)) => token,
            _ => return Err(GateRejection::MalformedAuthorization),
        };

        let expected = self
            .config
            .token_supplier
            .current_token()
            .filter(|t| !t.is_empty())
            .ok_or(GateRejection::NotReady)?;

        if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(GateRejection::InvalidToken)
        }
    }

    /// Wrap `router` so every route goes through this gate
    pub fn protect<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(Arc::new(self), access_gate_middleware))
    }
}

/// Axum middleware applying an [`AccessGate`]
pub async fn access_gate_middleware(
    State(gate): State<Arc<AccessGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match gate.check(request.method(), request.uri().path(), request.headers()) {
        Ok(()) => next.run(request).await,
        Err(rejection) => {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                status = rejection.status().as_u16(),
                reason = rejection.message(),
                "Request rejected"
            );
            rejection.into_response()
        }
    }
}

//! Challenge-response client authentication
//!
//! A client holding an RSA private key proves possession of it to a remote
//! verifier and receives a bearer token plus secret material in return.
//! The token can then guard a separate service through [`gate::AccessGate`].
//!
//! # Components
//!
//! - [`signing`]: SHA-256 + RSASSA-PKCS1-v1_5 challenge signatures
//! - [`client`]: the challenge, sign, verify exchange with bounded retry
//! - [`gate`]: axum middleware enforcing `Authorization: Bearer <token>`
//! - [`keys`]: key generation and PEM persistence

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod keys;
pub mod signing;

pub use client::{AuthClient, ClientConfig, RetryPolicy, Session};
pub use error::{Error, HttpErrorKind, Result};
pub use gate::{AccessGate, GateConfig, SharedToken, TokenSupplier};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}

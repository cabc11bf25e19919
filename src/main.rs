//! challenge-auth - challenge-response authentication client
//!
//! Generates key pairs, authenticates against a verifier, and serves a
//! bearer-protected endpoint using the token it obtained.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use axum::{Json, Router, extract::State, routing::get, routing::post};
use clap::Parser;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use challenge_auth::{
    AccessGate, AuthClient, SharedToken,
    cli::{ClientArgs, Cli, Command, KeygenArgs},
    config::{Config, ServerSettings},
    keys, setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Keygen(args) => run_keygen(config, args),
        Command::Auth(args) => run_auth(config, args).await,
        Command::Health(args) => run_health(config, args).await,
        Command::Serve { client, port, host } => run_serve(config, client, port, host).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Generate and save a key pair
fn run_keygen(mut config: Config, args: KeygenArgs) -> anyhow::Result<()> {
    if let Some(path) = args.private_key {
        config.keys.private_key = path;
    }
    if let Some(path) = args.public_key {
        config.keys.public_key = path;
    }
    if let Some(bits) = args.bits {
        config.keys.bits = bits;
    }

    keys::generate_and_save_key_pair(
        &config.keys.private_key,
        &config.keys.public_key,
        config.keys.bits,
    )?;
    let pem = keys::load_public_key_pem(&config.keys.public_key)?;

    println!("Private key saved to: {}", config.keys.private_key.display());
    println!("Public key saved to:  {}", config.keys.public_key.display());
    println!("\nRegister this public key with the verifier:\n\n{pem}");
    Ok(())
}

/// Apply CLI overrides and build a client
fn build_client(config: &mut Config, args: ClientArgs) -> anyhow::Result<AuthClient> {
    let settings = &mut config.client;
    if let Some(url) = args.url {
        settings.base_url = url;
    }
    if let Some(id) = args.client_id {
        settings.client_id = id;
    }
    if let Some(retries) = args.retries {
        settings.max_retries = retries;
    }
    if let Some(ms) = args.retry_backoff_ms {
        settings.retry_backoff = Duration::from_millis(ms);
    }
    if !args.secret_keys.is_empty() {
        settings.secret_keys = args
            .secret_keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
    }
    if args.repo_url.is_some() {
        settings.repo_url = args.repo_url;
    }
    if args.grpc_endpoint.is_some() {
        settings.grpc_endpoint = args.grpc_endpoint;
    }
    if args.include_repo_list {
        settings.include_repo_list = true;
    }
    if let Some(path) = args.private_key {
        config.keys.private_key = path;
    }

    if config.client.base_url.is_empty() || config.client.client_id.is_empty() {
        bail!("--url and --client-id (or client.base_url / client.client_id) are required");
    }

    let key_path = &config.keys.private_key;
    if !key_path.exists() {
        bail!(
            "Private key file not found: {} (run `challenge-auth keygen` to create one)",
            key_path.display()
        );
    }
    let signing_key = keys::load_private_key(key_path)
        .with_context(|| format!("Failed to load private key {}", key_path.display()))?;

    Ok(AuthClient::new(config.client.to_client_config(signing_key))?)
}

/// Health check, then authenticate and print the session
async fn run_auth(mut config: Config, args: ClientArgs) -> anyhow::Result<()> {
    let client = build_client(&mut config, args)?;
    info!(base_url = %client.base_url(), client_id = %client.client_id(), "Authenticating");

    match client.health().await {
        Ok(health) => info!(status = %health.status, "Verifier health"),
        Err(e) => warn!(error = %e, "Health check failed"),
    }

    let session = client.authenticate().await.context("Authentication failed")?;

    println!("Token: {}", session.token);
    println!("\nSecret Data:");
    let mut secrets: Vec<_> = session.secret_data.iter().collect();
    secrets.sort();
    for (key, value) in secrets {
        println!("  {key}: {value}");
    }
    if !session.repo_list.is_empty() {
        println!("\nRepository List:");
        for (i, repo) in session.repo_list.iter().enumerate() {
            println!("  {}. {repo}", i + 1);
        }
    }
    Ok(())
}

/// Print verifier health
async fn run_health(mut config: Config, args: ClientArgs) -> anyhow::Result<()> {
    let client = build_client(&mut config, args)?;
    let health = client.health().await.context("Health check failed")?;
    println!("{}", health.status);
    Ok(())
}

/// Shared state for the protected service
struct ServeState {
    client: AuthClient,
    token: SharedToken,
}

/// Authenticate upstream, then serve gate-protected routes
async fn run_serve(
    mut config: Config,
    args: ClientArgs,
    port: Option<u16>,
    host: Option<String>,
) -> anyhow::Result<()> {
    let client = build_client(&mut config, args)?;
    let token = SharedToken::new();

    client
        .authenticate_into(&token)
        .await
        .context("Upstream authentication failed")?;

    let gate = AccessGate::new(config.gate.to_gate_config(token.clone())?);
    let state = Arc::new(ServeState { client, token });

    let router = Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route("/api/session", get(session_info))
        .route("/api/reauthenticate", post(reauthenticate))
        .with_state(state);
    let app = gate.protect(router);

    let ServerSettings {
        host: default_host,
        port: default_port,
    } = config.server;
    let addr: SocketAddr = format!(
        "{}:{}",
        host.unwrap_or(default_host),
        port.unwrap_or(default_port)
    )
    .parse()
    .context("Invalid listen address")?;

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Serving gate-protected endpoints");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

async fn session_info(State(state): State<Arc<ServeState>>) -> Json<Value> {
    Json(json!({
        "clientId": state.client.client_id(),
        "authenticated": state.token.get().is_some(),
    }))
}

/// Run a fresh exchange and rotate the token the gate expects.
/// Overlapping requests queue on the client's exchange lock.
async fn reauthenticate(State(state): State<Arc<ServeState>>) -> Json<Value> {
    match state.client.authenticate_into(&state.token).await {
        Ok(_) => Json(json!({"success": true})),
        Err(e) => {
            warn!(error = %e, "Re-authentication failed");
            Json(json!({"success": false, "error": "re-authentication failed"}))
        }
    }
}

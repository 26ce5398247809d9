//! Authentication Resolver
//!
//! Reads bearer tokens (or `Bearer <token>` header values) from stdin, one
//! per line, resolves each through the configured backend and prints the
//! result as a JSON line.

use anyhow::Context;
use authn_resolver::{Config, TokenParserRegistry};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (stderr keeps stdout for results)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authn_resolver=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting Authentication Resolver");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        backend = %config.backend.backend(),
        http_timeout_seconds = config.http_timeout.as_secs(),
        clock_skew_seconds = config.clock_skew.as_secs(),
        "Configuration loaded successfully"
    );

    let registry = TokenParserRegistry::from_config(&config)
        .await
        .context("Failed to initialize token parser")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let result = if input.starts_with("Bearer ") {
            registry.resolve_authorization_header(input).await
        } else {
            registry.resolve(input).await
        };

        let output = match result {
            Ok(identity) => json!({ "identity": identity }),
            Err(e) => json!({ "error": e.to_string(), "status": e.status_code() }),
        };

        stdout
            .write_all(format!("{output}\n").as_bytes())
            .await
            .context("Failed to write result")?;
        stdout.flush().await.context("Failed to flush stdout")?;
    }

    info!("Input closed, shutting down");

    Ok(())
}

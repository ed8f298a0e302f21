//! DocFlow API command-line client
//!
//! Thin terminal front end over `docflow-client`:
//! 1. Loads TOML config (path from --config, DOCFLOW_CONFIG, or default)
//! 2. Opens the credential store, seeding it from a bootstrap token
//! 3. Executes one request, or tails an event stream until Ctrl-C

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use docflow_auth::{CredentialStore, Credentials};
use docflow_client::{Client, Error as ClientError, RequestOptions, RetryPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

fn usage() -> &'static str {
    "usage: docflow [--config <path>] <command>\n\
     commands:\n\
       get <path> [key=value ...]      GET with optional query pairs\n\
       delete <path> [key=value ...]   DELETE with optional query pairs\n\
       post <path> [json]              POST a JSON body\n\
       put <path> [json]               PUT a JSON body\n\
       patch <path> [json]             PATCH a JSON body\n\
       stream <path> [json]            POST and tail the event stream"
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // CLI: optional --config flag, then the command and its arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut rest = args.as_slice();
    let mut cli_config: Option<&str> = None;
    if rest.first().map(String::as_str) == Some("--config") {
        let Some(path) = rest.get(1) else {
            bail!("{}", usage());
        };
        cli_config = Some(path);
        rest = &rest[2..];
    }
    let [command, command_args @ ..] = rest else {
        bail!("{}", usage());
    };

    let config_path = Config::resolve_path(cli_config);
    let config = Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    info!(config = %config_path.display(), base_url = %config.api.base_url, "docflow client starting");

    let store = Arc::new(
        CredentialStore::load(config.session.credentials_path.clone())
            .await
            .context("opening credential store")?,
    );

    // Seed an empty store from the bootstrap token, if one is configured.
    // Bootstrap tokens carry no refresh token and unknown expirations.
    if store.get().await.is_none() {
        if let Some(token) = &config.session.token {
            store
                .save(Credentials {
                    access: token.expose().clone(),
                    refresh: String::new(),
                    access_expires: 0,
                    refresh_expires: 0,
                })
                .await
                .context("seeding credential store")?;
            info!("seeded credential store from bootstrap token");
        } else {
            warn!("no stored session and no bootstrap token configured");
        }
    }

    let client = Client::builder(&config.api.base_url)
        .timeout(Duration::from_secs(config.api.timeout_secs))
        .retry(RetryPolicy::new(
            config.api.retries,
            Duration::from_millis(config.api.retry_delay_ms),
        ))
        .build(store);

    match command.as_str() {
        "get" | "delete" => {
            let [path, query @ ..] = command_args else {
                bail!("{}", usage());
            };
            let options = RequestOptions {
                query: parse_query(query)?,
                ..Default::default()
            };
            let value: serde_json::Value = if command == "get" {
                client.get(path, options).await?
            } else {
                client.delete(path, options).await?
            };
            print_json(&value)?;
        }
        "post" | "put" | "patch" => {
            let [path, body @ ..] = command_args else {
                bail!("{}", usage());
            };
            let body = parse_body(body)?;
            let options = RequestOptions::default();
            let value: serde_json::Value = match command.as_str() {
                "post" => client.post(path, body, options).await?,
                "put" => client.put(path, body, options).await?,
                _ => client.patch(path, body, options).await?,
            };
            print_json(&value)?;
        }
        "stream" => {
            let [path, body @ ..] = command_args else {
                bail!("{}", usage());
            };
            let body = parse_body(body)?;
            stream(&client, path, body).await?;
        }
        other => bail!("unknown command {other:?}\n{}", usage()),
    }

    Ok(())
}

/// Parse trailing `key=value` arguments into query pairs.
fn parse_query(args: &[String]) -> Result<Vec<(String, String)>> {
    args.iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .with_context(|| format!("query argument {arg:?} is not key=value"))
        })
        .collect()
}

/// Parse an optional JSON body argument (defaults to an empty object).
fn parse_body(args: &[String]) -> Result<serde_json::Value> {
    match args {
        [] => Ok(serde_json::json!({})),
        [body] => serde_json::from_str(body).context("request body is not valid JSON"),
        _ => bail!("expected at most one JSON body argument"),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Tail an event stream until the server closes it or Ctrl-C aborts it.
async fn stream(client: &Client, path: &str, body: serde_json::Value) -> Result<()> {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, closing stream");
                cancel.cancel();
            }
        });
    }

    let options = RequestOptions {
        cancel: Some(cancel),
        ..Default::default()
    };
    let mut handle = client.sse(path, body, options).await?;

    while let Some(event) = handle.next().await {
        match event {
            Ok(event) => println!("{}", event.data),
            Err(ClientError::Cancelled { .. }) => break,
            Err(error) => {
                warn!(error = %error, "event stream failed");
                bail!("event stream failed: {error}");
            }
        }
    }
    Ok(())
}

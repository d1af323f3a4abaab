//! Bakalari command-line client
//!
//! Loads the school server and account from TOML, logs in with the password
//! grant and runs one command, printing the response as pretty JSON. Nothing
//! is cached between runs; every authorized command logs in first.

mod cli;
mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use bakalari_api::{ApiResponse, Bakalari, Endpoint, Method, RequestOptions};
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command, Target};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // JSON logs on stderr so stdout stays machine-readable
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("LOG_LEVEL")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let client = Bakalari::builder()
        .server(config.server.url.as_str())
        .timeout(config.timeout())
        .build();

    let outcome = run(&client, &config, cli).await;
    client.close().await;

    println!("{}", serde_json::to_string_pretty(&outcome?)?);
    Ok(())
}

async fn run(client: &Bakalari, config: &Config, cli: Cli) -> Result<Value> {
    match cli.command {
        Command::Version => {
            let response = client
                .send_unauth_request(
                    Endpoint::Version,
                    None,
                    Default::default(),
                    &RequestOptions::default(),
                )
                .await
                .context("version request failed")?;
            Ok(render(response))
        }
        Command::Login => {
            let credentials = login(client, config).await?;
            Ok(json!({
                "username": credentials.username(),
                "user_id": credentials.user_id(),
            }))
        }
        Command::UnreadCount => {
            login(client, config).await?;
            let response = client
                .send_auth_request(Endpoint::KomensUnreadCount, None, &RequestOptions::default())
                .await
                .context("unread count request failed")?;
            Ok(render(response))
        }
        Command::Request(args) => {
            let authorized = !args.unauth;
            if authorized {
                login(client, config).await?;
            }
            let options = args.options();
            let (url, method) = match args.target {
                Target::Endpoint(endpoint) => (
                    client.request_url(endpoint, None)?,
                    args.method.unwrap_or_else(|| endpoint.method()),
                ),
                Target::Path(path) => (path, args.method.unwrap_or(Method::GET)),
            };
            let response = client
                .send_raw_request(&url, method, &options, authorized)
                .await
                .with_context(|| format!("request to {url} failed"))?;
            Ok(render(response))
        }
        Command::Attachment { id, out } => {
            login(client, config).await?;
            let response = client
                .send_auth_request(
                    Endpoint::KomensAttachment,
                    Some(&format!("/{id}")),
                    &RequestOptions::default(),
                )
                .await
                .with_context(|| format!("attachment {id} download failed"))?;
            let Some(attachment) = response.into_attachment() else {
                bail!("server did not return a file for attachment {id}");
            };

            let path = attachment_path(&out, &attachment.filename);
            tokio::fs::write(&path, &attachment.data)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), bytes = attachment.data.len(), "attachment saved");
            Ok(json!({
                "filename": attachment.filename,
                "path": path.display().to_string(),
                "bytes": attachment.data.len(),
            }))
        }
    }
}

async fn login(
    client: &Bakalari,
    config: &Config,
) -> Result<std::sync::Arc<bakalari_api::Credentials>> {
    let username = config
        .account
        .username
        .as_deref()
        .context("account.username is not configured")?;
    let password = config
        .account
        .password
        .as_ref()
        .context("no password: set BAKALARI_PASSWORD or account.password_file")?;

    client
        .first_login(username, password.expose())
        .await
        .with_context(|| format!("login as {username} failed"))
}

/// Response as printable JSON.
fn render(response: ApiResponse) -> Value {
    match response {
        ApiResponse::Json(value) => value,
        ApiResponse::Attachment(attachment) => json!({
            "filename": attachment.filename,
            "bytes": attachment.data.len(),
        }),
        ApiResponse::NoContent | ApiResponse::Empty => Value::Null,
    }
}

/// Keep only the final path component so a server-supplied name cannot escape `dir`.
fn attachment_path(dir: &Path, filename: &str) -> PathBuf {
    let name = Path::new(filename)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "attachment".into());
    dir.join(name)
}

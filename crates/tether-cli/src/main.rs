//! Tether CLI: runs a remote service admin over HTTP, or calls an endpoint.

mod cli;
mod echo;

use crate::cli::{Cli, Commands};
use anyhow::{bail, Context};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tether_admin::config::load_config;
use tether_admin::{LocalServiceSpace, NoopDiscovery, RemoteServiceAdmin};
use tether_http::HttpTransport;
use tether_types::config::TetherConfig;
use tracing::info;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Serve { port } => {
            let mut config = load_config(cli.config.as_deref());
            if let Some(port) = port {
                config.http.port = port;
            }
            let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            rt.block_on(cmd_serve(config))
        }
        Commands::Call { url, data, timeout } => {
            let config = load_config(cli.config.as_deref());
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.http.request_timeout());
            cmd_call(&url, data, timeout)
        }
        Commands::Config => cmd_config(cli.config.as_deref()),
    }
}

async fn cmd_serve(config: TetherConfig) -> anyhow::Result<()> {
    let transport = HttpTransport::new(&config.http);
    let admin = RemoteServiceAdmin::new(
        &config,
        transport.clone(),
        Arc::new(LocalServiceSpace::new()),
        Arc::new(NoopDiscovery),
    );
    let server = transport
        .start(admin.clone())
        .await
        .context("failed to start HTTP listener")?;

    admin.add_export_factory(Arc::new(echo::EchoExportFactory), &Default::default());
    let (service, properties) = echo::echo_service();
    admin.add_service(service, &properties);

    for endpoint in admin.exported_endpoints() {
        println!("{}", serde_json::to_string_pretty(&endpoint)?);
    }
    info!(addr = %server.local_addr(), "Serving; press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    admin.stop();
    server.shutdown().await;
    Ok(())
}

fn cmd_call(url: &str, data: String, timeout: Duration) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")?;
    let resp = client
        .post(url)
        .body(data)
        .send()
        .with_context(|| format!("POST {url} failed"))?;
    let status = resp.status();
    let body = resp.text().context("failed to read reply")?;
    if !status.is_success() {
        bail!("{url} answered {status}: {body}");
    }
    println!("{body}");
    Ok(())
}

fn cmd_config(path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(path);
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

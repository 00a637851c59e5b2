use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use stategate::config::Config;
use stategate::filter::{admission_middleware, Decision, StateFilter};

#[derive(Parser)]
#[command(name = "stategate")]
#[command(author, version, about = "Geographic request-admission filter")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the filter in front of a demo upstream handler
    Serve {
        /// Listen address (overrides config)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Classify a single IP offline and print the decision
    Check {
        /// IP address to classify
        ip: String,

        /// Request path to evaluate
        #[arg(short, long, default_value = "/")]
        path: String,
    },
}

pub async fn run_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Commands::Serve { listen } => serve(config, listen).await,
        Commands::Check { ip, path } => check(config, &ip, &path),
    }
}

async fn serve(mut config: Config, listen: Option<String>) -> Result<()> {
    if let Some(listen) = listen {
        config.listen = listen;
    }

    let filter = Arc::new(
        StateFilter::new(&config, "stategate").context("Failed to construct admission filter")?,
    );

    let app = axum::Router::new()
        .fallback(upstream)
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&filter),
            admission_middleware,
        ));

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.listen))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, filter = filter.name(), "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Demo upstream: admitted requests land here
async fn upstream() -> &'static str {
    "OK\n"
}

fn check(config: Config, ip: &str, path: &str) -> Result<()> {
    let filter =
        StateFilter::new(&config, "stategate").context("Failed to construct admission filter")?;

    match filter.decide(ip, path) {
        Decision::Admit => println!("{ip} {path}: allowed"),
        Decision::Deny(reason) => println!("{ip} {path}: denied ({reason})"),
    }

    Ok(())
}

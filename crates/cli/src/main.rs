use std::path::PathBuf;

use {
    anyhow::{Context, Result},
    clap::Parser,
    tracing::info,
    tracing_subscriber::EnvFilter,
};

/// Outbound fetch gateway.
///
/// Fetches public http(s) URLs on behalf of callers and relays a sanitized
/// response. Private, loopback and cloud-metadata targets are refused, also
/// when reached through DNS or redirects.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Path to a TOML config file. Defaults to `outpost.toml` in the working
    /// directory when present.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to bind the HTTP server to (overrides the config file).
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides the config file and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before config loading so `.env` values act as overrides.
    let dotenv = dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.log_json);
    if let Some(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    let mut config =
        outpost_config::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    #[cfg(feature = "prometheus")]
    let metrics = Some(outpost_metrics::init_metrics().context("failed to initialise metrics")?);

    outpost_gateway::start_gateway(
        config,
        #[cfg(feature = "prometheus")]
        metrics,
    )
    .await
}

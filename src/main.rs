use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use tlgate::config::{ConfigStore, GatewayConfig};
use tlgate::events::TracingSink;
use tlgate::metrics::MetricsRegistry;
use tlgate::server::GatewayServer;
use tlgate::stop::StopSignal;
use tlgate::translate::glossary::{FileGlossary, GlossaryProvider};
use tlgate::translate::rules::{RegexProvider, RegexRules};
use tlgate::translate::TranslationService;

#[derive(Parser)]
#[command(name = "tlgate")]
#[command(about = "Local LLM translation gateway for game text-extraction tools", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Optional regex rule file (pre/post substitutions)
    #[arg(long)]
    rules: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tlgate=debug".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let args = Args::parse();
    info!("tlgate starting");

    let config = GatewayConfig::load(&args.config).unwrap_or_else(|e| {
        warn!(error = %e, path = %args.config.display(), "config load failed, using defaults");
        GatewayConfig::default()
    });

    let glossary: Arc<dyn GlossaryProvider> = Arc::new(FileGlossary::new());
    if config.enable_glossary {
        glossary.set_path(std::path::Path::new(&config.glossary_path));
    }

    let rules: Arc<dyn RegexProvider> = match &args.rules {
        Some(path) => Arc::new(RegexRules::load_from_file(path).unwrap_or_else(|e| {
            warn!(error = %e, path = %path.display(), "rule file load failed, running without rules");
            RegexRules::empty()
        })),
        None => Arc::new(RegexRules::empty()),
    };

    let store = Arc::new(ConfigStore::new(config));
    let metrics = Arc::new(MetricsRegistry::new());
    let stop = Arc::new(StopSignal::new());

    let service = match TranslationService::new(
        store,
        glossary,
        rules,
        Arc::new(TracingSink),
        metrics,
        stop,
    ) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!(error = %e, "http client init failed");
            return;
        }
    };

    let server = GatewayServer::new(service);
    match server.start().await {
        Ok(addr) => info!(%addr, "listening"),
        Err(e) => {
            error!(error = %e, "server start failed");
            return;
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed");
    }
    info!("shutting down");
    server.stop().await;
}

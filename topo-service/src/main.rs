//! topo: topology orchestrator CLI
//!
//! - `invoke`: run tool calls (a completion, an assistant message or a list
//!   of calls) and print one tool response per call
//! - `tools`: print the tool catalogue
//! - `snapshot`: print the backend topology

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use topo_core::config::{load_environment, GatewayConfig};
use topo_core::LayoutConfig;
use topo_dispatch::{Orchestrator, OrchestratorConfig};
use topo_execution_tracker::{ActionMetrics, ActionTracker};
use topo_network::{BackendGateway, InMemoryBackend, MininetClient};
use topo_tools::{ToolCall, ToolCallAdapter, ToolDefinition};

mod input;

#[derive(Parser, Debug)]
#[command(name = "topo")]
#[command(about = "Dispatch topology tool calls against a Mininet backend")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL (overrides TOPO_BACKEND_URL)
    #[arg(long)]
    backend_url: Option<String>,

    /// Bearer token (overrides TOPO_BACKEND_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Grid step for derived node positions
    #[arg(long)]
    layout_step: Option<f64>,

    /// Maximum gateway calls in flight together
    #[arg(long, default_value_t = topo_dispatch::config::DEFAULT_MAX_IN_FLIGHT)]
    max_in_flight: usize,

    /// Use an in-memory backend instead of HTTP
    #[arg(long)]
    dry_run: bool,

    /// Skip the startup snapshot
    #[arg(long)]
    no_sync: bool,

    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    metrics: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run tool calls read from a file, or stdin when omitted or "-"
    Invoke {
        path: Option<PathBuf>,
    },
    /// List available tools
    Tools {
        /// OpenAI function-calling format
        #[arg(long)]
        openai: bool,
    },
    /// Print the backend topology snapshot
    Snapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment first so RUST_LOG from the file reaches the filter
    let env_file = load_environment();
    let args = Args::parse();

    init_tracing(args.log_json)?;
    if let Some(path) = env_file {
        info!("Environment loaded from {}", path.display());
    }

    match &args.command {
        Commands::Tools { openai } => {
            let tools = ToolDefinition::all();
            let out = if *openai {
                serde_json::to_value(
                    tools
                        .iter()
                        .map(ToolDefinition::to_openai_format)
                        .collect::<Vec<_>>(),
                )?
            } else {
                serde_json::to_value(&tools)?
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Commands::Snapshot => {
            let gateway = build_gateway(&args)?;
            let state = gateway
                .fetch_snapshot()
                .await
                .with_context(|| format!("snapshot from {} backend failed", gateway.name()))?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
        Commands::Invoke { path } => invoke(&args, path.as_deref()).await,
    }
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("topo=info".parse()?)
        .add_directive("topo_dispatch=info".parse()?)
        .add_directive("topo_tools=info".parse()?)
        .add_directive("topo_network=warn".parse()?);

    // stdout carries the tool responses
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn gateway_config(args: &Args) -> Result<GatewayConfig> {
    let mut config = match &args.backend_url {
        Some(url) => GatewayConfig::new(url),
        None => GatewayConfig::from_env()?,
    };
    if let Some(token) = &args.token {
        config = config.with_token(token.clone());
    } else if args.backend_url.is_some() {
        config.token = topo_core::config::get_config_opt("TOPO_BACKEND_TOKEN");
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

fn build_gateway(args: &Args) -> Result<Arc<dyn BackendGateway>> {
    if args.dry_run {
        info!("Dry run: using the in-memory backend");
        return Ok(Arc::new(InMemoryBackend::new()));
    }
    let config = gateway_config(args)?;
    info!("Backend: {}", config.base_url);
    Ok(Arc::new(MininetClient::new(config)?))
}

fn orchestrator_config(args: &Args) -> Result<OrchestratorConfig> {
    let mut layout = LayoutConfig::default();
    if let Some(step) = args.layout_step {
        layout.step = step;
    }
    Ok(OrchestratorConfig {
        layout,
        max_in_flight: args.max_in_flight,
    }
    .validated()?)
}

async fn invoke(args: &Args, path: Option<&std::path::Path>) -> Result<()> {
    let raw = input::read(path)?;
    let calls = ToolCall::from_completion(&raw).context("tool calls are malformed")?;
    if calls.is_empty() {
        warn!("No tool calls in input");
    }

    let gateway = build_gateway(args)?;
    let metrics = Arc::new(ActionMetrics::new()?);
    let tracker = Arc::new(ActionTracker::new(metrics.clone()));
    let orchestrator = Orchestrator::new(gateway, orchestrator_config(args)?)?.with_tracker(tracker);

    if !args.no_sync && !args.dry_run {
        match orchestrator.resync().await {
            Ok(state) => info!(
                "Synced {} nodes and {} links from backend",
                state.nodes.len(),
                state.links.len()
            ),
            Err(e) => warn!("Initial snapshot failed, starting empty: {} ({})", e, e.suggestion()),
        }
    }

    let adapter = ToolCallAdapter::new(Arc::new(orchestrator));
    let responses = adapter.invoke(calls).await;
    println!("{}", serde_json::to_string_pretty(&responses)?);

    if args.metrics {
        eprintln!("{}", metrics.gather_text()?);
    }
    Ok(())
}

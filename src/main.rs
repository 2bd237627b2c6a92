//! Cross-Chain Tracer - follow tainted funds from one address across chains
//!
//! Usage: crosschain_tracer <chain> <address> [forward|backward|both]
//!
//! Endpoints come from ALCHEMY_API_KEY / <CHAIN>_RPC_URL; limits from
//! TRACE_MAX_DEPTH, TRACE_MAX_NODES, TRACE_MIN_TAINT and TRACE_DIRECTION.

use crosschain_tracer::core::BridgeRegistry;
use crosschain_tracer::models::{ChainEndpoint, TraceRequest, TracerConfig};
use crosschain_tracer::providers::{
    AdapterRegistry, AlchemyPriceProvider, CachedLabelProvider, JsonlBridgeSink, StaticLabels,
    StaticSanctions,
};
use crosschain_tracer::utils::constants::DEFAULT_LABEL_CACHE_TTL_SECS;
use crosschain_tracer::{Chain, Direction, TraceTelemetry, TransactionTracer};

use eyre::{eyre, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    println!(
        r#"
    ╔══════════════════════════════════════════════════════╗
    ║                                                      ║
    ║        C R O S S - C H A I N   T R A C E R           ║
    ║                                                      ║
    ║    Proportional taint · bridge continuation  v0.1.0  ║
    ║                                                      ║
    ╚══════════════════════════════════════════════════════╝
    "#
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("Usage: crosschain_tracer <chain> <address> [forward|backward|both]");
        eprintln!("   chains: {}", Chain::ALL.map(|c| c.as_str()).join(", "));
        return Err(eyre!("missing arguments"));
    }

    let chain: Chain = args[0].parse()?;
    let request = build_request(chain, &args[1], args.get(2).map(String::as_str))?;

    // Load configuration
    let config = TracerConfig::default();
    let endpoints = ChainEndpoint::all();
    if endpoints.is_empty() {
        warn!("⚠️  No chain endpoints configured. Set ALCHEMY_API_KEY or <CHAIN>_RPC_URL.");
    }

    let adapters = AdapterRegistry::from_endpoints(&endpoints, &config);
    let registry = Arc::new(BridgeRegistry::load(config.bridge_registry_path.as_deref())?);
    info!("🌉 Bridge registry: {} contracts", registry.len());

    let mut tracer = TransactionTracer::new(adapters, registry, config.clone());

    if let Some(path) = &config.labels_path {
        let labels = StaticLabels::from_file(path)?;
        tracer = tracer.with_labels(Arc::new(CachedLabelProvider::new(
            Arc::new(labels),
            Duration::from_secs(DEFAULT_LABEL_CACHE_TTL_SECS),
        )));
    }
    if let Some(path) = &config.sanctions_path {
        tracer = tracer.with_sanctions(Arc::new(StaticSanctions::from_file(path)?));
    }
    match AlchemyPriceProvider::from_env() {
        Ok(prices) => tracer = tracer.with_prices(Arc::new(prices)),
        Err(e) => warn!("⚠️  USD pricing disabled: {}", e),
    }
    if let Some(path) = &config.bridge_links_path {
        tracer = tracer.with_bridge_sink(Arc::new(JsonlBridgeSink::new(path.clone())));
    }

    // Initialize telemetry collector
    let telemetry = TraceTelemetry::with_config(config.output_dir.join("telemetry"), 100);

    // Ctrl+C aborts the trace; the partial graph is still written
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n\n🛑 Cancelling trace...");
            on_signal.cancel();
        }
    });

    let result = tracer.trace_with_cancel(request, cancel).await?;

    std::fs::create_dir_all(&config.output_dir)?;
    let json_path = config.output_dir.join(format!("{}.json", result.trace_id));
    let csv_path = config.output_dir.join(format!("{}_edges.csv", result.trace_id));
    std::fs::write(&json_path, result.to_json()?)?;
    std::fs::write(&csv_path, result.edges_csv())?;

    println!("\n{}", result.summary());
    println!("   📄 Result:  {}", json_path.display());
    println!("   📄 Edges:   {}", csv_path.display());
    for failure in &result.adapter_failures {
        println!(
            "   ⚠️  {} {} [{}] {}",
            failure.chain, failure.address, failure.code, failure.message
        );
    }

    telemetry.record_trace(&result);
    match telemetry.export_stats_json() {
        Ok(path) => println!("   ✅ Telemetry JSON: {}", path.display()),
        Err(e) => println!("   ❌ Telemetry JSON export failed: {}", e),
    }
    match telemetry.export_stats_csv() {
        Ok(path) => println!("   ✅ Telemetry CSV:  {}", path.display()),
        Err(e) => println!("   ❌ Telemetry CSV export failed: {}", e),
    }
    if let Err(e) = telemetry.flush() {
        warn!("⚠️  Telemetry flush failed: {}", e);
    }

    Ok(())
}

/// Request from CLI arguments plus TRACE_* overrides
fn build_request(chain: Chain, address: &str, direction: Option<&str>) -> Result<TraceRequest> {
    let mut request = TraceRequest::new(chain, address);

    let direction = direction
        .map(str::to_string)
        .or_else(|| std::env::var("TRACE_DIRECTION").ok());
    if let Some(direction) = direction {
        request = request.with_direction(direction.parse::<Direction>()?);
    }
    if let Some(depth) = env_parse::<u32>("TRACE_MAX_DEPTH")? {
        request.max_depth = depth;
    }
    if let Some(nodes) = env_parse::<usize>("TRACE_MAX_NODES")? {
        request.max_nodes = nodes;
    }
    if let Some(threshold) = env_parse::<Decimal>("TRACE_MIN_TAINT")? {
        request.min_taint_threshold = threshold;
    }

    request.validate()?;
    Ok(request)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| eyre!("{} is not a valid value: {}", key, raw)),
        _ => Ok(None),
    }
}

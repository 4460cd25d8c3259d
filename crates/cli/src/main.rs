use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use numalens_api::{
    query_types, Datasource, DetachedControlPlane, HealthStatus, LensApi, NodeGraph, Output, RequestCtx,
    Settings, Table,
};
use numalens_core::columns::columns_for;
use numalens_kubehub::KubeStore;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "numalensctl", version, about = "Numaflow pipeline lens")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Format::Human)]
    output: Format,

    /// Pin every query to this namespace
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    /// Datasource settings JSON file
    #[arg(long = "settings", global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Format {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List supported query types
    QueryTypes,
    /// Run a query, e.g. '{"namespace":"default","pipeline":"*"}'
    Query {
        /// Output kind: Table or NodeGraph
        #[arg(long = "type", default_value = "Table")]
        query_type: String,
        /// Raw query document
        raw: String,
    },
    /// List namespaces or resource names for a query
    Names {
        /// Raw query document, e.g. '{"namespace":"*","pipeline":""}'
        raw: String,
    },
    /// Check that the cluster is reachable
    Health,
}

fn init_tracing() {
    let env = std::env::var("NUMALENS_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("NUMALENS_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid NUMALENS_METRICS_ADDR; expected host:port");
        }
    }
}

fn request_ctx() -> RequestCtx {
    match std::env::var("NUMALENS_REQUEST_TIMEOUT_MS").ok().and_then(|s| s.parse::<u64>().ok()) {
        Some(ms) => RequestCtx::with_timeout(Duration::from_millis(ms)),
        None => RequestCtx::new(),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.settings {
        Some(path) => {
            let bytes = std::fs::read(path).with_context(|| format!("reading settings {}", path.display()))?;
            Settings::from_json(&bytes)?
        }
        None => Settings::default(),
    };
    if let Some(ns) = &cli.namespace {
        settings = Settings::pinned(ns.clone());
    }
    Ok(settings)
}

fn envelope(raw: &str) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&serde_json::json!({ "rawQuery": raw }))?)
}

fn print_table(t: &Table) {
    let header: Vec<String> = columns_for(t.kind()).iter().map(|c| c.label.to_uppercase()).collect();
    let rows = t.cells();
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }
    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    println!("{}", line(&header));
    for row in &rows {
        println!("{}", line(row));
    }
}

fn print_graph(g: &NodeGraph) {
    println!("NODES");
    for n in &g.nodes {
        let health = if n.arc_failure > 0.0 {
            "failed"
        } else if n.arc_success > 0.0 {
            "ok"
        } else {
            "pending"
        };
        println!(
            "{} • {} • {} • {} • {}",
            n.id,
            n.subtitle,
            health,
            n.mainstat.as_deref().unwrap_or("-"),
            n.secondarystat.as_deref().unwrap_or("-")
        );
    }
    println!("EDGES");
    for e in &g.edges {
        println!(
            "{} -> {} • pending {} • {}",
            e.source,
            e.target,
            e.mainstat.as_deref().unwrap_or("-"),
            e.secondarystat.as_deref().unwrap_or("-")
        );
    }
}

async fn datasource(settings: Settings) -> Result<Datasource> {
    let store = KubeStore::try_default().await?;
    Ok(Datasource::new(settings, Arc::new(store), Arc::new(DetachedControlPlane)))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match &cli.command {
        Commands::QueryTypes => {
            let types = query_types();
            match cli.output {
                Format::Human => {
                    for t in &types.query_types {
                        println!("{}", t);
                    }
                }
                Format::Json => println!("{}", serde_json::to_string_pretty(&types)?),
            }
        }
        Commands::Query { query_type, raw } => {
            info!(query_type = %query_type, "query invoked");
            let ds = datasource(load_settings(&cli)?).await?;
            let out = match ds.query(&request_ctx(), query_type, &envelope(raw)?).await {
                Ok(out) => out,
                Err(e) => {
                    error!(error = %e, "query failed");
                    bail!("query error: {}", e);
                }
            };
            match (cli.output, &out) {
                (Format::Json, _) => println!("{}", serde_json::to_string_pretty(&out)?),
                (Format::Human, Output::Table(t)) => print_table(t),
                (Format::Human, Output::NodeGraph(g)) => print_graph(g),
            }
        }
        Commands::Names { raw } => {
            info!("names invoked");
            let ds = datasource(load_settings(&cli)?).await?;
            let names = ds.metric_names(&request_ctx(), &envelope(raw)?).await?;
            match cli.output {
                Format::Human => {
                    for n in &names.metric_names {
                        println!("{}", n);
                    }
                }
                Format::Json => println!("{}", serde_json::to_string_pretty(&names)?),
            }
        }
        Commands::Health => {
            let ds = datasource(load_settings(&cli)?).await?;
            let res = ds.check_health(&request_ctx()).await;
            match cli.output {
                Format::Human => println!("{:?}: {}", res.status, res.message),
                Format::Json => println!("{}", serde_json::to_string_pretty(&res)?),
            }
            if res.status == HealthStatus::Error {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

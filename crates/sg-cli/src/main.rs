mod gateway;
mod server;
mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rmcp::{ServiceExt, transport::stdio};

use sg_core::{describe_status, parse_waveform, wire::STATUS_CODES};

use gateway::{Gateway, GatewayConfig};

#[derive(Parser)]
#[command(name = "sg", about = "Stimgate device gateway: MCP server and app relay")]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server on stdio plus the app-facing WebSocket listener
    Serve {
        /// Address the WebSocket listener binds to; falls back to
        /// SG_BIND_ADDR, then 127.0.0.1:9960
        #[arg(long)]
        addr: Option<String>,

        /// Host:port advertised to companion apps, if different from the
        /// bind address (e.g. behind NAT); falls back to SG_PUBLIC_HOST,
        /// then the bind address
        #[arg(long)]
        public_host: Option<String>,
    },

    /// Parse a waveform file and print its frame summary
    Parse {
        /// Waveform text file
        file: PathBuf,

        /// Name to report (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,
    },

    /// Print the protocol status-code table
    Codes,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    // stderr only: stdout carries the MCP stdio transport.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!("ignoring non-numeric {name}={v}");
            default
        }),
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve { addr, public_host } => {
            cmd_serve(addr.as_deref(), public_host.as_deref()).await
        }
        Commands::Parse { file, name } => cmd_parse(file, name.as_deref()),
        Commands::Codes => cmd_codes(),
    }
}

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:9960";

async fn cmd_serve(addr: Option<&str>, public_host: Option<&str>) -> Result<()> {
    // Flags win over environment, environment over defaults.
    let addr = addr
        .map(str::to_string)
        .or_else(|| std::env::var("SG_BIND_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let public_host = public_host
        .map(str::to_string)
        .or_else(|| std::env::var("SG_PUBLIC_HOST").ok())
        .unwrap_or_else(|| addr.clone());

    let config = GatewayConfig {
        session_ttl_ms: env_u64("SG_SESSION_TTL_MS", GatewayConfig::default().session_ttl_ms),
        sweep_interval_ms: env_u64(
            "SG_SWEEP_INTERVAL_MS",
            GatewayConfig::default().sweep_interval_ms,
        ),
        heartbeat_interval_ms: env_u64(
            "SG_HEARTBEAT_INTERVAL_MS",
            GatewayConfig::default().heartbeat_interval_ms,
        ),
        public_host,
    };

    let gateway = Arc::new(Gateway::new(config));
    let app = ws::router(gateway.bridge().clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("websocket listener on {addr}");

    let server = server::SgServer::new(gateway);
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("websocket listener failed")?;
        }
        result = service.waiting() => {
            result?;
        }
    }
    Ok(())
}

fn cmd_parse(file: &std::path::Path, name: Option<&str>) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let name = name
        .or_else(|| file.file_stem().and_then(|s| s.to_str()))
        .unwrap_or("unnamed");

    let waveform = parse_waveform(text.trim(), name).map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("name:     {}", waveform.name);
    println!("tag:      {}", waveform.tag);
    println!("sections: {}", waveform.sections.len());
    for section in &waveform.sections {
        println!(
            "  [{}] {:.0}Hz to {:.0}Hz, {}ms, mode {}, {} points",
            section.index,
            section.start_freq,
            section.end_freq,
            section.duration * 100,
            section.mode,
            section.points.len()
        );
    }
    println!(
        "frames:   {} ({}ms total)",
        waveform.frames.len(),
        waveform.frames.len() * 100
    );
    for frame in &waveform.frames {
        println!("  {frame}");
    }
    Ok(())
}

fn cmd_codes() -> Result<()> {
    for code in STATUS_CODES {
        println!("{code}  {}", describe_status(code));
    }
    Ok(())
}

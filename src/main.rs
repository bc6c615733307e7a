use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, warn};

use vulnscan_ui::api::HttpScannerApi;
use vulnscan_ui::config::{ApiConfig, DEFAULT_API_BASE_URL};
use vulnscan_ui::session::{Session, SessionSnapshot};
use vulnscan_ui::types::ScanForm;
use vulnscan_ui::{logging, server, view};

/// vulnscan-ui — Thin client and embedded web UI for an external port-scan and vulnerability-matching service.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "vulnscan-ui",
    version,
    about = "Thin client and embedded web UI for an external port-scan and vulnerability-matching service.",
    long_about = None
)]
struct Cli {
    /// Base URL of the scanning service.
    #[arg(long, env = "VULNSCAN_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// Per-request timeout in milliseconds. Unset means wait for the service.
    #[arg(long = "request-timeout-ms")]
    request_timeout_ms: Option<u64>,

    /// URL or host to scan or analyze.
    #[arg(long)]
    target: Option<String>,

    /// First port of the scanned range.
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    start_port: i64,

    /// Last port of the scanned range.
    #[arg(long, default_value_t = 1024, allow_negative_numbers = true)]
    end_port: i64,

    /// Per-port timeout in milliseconds, forwarded to the service.
    #[arg(long = "timeout-ms", default_value_t = 500, allow_negative_numbers = true)]
    timeout_ms: i64,

    /// Analyze the target as a web page instead of port-scanning it.
    #[arg(long, default_value_t = false)]
    analyze: bool,

    /// Match the scan result against known vulnerabilities.
    #[arg(long = "match-vulns", default_value_t = false)]
    match_vulns: bool,

    /// Write the session snapshot as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Serve the browser UI instead of running a one-shot scan.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Address for the browser UI.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Debug logging (ignored when RUST_LOG is set).
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = ApiConfig::new(&cli.api_base_url)?
        .with_request_timeout(cli.request_timeout_ms.map(Duration::from_millis));

    println!("vulnscan-ui configuration:");
    println!("  api_base_url : {}", config.base_url());
    println!(
        "  target       : {}",
        cli.target.as_deref().unwrap_or("<none>")
    );
    println!("  ports        : {}-{}", cli.start_port, cli.end_port);
    println!("  timeout_ms   : {}", cli.timeout_ms);
    println!(
        "  mode         : {}",
        if cli.serve_ui {
            "serve-ui"
        } else if cli.analyze {
            "analyze"
        } else {
            "scan"
        }
    );

    let api = HttpScannerApi::new(&config)?;
    let session = Arc::new(Session::new(api));
    session
        .set_form(ScanForm {
            target: cli.target.clone().unwrap_or_default(),
            start_port: cli.start_port,
            end_port: cli.end_port,
            timeout_ms: cli.timeout_ms,
        })
        .await;

    if cli.serve_ui {
        // Mount in the background so the page is reachable while the service is slow.
        let mounting = session.clone();
        tokio::spawn(async move {
            mounting.mount().await;
        });
        println!("UI server starting at http://{} (Ctrl+C to stop)", cli.bind);
        return server::serve_until(&cli.bind, session, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    }

    session.mount().await;

    if cli.target.is_some() {
        let started = if cli.analyze {
            session.analyze_web_page().await
        } else {
            session.scan_ports().await
        };
        if let Err(e) = started {
            warn!(error = %e, "nothing to scan");
        }

        if cli.match_vulns {
            if let Err(e) = session.match_vulnerabilities().await {
                warn!(error = %e, "vulnerability matching skipped");
            }
        }
    }

    let snapshot = session.snapshot().await;
    println!();
    print!("{}", view::render(&snapshot));

    if let Some(path) = cli.output.as_deref() {
        if let Err(e) = write_snapshot_json(path, &snapshot) {
            error!(path = %path.display(), error = ?e, "failed to write JSON");
        } else {
            println!("Wrote session snapshot to {}", path.display());
        }
    }

    Ok(())
}

fn write_snapshot_json(path: &std::path::Path, snapshot: &SessionSnapshot) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    serde_json::to_writer_pretty(file, snapshot)?;
    Ok(())
}

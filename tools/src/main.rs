//! window-runner: headless driver for the risk window.
//!
//! Usage:
//!   window-runner --seed 12345 --cycles 30 --step-secs 60
//!   window-runner --config window.json --json
//!   window-runner --ipc-mode

use anyhow::Result;
use chrono::{Duration, Utc};
use riskwindow_core::{
    filter::{self, EventFilter, EXPLORER_ROW_LIMIT},
    RefreshCoordinator, TxEvent, ViewBundle, WindowConfig,
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcRequest {
    Latest,
    Refresh,
    Filter {
        #[serde(default)]
        filter: EventFilter,
        #[serde(default)]
        limit:  Option<usize>,
    },
    Facets,
    Quit,
}

#[derive(serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcResponse<'a> {
    Bundle { bundle: Option<&'a ViewBundle> },
    Events { count: usize, events: Vec<TxEvent> },
    Facets { cities: Vec<String>, merchants: Vec<String> },
    Error { message: String },
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let json_out = args.iter().any(|a| a == "--json");
    let cycles = parse_arg(&args, "--cycles", 30u64);
    let step_secs = parse_arg(&args, "--step-secs", 60i64);

    let mut config = match args.windows(2).find(|w| w[0] == "--config") {
        Some(w) => WindowConfig::load(&w[1])?,
        None => WindowConfig::default(),
    };
    config.generator.seed = parse_arg(&args, "--seed", config.generator.seed);
    config.validate()?;

    let coord = RefreshCoordinator::with_synthetic(config)?;

    if ipc_mode {
        return run_ipc_loop(&coord);
    }

    if !json_out {
        println!("window-runner");
        println!("  seed:      {}", coord.config().generator.seed);
        println!("  cycles:    {cycles}");
        println!("  step:      {step_secs}s");
        println!("  horizon:   {}s", coord.config().horizon_secs);
        println!("  cap:       {}", coord.config().size_cap);
        println!();
    }

    // Simulated clock: each cycle advances by one step so the freshness
    // cache never swallows a cycle.
    let start = Utc::now() - Duration::seconds(step_secs * cycles as i64);
    let mut last = None;
    for i in 1..=cycles as i64 {
        let now = start + Duration::seconds(step_secs * i);
        last = coord.serve_at(now);
    }

    match last {
        Some(bundle) if json_out => println!("{}", bundle.to_json()?),
        Some(bundle) => print_summary(&coord, &bundle),
        None => println!("No cycle completed ({} failed).", coord.failed_cycles()),
    }
    Ok(())
}

fn run_ipc_loop(coord: &RefreshCoordinator) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let request: IpcRequest = match serde_json::from_str(&buffer) {
            Ok(r) => r,
            Err(e) => {
                write_response(&mut stdout, &IpcResponse::Error { message: e.to_string() })?;
                continue;
            }
        };

        match request {
            IpcRequest::Quit => break,
            IpcRequest::Latest => {
                let latest = coord.latest();
                write_response(&mut stdout, &IpcResponse::Bundle { bundle: latest.as_deref() })?;
            }
            IpcRequest::Refresh => {
                let served = coord.serve_at(Utc::now());
                write_response(&mut stdout, &IpcResponse::Bundle { bundle: served.as_deref() })?;
            }
            IpcRequest::Facets => {
                let snapshot = coord.committed_snapshot();
                let response = IpcResponse::Facets {
                    cities:    filter::distinct_cities(&snapshot),
                    merchants: filter::distinct_merchants(&snapshot),
                };
                write_response(&mut stdout, &response)?;
            }
            IpcRequest::Filter { filter, limit } => {
                let events = coord.explore(&filter, limit.unwrap_or(EXPLORER_ROW_LIMIT));
                let count = events.len();
                write_response(&mut stdout, &IpcResponse::Events { count, events })?;
            }
        }
    }
    Ok(())
}

fn write_response(out: &mut impl Write, response: &IpcResponse<'_>) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string(response)?)?;
    out.flush()?;
    Ok(())
}

fn print_summary(coord: &RefreshCoordinator, bundle: &ViewBundle) {
    let t = &bundle.totals;
    println!("=== WINDOW SUMMARY (cycle {}) ===", bundle.cycle);
    println!("  generated at:    {}", bundle.generated_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  window size:     {}", bundle.window_len);
    println!("  transactions:    {}", t.total_count);
    println!(
        "  blocked:         {} ({:+})",
        t.blocked_count, bundle.kpi_delta.blocked_count
    );
    println!(
        "  loss avoided:    {} ({:+})",
        t.blocked_amount_sum, bundle.kpi_delta.blocked_amount
    );
    println!("  detection rate:  {:.2}%", t.detection_rate);
    println!("  failed cycles:   {}", coord.failed_cycles());

    println!();
    println!("=== TOP RISKY TRANSACTIONS ===");
    for e in &bundle.top_risky {
        println!(
            "  {} | {:>6} | {:<14} | {:<11} | {:>4} | {:<19} | {}",
            e.transaction_id, e.amount, e.merchant, e.city, e.risk_score, e.fraud_type, e.status
        );
    }

    println!();
    println!("=== MOST TARGETED MERCHANTS ===");
    for r in &bundle.merchant_ranking {
        println!(
            "  {:<14} | txns: {:>5} | amount: {:>9} | mean risk: {:.0}",
            r.key, r.stats.count, r.stats.amount_sum, r.stats.mean_risk_score
        );
    }

    println!();
    println!("=== BLOCKED BY CITY ===");
    for (city, stats) in &bundle.blocked_by_city {
        println!("  {:<11} | {:>5}", city, stats.count);
    }

    println!();
    println!(
        "=== FRAUD NETWORK: {} nodes, {} edges ({} of {} high-risk events sampled) ===",
        bundle.graph.nodes.len(),
        bundle.graph.edges.len(),
        bundle.graph.sampled_count,
        bundle.graph.candidate_count
    );
    if bundle.graph.is_empty() {
        println!("  (No high-risk events in the window)");
    }

    for w in &bundle.warnings {
        println!("  warning: {w}");
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

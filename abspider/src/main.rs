use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::{thread_rng, Rng};
use smart_scan::{ScanMode, SmartScanManager, DEFAULT_USER_AGENT};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

mod config;

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl }

fn parse_format(s: &str) -> OutputFormat {
    match s {
        "json" => OutputFormat::Json,
        "jsonl" => OutputFormat::Jsonl,
        _ => OutputFormat::Text,
    }
}

#[derive(Debug, Parser)]
#[command(name = "abspider", version, about = "Adaptive web reconnaissance scan pacing")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./abspider.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Probe a target once and report reachability, posture and advisories
    Recon {
        /// Target host or URL
        target: String,
        /// Scan mode (conservative, adaptive, aggressive)
        #[arg(long, default_value = "adaptive")]
        mode: String,
        /// User agent for the probe
        #[arg(long)]
        user_agent: Option<String>,
        /// Probe timeout in milliseconds
        #[arg(long, default_value_t = 8000)]
        timeout_ms: u64,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Run an adaptively paced probe loop against a target
    Scan {
        /// Target host or URL
        target: String,
        /// Scan mode (conservative, adaptive, aggressive)
        #[arg(long, default_value = "adaptive")]
        mode: String,
        /// Maximum number of probe batches
        #[arg(long, default_value_t = 10)]
        batches: u32,
        /// Timeout per probe request in milliseconds
        #[arg(long, default_value_t = 8000)]
        timeout_ms: u64,
        /// QPS cap for probe launches within a batch; 0 disables pacing
        #[arg(long, default_value_t = 0)]
        qps: u32,
        /// User agent for probes
        #[arg(long)]
        user_agent: Option<String>,
        /// Output format for batch lines
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Output file (overwrites); one line per batch
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Write CSV instead of text/JSONL when --out is provided
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let loaded_cfg = config::load_config(cli.config.as_deref());
    match cli.command {
        Commands::Version => {
            println!("abspider {} (core {})", env!("CARGO_PKG_VERSION"), abspider_core::version());
        }
        Commands::Recon { target, mut mode, mut user_agent, mut timeout_ms, mut format } => {
            if let Some(cfg) = &loaded_cfg { if let Some(r) = &cfg.recon {
                if r.mode.is_some() { mode = r.mode.clone().unwrap(); }
                if r.timeout_ms.is_some() { timeout_ms = r.timeout_ms.unwrap(); }
                if user_agent.is_none() { user_agent = r.user_agent.clone(); }
                if let Some(f) = &r.format { format = parse_format(f); }
            }}
            let mode: ScanMode = mode.parse()?;
            let target = abspider_core::Target::parse(&target)?;
            let rt = tokio::runtime::Runtime::new()?;
            let mut mgr = SmartScanManager::new(target.as_str(), mode)
                .with_probe_timeout(Duration::from_millis(timeout_ms));
            if let Some(ua) = user_agent {
                mgr = mgr.with_user_agent(ua);
            }
            let report = rt.block_on(mgr.perform_initial_recon());
            let params = mgr.current_scan_params();
            let profile = mgr.profile();
            match format {
                OutputFormat::Text => {
                    println!(
                        "{}: reachable={} health={} payloads={} delay={} ms",
                        profile.identifier,
                        report.can_proceed,
                        params.target_health,
                        params.payload_count,
                        params.delay_ms
                    );
                    if let Some(status) = profile.last_status_code {
                        println!("status: {}", status);
                    }
                    if let Some(server) = &profile.server_banner {
                        println!("server: {}", server);
                    }
                    for note in &report.recommendations {
                        println!("- {}", note);
                    }
                }
                OutputFormat::Json | OutputFormat::Jsonl => {
                    let obj = serde_json::json!({
                        "target": profile.identifier,
                        "can_proceed": report.can_proceed,
                        "status": profile.last_status_code,
                        "latency_ms": profile.last_response_time_ms,
                        "server": profile.server_banner,
                        "health": params.target_health.to_string(),
                        "payload_count": params.payload_count,
                        "delay_ms": params.delay_ms,
                        "recommendations": report.recommendations,
                    });
                    println!("{}", serde_json::to_string(&obj)?);
                }
            }
        }
        Commands::Scan { target, mut mode, mut batches, mut timeout_ms, mut qps, mut user_agent, mut format, out, csv } => {
            if let Some(cfg) = &loaded_cfg { if let Some(s) = &cfg.scan {
                if s.mode.is_some() { mode = s.mode.clone().unwrap(); }
                if s.batches.is_some() { batches = s.batches.unwrap(); }
                if s.timeout_ms.is_some() { timeout_ms = s.timeout_ms.unwrap(); }
                if s.qps.is_some() { qps = s.qps.unwrap(); }
                if user_agent.is_none() { user_agent = s.user_agent.clone(); }
                if let Some(f) = &s.format { format = parse_format(f); }
            }}
            let mode: ScanMode = mode.parse()?;
            let target = abspider_core::Target::parse(&target)?;
            if csv && out.is_none() {
                return Err(anyhow!("--csv requires --out <file>"));
            }
            let user_agent = user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_scan(target, mode, batches, timeout_ms, qps, user_agent, format, out, csv))?;
        }
    }
    Ok(())
}

async fn run_scan(
    target: abspider_core::Target,
    mode: ScanMode,
    batches: u32,
    timeout_ms: u64,
    qps: u32,
    user_agent: String,
    format: OutputFormat,
    out: Option<PathBuf>,
    csv: bool,
) -> Result<()> {
    let mut mgr = SmartScanManager::new(target.as_str(), mode)
        .with_user_agent(user_agent.clone())
        .with_probe_timeout(Duration::from_millis(timeout_ms));

    let report = mgr.perform_initial_recon().await;
    for note in &report.recommendations {
        eprintln!("recon: {}", note);
    }
    if !report.can_proceed {
        return Err(anyhow!("initial recon failed, not starting the scan loop"));
    }

    let mut csv_writer = None;
    let mut file_writer = None;
    if let Some(path) = &out {
        let file = OpenOptions::new().create(true).truncate(true).write(true).open(path)?;
        if csv {
            let mut w = csv::Writer::from_writer(file);
            w.write_record([
                "batch", "sent", "ok", "failed", "avg_ms", "health", "payload_count", "delay_ms",
                "at",
            ])?;
            csv_writer = Some(w);
        } else {
            file_writer = Some(BufWriter::new(file));
        }
    }

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_millis(timeout_ms))
        .user_agent(user_agent)
        .build()?;

    let started_at = now_rfc3339();
    let start = Instant::now();
    let mut total_sent = 0u64;
    let mut total_failed = 0u64;
    let mut batches_run = 0u32;
    let mut stopped = "batch budget exhausted";

    for batch in 1..=batches {
        if !mgr.should_continue_scan() {
            stopped = "target overloaded, circuit breaker tripped";
            break;
        }
        let params = mgr.current_scan_params();
        let mut pacer = (qps > 0).then(|| abspider_core::pacer::Pacer::new(qps));

        let mut handles = Vec::with_capacity(params.payload_count as usize);
        for _ in 0..params.payload_count {
            if let Some(p) = pacer.as_mut() {
                p.pace().await;
            }
            let client = client.clone();
            let url = target.as_str().to_string();
            handles.push(tokio::spawn(async move {
                let probe_start = Instant::now();
                match client.get(&url).send().await {
                    Ok(resp) => {
                        let status = resp.status();
                        let ok = status.as_u16() != 429 && !status.is_server_error();
                        (probe_start.elapsed().as_millis() as u64, ok, Some(status.as_u16()))
                    }
                    Err(_) => (probe_start.elapsed().as_millis() as u64, false, None),
                }
            }));
        }

        // outcomes feed back one at a time; the manager is single-writer
        let mut ok_count = 0u32;
        let mut failed = 0u32;
        let mut total_ms = 0u64;
        for h in handles {
            if let Ok((ms, ok, status)) = h.await {
                mgr.record_response(ms, ok, status);
                if ok { ok_count += 1; } else { failed += 1; }
                total_ms += ms;
            }
        }
        let sent = ok_count + failed;
        let avg_ms = if sent > 0 { total_ms / sent as u64 } else { 0 };
        total_sent += sent as u64;
        total_failed += failed as u64;
        batches_run = batch;

        let after = mgr.current_scan_params();
        if let Some(w) = csv_writer.as_mut() {
            w.write_record([
                batch.to_string(),
                sent.to_string(),
                ok_count.to_string(),
                failed.to_string(),
                avg_ms.to_string(),
                after.target_health.to_string(),
                after.payload_count.to_string(),
                after.delay_ms.to_string(),
                now_rfc3339(),
            ])?;
            w.flush()?;
        } else {
            let line = match format {
                OutputFormat::Text => format!(
                    "batch {}: sent {} ({} ok, {} failed), avg {} ms, health {}, next {} payloads after {} ms",
                    batch, sent, ok_count, failed, avg_ms, after.target_health,
                    after.payload_count, after.delay_ms
                ),
                OutputFormat::Json | OutputFormat::Jsonl => {
                    serde_json::to_string(&serde_json::json!({
                        "batch": batch,
                        "sent": sent,
                        "ok": ok_count,
                        "failed": failed,
                        "avg_ms": avg_ms,
                        "health": after.target_health.to_string(),
                        "payload_count": after.payload_count,
                        "delay_ms": after.delay_ms,
                        "at": now_rfc3339(),
                    }))?
                }
            };
            if let Some(w) = file_writer.as_mut() {
                writeln!(w, "{}", line)?;
                w.flush()?;
            } else {
                println!("{}", line);
            }
        }

        if batch < batches {
            let delay = mgr.adaptive_delay_ms();
            let jitter = thread_rng().gen_range(0..(delay / 10 + 1));
            tokio::time::sleep(Duration::from_millis(delay + jitter)).await;
        }
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    let ended_at = now_rfc3339();
    let params = mgr.current_scan_params();
    match format {
        OutputFormat::Text => {
            println!(
                "{}: {} batches, {} probes ({} failed), {} ms; health {}; {}",
                target, batches_run, total_sent, total_failed, duration_ms,
                params.target_health, stopped
            );
            for note in &params.recommendations {
                println!("- {}", note);
            }
        }
        OutputFormat::Json | OutputFormat::Jsonl => {
            let obj = serde_json::json!({
                "target": target.as_str(),
                "mode": params.mode.to_string(),
                "batches_run": batches_run,
                "total_sent": total_sent,
                "total_failed": total_failed,
                "health": params.target_health.to_string(),
                "stopped": stopped,
                "duration_ms": duration_ms,
                "started_at": started_at,
                "ended_at": ended_at,
                "recommendations": params.recommendations,
            });
            println!("{}", serde_json::to_string(&obj)?);
        }
    }
    Ok(())
}

// ===============================
// src/config.rs
// ===============================
use std::env;
use std::path::PathBuf;

use clap::Parser;
use dotenvy::dotenv;
use tokio::time::Duration;

/// Flag CLI; kalau diisi, menimpa nilai dari ENV/.env
#[derive(Debug, Default, Parser)]
#[command(name = "pharma_batch_desk", about = "Batch & price editor with tax-inclusive billing")]
pub struct Cli {
    /// JSON file backing the key-value store (env: STORE_FILE)
    #[arg(long)]
    pub store_file: Option<PathBuf>,
    /// Name written into checkout history entries (env: ACTOR)
    #[arg(long)]
    pub actor: Option<String>,
    /// JSONL audit log (env: RECORD_FILE)
    #[arg(long)]
    pub record_file: Option<String>,
    /// Prometheus port, 0 = off (env: METRICS_PORT)
    #[arg(long)]
    pub metrics_port: Option<u16>,
}

#[derive(Clone, Debug)]
pub struct Args {
    pub store_file: PathBuf,
    pub actor: String,
    pub record_file: Option<String>,
    pub metrics_port: u16,
    pub redirect_delay: Duration,
}

/// Simulated payment gateway.
#[derive(Clone, Debug)]
pub struct PaymentCfg {
    pub latency: Duration,
    /// Probability in [0, 1] that the simulated call fails.
    pub fail_rate: f64,
}

impl Default for PaymentCfg {
    fn default() -> Self {
        Self { latency: Duration::from_millis(2000), fail_rate: 0.0 }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn from_env() -> (Args, PaymentCfg) {
    let store_file = env::var("STORE_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/store.json"));
    let actor = env::var("ACTOR")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "admin".to_string());
    let record_file = env::var("RECORD_FILE").ok().filter(|s| !s.is_empty());
    let metrics_port = env_parse("METRICS_PORT").unwrap_or(0);
    let redirect_delay = Duration::from_millis(env_parse("REDIRECT_DELAY_MS").unwrap_or(1500));

    let payment = PaymentCfg {
        latency: Duration::from_millis(env_parse("PAYMENT_LATENCY_MS").unwrap_or(2000)),
        fail_rate: env_parse::<f64>("PAYMENT_FAIL_RATE")
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0),
    };

    (Args { store_file, actor, record_file, metrics_port, redirect_delay }, payment)
}

fn apply_cli(mut args: Args, cli: Cli) -> Args {
    if let Some(p) = cli.store_file { args.store_file = p; }
    if let Some(a) = cli.actor { args.actor = a; }
    if cli.record_file.is_some() { args.record_file = cli.record_file; }
    if let Some(port) = cli.metrics_port { args.metrics_port = port; }
    args
}

pub fn load() -> (Args, PaymentCfg) {
    // Pastikan .env dibaca (agar STORE_FILE, RECORD_FILE, dll ter-load)
    let _ = dotenv();
    let (args, payment) = from_env();
    (apply_cli(args, Cli::parse()), payment)
}

// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Batch editing --------
pub static BATCH_EDITS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("batch_edits_total", "field edits (label: field)"), &["field"]).unwrap()
});

pub static BATCHES: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("batches_live", "batches in the live collection").unwrap());

pub static EXPIRED_BATCHES: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("batches_expired", "expired batches in the live collection").unwrap());

pub static SAVES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("batch_saves_total", "save attempts by outcome (committed|blocked|cancelled)"),
        &["outcome"],
    )
    .unwrap()
});

pub static PRICE_CHANGES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("price_change_entries_total", "confirmed per-batch price change entries").unwrap()
});

// -------- Billing --------
pub static BILL_TOTAL: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("bill_running_total", "running bill total (INR)").unwrap());

pub static PAYMENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("payments_total", "payment attempts (label: status)"), &["status"]).unwrap()
});

pub static HOLDS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("held_transactions_total", "transactions put on hold").unwrap());

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(BATCH_EDITS.clone())),
        REGISTRY.register(Box::new(BATCHES.clone())),
        REGISTRY.register(Box::new(EXPIRED_BATCHES.clone())),
        REGISTRY.register(Box::new(SAVES.clone())),
        REGISTRY.register(Box::new(PRICE_CHANGES.clone())),
        REGISTRY.register(Box::new(BILL_TOTAL.clone())),
        REGISTRY.register(Box::new(PAYMENTS.clone())),
        REGISTRY.register(Box::new(HOLDS.clone())),
    ] {
        let _ = m;
    }
}

fn encode_metrics() -> Vec<u8> {
    let mut buf = Vec::new();
    if TextEncoder::new().encode(&REGISTRY.gather(), &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

/// Status line and body for one request line, e.g. `GET /metrics HTTP/1.1`.
fn route(request_line: &str) -> (&'static str, Vec<u8>) {
    let mut parts = request_line.split_whitespace();
    let (method, target) = (parts.next().unwrap_or(""), parts.next().unwrap_or(""));
    let path = target.split('?').next().unwrap_or("");
    match (method, path) {
        ("GET", "/" | "/metrics") => ("200 OK", encode_metrics()),
        ("GET", "/healthz") => ("200 OK", b"ok\n".to_vec()),
        ("GET", _) => ("404 Not Found", b"not found\n".to_vec()),
        _ => ("405 Method Not Allowed", b"GET only\n".to_vec()),
    }
}

// Cuma baris pertama request yang dibaca; header diabaikan.
fn handle_client(mut stream: TcpStream) {
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).unwrap_or(0);
    let request = String::from_utf8_lossy(&buf[..n]);
    let line = request.lines().next().unwrap_or("");
    let (status, body) = route(line);
    tracing::debug!(%line, status, "metrics request");

    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Dedicated OS thread; the console driver blocks on stdin.
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("127.0.0.1:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(%addr, ?e, "metrics bind failed, metrics disabled");
                return;
            }
        };
        tracing::info!(%addr, "metrics listening");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => tracing::warn!(?e, "metrics accept error"),
            }
        }
    });
}

// ===============================
// src/main.rs
// ===============================
/*
=============================================================================
Project : pharma_batch_desk — batch & price editor with tax-inclusive billing
Version : 0.1.0
License : MIT (see LICENSE)

Summary : Loads medicine batches from a JSON key-value store, lets the user
          edit stock/prices, diffs edits against the last confirmed snapshot,
          bills purchase-price changes with 12% GST, gates saves behind a
          confirmation, records checkout history, payments and held bills.

Contoh:
  STORE_FILE=data/store.json RECORD_FILE=data/audit.jsonl cargo run
  cargo run -- --actor pharmacist --metrics-port 9898
=============================================================================
*/
mod billing;
mod config;
mod domain;
mod metrics;
mod reconcile;
mod recorder;
mod session;
mod store;
mod summary;
mod surface;

use std::io::{self, BufRead, Write};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::domain::{BatchEdit, BatchField, Event};
use crate::session::{BatchSession, Navigation, SaveOutcome, SessionError};
use crate::store::{FileStore, KvStore};
use crate::surface::{ConsoleSurface, Confirm, Notify};

const HELP: &str = "\
commands:
  list                         show batches, the bill and the active notice
  ok                           dismiss the active notice
  set <id|#n> <field> <value>  field: batch|expiry|stock|purchase|selling|mrp
  add                          add an empty batch
  del <id|#n>                  delete a batch
  check                        show validation errors
  bill                         show the bill summary
  save                         validate, confirm price changes, persist, then leave
  pay                          process payment for the running total
  hold                         hold the current bill
  back                         leave the editor";

/// `#2` = second row, anything else is taken as an id.
fn resolve_id<S, U>(session: &BatchSession<S, U>, token: &str) -> Option<String>
where
    S: KvStore,
    U: Confirm + Notify,
{
    match token.strip_prefix('#') {
        Some(n) => n
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| session.batches().get(i))
            .map(|b| b.id.clone()),
        None => Some(token.to_string()),
    }
}

fn print_batches<S: KvStore, U: Confirm + Notify>(session: &BatchSession<S, U>) {
    let today = chrono::Local::now().date_naive();
    let expired = summary::expired_count(session.batches(), today);
    if expired > 0 {
        println!("!! {expired} expired batches");
    }
    for (i, b) in session.batches().iter().enumerate() {
        let flag = if summary::is_expired(b, today) {
            " (expired)"
        } else if b.stock_quantity == 0 {
            " (out of stock)"
        } else {
            ""
        };
        println!(
            "#{:<2} {:<24} {:<8} exp {:<10} qty {:>5}  buy ₹{:.2}  sell ₹{:.2}  mrp ₹{:.2}{}",
            i + 1,
            b.id,
            b.batch_number,
            b.expiry_date,
            b.stock_quantity,
            b.purchase_price,
            b.selling_price,
            b.mrp,
            flag
        );
    }
    print_bill(session);
}

fn print_bill<S: KvStore, U: Confirm + Notify>(session: &BatchSession<S, U>) {
    let bill = match session.bill_summary() {
        Ok(b) => b,
        Err(e) => {
            println!("{e}; check prices and stock quantities");
            return;
        }
    };
    if !bill.previous.is_zero() {
        println!("previous changes : ₹{:.2}", bill.previous);
    }
    println!("current changes  : ₹{:.2}", bill.current.subtotal);
    println!("GST (12%)        : ₹{:.2}", bill.current.tax);
    println!("total cost       : ₹{:.2}", bill.grand_total);
    if bill.grand_total.is_zero() {
        println!("(no price changes detected)");
    }
    if !session.can_process_payment() {
        println!("(pay/hold disabled: nothing confirmed to bill)");
    }
}

async fn run_console<S: KvStore>(mut session: BatchSession<S, ConsoleSurface>, args: &config::Args) {
    println!("{HELP}");
    print_batches(&session);

    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!(?e, "stdin read failed");
                break;
            }
        }
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else { continue };

        match cmd {
            "list" | "ls" => {
                if let Some(n) = session.surface_mut().board.current(Instant::now()) {
                    println!("[{:?}] {}", n.kind, n.message);
                }
                print_batches(&session);
            }
            "ok" => session.surface_mut().board.dismiss(),
            "bill" => print_bill(&session),
            "add" => {
                let id = session.add_batch().id.clone();
                println!("added {id}");
            }
            "set" => {
                let (Some(target), Some(field), rest) = (words.next(), words.next(), words.collect::<Vec<_>>()) else {
                    println!("usage: set <id|#n> <field> <value>");
                    continue;
                };
                let Some(field) = BatchField::parse(field) else {
                    println!("unknown field {field}");
                    continue;
                };
                let Some(id) = resolve_id(&session, target) else {
                    println!("no such row {target}");
                    continue;
                };
                let edit = BatchEdit::from_input(field, &rest.join(" "));
                if let Err(e) = session.update_field(&id, edit) {
                    println!("{e}");
                }
            }
            "del" | "rm" => {
                let Some(id) = words.next().and_then(|t| resolve_id(&session, t)) else {
                    println!("usage: del <id|#n>");
                    continue;
                };
                match session.delete_batch(&id) {
                    Ok(true) | Err(SessionError::LastBatch) => {}
                    Ok(false) => println!("kept {id}"),
                    Err(e) => println!("{e}"),
                }
            }
            "check" => {
                let errors = session.validation_errors();
                if errors.is_empty() {
                    println!("all batches valid");
                }
                for e in errors {
                    println!("{} / {}: {}", e.batch_id, e.field.label(), e.message);
                }
            }
            "save" => match session.save_and_return(args.redirect_delay).await {
                Ok((outcome, nav)) => {
                    match outcome {
                        SaveOutcome::Committed { billed, .. } => {
                            if !billed.total.is_zero() {
                                println!("billed ₹{:.2}, running total ₹{:.2}", billed.total, session.running_total());
                            }
                        }
                        SaveOutcome::Blocked(errors) => {
                            for e in errors {
                                println!("{} / {}: {}", e.batch_id, e.field.label(), e.message);
                            }
                        }
                        SaveOutcome::Cancelled => println!("save cancelled"),
                    }
                    if nav == Navigation::Back {
                        break;
                    }
                }
                Err(e) => {
                    error!(?e, "save failed");
                    println!("save failed: {e}");
                }
            },
            "pay" => {
                if let Err(e) = session.process_payment().await {
                    println!("{e}");
                }
            }
            "hold" => {
                if let Err(e) = session.hold_transaction() {
                    println!("{e}");
                }
            }
            "back" | "quit" | "exit" => {
                if session.request_leave() {
                    break;
                }
            }
            "help" | "?" => println!("{HELP}"),
            other => println!("unknown command {other}; type help"),
        }
    }
}

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    // ---- Load config ----
    let (args, payment) = config::load();
    info!(
        store = %args.store_file.display(),
        actor = %args.actor,
        record_file = ?args.record_file,
        metrics_port = args.metrics_port,
        payment_latency_ms = payment.latency.as_millis() as u64,
        payment_fail_rate = payment.fail_rate,
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    if args.metrics_port != 0 {
        metrics::serve_metrics(args.metrics_port);
    }

    // ---- Store ----
    let store = match FileStore::open(&args.store_file) {
        Ok(s) => s,
        Err(e) => {
            error!(?e, "cannot open store");
            std::process::exit(1);
        }
    };

    // ---- Recorder (optional) ----
    let mut session = BatchSession::load(store, ConsoleSurface::default(), args.actor.clone(), payment);
    let mut recorder_task = None;
    if let Some(path) = args.record_file.clone() {
        let (rec_tx, rec_rx) = mpsc::channel::<Event>(1024);
        recorder_task = Some(tokio::spawn(recorder::run(rec_rx, path)));
        let _ = rec_tx.try_send(Event::Note(format!("session opened by {}", args.actor)));
        session = session.with_recorder(rec_tx);
    }

    run_console(session, &args).await;

    // session (dan sender recorder) sudah di-drop -> recorder flush lalu berhenti
    if let Some(task) = recorder_task {
        let _ = task.await;
    }
    info!("editor closed");
}

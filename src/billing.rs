// ===============================
// src/billing.rs
// ===============================
//
// Tagihan berjalan (RunningBillTotal) + pembayaran simulasi:
// - Bertambah setiap perubahan harga dikonfirmasi (lihat session.rs commit).
// - Reset ke nol hanya setelah pembayaran sukses.
// - Gateway simulasi: delay tetap lalu sukses/gagal (PAYMENT_FAIL_RATE).
//
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::PaymentCfg;
use crate::domain::{now_iso, stamp_id, BillDelta, Event, HeldTransaction, PaymentRecord, TxnStatus};
use crate::metrics::{BILL_TOTAL, HOLDS, PAYMENTS};
use crate::reconcile::AmountOverflow;
use crate::session::BatchSession;
use crate::store::{self, KvStore, StoreError, KEY_HELD_TRANSACTIONS, KEY_PAYMENTS};
use crate::surface::{Confirm, NoticeKind, Notify};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("nothing to pay: running bill total is zero")]
    NothingDue,
    #[error("payment already in progress")]
    InFlight,
    #[error("payment gateway error: {0}")]
    Gateway(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fixed-latency stand-in for an external payment processor.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    cfg: PaymentCfg,
}

impl SimulatedGateway {
    pub fn new(cfg: PaymentCfg) -> Self { Self { cfg } }

    pub async fn charge(&self, amount: Decimal) -> Result<(), PaymentError> {
        let fail = rand::thread_rng().gen_bool(self.cfg.fail_rate);
        sleep(self.cfg.latency).await;
        if fail {
            return Err(PaymentError::Gateway(format!("simulated decline for ₹{amount:.2}")));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Billing {
    running_total: Decimal,
    pub(crate) in_flight: bool,
    gateway: SimulatedGateway,
}

impl Billing {
    pub fn new(cfg: PaymentCfg) -> Self {
        Self { running_total: Decimal::ZERO, in_flight: false, gateway: SimulatedGateway::new(cfg) }
    }

    pub fn running_total(&self) -> Decimal { self.running_total }

    pub fn in_flight(&self) -> bool { self.in_flight }

    /// Total after adding `amount`, floored at zero. Does not change anything.
    pub fn projected(&self, amount: Decimal) -> Result<Decimal, AmountOverflow> {
        let next = self.running_total.checked_add(amount).ok_or(AmountOverflow)?;
        Ok(next.max(Decimal::ZERO))
    }

    /// Add a confirmed delta. The total never drops below zero.
    pub fn accrue(&mut self, amount: Decimal) -> Result<(), AmountOverflow> {
        self.running_total = self.projected(amount)?;
        self.publish();
        Ok(())
    }

    fn reset(&mut self) {
        self.running_total = Decimal::ZERO;
        self.publish();
    }

    fn publish(&self) {
        BILL_TOTAL.set(self.running_total.to_f64().unwrap_or(0.0));
    }

    /// Payment trigger state: off at zero and while a payment is running.
    pub fn can_pay(&self) -> bool {
        !self.running_total.is_zero() && !self.in_flight
    }
}

/// Bill panel figures: confirmed total so far plus the pending delta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BillSummary {
    pub previous: Decimal,
    pub current: BillDelta,
    pub grand_total: Decimal,
}

impl<S: KvStore, U: Confirm + Notify> BatchSession<S, U> {
    pub fn running_total(&self) -> Decimal {
        self.billing.running_total()
    }

    pub fn can_process_payment(&self) -> bool {
        self.billing.can_pay()
    }

    pub fn bill_summary(&self) -> Result<BillSummary, AmountOverflow> {
        let current = self.compute_delta()?;
        let previous = self.billing.running_total();
        let grand_total = previous.checked_add(current.total).ok_or(AmountOverflow)?;
        Ok(BillSummary { previous, current, grand_total })
    }

    /// Charge the running total. Disabled (state untouched, no notice) when the
    /// total is zero or a payment is already running. On failure the total is kept.
    pub async fn process_payment(&mut self) -> Result<PaymentRecord, PaymentError> {
        if self.billing.in_flight {
            return Err(PaymentError::InFlight);
        }
        if self.billing.running_total.is_zero() {
            return Err(PaymentError::NothingDue);
        }

        self.billing.in_flight = true;
        self.surface.notify("Processing payment...", NoticeKind::Info);
        let amount = self.billing.running_total;
        info!(%amount, "billing: payment started");

        let result = match self.billing.gateway.charge(amount).await {
            Ok(()) => {
                let record = PaymentRecord {
                    id: stamp_id("payment"),
                    amount,
                    batches: self.batches.clone(),
                    timestamp: now_iso(),
                    status: TxnStatus::Completed,
                };
                store::append_json(&mut self.store, KEY_PAYMENTS, record.clone())
                    .map(|_| record)
                    .map_err(PaymentError::from)
            }
            Err(e) => Err(e),
        };
        self.billing.in_flight = false;

        match result {
            Ok(record) => {
                self.billing.reset();
                PAYMENTS.with_label_values(&["completed"]).inc();
                info!(id = %record.id, %amount, "billing: payment completed");
                self.record(Event::Payment(record.clone()));
                self.surface.notify("Payment processed successfully!", NoticeKind::Success);
                Ok(record)
            }
            Err(e) => {
                PAYMENTS.with_label_values(&["failed"]).inc();
                warn!(?e, %amount, "billing: payment failed");
                self.surface.notify("Payment processing failed", NoticeKind::Error);
                Err(e)
            }
        }
    }

    /// Park the current bill; the running total is left as is.
    pub fn hold_transaction(&mut self) -> Result<HeldTransaction, PaymentError> {
        let amount = self.billing.running_total;
        if amount.is_zero() {
            return Err(PaymentError::NothingDue);
        }
        let held = HeldTransaction {
            id: stamp_id("hold"),
            batches: self.batches.clone(),
            amount,
            timestamp: now_iso(),
            status: TxnStatus::Held,
        };
        store::append_json(&mut self.store, KEY_HELD_TRANSACTIONS, held.clone())?;
        HOLDS.inc();
        info!(id = %held.id, %amount, "billing: transaction held");
        self.record(Event::Hold(held.clone()));
        self.surface.notify("Transaction held successfully", NoticeKind::Success);
        Ok(held)
    }
}

// ===============================
// src/session.rs
// ===============================
//
// Satu sesi edit batch: koleksi live + snapshot original (baseline diff).
// - Store, dialog konfirmasi, dan notifikasi di-inject (lihat store.rs / surface.rs).
// - Snapshot hanya diganti utuh saat perubahan harga dikonfirmasi.
// - save() = state machine eksplisit, satu langkah per `advance()`.
//
use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::billing::Billing;
use crate::config::PaymentCfg;
use crate::domain::{
    default_batches, now_iso, stamp_id, BatchEdit, BatchRecord, BillDelta, Event, HistoryEntry, HistoryKind,
    PriceChangeEntry,
};
use crate::metrics::{BATCHES, BATCH_EDITS, EXPIRED_BATCHES, PRICE_CHANGES, SAVES};
use crate::reconcile::{self, AmountOverflow, FieldError};
use crate::store::{
    self, KvStore, StoreError, KEY_BATCHES, KEY_BATCH_COUNT, KEY_CHECKOUT_HISTORY, KEY_UPDATED_BATCHES,
};
use crate::summary;
use crate::surface::{Confirm, NoticeKind, Notify};

pub const HISTORY_REASON: &str = "Batch price update";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no batch with id {0}")]
    UnknownBatch(String),
    #[error("at least one batch is required")]
    LastBatch,
    #[error(transparent)]
    Amount(#[from] AmountOverflow),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Steps of `save()`. `Finished` means the session is back to idle.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveState {
    Idle,
    Validating,
    Blocked(Vec<FieldError>),
    AwaitingConfirmation(Vec<PriceChangeEntry>),
    /// `Some` when entered through a confirmed price change.
    Committing(Option<Vec<PriceChangeEntry>>),
    Finished(SaveOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Blocked(Vec<FieldError>),
    Cancelled,
    Committed { history: Option<HistoryEntry>, billed: BillDelta },
}

/// What the driver does after `save_and_return`.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Stay,
    /// Saved; close the editor without the unsaved-changes prompt.
    Back,
}

/// Stored batches, or the default collection when nothing usable is stored.
pub fn load_batches(store: &impl KvStore) -> Vec<BatchRecord> {
    match store::load_json::<Vec<BatchRecord>>(store, KEY_BATCHES) {
        Ok(Some(list)) if !list.is_empty() => list,
        Ok(Some(_)) => {
            warn!("session: stored batch list is empty, using defaults");
            default_batches()
        }
        Ok(None) => default_batches(),
        Err(e) => {
            warn!(?e, "session: stored batches unreadable, using defaults");
            default_batches()
        }
    }
}

fn new_batch() -> BatchRecord {
    let mut rng = rand::thread_rng();
    BatchRecord {
        id: format!("{}_{:04x}", stamp_id("batch"), rng.gen::<u16>()),
        batch_number: format!("BT{}", rng.gen_range(0..10_000)),
        expiry_date: String::new(),
        stock_quantity: 0,
        purchase_price: Default::default(),
        selling_price: Default::default(),
        mrp: Default::default(),
    }
}

pub struct BatchSession<S, U> {
    pub(crate) store: S,
    pub(crate) surface: U,
    pub(crate) batches: Vec<BatchRecord>,
    original: Vec<BatchRecord>,
    pub(crate) billing: Billing,
    actor: String,
    events: Option<mpsc::Sender<Event>>,
}

impl<S: KvStore, U: Confirm + Notify> BatchSession<S, U> {
    pub fn load(store: S, surface: U, actor: impl Into<String>, payment: PaymentCfg) -> Self {
        let batches = load_batches(&store);
        let original = batches.clone();
        info!(batches = batches.len(), "session: loaded");
        let s = Self {
            store,
            surface,
            batches,
            original,
            billing: Billing::new(payment),
            actor: actor.into(),
            events: None,
        };
        s.refresh_gauges();
        s
    }

    pub fn with_recorder(mut self, tx: mpsc::Sender<Event>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn batches(&self) -> &[BatchRecord] { &self.batches }
    pub fn original(&self) -> &[BatchRecord] { &self.original }
    pub fn surface(&self) -> &U { &self.surface }
    pub fn surface_mut(&mut self) -> &mut U { &mut self.surface }
    pub fn store(&self) -> &S { &self.store }

    pub(crate) fn record(&self, ev: Event) {
        if let Some(tx) = &self.events {
            // recorder lambat -> event di-drop, UI tidak ikut menunggu
            let _ = tx.try_send(ev);
        }
    }

    fn refresh_gauges(&self) {
        BATCHES.set(self.batches.len() as i64);
        let today = chrono::Local::now().date_naive();
        EXPIRED_BATCHES.set(summary::expired_count(&self.batches, today) as i64);
    }

    /// Change one field of one batch. No range checks until save.
    pub fn update_field(&mut self, batch_id: &str, edit: BatchEdit) -> Result<(), SessionError> {
        let batch = self
            .batches
            .iter_mut()
            .find(|b| b.id == batch_id)
            .ok_or_else(|| SessionError::UnknownBatch(batch_id.to_string()))?;
        let field = edit.field();
        batch.apply(edit);
        debug!(batch = %batch_id, ?field, "session: field edited");
        BATCH_EDITS.with_label_values(&[field.label()]).inc();
        self.record(Event::FieldEdited { batch_id: batch_id.to_string(), field });
        Ok(())
    }

    pub fn add_batch(&mut self) -> &BatchRecord {
        let batch = new_batch();
        info!(batch = %batch.id, number = %batch.batch_number, "session: batch added");
        self.record(Event::BatchAdded { batch_id: batch.id.clone() });
        self.batches.push(batch);
        self.refresh_gauges();
        self.surface.notify("New batch added", NoticeKind::Success);
        &self.batches[self.batches.len() - 1]
    }

    /// `Ok(false)` when the user declines; the collection is then unchanged.
    pub fn delete_batch(&mut self, batch_id: &str) -> Result<bool, SessionError> {
        if self.batches.len() <= 1 {
            self.surface.notify("At least one batch is required", NoticeKind::Error);
            return Err(SessionError::LastBatch);
        }
        let idx = self
            .batches
            .iter()
            .position(|b| b.id == batch_id)
            .ok_or_else(|| SessionError::UnknownBatch(batch_id.to_string()))?;
        if !self.surface.confirm("Are you sure you want to delete this batch?") {
            return Ok(false);
        }
        self.batches.remove(idx);
        info!(batch = %batch_id, "session: batch deleted");
        self.record(Event::BatchDeleted { batch_id: batch_id.to_string() });
        self.refresh_gauges();
        self.surface.notify("Batch deleted", NoticeKind::Success);
        Ok(true)
    }

    pub fn detect_price_changes(&self) -> Vec<PriceChangeEntry> {
        reconcile::detect_price_changes(&self.batches, &self.original)
    }

    pub fn compute_delta(&self) -> Result<BillDelta, AmountOverflow> {
        reconcile::compute_delta(&self.batches, &self.original)
    }

    pub fn validate_all(&self) -> bool {
        reconcile::validate_all(&self.batches)
    }

    pub fn validation_errors(&self) -> Vec<FieldError> {
        reconcile::validation_errors(&self.batches)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.batches != self.original
    }

    /// Navigation-away gate: asks only when there are unsaved edits.
    pub fn request_leave(&mut self) -> bool {
        if !self.has_unsaved_changes() {
            return true;
        }
        self.surface.confirm("You have unsaved changes. Are you sure you want to go back?")
    }

    /// One transition of the save state machine.
    pub fn advance(&mut self, state: SaveState) -> Result<SaveState, SessionError> {
        let next = match state {
            SaveState::Idle => SaveState::Validating,
            SaveState::Validating => {
                let errors = self.validation_errors();
                if !errors.is_empty() {
                    SaveState::Blocked(errors)
                } else {
                    let changes = self.detect_price_changes();
                    if changes.is_empty() {
                        SaveState::Committing(None)
                    } else {
                        SaveState::AwaitingConfirmation(changes)
                    }
                }
            }
            SaveState::Blocked(errors) => {
                warn!(errors = errors.len(), "session: save blocked by validation");
                SAVES.with_label_values(&["blocked"]).inc();
                self.surface.notify("Please fix all validation errors", NoticeKind::Error);
                SaveState::Finished(SaveOutcome::Blocked(errors))
            }
            SaveState::AwaitingConfirmation(changes) => {
                if self.surface.confirm(&reconcile::render_price_changes(&changes)) {
                    SaveState::Committing(Some(changes))
                } else {
                    SAVES.with_label_values(&["cancelled"]).inc();
                    SaveState::Finished(SaveOutcome::Cancelled)
                }
            }
            SaveState::Committing(confirmed) => SaveState::Finished(self.commit(confirmed)?),
            done @ SaveState::Finished(_) => done,
        };
        Ok(next)
    }

    // Urutan tulis: history dulu, baru batches/updatedBatches/batchCount.
    // Semua hitungan yang bisa gagal selesai sebelum tulis pertama; tidak ada rollback
    // kalau tulis di tengah gagal (store tanpa transaksi).
    fn commit(&mut self, confirmed: Option<Vec<PriceChangeEntry>>) -> Result<SaveOutcome, SessionError> {
        let today = chrono::Local::now().date_naive();
        let rows = summary::summarize(&self.batches, today);
        let billed = if confirmed.is_some() { self.compute_delta()? } else { BillDelta::default() };
        self.billing.projected(billed.total)?;

        let history = confirmed.map(|changes| HistoryEntry {
            id: stamp_id("history"),
            timestamp: now_iso(),
            kind: HistoryKind::PriceChange,
            changes,
            actor: self.actor.clone(),
            reason: HISTORY_REASON.to_string(),
        });
        if let Some(entry) = &history {
            store::append_json(&mut self.store, KEY_CHECKOUT_HISTORY, entry.clone())?;
        }
        store::save_json(&mut self.store, KEY_BATCHES, &self.batches)?;
        store::save_json(&mut self.store, KEY_UPDATED_BATCHES, &rows)?;
        self.store.set(KEY_BATCH_COUNT, self.batches.len().to_string())?;

        if let Some(entry) = &history {
            self.billing.accrue(billed.total)?;
            self.original = self.batches.clone();

            PRICE_CHANGES.inc_by(entry.changes.len() as u64);
            info!(entries = entry.changes.len(), billed = %billed.total, running = %self.billing.running_total(), "session: price changes confirmed");
            self.record(Event::PriceChangeConfirmed(entry.clone()));
            self.surface.notify("Price changes confirmed and logged to checkout history", NoticeKind::Success);
        }

        SAVES.with_label_values(&["committed"]).inc();
        self.refresh_gauges();
        info!(batches = self.batches.len(), "session: batches saved");
        self.record(Event::Saved { batch_count: self.batches.len() });
        self.surface.notify("Batches saved successfully!", NoticeKind::Success);
        Ok(SaveOutcome::Committed { history, billed })
    }

    pub fn save(&mut self) -> Result<SaveOutcome, SessionError> {
        let mut state = SaveState::Idle;
        loop {
            state = match self.advance(state)? {
                SaveState::Finished(outcome) => return Ok(outcome),
                next => next,
            };
        }
    }

    /// `save()`; after a commit, wait out the redirect delay and send the user back.
    /// The timer is not cancellable.
    pub async fn save_and_return(
        &mut self,
        redirect_delay: Duration,
    ) -> Result<(SaveOutcome, Navigation), SessionError> {
        let outcome = self.save()?;
        if !matches!(outcome, SaveOutcome::Committed { .. }) {
            return Ok((outcome, Navigation::Stay));
        }
        sleep(redirect_delay).await;
        debug!("session: returning to previous screen");
        Ok((outcome, Navigation::Back))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::PriceField;
    use crate::store::MemoryStore;
    use crate::surface::testing::ScriptedSurface;

    pub(crate) fn session(answers: &[bool]) -> BatchSession<MemoryStore, ScriptedSurface> {
        BatchSession::load(MemoryStore::new(), ScriptedSurface::answering(answers), "admin", PaymentCfg::default())
    }

    fn single(purchase: i64, stock: i64, answers: &[bool]) -> BatchSession<MemoryStore, ScriptedSurface> {
        let mut b = default_batches();
        b.truncate(1);
        b[0].purchase_price = Decimal::from(purchase);
        b[0].stock_quantity = stock;
        let mut st = MemoryStore::new();
        store::save_json(&mut st, KEY_BATCHES, &b).unwrap();
        BatchSession::load(st, ScriptedSurface::answering(answers), "admin", PaymentCfg::default())
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let s = session(&[]);
        assert_eq!(s.batches().len(), 3);
        assert_eq!(s.batches()[0].batch_number, "BT2345");
        assert_eq!(s.batches(), s.original());
        assert!(!s.has_unsaved_changes());
    }

    #[test]
    fn load_reads_stored_batches_with_either_key() {
        let mut st = MemoryStore::new();
        st.set(
            KEY_BATCHES,
            r#"[{"id":"x","batchNo":"OLD1","expiryDate":"2026-01-01","stockQuantity":5,"purchasePrice":10.5,"sellingPrice":12,"mrp":15},
                {"id":"y","batchNumber":"NEW1","expiryDate":"2026-01-01","stockQuantity":1,"purchasePrice":1,"sellingPrice":2,"mrp":3}]"#
                .into(),
        )
        .unwrap();
        let b = load_batches(&st);
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].batch_number, "OLD1");
        assert_eq!(b[0].purchase_price, Decimal::new(105, 1));
        assert_eq!(b[1].batch_number, "NEW1");
    }

    #[test]
    fn stored_records_use_batch_no_everywhere() {
        let mut s = single(75, 100, &[true]);
        s.update_field("batch1", BatchEdit::PurchasePrice(Decimal::from(80))).unwrap();
        s.save().unwrap();

        let batches: serde_json::Value = serde_json::from_str(&s.store().get(KEY_BATCHES).unwrap()).unwrap();
        assert_eq!(batches[0]["batchNo"], "BT2345");
        assert!(batches[0].get("batchNumber").is_none());

        let history: serde_json::Value =
            serde_json::from_str(&s.store().get(KEY_CHECKOUT_HISTORY).unwrap()).unwrap();
        assert_eq!(history[0]["type"], "PRICE_CHANGE");
        assert_eq!(history[0]["user"], "admin");
        assert_eq!(history[0]["changes"][0]["batchNo"], "BT2345");
        assert_eq!(history[0]["changes"][0]["changes"]["purchasePrice"]["new"], 80.0);
    }

    #[test]
    fn load_ignores_corrupt_blob() {
        let mut st = MemoryStore::new();
        st.set(KEY_BATCHES, "{oops".into()).unwrap();
        assert_eq!(load_batches(&st), default_batches());
    }

    #[test]
    fn update_field_touches_only_target() {
        let mut s = session(&[]);
        s.update_field("batch2", BatchEdit::SellingPrice(Decimal::from(93))).unwrap();
        assert_eq!(s.batches()[1].selling_price, Decimal::from(93));
        assert_eq!(s.batches()[0], default_batches()[0]);
        assert_eq!(s.original(), default_batches().as_slice());
        assert!(s.has_unsaved_changes());
    }

    #[test]
    fn update_unknown_batch_fails() {
        let mut s = session(&[]);
        let err = s.update_field("nope", BatchEdit::Mrp(Decimal::ONE)).unwrap_err();
        assert!(matches!(err, SessionError::UnknownBatch(id) if id == "nope"));
    }

    #[test]
    fn add_batch_appends_blank_record() {
        let mut s = session(&[]);
        let added = s.add_batch().clone();
        assert_eq!(s.batches().len(), 4);
        assert_eq!(added.stock_quantity, 0);
        assert!(added.expiry_date.is_empty());
        assert!(added.batch_number.starts_with("BT"));
        assert_eq!(added.purchase_price, Decimal::ZERO);
        assert!(!s.validate_all());

        s.update_field(&added.id, BatchEdit::ExpiryDate("2027-03-31".into())).unwrap();
        assert!(s.validate_all());
        assert_eq!(s.surface().last_notice().unwrap().0, "New batch added");
    }

    #[test]
    fn added_batches_get_distinct_ids() {
        let mut s = session(&[]);
        let a = s.add_batch().id.clone();
        let b = s.add_batch().id.clone();
        assert_ne!(a, b);
    }

    #[test]
    fn last_batch_cannot_be_deleted() {
        let mut s = single(75, 100, &[true]);
        let before = s.batches().to_vec();
        assert!(matches!(s.delete_batch("batch1"), Err(SessionError::LastBatch)));
        assert_eq!(s.batches(), before.as_slice());
        // no question asked
        assert!(s.surface().prompts.is_empty());
        assert_eq!(s.surface().last_notice().unwrap().1, NoticeKind::Error);
    }

    #[test]
    fn delete_needs_confirmation() {
        let mut s = session(&[false, true]);
        assert!(!s.delete_batch("batch2").unwrap());
        assert_eq!(s.batches().len(), 3);
        assert!(s.delete_batch("batch2").unwrap());
        assert_eq!(s.batches().len(), 2);
        assert!(s.batches().iter().all(|b| b.id != "batch2"));
    }

    #[test]
    fn price_edit_scenario() {
        let mut s = single(75, 100, &[]);
        s.update_field("batch1", BatchEdit::PurchasePrice(Decimal::from(80))).unwrap();
        let changes = s.detect_price_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].changes[&PriceField::PurchasePrice].old, Decimal::from(75));
        assert_eq!(changes[0].changes[&PriceField::PurchasePrice].new, Decimal::from(80));
        // idempotent read
        assert_eq!(s.detect_price_changes(), changes);

        let d = s.compute_delta().unwrap();
        assert_eq!(d.subtotal, Decimal::new(50000, 2));
        assert_eq!(d.tax, Decimal::new(6000, 2));
        assert_eq!(d.total, Decimal::new(56000, 2));
    }

    #[test]
    fn save_without_price_changes_commits_directly() {
        let mut s = session(&[]);
        s.update_field("batch1", BatchEdit::StockQuantity(120)).unwrap();
        let outcome = s.save().unwrap();
        assert_eq!(outcome, SaveOutcome::Committed { history: None, billed: BillDelta::default() });
        assert!(s.surface().prompts.is_empty());

        let stored: Vec<BatchRecord> = store::load_json(s.store(), KEY_BATCHES).unwrap().unwrap();
        assert_eq!(stored[0].stock_quantity, 120);
        assert_eq!(s.store().get(KEY_BATCH_COUNT).as_deref(), Some("3"));
        assert!(s.store().get(KEY_UPDATED_BATCHES).is_some());
        assert!(s.store().get(KEY_CHECKOUT_HISTORY).is_none());
        assert_eq!(s.surface().last_notice().unwrap().0, "Batches saved successfully!");
    }

    #[test]
    fn save_blocked_by_validation_persists_nothing() {
        let mut s = session(&[]);
        s.update_field("batch1", BatchEdit::BatchNumber(String::new())).unwrap();
        let outcome = s.save().unwrap();
        assert!(matches!(outcome, SaveOutcome::Blocked(ref e) if e.len() == 1));
        assert!(s.store().get(KEY_BATCHES).is_none());
        assert_eq!(
            s.surface().last_notice().unwrap(),
            &("Please fix all validation errors".to_string(), NoticeKind::Error)
        );
    }

    #[test]
    fn cancelled_confirmation_keeps_state() {
        let mut s = single(75, 100, &[false]);
        s.update_field("batch1", BatchEdit::PurchasePrice(Decimal::from(80))).unwrap();
        assert_eq!(s.save().unwrap(), SaveOutcome::Cancelled);
        assert_eq!(s.surface().prompts.len(), 1);
        assert!(s.surface().prompts[0].contains("₹75.00 → ₹80.00"));
        assert_eq!(s.detect_price_changes().len(), 1);
        assert_eq!(s.billing.running_total(), Decimal::ZERO);
        assert!(s.store().get(KEY_CHECKOUT_HISTORY).is_none());
        // stored value is still the seeded one
        let stored: Vec<BatchRecord> = store::load_json(s.store(), KEY_BATCHES).unwrap().unwrap();
        assert_eq!(stored[0].purchase_price, Decimal::from(75));
    }

    #[test]
    fn confirmed_save_logs_history_bills_and_resets_baseline() {
        let mut s = single(75, 100, &[true]);
        s.update_field("batch1", BatchEdit::PurchasePrice(Decimal::from(80))).unwrap();
        let outcome = s.save().unwrap();

        let (entry, billed) = match outcome {
            SaveOutcome::Committed { history: Some(entry), billed } => (entry, billed),
            other => panic!("expected committed with history, got {other:?}"),
        };
        assert_eq!(billed.total, Decimal::new(56000, 2));
        assert_eq!(entry.kind, HistoryKind::PriceChange);
        assert_eq!(entry.actor, "admin");
        assert_eq!(entry.reason, HISTORY_REASON);
        assert_eq!(s.billing.running_total(), Decimal::new(56000, 2));

        assert!(s.detect_price_changes().is_empty());
        assert!(!s.has_unsaved_changes());

        let history: Vec<HistoryEntry> = store::load_json(s.store(), KEY_CHECKOUT_HISTORY).unwrap().unwrap();
        assert_eq!(history, vec![entry]);
    }

    #[test]
    fn running_total_accumulates_across_confirmations() {
        let mut s = single(75, 100, &[true, true]);
        s.update_field("batch1", BatchEdit::PurchasePrice(Decimal::from(80))).unwrap();
        s.save().unwrap();
        s.update_field("batch1", BatchEdit::PurchasePrice(Decimal::from(81))).unwrap();
        s.save().unwrap();
        // 560 + 100 * 1 * 1.12
        assert_eq!(s.billing.running_total(), Decimal::from(672));
        let history: Vec<HistoryEntry> = store::load_json(s.store(), KEY_CHECKOUT_HISTORY).unwrap().unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn state_machine_steps_are_observable() {
        let mut s = single(75, 100, &[true]);
        s.update_field("batch1", BatchEdit::Mrp(Decimal::from(101))).unwrap();

        let st = s.advance(SaveState::Idle).unwrap();
        assert_eq!(st, SaveState::Validating);
        let st = s.advance(st).unwrap();
        assert!(matches!(st, SaveState::AwaitingConfirmation(ref c) if c.len() == 1));
        let st = s.advance(st).unwrap();
        assert!(matches!(st, SaveState::Committing(Some(_))));
        // nothing persisted before the commit step
        assert!(s.store().get(KEY_CHECKOUT_HISTORY).is_none());
        let st = s.advance(st).unwrap();
        // mrp change is logged but not billed
        assert!(matches!(
            st,
            SaveState::Finished(SaveOutcome::Committed { history: Some(_), billed }) if billed.total.is_zero()
        ));
    }

    #[test]
    fn duplicate_batch_numbers_save_fine() {
        let mut s = session(&[]);
        s.update_field("batch2", BatchEdit::BatchNumber("BT2345".into())).unwrap();
        assert!(matches!(s.save().unwrap(), SaveOutcome::Committed { .. }));
    }

    #[test]
    fn leaving_with_unsaved_changes_asks_first() {
        let mut s = session(&[false]);
        assert!(s.request_leave());
        assert!(s.surface().prompts.is_empty());

        s.update_field("batch3", BatchEdit::StockQuantity(7)).unwrap();
        assert!(!s.request_leave());
        assert_eq!(s.surface().prompts.len(), 1);
    }

    #[tokio::test]
    async fn committed_save_waits_then_goes_back() {
        let mut s = session(&[]);
        s.update_field("batch1", BatchEdit::StockQuantity(120)).unwrap();
        let t0 = tokio::time::Instant::now();
        let (outcome, nav) = s.save_and_return(Duration::from_millis(20)).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::Committed { history: None, .. }));
        assert_eq!(nav, Navigation::Back);
        assert!(t0.elapsed() >= Duration::from_millis(20));
        // leaving happens through Back, not through the unsaved-changes prompt
        assert!(s.surface().prompts.is_empty());
    }

    #[tokio::test]
    async fn blocked_or_cancelled_save_stays_in_editor() {
        let mut s = single(75, 100, &[false]);
        s.update_field("batch1", BatchEdit::PurchasePrice(Decimal::from(80))).unwrap();
        let (outcome, nav) = s.save_and_return(Duration::from_secs(60)).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Cancelled);
        assert_eq!(nav, Navigation::Stay);

        s.update_field("batch1", BatchEdit::ExpiryDate(String::new())).unwrap();
        let (outcome, nav) = s.save_and_return(Duration::from_secs(60)).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::Blocked(_)));
        assert_eq!(nav, Navigation::Stay);
    }

    #[test]
    fn huge_values_block_save_instead_of_panicking() {
        let mut s = single(75, 100, &[true]);
        s.update_field("batch1", BatchEdit::PurchasePrice(Decimal::MAX)).unwrap();
        s.update_field("batch1", BatchEdit::StockQuantity(i64::MAX)).unwrap();
        assert!(matches!(s.compute_delta(), Err(AmountOverflow)));
        assert!(!s.validate_all());
        assert!(matches!(s.save().unwrap(), SaveOutcome::Blocked(ref e) if e.len() == 2));
        assert!(s.surface().prompts.is_empty());
    }

    /// MemoryStore that refuses writes to one key.
    struct FailOn(MemoryStore, &'static str);

    impl KvStore for FailOn {
        fn get(&self, key: &str) -> Option<String> { self.0.get(key) }

        fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
            if key == self.1 {
                return Err(StoreError::Io {
                    path: key.into(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.0.set(key, value)
        }

        fn remove(&mut self, key: &str) -> Result<(), StoreError> { self.0.remove(key) }
    }

    #[test]
    fn failed_history_write_persists_nothing_and_keeps_baseline() {
        let st = FailOn(MemoryStore::new(), KEY_CHECKOUT_HISTORY);
        let mut s = BatchSession::load(st, ScriptedSurface::answering(&[true]), "admin", PaymentCfg::default());
        s.update_field("batch1", BatchEdit::PurchasePrice(Decimal::from(80))).unwrap();

        assert!(matches!(s.save(), Err(SessionError::Store(_))));
        assert!(s.store().get(KEY_BATCHES).is_none());
        assert!(s.store().get(KEY_BATCH_COUNT).is_none());
        assert_eq!(s.billing.running_total(), Decimal::ZERO);
        assert_eq!(s.detect_price_changes().len(), 1);
    }

    #[tokio::test]
    async fn recorder_receives_session_events() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut s = session(&[]).with_recorder(tx);
        s.update_field("batch1", BatchEdit::StockQuantity(1)).unwrap();
        s.save().unwrap();
        assert!(matches!(rx.recv().await, Some(Event::FieldEdited { .. })));
        assert!(matches!(rx.recv().await, Some(Event::Saved { batch_count: 3 })));
    }
}

// ===============================
// src/reconcile.rs
// ===============================
//
// Bagian murni dari rekonsiliasi batch: diff vs snapshot, hitung tagihan, validasi.
// Tidak ada side effect di sini; BatchSession yang memanggil dan menyimpan hasilnya.
//
use std::collections::BTreeMap;
use std::fmt::Write as _;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{BatchField, BatchRecord, BillDelta, PriceChangeEntry, PriceDelta, PriceField, GST_RATE};

/// One inline validation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub batch_id: String,
    pub field: BatchField,
    pub message: &'static str,
}

fn snapshot_of<'a>(original: &'a [BatchRecord], id: &str) -> Option<&'a BatchRecord> {
    original.iter().find(|b| b.id == id)
}

/// Price fields that differ between `current` and `original`, per batch matched by id,
/// in `current` order. Batches missing from either side are ignored.
pub fn detect_price_changes(current: &[BatchRecord], original: &[BatchRecord]) -> Vec<PriceChangeEntry> {
    current
        .iter()
        .filter_map(|batch| {
            let orig = snapshot_of(original, &batch.id)?;
            let changes: BTreeMap<PriceField, PriceDelta> = PriceField::ALL
                .iter()
                .filter(|f| orig.price(**f) != batch.price(**f))
                .map(|f| (*f, PriceDelta { old: orig.price(*f), new: batch.price(*f) }))
                .collect();
            (!changes.is_empty()).then(|| PriceChangeEntry { batch_number: batch.batch_number.clone(), changes })
        })
        .collect()
}

/// Bill arithmetic left the `Decimal` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bill amount out of range")]
pub struct AmountOverflow;

/// Largest accepted stock quantity.
pub const MAX_STOCK: i64 = 1_000_000_000;
/// Largest accepted price (₹10^12). With `MAX_STOCK` one batch stays far below `Decimal::MAX`.
pub const MAX_PRICE: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Cost delta from purchase-price changes only, weighted by current stock, plus GST.
/// Selling price and MRP changes are reported by `detect_price_changes` but never billed.
pub fn compute_delta(current: &[BatchRecord], original: &[BatchRecord]) -> Result<BillDelta, AmountOverflow> {
    let mut subtotal = Decimal::ZERO;
    for batch in current {
        let Some(orig) = snapshot_of(original, &batch.id) else { continue };
        if orig.purchase_price == batch.purchase_price {
            continue;
        }
        let line = batch
            .purchase_price
            .checked_sub(orig.purchase_price)
            .and_then(|d| d.checked_mul(Decimal::from(batch.stock_quantity)))
            .ok_or(AmountOverflow)?;
        subtotal = subtotal.checked_add(line).ok_or(AmountOverflow)?;
    }
    let tax = subtotal.checked_mul(GST_RATE).ok_or(AmountOverflow)?;
    let total = subtotal.checked_add(tax).ok_or(AmountOverflow)?;
    Ok(BillDelta { subtotal, tax, total })
}

pub fn validation_errors(batches: &[BatchRecord]) -> Vec<FieldError> {
    let mut out = Vec::new();
    for b in batches {
        let mut push = |field, message| {
            out.push(FieldError { batch_id: b.id.clone(), field, message });
        };
        if b.batch_number.trim().is_empty() {
            push(BatchField::BatchNumber, "Batch number is required");
        }
        if b.expiry_date.trim().is_empty() {
            push(BatchField::ExpiryDate, "Expiry date is required");
        }
        if b.stock_quantity < 0 {
            push(BatchField::StockQuantity, "Stock quantity cannot be negative");
        } else if b.stock_quantity > MAX_STOCK {
            push(BatchField::StockQuantity, "Stock quantity is too large");
        }
        for (field, value, negative, too_large) in [
            (BatchField::SellingPrice, b.selling_price, "Selling price cannot be negative", "Selling price is too large"),
            (BatchField::PurchasePrice, b.purchase_price, "Purchase price cannot be negative", "Purchase price is too large"),
            (BatchField::Mrp, b.mrp, "MRP cannot be negative", "MRP is too large"),
        ] {
            if value < Decimal::ZERO {
                push(field, negative);
            } else if value > MAX_PRICE {
                push(field, too_large);
            }
        }
    }
    out
}

/// No cross-field or uniqueness checks: repeated batch numbers pass.
pub fn validate_all(batches: &[BatchRecord]) -> bool {
    validation_errors(batches).is_empty()
}

/// Confirmation text listing every changed price as `₹old → ₹new`.
pub fn render_price_changes(changes: &[PriceChangeEntry]) -> String {
    let mut out = String::from("Price changes have been detected. This will create a checkout history entry.\n");
    for entry in changes {
        let _ = writeln!(out, "Batch: {}", entry.batch_number);
        for (field, d) in &entry.changes {
            let _ = writeln!(out, "  {}: ₹{:.2} → ₹{:.2}", field, d.old, d.new);
        }
    }
    out
}

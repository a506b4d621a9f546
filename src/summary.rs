// ===============================
// src/summary.rs
// ===============================
use chrono::NaiveDate;

use crate::domain::{BatchRecord, BatchSummaryRow};

const NEAR_EXPIRY_MONTHS: f64 = 6.0;

fn parse_expiry(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Expired once the expiry day has started. Unparseable dates never count as expired.
pub fn is_expired(batch: &BatchRecord, today: NaiveDate) -> bool {
    parse_expiry(&batch.expiry_date).map(|d| d <= today).unwrap_or(false)
}

pub fn expired_count(batches: &[BatchRecord], today: NaiveDate) -> usize {
    batches.iter().filter(|b| is_expired(b, today)).count()
}

/// Rows for the `updatedBatches` key. Months are counted as 30 days.
pub fn summarize(batches: &[BatchRecord], today: NaiveDate) -> Vec<BatchSummaryRow> {
    batches
        .iter()
        .map(|b| {
            let expiry = parse_expiry(&b.expiry_date);
            let months_left = expiry.map(|d| (d - today).num_days() as f64 / 30.0);
            BatchSummaryRow {
                name: format!("Batch: {}", b.batch_number),
                mrp: b.mrp,
                expiry: expiry
                    .map(|d| d.format("%d %b %Y").to_string())
                    .unwrap_or_else(|| b.expiry_date.clone()),
                stock: b.stock_quantity,
                is_near_expiry: months_left.map(|m| m > 0.0 && m <= NEAR_EXPIRY_MONTHS).unwrap_or(false),
                is_expired: is_expired(b, today),
            }
        })
        .collect()
}

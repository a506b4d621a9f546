// ===============================
// src/domain.rs
// ===============================
use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// GST flat rate (12%) applied to the purchase-cost delta.
pub const GST_RATE: Decimal = Decimal::from_parts(12, 0, 0, false, 2);

/// One stock lot of a medicine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub id: String,
    // nama field tersimpan ikut form obat: `batchNo`
    #[serde(rename = "batchNo", alias = "batchNumber")]
    pub batch_number: String,
    /// ISO date (`YYYY-MM-DD`), empty while the user has not picked one.
    pub expiry_date: String,
    pub stock_quantity: i64,
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
    pub mrp: Decimal,
}

impl BatchRecord {
    pub fn price(&self, field: PriceField) -> Decimal {
        match field {
            PriceField::SellingPrice => self.selling_price,
            PriceField::PurchasePrice => self.purchase_price,
            PriceField::Mrp => self.mrp,
        }
    }

    /// Apply one typed edit. Values are not range-checked here (see `reconcile::validate_all`).
    pub fn apply(&mut self, edit: BatchEdit) {
        match edit {
            BatchEdit::BatchNumber(v) => self.batch_number = v,
            BatchEdit::ExpiryDate(v) => self.expiry_date = v,
            BatchEdit::StockQuantity(v) => self.stock_quantity = v,
            BatchEdit::PurchasePrice(v) => self.purchase_price = v,
            BatchEdit::SellingPrice(v) => self.selling_price = v,
            BatchEdit::Mrp(v) => self.mrp = v,
        }
    }
}

/// Three-entry collection used when nothing is stored yet.
pub fn default_batches() -> Vec<BatchRecord> {
    vec![
        BatchRecord {
            id: "batch1".into(),
            batch_number: "BT2345".into(),
            expiry_date: "2025-12-31".into(),
            stock_quantity: 100,
            purchase_price: Decimal::new(7500, 2),
            selling_price: Decimal::new(9500, 2),
            mrp: Decimal::new(10000, 2),
        },
        BatchRecord {
            id: "batch2".into(),
            batch_number: "BT7890".into(),
            expiry_date: "2025-09-30".into(),
            stock_quantity: 50,
            purchase_price: Decimal::new(7200, 2),
            selling_price: Decimal::new(9100, 2),
            mrp: Decimal::new(9800, 2),
        },
        BatchRecord {
            id: "batch3".into(),
            batch_number: "BT1223".into(),
            expiry_date: "2024-12-15".into(),
            stock_quantity: 0,
            purchase_price: Decimal::new(8000, 2),
            selling_price: Decimal::new(10500, 2),
            mrp: Decimal::new(11000, 2),
        },
    ]
}

/// Mutable field of a batch, for field-level errors and console parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchField {
    BatchNumber,
    ExpiryDate,
    StockQuantity,
    PurchasePrice,
    SellingPrice,
    Mrp,
}

impl BatchField {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batchnumber" | "batch_number" | "batchno" | "batch" => Some(BatchField::BatchNumber),
            "expirydate" | "expiry_date" | "expiry" => Some(BatchField::ExpiryDate),
            "stockquantity" | "stock_quantity" | "stock" | "qty" => Some(BatchField::StockQuantity),
            "purchaseprice" | "purchase_price" | "purchase" => Some(BatchField::PurchasePrice),
            "sellingprice" | "selling_price" | "selling" => Some(BatchField::SellingPrice),
            "mrp" => Some(BatchField::Mrp),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BatchField::BatchNumber => "Batch No",
            BatchField::ExpiryDate => "Expiry Date",
            BatchField::StockQuantity => "Stock Quantity",
            BatchField::PurchasePrice => "Purchase Price",
            BatchField::SellingPrice => "Selling Price",
            BatchField::Mrp => "MRP",
        }
    }
}

/// New value for exactly one field, typed to match that field.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEdit {
    BatchNumber(String),
    ExpiryDate(String),
    StockQuantity(i64),
    PurchasePrice(Decimal),
    SellingPrice(Decimal),
    Mrp(Decimal),
}

impl BatchEdit {
    /// Build an edit from raw text. Numbers that do not parse become 0,
    /// same as the number inputs of the editor form.
    pub fn from_input(field: BatchField, raw: &str) -> Self {
        let raw = raw.trim();
        let price = || raw.parse::<Decimal>().unwrap_or(Decimal::ZERO);
        match field {
            BatchField::BatchNumber => BatchEdit::BatchNumber(raw.to_string()),
            BatchField::ExpiryDate => BatchEdit::ExpiryDate(raw.to_string()),
            BatchField::StockQuantity => BatchEdit::StockQuantity(raw.parse().unwrap_or(0)),
            BatchField::PurchasePrice => BatchEdit::PurchasePrice(price()),
            BatchField::SellingPrice => BatchEdit::SellingPrice(price()),
            BatchField::Mrp => BatchEdit::Mrp(price()),
        }
    }

    pub fn field(&self) -> BatchField {
        match self {
            BatchEdit::BatchNumber(_) => BatchField::BatchNumber,
            BatchEdit::ExpiryDate(_) => BatchField::ExpiryDate,
            BatchEdit::StockQuantity(_) => BatchField::StockQuantity,
            BatchEdit::PurchasePrice(_) => BatchField::PurchasePrice,
            BatchEdit::SellingPrice(_) => BatchField::SellingPrice,
            BatchEdit::Mrp(_) => BatchField::Mrp,
        }
    }
}

// Urutan varian = urutan tampil di dialog konfirmasi.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriceField {
    SellingPrice,
    PurchasePrice,
    Mrp,
}

impl PriceField {
    pub const ALL: [PriceField; 3] = [PriceField::SellingPrice, PriceField::PurchasePrice, PriceField::Mrp];

    pub fn label(&self) -> &'static str {
        match self {
            PriceField::SellingPrice => "Selling Price",
            PriceField::PurchasePrice => "Purchase Price",
            PriceField::Mrp => "Mrp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceDelta { pub old: Decimal, pub new: Decimal }

/// Differing price fields of one batch versus the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceChangeEntry {
    #[serde(rename = "batchNo", alias = "batchNumber")]
    pub batch_number: String,
    pub changes: BTreeMap<PriceField, PriceDelta>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryKind {
    #[serde(rename = "PRICE_CHANGE")]
    PriceChange,
}

/// Append-only checkout history line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub changes: Vec<PriceChangeEntry>,
    #[serde(rename = "user")]
    pub actor: String,
    pub reason: String,
}

/// Derived bill figures; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BillDelta {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnStatus { Completed, Held }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub amount: Decimal,
    pub batches: Vec<BatchRecord>,
    pub timestamp: String,
    pub status: TxnStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldTransaction {
    pub id: String,
    pub batches: Vec<BatchRecord>,
    pub amount: Decimal,
    pub timestamp: String,
    pub status: TxnStatus,
}

/// Row of the `updatedBatches` summary read by the medicine form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummaryRow {
    pub name: String,
    pub mrp: Decimal,
    pub expiry: String,
    pub stock: i64,
    pub is_near_expiry: bool,
    pub is_expired: bool,
}

// Audit events untuk recorder JSONL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    FieldEdited { batch_id: String, field: BatchField },
    BatchAdded { batch_id: String },
    BatchDeleted { batch_id: String },
    PriceChangeConfirmed(HistoryEntry),
    Saved { batch_count: usize },
    Payment(PaymentRecord),
    Hold(HeldTransaction),
    Note(String),
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// `<prefix>_<unix ms>`, e.g. `history_1718000000000`.
pub fn stamp_id(prefix: &str) -> String {
    format!("{}_{}", prefix, chrono::Utc::now().timestamp_millis())
}

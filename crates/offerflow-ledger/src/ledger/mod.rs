//! Sale ledger module

pub mod sale_ledger;

pub use sale_ledger::{SaleLedger, SaleRecord, StatusUpdate};

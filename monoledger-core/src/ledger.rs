//! Ledger rows and the sink they are appended to.

use anyhow::Result;
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::currency::to_major;
use crate::reply::Mark;
use crate::transaction::Transaction;

/// Header row every sink enforces before appending.
pub const LEDGER_HEADER: [&str; 6] = [
    "Mark",
    "Description",
    "Amount",
    "Remaining",
    "Date",
    "Original description",
];

/// Date layout of the Russian locale, without the comma between date and time.
pub const DATE_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// A categorized transaction, ready for the spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub mark: Mark,
    pub description: String,
    /// Major units, account currency.
    pub amount: Decimal,
    /// Major units, account currency.
    pub remaining: Decimal,
    pub date: String,
    pub original_description: String,
}

impl LedgerRow {
    pub fn new(txn: &Transaction, mark: Mark, description: Option<String>, tz: Tz) -> Self {
        Self {
            mark,
            description: description.unwrap_or_else(|| txn.description.clone()),
            amount: to_major(txn.amount),
            remaining: to_major(txn.balance),
            date: format_timestamp(txn.time, tz),
            original_description: txn.description.clone(),
        }
    }

    /// Cells in `LEDGER_HEADER` order.
    pub fn cells(&self) -> [String; 6] {
        [
            self.mark.to_string(),
            self.description.clone(),
            self.amount.to_string(),
            self.remaining.to_string(),
            self.date.clone(),
            self.original_description.clone(),
        ]
    }
}

pub fn format_timestamp(unix_seconds: i64, tz: Tz) -> String {
    match DateTime::from_timestamp(unix_seconds, 0) {
        Some(utc) => utc.with_timezone(&tz).format(DATE_FORMAT).to_string(),
        None => unix_seconds.to_string(),
    }
}

/// External tabular store the workflow appends to.
///
/// Implementations ensure the header matches `LEDGER_HEADER` and then append
/// one row. There is no rollback when one of the two steps fails.
#[async_trait]
pub trait LedgerSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn append(&self, row: &LedgerRow) -> Result<()>;

    /// Startup check that the store is reachable and writable.
    async fn verify(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: LedgerSink + ?Sized> LedgerSink for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn append(&self, row: &LedgerRow) -> Result<()> {
        (**self).append(row).await
    }

    async fn verify(&self) -> Result<()> {
        (**self).verify().await
    }
}

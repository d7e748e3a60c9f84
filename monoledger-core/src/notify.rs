//! Outbound operator messages.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::currency::format_amount;
use crate::transaction::Transaction;

pub const NO_TRANSACTION_WAITING: &str = "No transaction waiting answer";
pub const GREETING: &str = "Hi my boss!";
pub const DISCARDED: &str = "OK";
pub const ADDED: &str = "Added";
pub const EMPTY_REPLY_HINT: &str = "Reply with a mark first: 1, 2, 3 or 0";
pub const INSTRUCTIONS: &str =
    "Please mark a transaction: \n1 - Useful, 2 - Forced, 3 - Bad, 0 - Don't add to spreadsheet";

/// Delivers text to the single operator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<()>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn notify(&self, text: &str) -> Result<()> {
        (**self).notify(text).await
    }
}

/// Categorization prompt for one transaction.
pub fn render_prompt(txn: &Transaction) -> String {
    format!(
        "💸 {}\n{}\nRemaining: {}\n\n{}",
        txn.description,
        format_amount(txn.operation_amount, txn.currency_code),
        format_amount(txn.balance, txn.currency_code),
        INSTRUCTIONS
    )
}

pub fn render_timeout(txn: &Transaction) -> String {
    format!("⌛ No answer for \"{}\", skipped", txn.description)
}

pub fn render_ledger_failure(err: &anyhow::Error) -> String {
    format!("❗️ Could not add to spreadsheet: {err}")
}

//! Bank transaction as delivered by the statement endpoint and the webhook push.

use serde::{Deserialize, Serialize};

/// A single statement item.
///
/// Amounts are integer minor units (kopiykas, cents). `amount` and `balance`
/// are in the account currency, `operation_amount` in `currency_code`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique within a statement window; the only de-duplication key.
    pub id: String,
    /// Unix seconds.
    pub time: i64,
    pub description: String,
    pub amount: i64,
    pub operation_amount: i64,
    /// ISO 4217 numeric code of the operation currency.
    pub currency_code: u16,
    pub balance: i64,
    #[serde(default)]
    pub mcc: Option<u32>,
    #[serde(default)]
    pub hold: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Transaction {
    pub fn new(id: impl Into<String>, description: impl Into<String>, amount: i64) -> Self {
        Self {
            id: id.into(),
            time: 0,
            description: description.into(),
            amount,
            operation_amount: amount,
            currency_code: crate::currency::UAH,
            balance: 0,
            mcc: None,
            hold: false,
            comment: None,
        }
    }

    pub fn with_balance(mut self, balance: i64) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_time(mut self, time: i64) -> Self {
        self.time = time;
        self
    }

    pub fn with_currency(mut self, currency_code: u16) -> Self {
        self.currency_code = currency_code;
        self
    }

    pub fn is_expense(&self) -> bool {
        self.amount < 0
    }
}

//! Bank API payloads.

use monoledger_core::currency;
use monoledger_core::Transaction;
use serde::{Deserialize, Serialize};

/// Webhook event type carrying a new statement item.
pub const STATEMENT_ITEM: &str = "StatementItem";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub web_hook_url: Option<String>,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    /// Minor units.
    pub balance: i64,
    #[serde(default)]
    pub credit_limit: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub currency_code: u16,
    #[serde(default)]
    pub masked_pan: Vec<String>,
    #[serde(default)]
    pub iban: Option<String>,
}

impl Account {
    pub fn card_label(&self) -> &str {
        match self.kind.as_str() {
            "black" => "Чорна картка",
            "white" => "Бiла картка",
            other => other,
        }
    }

    /// Multi-line description ending with the `ACCOUNT_ID=` line to paste into the config.
    pub fn summary(&self) -> String {
        let code = currency::label(self.currency_code);
        format!(
            "{} ({})\n{}\n{}\nACCOUNT_ID={}",
            self.card_label(),
            code,
            self.masked_pan.first().map(String::as_str).unwrap_or("-"),
            currency::format_amount(self.balance, self.currency_code),
            self.id
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
    pub web_hook_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WebhookAck {
    #[serde(default)]
    pub status: String,
}

impl WebhookAck {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Push body: `{type: "StatementItem", data: {account, statementItem}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<WebhookData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    pub account: String,
    pub statement_item: Transaction,
}

impl WebhookEvent {
    /// The carried transaction, if this is a statement item for `account`.
    pub fn into_transaction_for(self, account: &str) -> Option<Transaction> {
        if self.kind != STATEMENT_ITEM {
            return None;
        }
        self.data
            .filter(|d| d.account == account)
            .map(|d| d.statement_item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = r#"{
        "type": "StatementItem",
        "data": {
            "account": "acc-1",
            "statementItem": {
                "id": "ZuHWzqkKGVo=",
                "time": 1554466347,
                "description": "Silpo",
                "mcc": 5411,
                "hold": true,
                "amount": -15000,
                "operationAmount": -15000,
                "currencyCode": 980,
                "commissionRate": 0,
                "cashbackAmount": 0,
                "balance": 1000000
            }
        }
    }"#;

    #[test]
    fn matching_account_yields_transaction() {
        let ev: WebhookEvent = serde_json::from_str(EVENT).unwrap();
        let t = ev.into_transaction_for("acc-1").unwrap();
        assert_eq!(t.id, "ZuHWzqkKGVo=");
        assert_eq!(t.amount, -15000);
    }

    #[test]
    fn other_account_or_type_is_ignored() {
        let ev: WebhookEvent = serde_json::from_str(EVENT).unwrap();
        assert!(ev.clone().into_transaction_for("acc-2").is_none());

        let mut other = ev;
        other.kind = "SomethingElse".to_string();
        assert!(other.into_transaction_for("acc-1").is_none());
    }

    #[test]
    fn client_info_and_account_summary() {
        let json = r#"{
            "clientId": "3MSaMMtczs",
            "name": "Мазепа Іван",
            "webHookUrl": "https://example.com/mono",
            "accounts": [{
                "id": "kKGVoZuHWzqVoZuH",
                "sendId": "uHWzqVoZuH",
                "balance": 10000000,
                "creditLimit": 10000000,
                "type": "black",
                "currencyCode": 980,
                "cashbackType": "UAH",
                "maskedPan": ["537541******1234"],
                "iban": "UA733220010000026201234567890"
            }]
        }"#;
        let info: ClientInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.client_id, "3MSaMMtczs");
        assert_eq!(info.accounts.len(), 1);

        let summary = info.accounts[0].summary();
        assert_eq!(
            summary,
            "Чорна картка (₴)\n537541******1234\n100000₴\nACCOUNT_ID=kKGVoZuHWzqVoZuH"
        );
    }

    #[test]
    fn webhook_registration_uses_camel_case() {
        let body = serde_json::to_string(&WebhookRegistration {
            web_hook_url: "https://x/y".to_string(),
        })
        .unwrap();
        assert_eq!(body, r#"{"webHookUrl":"https://x/y"}"#);
    }
}

//! Telegram Bot API over HTTPS: long-polled `getUpdates` in, `sendMessage` out.
//!
//! Only the owner's chat reaches the approval workflow. Anyone else gets a
//! fixed brush-off and is otherwise ignored.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use monoledger_core::{ApprovalError, Notifier, OperatorInbox, OperatorMessage};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const STRANGER_REPLY: &str = "Get off! This bot works for my boss only. You are not my boss!";
pub const RUNNING: &str = "Bot is running...";

/// Pause after a failed `getUpdates` before polling again.
const RETRY_PAUSE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Where an inbound update goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Owner(OperatorMessage),
    Stranger(i64),
    Ignore,
}

pub fn route(owner: i64, update: &Update) -> Route {
    let Some(message) = &update.message else {
        return Route::Ignore;
    };
    if message.chat.id != owner {
        return Route::Stranger(message.chat.id);
    }
    match &message.text {
        Some(text) => Route::Owner(OperatorMessage::parse(text)),
        None => Route::Ignore,
    }
}

#[derive(Debug, Clone)]
pub struct TelegramBot {
    http: reqwest::Client,
    api_base: String,
    token: String,
    owner: i64,
    poll_timeout: Duration,
}

impl TelegramBot {
    pub fn new(token: &str, owner: i64, poll_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()
            .context("building telegram http client")?;
        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.to_string(),
            owner,
            poll_timeout,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("telegram {method}"))?;
        let envelope: Envelope<T> = resp
            .json()
            .await
            .with_context(|| format!("decoding telegram {method} response"))?;
        if !envelope.ok {
            bail!(
                "telegram {method} failed: {}",
                envelope.description.unwrap_or_else(|| "no description".to_string())
            );
        }
        envelope
            .result
            .with_context(|| format!("telegram {method} returned no result"))
    }

    pub async fn get_me(&self) -> Result<BotUser> {
        self.call("getMe", json!({})).await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(())
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        self.fetch_updates(offset, self.poll_timeout).await
    }

    async fn fetch_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout.as_secs(),
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    /// Offset just past everything queued before startup, so a stale text
    /// can never answer a fresh prompt.
    pub async fn skip_backlog(&self) -> Result<i64> {
        let last = self.fetch_updates(-1, Duration::ZERO).await?;
        Ok(last.iter().map(|u| u.update_id + 1).max().unwrap_or(0))
    }

    /// Long-poll forever, forwarding the owner's messages into `inbox`.
    ///
    /// Returns only when the workflow behind `inbox` is gone.
    pub async fn listen(&self, inbox: OperatorInbox) -> Result<()> {
        info!(owner = self.owner, "listening for telegram updates");
        let mut offset = match self.skip_backlog().await {
            Ok(offset) => {
                if offset > 0 {
                    info!(offset, "dropped messages sent while the bot was down");
                }
                offset
            }
            Err(e) => {
                warn!(error = %e, "could not skip pending updates");
                0
            }
        };
        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "getUpdates failed");
                    tokio::time::sleep(RETRY_PAUSE).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                self.dispatch_update(&update, &inbox).await?;
            }
        }
    }

    async fn dispatch_update(&self, update: &Update, inbox: &OperatorInbox) -> Result<(), ApprovalError> {
        match route(self.owner, update) {
            Route::Owner(message) => {
                debug!(update_id = update.update_id, "operator message");
                inbox.deliver(message)
            }
            Route::Stranger(chat_id) => {
                info!(chat_id, "message from a stranger");
                if let Err(e) = self.send_message(chat_id, STRANGER_REPLY).await {
                    warn!(chat_id, error = %e, "could not answer stranger");
                }
                Ok(())
            }
            Route::Ignore => Ok(()),
        }
    }
}

#[async_trait]
impl Notifier for TelegramBot {
    async fn notify(&self, text: &str) -> Result<()> {
        self.send_message(self.owner, text).await
    }
}

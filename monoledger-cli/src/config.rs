//! Service configuration: `monoledger.toml` plus environment overrides.

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use monoledger_bank::{RetryPolicy, DEFAULT_BASE_URL};
use monoledger_core::ApprovalConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::server::{HEALTH_PATH, STATUS_PATH};
use crate::telegram::DEFAULT_API_BASE;

pub const DEFAULT_CONFIG_FILE: &str = "monoledger.toml";

/// Where transactions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Diff the statement endpoint every polling interval.
    #[default]
    #[serde(alias = "statement_check")]
    #[value(alias = "statement_check")]
    Polling,
    /// Receive statement items pushed by the bank.
    Webhook,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "polling" | "statement_check" => Ok(Mode::Polling),
            "webhook" => Ok(Mode::Webhook),
            other => bail!("unknown mode '{other}', expected 'statement_check' or 'webhook'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    #[default]
    Csv,
    Sheets,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,
    pub bank: BankSection,
    pub telegram: TelegramSection,
    pub ledger: LedgerSection,
    pub server: ServerSection,
    pub polling: PollingSection,
    pub approval: ApprovalSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BankSection {
    /// Personal API token from https://api.monobank.ua/
    pub token: String,
    /// Unset: `run` lists the accounts and exits.
    pub account: Option<String>,
    pub base_url: String,
    pub retry_backoff_secs: u64,
    /// Unset: retry throttled calls forever.
    pub max_attempts: Option<u32>,
}

impl Default for BankSection {
    fn default() -> Self {
        Self {
            token: String::new(),
            account: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry_backoff_secs: 90,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSection {
    pub token: String,
    /// Telegram id of the operator; also the chat the bot writes to.
    pub owner_id: Option<i64>,
    pub api_base: String,
    pub poll_timeout_secs: u64,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            token: String::new(),
            owner_id: None,
            api_base: DEFAULT_API_BASE.to_string(),
            poll_timeout_secs: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub kind: LedgerKind,
    pub csv_path: PathBuf,
    pub sheet_id: Option<String>,
    /// Path to the Google service account JSON key.
    pub service_account_key: Option<PathBuf>,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            kind: LedgerKind::Csv,
            csv_path: PathBuf::from("ledger.csv"),
            sheet_id: None,
            service_account_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    /// Public origin the bank pushes to, e.g. `https://bot.example.com`.
    pub domain: Option<String>,
    pub webhook_path: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 8080,
            domain: None,
            webhook_path: "mono".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    pub interval_secs: u64,
    pub lookback_hours: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            lookback_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSection {
    pub timezone: String,
    /// Unset: wait for the operator forever.
    pub reply_timeout_secs: Option<u64>,
}

impl Default for ApprovalSection {
    fn default() -> Self {
        Self {
            timezone: "Europe/Kyiv".to_string(),
            reply_timeout_secs: None,
        }
    }
}

impl Config {
    /// Apply `.env`-style overrides; `lookup` is `std::env::var` outside tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = var("APP_MODE") {
            self.mode = v.parse().context("APP_MODE")?;
        }
        if let Some(v) = var("MONO_API_TOKEN") {
            self.bank.token = v;
        }
        if let Some(v) = var("ACCOUNT_ID") {
            self.bank.account = Some(v);
        }
        if let Some(v) = var("TELEGRAM_BOT_TOKEN") {
            self.telegram.token = v;
        }
        if let Some(v) = var("OWNER_TG_ID") {
            let id = v
                .parse()
                .with_context(|| format!("OWNER_TG_ID must be a numeric telegram id, got '{v}'"))?;
            self.telegram.owner_id = Some(id);
        }
        if let Some(v) = var("GOOGLE_SERVICE_ACCOUNT_KEY") {
            self.ledger.service_account_key = Some(PathBuf::from(v));
        }
        if let Some(v) = var("SHEET_ID") {
            self.ledger.sheet_id = Some(v);
            self.ledger.kind = LedgerKind::Sheets;
        }
        if let Some(v) = var("MONO_WEBHOOK") {
            self.server.webhook_path = v;
        }
        if let Some(v) = var("APP_DOMAIN") {
            self.server.domain = Some(v);
        }
        if let Some(v) = var("PORT") {
            self.server.port = v.parse().with_context(|| format!("PORT must be a port number, got '{v}'"))?;
        }
        Ok(())
    }

    /// Missing required settings, each with a hint on where to get it.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.bank.token.is_empty() {
            out.push("Missing bank.token (MONO_API_TOKEN). You can get it on https://api.monobank.ua/".to_string());
        }
        if self.telegram.token.is_empty() {
            out.push(
                "Missing telegram.token (TELEGRAM_BOT_TOKEN). You can get it in conversation with https://t.me/BotFather"
                    .to_string(),
            );
        }
        if self.telegram.owner_id.is_none() {
            out.push(
                "Missing telegram.owner_id (OWNER_TG_ID). It must contain your telegram id, see https://t.me/get_any_telegram_id_bot"
                    .to_string(),
            );
        }
        if self.ledger.kind == LedgerKind::Sheets {
            if self.ledger.service_account_key.is_none() {
                out.push(
                    "Missing ledger.service_account_key (GOOGLE_SERVICE_ACCOUNT_KEY). It's a path to your service account key"
                        .to_string(),
                );
            }
            if self.ledger.sheet_id.is_none() {
                out.push(
                    "Missing ledger.sheet_id (SHEET_ID). You can find it in the address bar when you open your sheet"
                        .to_string(),
                );
            }
        }
        if self.mode == Mode::Webhook && self.server.domain.is_none() {
            out.push("Missing server.domain (APP_DOMAIN). Webhook mode needs the public address of this service".to_string());
        }
        if self.mode == Mode::Webhook {
            out.extend(self.webhook_path_problem());
        }
        if self.approval.reply_timeout_secs == Some(0) {
            out.push(
                "approval.reply_timeout_secs = 0 would skip every transaction; remove it to wait forever".to_string(),
            );
        }
        if self.approval.timezone.parse::<Tz>().is_err() {
            out.push(format!("Unknown approval.timezone '{}'", self.approval.timezone));
        }
        out
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::fixed(Duration::from_secs(self.bank.retry_backoff_secs));
        match self.bank.max_attempts {
            Some(max) => policy.with_max_attempts(max),
            None => policy,
        }
    }

    pub fn approval_config(&self) -> Result<ApprovalConfig> {
        let timezone: Tz = self
            .approval
            .timezone
            .parse()
            .map_err(|e| anyhow!("approval.timezone '{}': {e}", self.approval.timezone))?;
        Ok(ApprovalConfig {
            timezone,
            reply_timeout: self.approval.reply_timeout_secs.map(Duration::from_secs),
        })
    }

    /// The push route must be a plain path that no other route already owns.
    fn webhook_path_problem(&self) -> Option<String> {
        let path = self.webhook_path();
        if path == HEALTH_PATH || path == STATUS_PATH {
            return Some(format!(
                "server.webhook_path (MONO_WEBHOOK) '{}' clashes with the {path} endpoint, pick another path",
                self.server.webhook_path
            ));
        }
        if path.contains([':', '*']) {
            return Some(format!(
                "server.webhook_path (MONO_WEBHOOK) '{}' must not contain ':' or '*'",
                self.server.webhook_path
            ));
        }
        None
    }

    pub fn webhook_path(&self) -> String {
        format!("/{}", self.server.webhook_path.trim_matches('/'))
    }

    /// Public URL registered with the bank in webhook mode.
    pub fn webhook_url(&self) -> Option<String> {
        self.server
            .domain
            .as_deref()
            .map(|domain| format!("{}{}", domain.trim_end_matches('/'), self.webhook_path()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs.max(1))
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.polling.lookback_hours as i64)
    }
}

pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Read the config file (defaults when the implicit file is absent), then
/// apply environment overrides.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let p = config_path(explicit);
    let mut cfg = if p.exists() {
        let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
        toml::from_str(&s).with_context(|| format!("parse {}", p.display()))?
    } else if explicit.is_some() {
        bail!("config file not found: {}", p.display());
    } else {
        Config::default()
    };
    cfg.apply_env(|key| std::env::var(key).ok())?;
    Ok(cfg)
}

pub fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn init_config(explicit: Option<&Path>) -> Result<()> {
    let p = config_path(explicit);
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&p, &Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

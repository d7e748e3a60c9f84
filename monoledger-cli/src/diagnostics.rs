//! Startup checks, in the order a fresh install tends to fail them:
//! settings, bank token, ledger access, bot token.

use anyhow::{bail, Context, Result};
use monoledger_bank::{Account, MonoClient};
use monoledger_core::{LedgerSink, Notifier};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;
use crate::ledger::build_sink;
use crate::telegram::{TelegramBot, RUNNING};

const ACCOUNT_SEPARATOR: &str = "\n—————————————————————\n";

pub fn check_config(config: &Config) -> Result<()> {
    let problems = config.problems();
    if !problems.is_empty() {
        for p in &problems {
            error!("❗️ {p}");
        }
        bail!("configuration is incomplete: {} problem(s)", problems.len());
    }
    info!("✅ configuration is correct");
    Ok(())
}

pub fn bank_client(config: &Config) -> Result<MonoClient> {
    if config.bank.token.is_empty() {
        bail!("bank.token (MONO_API_TOKEN) is not set");
    }
    Ok(MonoClient::new(&config.bank.token)
        .context("building bank client")?
        .with_base_url(&config.bank.base_url)
        .with_retry(config.retry_policy()))
}

pub async fn check_bank(config: &Config) -> Result<MonoClient> {
    let client = bank_client(config)?;
    if !client.validate().await {
        bail!("Monobank token is invalid");
    }
    info!("✅ Monobank token is valid");
    Ok(client)
}

pub async fn check_ledger(config: &Config) -> Result<Arc<dyn LedgerSink>> {
    let sink = build_sink(config)?;
    sink.verify()
        .await
        .with_context(|| format!("{} ledger is not usable", sink.name()))?;
    info!(sink = sink.name(), "✅ ledger is reachable");
    Ok(sink)
}

pub async fn check_bot(config: &Config) -> Result<TelegramBot> {
    let owner = config
        .telegram
        .owner_id
        .context("telegram.owner_id (OWNER_TG_ID) is not set")?;
    let bot = TelegramBot::new(
        &config.telegram.token,
        owner,
        Duration::from_secs(config.telegram.poll_timeout_secs),
    )?
    .with_api_base(&config.telegram.api_base);

    let me = bot.get_me().await.context("Telegram bot token is not valid")?;
    bot.notify(RUNNING)
        .await
        .context("Telegram bot could not message the owner, did you /start your bot?")?;
    info!(
        bot_id = me.id,
        bot = me.username.as_deref().unwrap_or(&me.first_name),
        "✅ Telegram bot token is valid"
    );
    Ok(bot)
}

pub fn render_accounts(accounts: &[Account]) -> String {
    accounts
        .iter()
        .map(Account::summary)
        .collect::<Vec<_>>()
        .join(ACCOUNT_SEPARATOR)
}

pub async fn print_accounts(client: &MonoClient) -> Result<()> {
    let accounts = client.accounts().await.context("listing accounts")?;
    if accounts.is_empty() {
        println!("No accounts on this client");
        return Ok(());
    }
    println!("{}", render_accounts(&accounts));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str, kind: &str, currency_code: u16, balance: i64) -> Account {
        Account {
            id: id.to_string(),
            balance,
            credit_limit: 0,
            kind: kind.to_string(),
            currency_code,
            masked_pan: vec!["537541******1234".to_string()],
            iban: None,
        }
    }

    #[test]
    fn accounts_are_separated_and_pasteable() {
        let out = render_accounts(&[
            account("acc-uah", "black", 980, 15000),
            account("acc-usd", "white", 840, 250),
        ]);
        let blocks: Vec<&str> = out.split(ACCOUNT_SEPARATOR).collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("Чорна картка"));
        assert!(blocks[0].ends_with("ACCOUNT_ID=acc-uah"));
        assert!(blocks[1].starts_with("Бiла картка"));
        assert!(blocks[1].ends_with("ACCOUNT_ID=acc-usd"));
    }

    #[test]
    fn incomplete_config_fails_fast() {
        assert!(check_config(&Config::default()).is_err());
    }

    #[test]
    fn bank_client_needs_a_token() {
        assert!(bank_client(&Config::default()).is_err());

        let mut cfg = Config::default();
        cfg.bank.token = "token".to_string();
        cfg.bank.max_attempts = Some(2);
        let client = bank_client(&cfg).unwrap();
        assert_eq!(client.retry_policy().max_attempts, Some(2));
    }

    #[tokio::test]
    async fn unreachable_bank_means_invalid_token() {
        let mut cfg = Config::default();
        cfg.bank.token = "token".to_string();
        cfg.bank.base_url = "http://127.0.0.1:1".to_string();
        let err = check_bank(&cfg).await.err().unwrap();
        assert!(err.to_string().contains("invalid"));
    }
}

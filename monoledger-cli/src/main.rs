use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use monoledger_core::{approval_queue, ApprovalWorkflow};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod diagnostics;
mod ledger;
mod server;
mod sources;
mod telegram;

use config::{load_config, Config, Mode};
use server::AppState;
use sources::Poller;

/// Package version, plus the commit it was built from when known.
const VERSION: &str = env!("MONOLEDGER_VERSION");

#[derive(Parser, Debug)]
#[command(
    name = "monoledger",
    version = VERSION,
    about = "Categorize Monobank transactions over Telegram into a spreadsheet"
)]
struct Cli {
    /// Config file (default: ./monoledger.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the bot: transaction source, approval workflow and HTTP server
    Run {
        /// Override the configured mode
        #[arg(long, value_enum)]
        mode: Option<Mode>,
    },

    /// List the client's accounts with the ACCOUNT_ID line to paste
    Accounts,

    /// Run the startup diagnostics and exit
    Check,

    /// Write a default config file
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let path = cli.config.as_deref();

    match cli.command {
        Command::InitConfig => {
            config::init_config(path)?;
        }

        Command::Accounts => {
            let cfg = load_config(path)?;
            let client = diagnostics::check_bank(&cfg).await?;
            diagnostics::print_accounts(&client).await?;
        }

        Command::Check => {
            let cfg = load_config(path)?;
            diagnostics::check_config(&cfg)?;
            let client = diagnostics::check_bank(&cfg).await?;
            if cfg.bank.account.is_none() {
                println!("bank.account is not set. Pick one of:");
                diagnostics::print_accounts(&client).await?;
            }
            diagnostics::check_ledger(&cfg).await?;
            diagnostics::check_bot(&cfg).await?;
            println!("All checks passed");
        }

        Command::Run { mode } => {
            let mut cfg = load_config(path)?;
            if let Some(mode) = mode {
                cfg.mode = mode;
            }
            run(cfg).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("monoledger=info,monoledger_core=info,monoledger_bank=info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        version = VERSION,
        mode = ?cfg.mode,
        "starting monoledger"
    );

    diagnostics::check_config(&cfg)?;
    let client = diagnostics::check_bank(&cfg).await?;
    let Some(account) = cfg.bank.account.clone() else {
        println!("Now put one of your monobank account ids into bank.account (or ACCOUNT_ID). Here is the list:");
        diagnostics::print_accounts(&client).await?;
        return Ok(());
    };
    let sink = diagnostics::check_ledger(&cfg).await?;
    let bot = diagnostics::check_bot(&cfg).await?;
    info!("🚀 all checks passed");

    let (queue, pending) = approval_queue();
    let (workflow, inbox) = ApprovalWorkflow::new(bot.clone(), sink, cfg.approval_config()?);

    let webhook_path = cfg.webhook_path();
    let app = server::router(
        AppState {
            queue: queue.clone(),
            account: account.clone(),
            phase: workflow.subscribe(),
        },
        (cfg.mode == Mode::Webhook).then_some(webhook_path.as_str()),
    );
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "started server");

    let source = async {
        match cfg.mode {
            Mode::Polling => {
                Poller::new(client.clone(), account.as_str(), cfg.poll_interval(), cfg.lookback())
                    .run(queue)
                    .await
            }
            Mode::Webhook => {
                let url = cfg.webhook_url().context("server.domain is not set")?;
                sources::register_webhook(&client, &url).await?;
                // The server's queue handle feeds the workflow from here on.
                drop(queue);
                std::future::pending::<Result<()>>().await
            }
        }
    };

    tokio::select! {
        res = workflow.run(pending) => res.context("approval workflow stopped"),
        res = bot.listen(inbox) => res.context("telegram listener stopped"),
        res = axum::serve(listener, app).into_future() => res.context("http server stopped"),
        res = source => res.context("transaction source stopped"),
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}

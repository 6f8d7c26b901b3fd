//! mini_wallet CLI
//!
//! ```bash
//! mini_wallet transfer --from 1 --to 2 --amount 500 --note "rent"
//! mini_wallet top-up --user 1 --amount 1000
//! mini_wallet balance --user 1
//! mini_wallet history --user 1 --status success --from 2024-03-01 --page 2
//! mini_wallet delete --id 17
//! mini_wallet restore --id 17
//! mini_wallet retry --debit 17
//! mini_wallet --env prod reconcile
//! ```
//!
//! Every invocation first runs the startup reconciliation pass once (unless
//! `--skip-reconcile` or `reconcile.run_on_startup: false`).

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;

use mini_wallet::config::AppConfig;
use mini_wallet::models::TxStatus;
use mini_wallet::store::{HttpStore, ResourceStore};
use mini_wallet::validation::TransferInput;
use mini_wallet::wallet::{HistoryQuery, Wallet};
use mini_wallet::{Reconciler, TransactionId, UserId};

/// Wallet ledger operations against a resource store
#[derive(Parser)]
#[command(name = "mini_wallet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config environment: loads config/<env>.yaml
    #[arg(long, default_value = "dev", global = true)]
    env: String,

    /// Do not run the startup reconciliation pass
    #[arg(long, global = true)]
    skip_reconcile: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation pass
    Reconcile,

    /// Send money to another user
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        note: Option<String>,
    },

    /// Add money to a wallet
    TopUp {
        #[arg(long)]
        user: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        note: Option<String>,
    },

    /// Compare the cached balance with the ledger
    Balance {
        #[arg(long)]
        user: String,
    },

    /// List transactions, newest first
    History {
        #[arg(long)]
        user: String,
        /// pending, success or failed
        #[arg(long)]
        status: Option<TxStatus>,
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Soft-delete a transaction
    Delete {
        #[arg(long)]
        id: String,
    },

    /// Undo a soft delete
    Restore {
        #[arg(long)]
        id: String,
    },

    /// Finish a pending transfer forward
    Retry {
        #[arg(long)]
        debit: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let app_config = AppConfig::load(&cli.env)?;
    let _log_guard = mini_wallet::logging::init_logging(&app_config);
    tracing::info!(env = %cli.env, store = %app_config.store.base_url, "Starting mini_wallet");

    let store: Arc<dyn ResourceStore> =
        Arc::new(HttpStore::new(&app_config.store).context("Failed to build store client")?);
    let reconciler = Reconciler::new(store.clone(), app_config.reconcile.clone());
    let wallet = Wallet::new(store.clone(), app_config.wallet.clone());

    let explicit_reconcile = matches!(cli.command, Commands::Reconcile);
    if app_config.reconcile.run_on_startup && !cli.skip_reconcile && !explicit_reconcile {
        // A failed startup pass must not block the command itself
        if let Err(e) = reconciler.run_once().await {
            tracing::error!(error = %e, "Startup reconciliation failed");
        }
    }

    match cli.command {
        Commands::Reconcile => {
            let report = reconciler.run_once().await?;
            if let Some(report) = report {
                print_json(&report)?;
            }
        }
        Commands::Transfer {
            from,
            to,
            amount,
            note,
        } => {
            let input = TransferInput {
                sender_id: UserId::from(from),
                recipient_id: Some(UserId::from(to)).filter(|id| !id.is_blank()),
                amount,
                note,
            };
            match wallet.transfer(&input).await {
                Ok(receipt) => print_json(&receipt)?,
                Err(e) => {
                    tracing::warn!(code = e.code(), error = %e, "Transfer failed");
                    anyhow::bail!("[{}] {}", e.code(), e);
                }
            }
        }
        Commands::TopUp { user, amount, note } => {
            let receipt = wallet
                .top_up(&UserId::from(user), &amount, note.as_deref())
                .await?;
            print_json(&receipt)?;
        }
        Commands::Balance { user } => {
            print_json(&wallet.check_balance(&UserId::from(user)).await?)?;
        }
        Commands::History {
            user,
            status,
            from,
            to,
            page,
        } => {
            let query = HistoryQuery {
                status,
                from,
                to,
                page,
                ..Default::default()
            };
            print_json(&wallet.history(&UserId::from(user), &query).await?)?;
        }
        Commands::Delete { id } => {
            print_json(&wallet.delete_transaction(&TransactionId::from(id)).await?)?;
        }
        Commands::Restore { id } => {
            print_json(&wallet.restore_transaction(&TransactionId::from(id)).await?)?;
        }
        Commands::Retry { debit } => {
            let action = reconciler
                .retry_transfer(&TransactionId::from(debit))
                .await?;
            println!("{}", action);
        }
    }

    Ok(())
}

use clap::{Parser, Subcommand};
use serde::Serialize;
use spendiq_engine::{BaseCategorizer, EditOutcome, JsonStatementParser, RuleCategorizer};
use spendiq_storage::{
    create_db, CacheStore, FileCacheStore, IdentityContext, LocalUserStore, SqliteUserStore, UserDataStore,
};
use std::fmt::{self, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, ConfigError};
use crate::session::{PassOutcome, SavingsReport, Session, SessionError, SessionView};

#[derive(Parser)]
#[command(name = "spendiq", about = "Categorize bank statements and keep your corrections.")]
pub struct Cli {
    /// Config file (default: spendiq.toml in the data directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Work as this account instead of anonymously
    #[arg(long, global = true)]
    pub account: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import an extracted statement (JSON) and categorize it.
    Import {
        /// Path to the statement JSON
        file: PathBuf,
    },
    /// Show the current dashboard.
    Show {
        /// Print the dashboard as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage categories.
    Categories {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Correct the category of transactions.
    Override {
        #[command(subcommand)]
        command: OverrideCommands,
    },
    /// Manage savings accounts.
    Savings {
        #[command(subcommand)]
        command: SavingsCommands,
    },
    /// Restore default categories and drop overrides and settings.
    Reset,
    /// Forget the cached dashboard.
    SignOut,
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// List categories.
    List,
    /// Add a category.
    Add { name: String },
    /// Rename a category, merging into an existing one of the same name.
    Rename { old: String, new: String },
    /// Delete a category; its transactions fall back to Other.
    Delete { name: String },
}

#[derive(Subcommand)]
pub enum OverrideCommands {
    /// Every transaction with the same merchant and type.
    MerchantType {
        /// Row number as printed by `show`
        index: usize,
        category: String,
    },
    /// Just this transaction.
    Transaction {
        /// Row number as printed by `show`
        index: usize,
        category: String,
    },
}

#[derive(Subcommand)]
pub enum SavingsCommands {
    /// Add a savings account (IBAN).
    Add { account: String },
    /// Remove a savings account.
    Remove { account: String },
    /// Money moved into and out of savings.
    Summary,
}

#[derive(Debug, Serialize)]
pub struct CommandError {
    pub message: String,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandError {}

impl From<SessionError> for CommandError {
    fn from(e: SessionError) -> Self {
        CommandError { message: e.to_string() }
    }
}

impl From<ConfigError> for CommandError {
    fn from(e: ConfigError) -> Self {
        CommandError { message: e.to_string() }
    }
}

impl From<sqlx::Error> for CommandError {
    fn from(e: sqlx::Error) -> Self {
        CommandError { message: e.to_string() }
    }
}

impl From<spendiq_storage::CacheError> for CommandError {
    fn from(e: spendiq_storage::CacheError) -> Self {
        CommandError { message: e.to_string() }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(e: serde_json::Error) -> Self {
        CommandError { message: e.to_string() }
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        CommandError { message: e.to_string() }
    }
}

/// Builds a session for the configured mode and brings back the user's data
/// and last dashboard.
pub async fn open_session(config: &AppConfig, account: Option<&str>) -> Result<Session, CommandError> {
    let cache_dir = config.cache_path()?;
    let cache: Arc<dyn CacheStore> = Arc::new(FileCacheStore::open(&cache_dir)?);

    let categorizer: Arc<dyn BaseCategorizer> = match &config.rules_file {
        Some(path) => {
            let content = tokio::fs::read_to_string(path).await?;
            Arc::new(RuleCategorizer::from_toml(&content).map_err(|message| CommandError { message })?)
        }
        None => Arc::new(RuleCategorizer::with_default_rules()),
    };

    let defaults = config.default_category_set();
    let (identity, store): (IdentityContext, Arc<dyn UserDataStore>) = match account {
        Some(id) => {
            let db_path = config.database_path()?;
            if let Some(parent) = db_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let pool = create_db(&db_path).await?;
            let store: Arc<dyn UserDataStore> =
                Arc::new(SqliteUserStore::new(pool, id).with_default_categories(defaults.clone()));
            (IdentityContext::account(id), store)
        }
        None => {
            let local = FileCacheStore::open(cache_dir.join("local"))?;
            let store: Arc<dyn UserDataStore> =
                Arc::new(LocalUserStore::new(local).with_default_categories(defaults.clone()));
            (IdentityContext::Anonymous, store)
        }
    };

    let session = Session::new(categorizer, store, cache, identity)
        .with_commit_policy(config.commit_policy)
        .with_default_categories(defaults);
    session.load_user_data().await?;
    session.restore_dashboard().await;
    Ok(session)
}

/// Runs one CLI command and returns what to print.
pub async fn run(config: &AppConfig, cli: Cli) -> Result<String, CommandError> {
    let session = open_session(config, cli.account.as_deref()).await?;

    let output = match cli.command {
        Commands::Import { file } => {
            let document = tokio::fs::read(&file).await?;
            match session.import_document(&JsonStatementParser, &document).await? {
                PassOutcome::Applied { transactions } => {
                    let view = session.view().await;
                    format!("Imported {transactions} transactions.\n{}", render_view(&view))
                }
                PassOutcome::Superseded => "Import superseded by a newer one.\n".to_string(),
            }
        }
        Commands::Show { json: false } => render_view(&session.view().await),
        Commands::Show { json: true } => {
            let mut out = serde_json::to_string_pretty(&session.view().await)?;
            out.push('\n');
            out
        }
        Commands::Categories { command } => match command {
            CategoryCommands::List => render_categories(&session.view().await),
            CategoryCommands::Add { name } => {
                session.add_category(&name).await?;
                render_categories(&session.view().await)
            }
            CategoryCommands::Rename { old, new } => {
                let outcome = session.rename_category(&old, &new).await?;
                describe(outcome, &format!("Renamed '{old}' to '{}'.", new.trim()))
            }
            CategoryCommands::Delete { name } => {
                session.delete_category(&name).await?;
                format!("Deleted '{}'.\n", name.trim())
            }
        },
        Commands::Override { command } => {
            let (index, category, outcome) = match command {
                OverrideCommands::MerchantType { index, category } => {
                    let outcome = session.override_merchant_type(index, &category).await?;
                    (index, category, outcome)
                }
                OverrideCommands::Transaction { index, category } => {
                    let outcome = session.override_single_transaction(index, &category).await?;
                    (index, category, outcome)
                }
            };
            describe(outcome, &format!("Row {index} is now '{}'.", category.trim()))
        }
        Commands::Savings { command } => match command {
            SavingsCommands::Add { account } => {
                let outcome = session.add_savings_account(&account).await?;
                describe(outcome, "Savings account added.")
            }
            SavingsCommands::Remove { account } => {
                let outcome = session.remove_savings_account(&account).await?;
                describe(outcome, "Savings account removed.")
            }
            SavingsCommands::Summary => render_savings(&session.savings_report().await),
        },
        Commands::Reset => {
            session.reset_data().await?;
            "Categories, overrides and settings reset.\n".to_string()
        }
        Commands::SignOut => {
            session.sign_out().await;
            "Signed out.\n".to_string()
        }
    };
    Ok(output)
}

fn describe(outcome: EditOutcome, changed: &str) -> String {
    if outcome.changed() {
        format!("{changed}\n")
    } else {
        "Nothing to change.\n".to_string()
    }
}

pub fn render_view(view: &SessionView) -> String {
    let mut out = String::new();
    if let Some(details) = &view.statement_details {
        if let Some(holder) = &details.account_holder {
            let _ = writeln!(out, "Account holder: {holder}");
        }
        if let Some(period) = &details.statement_period {
            let _ = writeln!(out, "Period: {period}");
        }
    }
    if view.transactions.is_empty() {
        out.push_str("No transactions.\n");
        return out;
    }
    for (i, tx) in view.transactions.iter().enumerate() {
        let amount = tx.amount.map_or_else(|| "-".to_string(), |a| format!("{a:.2}"));
        let _ = writeln!(
            out,
            "{i:>4}  {:<10}  {:<28}  {:>10}  {}",
            tx.date,
            truncate(&tx.merchant, 28),
            amount,
            tx.category.as_deref().unwrap_or("-"),
        );
    }
    out
}

pub fn render_categories(view: &SessionView) -> String {
    let mut out = String::new();
    for name in view.categories.iter() {
        let count = view
            .transactions
            .iter()
            .filter(|t| t.category_name() == Some(name))
            .count();
        let _ = writeln!(out, "{name:<24} {count:>5}");
    }
    out
}

pub fn render_savings(report: &SavingsReport) -> String {
    let mut out = String::new();
    let overall = &report.overall;
    let _ = writeln!(
        out,
        "All accounts: {} transactions, in {}, out {}, net {}",
        overall.transaction_count, overall.savings_in, overall.savings_out, overall.net
    );
    for account in &report.accounts {
        let s = &account.summary;
        let _ = writeln!(
            out,
            "{}: {} transactions, in {}, out {}, net {}",
            account.account, s.transaction_count, s.savings_in, s.savings_out, s.net
        );
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut cut: String = s.chars().take(max.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            data_dir: Some(dir.to_path_buf()),
            ..AppConfig::default()
        }
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("spendiq").chain(args.iter().copied()))
    }

    const STATEMENT: &str = r#"{
        "transactions": [
            {"date": "02/01/2026", "title": "Cumparare POS", "merchant": "LIDL", "amount": -42.1, "direction": "debit"},
            {"date": "03/01/2026", "title": "Transfer Home'Bank", "merchant": "Savings", "amount": -100.0,
             "direction": "debit", "rawLines": ["In contul: RO49 AAAA 1234"]}
        ],
        "statementDetails": {"accountHolder": "Jane Doe"}
    }"#;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[tokio::test]
    async fn anonymous_flow_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let file = dir.path().join("statement.json");
        std::fs::write(&file, STATEMENT).unwrap();

        let out = run(&config, cli(&["import", file.to_str().unwrap()])).await.unwrap();
        assert!(out.contains("Imported 2 transactions."));
        assert!(out.contains("Groceries"));
        assert!(out.contains("Account holder: Jane Doe"));

        run(&config, cli(&["savings", "add", "ro49 aaaa 1234"])).await.unwrap();
        let summary = run(&config, cli(&["savings", "summary"])).await.unwrap();
        assert!(summary.contains("All accounts: 1 transactions, in 100.00"));

        run(&config, cli(&["categories", "rename", "Groceries", "Food"])).await.unwrap();
        let shown = run(&config, cli(&["show"])).await.unwrap();
        assert!(shown.contains("Food"));
        assert!(shown.contains("Savings"));

        run(&config, cli(&["override", "merchant-type", "0", "Shopping"])).await.unwrap();
        assert!(run(&config, cli(&["show"])).await.unwrap().contains("Shopping"));

        let json = run(&config, cli(&["show", "--json"])).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["transactions"][0]["category"], "Shopping");
        assert!(value["overrides"]["LIDL||Cumparare POS"].is_string());

        run(&config, cli(&["sign-out"])).await.unwrap();
        assert!(run(&config, cli(&["show"])).await.unwrap().contains("No transactions."));
    }

    #[tokio::test]
    async fn account_mode_uses_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        run(&config, cli(&["--account", "Jane@Example.com", "categories", "add", "Travel"]))
            .await
            .unwrap();
        assert!(dir.path().join("spendiq.db").exists());

        let listed = run(&config, cli(&["categories", "list", "--account", "jane@example.com"]))
            .await
            .unwrap();
        assert!(listed.contains("Travel"));

        let anonymous = run(&config, cli(&["categories", "list"])).await.unwrap();
        assert!(!anonymous.contains("Travel"));
    }

    #[tokio::test]
    async fn errors_carry_a_message() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let err = run(&config, cli(&["categories", "delete", "Other"])).await.unwrap_err();
        assert!(err.message.contains("reserved"));
        let err = run(&config, cli(&["override", "transaction", "7", "Fees"])).await.unwrap_err();
        assert!(err.message.contains("No transaction at position 7"));
    }

    #[test]
    fn truncate_marks_long_names() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}

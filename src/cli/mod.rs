pub mod csvio;
pub mod init;
pub mod query;
pub mod tags;
pub mod transactions;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::{db, settings};

#[derive(Parser)]
#[command(name = "kassabok", about = "Personal finance ledger with category/person tagging.")]
pub struct Cli {
    /// Database file (default: <data-dir>/kassabok.db from settings)
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for kassabok data (default: platform data dir)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Record a transaction, creating and linking any named tags.
    Add {
        /// Whole-number amount
        #[arg(allow_hyphen_values = true)]
        amount: i64,
        /// deposit, withdrawal, expense or reimbursement
        kind: String,
        /// ISO date: YYYY-MM-DD
        date: String,
        /// Free-text description
        #[arg(default_value = "")]
        description: String,
        /// Category name (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Person name (repeatable)
        #[arg(long = "person")]
        people: Vec<String>,
    },
    /// Show one transaction with its categories and people.
    Show { id: i64 },
    /// List all transactions.
    List,
    /// Query transactions.
    Query {
        #[command(subcommand)]
        command: QueryCommands,
    },
    /// Overwrite all fields of a transaction.
    Update {
        id: i64,
        #[arg(allow_hyphen_values = true)]
        amount: i64,
        kind: String,
        date: String,
        #[arg(default_value = "")]
        description: String,
    },
    /// Delete a transaction and its tag links.
    Remove {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Link an existing category or person to a transaction.
    Link {
        transaction: i64,
        #[arg(long)]
        category: Option<i64>,
        #[arg(long)]
        person: Option<i64>,
    },
    /// Remove a single tag link from a transaction.
    Unlink {
        transaction: i64,
        #[arg(long)]
        category: Option<i64>,
        #[arg(long)]
        person: Option<i64>,
    },
    /// Replace one tag link with another on a transaction.
    Remap {
        /// Tag kind: category or person
        kind: String,
        transaction: i64,
        old_tag: i64,
        new_tag: i64,
    },
    /// Export transactions to a semicolon-delimited CSV file.
    Export {
        file: String,
        /// Transaction ids (default: all)
        ids: Vec<i64>,
    },
    /// Import transactions from a CSV file, skipping duplicates.
    Import { file: String },
    /// Manage categories.
    Categories {
        #[command(subcommand)]
        command: TagCommands,
    },
    /// Manage people.
    People {
        #[command(subcommand)]
        command: TagCommands,
    },
}

#[derive(Subcommand)]
pub enum QueryCommands {
    /// Filter by amount: 'greater than', '>', 'equal', … plus a value.
    Amount {
        comparator: String,
        #[arg(allow_hyphen_values = true)]
        value: i64,
    },
    /// Filter by kind.
    Kind { kind: String },
    /// Inclusive date range.
    Between { from: String, to: String },
    /// Single date.
    On { date: String },
    /// Case-sensitive description substring.
    Search { text: String },
    /// Conjunctive filter over any of the four fields.
    Fields {
        #[arg(long)]
        amount: Option<i64>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum TagCommands {
    /// Add a new entry.
    Add { name: String },
    /// List all entries.
    List,
    /// Look up by id or name.
    Show { key: String },
    /// Rename an entry.
    Rename { id: i64, name: String },
    /// Delete an entry and its tag links.
    Delete {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
    /// List transactions linked to an entry.
    Transactions { id: i64 },
}

/// Opens (and if necessary creates) the database behind `--db` or the
/// settings file.
pub(crate) fn connect(db: Option<&str>) -> anyhow::Result<Connection> {
    let path = settings::resolve_db_path(db);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = db::get_connection(&path)?;
    db::init_db(&conn)?;
    Ok(conn)
}

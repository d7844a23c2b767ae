mod cli;
mod db;
mod error;
mod fmt;
mod ledger;
mod models;
mod registry;
mod response;
mod settings;
mod validate;

use clap::Parser;

use cli::{Cli, Commands};
use registry::TagKind;

fn main() {
    let cli = Cli::parse();
    let db = cli.db.as_deref();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir, db),
        Commands::Add {
            amount,
            kind,
            date,
            description,
            categories,
            people,
        } => cli::transactions::add(amount, &kind, &date, &description, &categories, &people, db),
        Commands::Show { id } => cli::transactions::show(id, db),
        Commands::List => cli::transactions::list(db),
        Commands::Query { command } => cli::query::run(command, db),
        Commands::Update {
            id,
            amount,
            kind,
            date,
            description,
        } => cli::transactions::update(id, amount, &kind, &date, &description, db),
        Commands::Remove { id, yes } => cli::transactions::remove(id, yes, db),
        Commands::Link {
            transaction,
            category,
            person,
        } => cli::transactions::link(transaction, category, person, db),
        Commands::Unlink {
            transaction,
            category,
            person,
        } => cli::transactions::unlink(transaction, category, person, db),
        Commands::Remap {
            kind,
            transaction,
            old_tag,
            new_tag,
        } => cli::transactions::remap(&kind, transaction, old_tag, new_tag, db),
        Commands::Export { file, ids } => cli::csvio::export(&file, &ids, db),
        Commands::Import { file } => cli::csvio::import(&file, db),
        Commands::Categories { command } => cli::tags::run(TagKind::Category, command, db),
        Commands::People { command } => cli::tags::run(TagKind::Person, command, db),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

use crate::fmt::print_reply;
use crate::ledger::Ledger;
use crate::models::TransactionFilter;

use super::QueryCommands;

pub fn run(command: QueryCommands, db: Option<&str>) -> anyhow::Result<()> {
    let conn = super::connect(db)?;
    let ledger = Ledger::new(&conn);
    let reply = match command {
        QueryCommands::Amount { comparator, value } => ledger.by_amount(&comparator, value),
        QueryCommands::Kind { kind } => ledger.by_kind(&kind),
        QueryCommands::Between { from, to } => ledger.between_dates(&from, &to),
        QueryCommands::On { date } => ledger.on_date(&date),
        QueryCommands::Search { text } => ledger.by_description(&text),
        QueryCommands::Fields {
            amount,
            kind,
            date,
            description,
        } => ledger.find_by_fields(&TransactionFilter {
            amount,
            kind,
            date,
            description,
        }),
    };
    print_reply(&reply);
    Ok(())
}

use std::path::Path;

use anyhow::Context;
use serde_json::{json, Value};

use crate::fmt::print_reply;
use crate::ledger::Ledger;
use crate::response::Status;

pub fn export(file: &str, ids: &[i64], db: Option<&str>) -> anyhow::Result<()> {
    let conn = super::connect(db)?;
    let ledger = Ledger::new(&conn);

    let entries: Vec<Value> = if ids.is_empty() {
        let all = ledger.all();
        if all.status != Status::Ok {
            print_reply(&all);
            return Ok(());
        }
        all.content
            .as_array()
            .map(|rows| rows.iter().cloned().collect())
            .unwrap_or_default()
    } else {
        ids.iter().map(|id| json!({ "id": id })).collect()
    };

    let reply = ledger
        .export_csv(&entries, Path::new(file))
        .with_context(|| format!("could not write {file}"))?;
    print_reply(&reply);
    Ok(())
}

pub fn import(file: &str, db: Option<&str>) -> anyhow::Result<()> {
    let conn = super::connect(db)?;
    let reply = Ledger::new(&conn)
        .import_csv(Path::new(file))
        .with_context(|| format!("could not read {file}"))?;
    print_reply(&reply);
    Ok(())
}

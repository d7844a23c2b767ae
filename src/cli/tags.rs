use crate::fmt::print_reply;
use crate::registry::{Registry, TagKind};

use super::TagCommands;

pub fn run(kind: TagKind, command: TagCommands, db: Option<&str>) -> anyhow::Result<()> {
    if let TagCommands::Delete { id, yes: false } = command {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Delete {} {id} and its tag links?", kind.noun()))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let conn = super::connect(db)?;
    let registry = Registry::new(&conn, kind);
    let reply = match command {
        TagCommands::Add { name } => registry.add(&name),
        TagCommands::List => registry.list(),
        // A numeric key is an id lookup, anything else a name lookup.
        TagCommands::Show { key } => match key.parse::<i64>() {
            Ok(id) => registry.get_by_id(id),
            Err(_) => registry.get_by_name(&key),
        },
        TagCommands::Rename { id, name } => registry.update(id, &name),
        TagCommands::Delete { id, .. } => registry.remove(id),
        TagCommands::Transactions { id } => registry.linked_transactions(id),
    };
    print_reply(&reply);
    Ok(())
}

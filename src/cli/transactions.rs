use anyhow::bail;

use crate::fmt::print_reply;
use crate::ledger::Ledger;
use crate::registry::TagKind;

#[allow(clippy::too_many_arguments)]
pub fn add(
    amount: i64,
    kind: &str,
    date: &str,
    description: &str,
    categories: &[String],
    people: &[String],
    db: Option<&str>,
) -> anyhow::Result<()> {
    let conn = super::connect(db)?;
    let ledger = Ledger::new(&conn);
    let reply = if categories.is_empty() && people.is_empty() {
        ledger.write(amount, kind, date, description)
    } else {
        ledger.write_with_tags(amount, kind, date, description, categories, people)
    };
    print_reply(&reply);
    Ok(())
}

pub fn show(id: i64, db: Option<&str>) -> anyhow::Result<()> {
    let conn = super::connect(db)?;
    print_reply(&Ledger::new(&conn).get_full(id));
    Ok(())
}

pub fn list(db: Option<&str>) -> anyhow::Result<()> {
    let conn = super::connect(db)?;
    print_reply(&Ledger::new(&conn).all());
    Ok(())
}

pub fn update(
    id: i64,
    amount: i64,
    kind: &str,
    date: &str,
    description: &str,
    db: Option<&str>,
) -> anyhow::Result<()> {
    let conn = super::connect(db)?;
    print_reply(&Ledger::new(&conn).update(id, amount, kind, date, description));
    Ok(())
}

pub fn remove(id: i64, yes: bool, db: Option<&str>) -> anyhow::Result<()> {
    if !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Delete transaction {id} and its tag links?"))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }
    let conn = super::connect(db)?;
    print_reply(&Ledger::new(&conn).remove(id));
    Ok(())
}

pub fn link(
    transaction: i64,
    category: Option<i64>,
    person: Option<i64>,
    db: Option<&str>,
) -> anyhow::Result<()> {
    let (kind, tag_id) = tag_ref(category, person)?;
    let conn = super::connect(db)?;
    let ledger = Ledger::new(&conn);
    let reply = match kind {
        TagKind::Category => ledger.link_category(transaction, tag_id),
        TagKind::Person => ledger.link_person(transaction, tag_id),
    };
    print_reply(&reply);
    Ok(())
}

pub fn unlink(
    transaction: i64,
    category: Option<i64>,
    person: Option<i64>,
    db: Option<&str>,
) -> anyhow::Result<()> {
    let (kind, tag_id) = tag_ref(category, person)?;
    let conn = super::connect(db)?;
    let ledger = Ledger::new(&conn);
    let reply = match kind {
        TagKind::Category => ledger.unlink_category(transaction, tag_id),
        TagKind::Person => ledger.unlink_person(transaction, tag_id),
    };
    print_reply(&reply);
    Ok(())
}

pub fn remap(
    kind: &str,
    transaction: i64,
    old_tag: i64,
    new_tag: i64,
    db: Option<&str>,
) -> anyhow::Result<()> {
    let Some(kind) = TagKind::parse(kind) else {
        bail!("unknown tag kind \"{kind}\": expected category or person");
    };
    let conn = super::connect(db)?;
    print_reply(&Ledger::new(&conn).remap_tag(kind, transaction, old_tag, new_tag));
    Ok(())
}

fn tag_ref(category: Option<i64>, person: Option<i64>) -> anyhow::Result<(TagKind, i64)> {
    match (category, person) {
        (Some(id), None) => Ok((TagKind::Category, id)),
        (None, Some(id)) => Ok((TagKind::Person, id)),
        _ => bail!("specify exactly one of --category or --person"),
    }
}

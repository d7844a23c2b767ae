//! The transaction ledger: writes with duplicate suppression, tag linking,
//! composite reads, filtered queries, tag remapping and CSV import/export.

use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;

use crate::db;
use crate::error::Result;
use crate::models::{TagEntity, Transaction, TransactionFilter};
use crate::registry::{Registry, TagKind};
use crate::response::{Reply, Status};
use crate::validate;

/// Column order of the semicolon-delimited CSV exchange format.
pub const CSV_HEADER: [&str; 6] = ["pris", "type", "dato", "beskrivelse", "kategorier", "personer"];

const TX_COLUMNS: &str = "id, amount, kind, date, description";

/// How the duplicate check treats person tags. The historical implementation
/// compared category-name sets twice and never looked at person names;
/// `Legacy` keeps that behavior for callers that depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupMode {
    #[default]
    Fixed,
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Greater,
    Less,
    Equal,
    GreaterOrEqual,
    LessOrEqual,
    NotEqual,
}

impl Comparator {
    /// Accepts both the spelled-out token and the symbol itself.
    pub fn parse(token: &str) -> Option<Comparator> {
        match token.trim() {
            "greater than" | ">" => Some(Comparator::Greater),
            "less than" | "<" => Some(Comparator::Less),
            "equal" | "=" => Some(Comparator::Equal),
            "greater or equal" | ">=" => Some(Comparator::GreaterOrEqual),
            "less or equal" | "<=" => Some(Comparator::LessOrEqual),
            "not equal" | "!=" => Some(Comparator::NotEqual),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Greater => ">",
            Comparator::Less => "<",
            Comparator::Equal => "=",
            Comparator::GreaterOrEqual => ">=",
            Comparator::LessOrEqual => "<=",
            Comparator::NotEqual => "!=",
        }
    }
}

pub struct Ledger<'a> {
    conn: &'a Connection,
    categories: Registry<'a>,
    people: Registry<'a>,
    dedup: DedupMode,
}

impl<'a> Ledger<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Ledger {
            conn,
            categories: Registry::new(conn, TagKind::Category),
            people: Registry::new(conn, TagKind::Person),
            dedup: DedupMode::default(),
        }
    }

    pub fn with_dedup_mode(mut self, mode: DedupMode) -> Self {
        self.dedup = mode;
        self
    }

    pub fn categories(&self) -> &Registry<'a> {
        &self.categories
    }

    pub fn people(&self) -> &Registry<'a> {
        &self.people
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub fn write(&self, amount: i64, kind: &str, date: &str, description: &str) -> Reply {
        if let Some(msg) = validate::check_transaction_input(kind, date) {
            return Reply::invalid(msg);
        }
        let kind = kind.to_lowercase();
        if self.exists_equivalent(amount, &kind, date, description, &[], &[]) {
            return Reply::conflict("transaction already exists in the database");
        }
        self.insert_transaction(amount, &kind, date, description)
    }

    fn insert_transaction(&self, amount: i64, kind: &str, date: &str, description: &str) -> Reply {
        match self.conn.query_row(
            &format!(
                "INSERT INTO transactions (amount, kind, date, description) \
                 VALUES (?1, ?2, ?3, ?4) RETURNING {TX_COLUMNS}"
            ),
            params![amount, kind, date, description],
            Transaction::from_row,
        ) {
            Ok(tx) => Reply::created(tx),
            Err(e) => Reply::schema_missing(format!("could not add transaction: {e}")),
        }
    }

    pub fn link_category(&self, tx_id: i64, category_id: i64) -> Reply {
        self.link(TagKind::Category, tx_id, category_id)
    }

    pub fn link_person(&self, tx_id: i64, person_id: i64) -> Reply {
        self.link(TagKind::Person, tx_id, person_id)
    }

    fn link(&self, kind: TagKind, tx_id: i64, tag_id: i64) -> Reply {
        match self.transaction_exists(tx_id) {
            Ok(true) => {}
            Ok(false) => return Reply::invalid(format!("{tx_id} is not a known transaction")),
            Err(e) => return Reply::schema_missing(format!("lookup failed: {e}")),
        }
        let tag = Registry::new(self.conn, kind).get_by_id(tag_id);
        match tag.status {
            Status::Ok => {}
            Status::NotFound => {
                return Reply::invalid(format!("{tag_id} is not a known {}", kind.noun()))
            }
            _ => return tag,
        }
        // No link-existence check: repeated calls create duplicate links.
        let sql = format!(
            "INSERT INTO {} (transaction_id, {}) VALUES (?1, ?2)",
            kind.junction_table(),
            kind.tag_column()
        );
        match self.conn.execute(&sql, params![tx_id, tag_id]) {
            Ok(_) => Reply::created(Value::Array(vec![])),
            Err(e) => Reply::schema_missing(format!(
                "could not link {} {tag_id}: {e}",
                kind.noun()
            )),
        }
    }

    /// Orchestration entrypoint: resolves every tag name (creating entities
    /// on the fly), writes the transaction, then links each resolved tag to
    /// it best-effort. Not atomic: a link failure after the insert leaves the
    /// transaction row in place.
    pub fn write_with_tags(
        &self,
        amount: i64,
        kind: &str,
        date: &str,
        description: &str,
        category_names: &[String],
        person_names: &[String],
    ) -> Reply {
        if let Some(msg) = validate::check_transaction_input(kind, date) {
            return Reply::invalid(msg);
        }
        let kind = kind.to_lowercase();

        let person_ids = match self.resolve_tags(&self.people, person_names) {
            Ok(ids) => ids,
            Err(reply) => return reply,
        };
        let category_ids = match self.resolve_tags(&self.categories, category_names) {
            Ok(ids) => ids,
            Err(reply) => return reply,
        };

        // The duplicate check sees the full tag-name sets, so a second
        // identical tagged write conflicts instead of duplicating.
        if self.exists_equivalent(amount, &kind, date, description, category_names, person_names) {
            return Reply::conflict("transaction already exists in the database");
        }

        let created = self.insert_transaction(amount, &kind, date, description);
        if created.status != Status::Created {
            return created;
        }
        let Some(tx_id) = created.content_id() else {
            return Reply::schema_missing("created transaction carries no id");
        };

        // Best-effort: link failures are not aggregated into the result.
        for person_id in person_ids {
            let _ = self.link(TagKind::Person, tx_id, person_id);
        }
        for category_id in category_ids {
            let _ = self.link(TagKind::Category, tx_id, category_id);
        }

        created
    }

    fn resolve_tags(
        &self,
        registry: &Registry,
        names: &[String],
    ) -> std::result::Result<Vec<i64>, Reply> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let reply = registry.get_or_create(name);
            if !reply.is_success() {
                return Err(reply);
            }
            match reply.content_id() {
                Some(id) => ids.push(id),
                None => {
                    return Err(Reply::schema_missing(format!(
                        "could not resolve {} {name}",
                        registry.kind().noun()
                    )))
                }
            }
        }
        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // Duplicate detection
    // -----------------------------------------------------------------------

    /// True when a stored transaction matches the candidate in amount, kind,
    /// date, description and tag-name sets (order-insensitive). Description
    /// participates in the equi-filter only when non-empty.
    fn exists_equivalent(
        &self,
        amount: i64,
        kind: &str,
        date: &str,
        description: &str,
        category_names: &[String],
        person_names: &[String],
    ) -> bool {
        let mut want_categories = category_names.to_vec();
        want_categories.sort();
        let mut want_persons = person_names.to_vec();
        want_persons.sort();

        let filter = TransactionFilter {
            amount: Some(amount),
            kind: Some(kind.to_string()),
            date: Some(date.to_string()),
            description: (!description.is_empty()).then(|| description.to_string()),
        };
        let candidates = match self.find_rows(&filter) {
            Ok(rows) => rows,
            Err(_) => return false,
        };

        let mut category_matches = Vec::new();
        for tx in candidates {
            let Ok(mut names) = self.tag_names(TagKind::Category, tx.id) else {
                continue;
            };
            names.sort();
            if names == want_categories {
                category_matches.push(tx);
            }
        }

        for tx in category_matches {
            let (kind, want) = match self.dedup {
                DedupMode::Fixed => (TagKind::Person, &want_persons),
                DedupMode::Legacy => (TagKind::Category, &want_categories),
            };
            let Ok(mut names) = self.tag_names(kind, tx.id) else {
                continue;
            };
            names.sort();
            if names == *want {
                return true;
            }
        }
        false
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get_by_id(&self, tx_id: i64) -> Reply {
        match self
            .conn
            .query_row(
                &format!("SELECT {TX_COLUMNS} FROM transactions WHERE id = ?1"),
                [tx_id],
                Transaction::from_row,
            )
            .optional()
        {
            Ok(Some(tx)) => Reply::ok(tx),
            Ok(None) => Reply::not_found("no transaction found"),
            Err(e) => Reply::schema_missing(format!("lookup failed: {e}")),
        }
    }

    /// Denormalized view: the transaction row with its full person and
    /// category rows embedded under `persons` and `categories`.
    pub fn get_full(&self, tx_id: i64) -> Reply {
        let found = self.get_by_id(tx_id);
        if found.status != Status::Ok {
            return found;
        }
        let persons = match self.tag_rows(TagKind::Person, tx_id) {
            Ok(rows) => rows,
            Err(e) => return Reply::schema_missing(format!("lookup failed: {e}")),
        };
        let categories = match self.tag_rows(TagKind::Category, tx_id) {
            Ok(rows) => rows,
            Err(e) => return Reply::schema_missing(format!("lookup failed: {e}")),
        };

        let mut content = found.content;
        if let Some(object) = content.as_object_mut() {
            object.insert("persons".into(), to_json(persons));
            object.insert("categories".into(), to_json(categories));
        }
        Reply::new(Status::Ok, content, "success")
    }

    pub fn linked_people(&self, tx_id: i64) -> Reply {
        self.linked_tags(TagKind::Person, tx_id)
    }

    pub fn linked_categories(&self, tx_id: i64) -> Reply {
        self.linked_tags(TagKind::Category, tx_id)
    }

    fn linked_tags(&self, kind: TagKind, tx_id: i64) -> Reply {
        match self.tag_rows(kind, tx_id) {
            Ok(rows) if rows.is_empty() => Reply::no_content(format!(
                "no {} linked to transaction {tx_id}",
                kind.noun_plural()
            )),
            Ok(rows) => Reply::ok(rows),
            Err(e) => Reply::schema_missing(format!("lookup failed: {e}")),
        }
    }

    pub fn all(&self) -> Reply {
        match self.fetch_many(&format!("SELECT {TX_COLUMNS} FROM transactions"), params![]) {
            Ok(rows) if rows.is_empty() => Reply::no_content("no transactions recorded"),
            Ok(rows) => Reply::ok(rows),
            Err(e) => Reply::schema_missing(format!("lookup failed: {e}")),
        }
    }

    pub fn by_amount(&self, comparator: &str, amount: i64) -> Reply {
        let Some(cmp) = Comparator::parse(comparator) else {
            return Reply::invalid(format!("unknown comparator \"{comparator}\""));
        };
        let sql = format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE amount {} ?1",
            cmp.symbol()
        );
        match self.fetch_many(&sql, params![amount]) {
            Ok(rows) if rows.is_empty() => Reply::no_content("no transactions found"),
            Ok(rows) => Reply::ok(rows),
            Err(e) => Reply::schema_missing(format!("query failed: {e}")),
        }
    }

    pub fn by_kind(&self, kind: &str) -> Reply {
        if !validate::is_valid_kind(kind) {
            return Reply::invalid(format!(
                "invalid kind \"{kind}\": expected deposit, withdrawal, expense or reimbursement"
            ));
        }
        let kind = kind.to_lowercase();
        match self.fetch_many(
            &format!("SELECT {TX_COLUMNS} FROM transactions WHERE kind = ?1"),
            params![kind],
        ) {
            Ok(rows) if rows.is_empty() => {
                Reply::no_content(format!("no transactions of kind {kind}"))
            }
            Ok(rows) => Reply::ok(rows),
            Err(e) => Reply::schema_missing(format!("query failed: {e}")),
        }
    }

    /// Inclusive date range; both bounds must be valid ISO dates.
    pub fn between_dates(&self, start: &str, end: &str) -> Reply {
        for date in [start, end] {
            if !validate::is_valid_date(date) {
                return Reply::invalid(format!(
                    "invalid date \"{date}\": expected an ISO calendar date (YYYY-MM-DD)"
                ));
            }
        }
        match self.fetch_many(
            &format!("SELECT {TX_COLUMNS} FROM transactions WHERE date BETWEEN ?1 AND ?2"),
            params![start, end],
        ) {
            Ok(rows) if rows.is_empty() => Reply::no_content("no transactions found"),
            Ok(rows) => Reply::ok(rows),
            Err(e) => Reply::schema_missing(format!("query failed: {e}")),
        }
    }

    pub fn on_date(&self, date: &str) -> Reply {
        self.between_dates(date, date)
    }

    /// Case-sensitive substring containment over descriptions.
    pub fn by_description(&self, substring: &str) -> Reply {
        let pattern = format!("%{substring}%");
        match self.fetch_many(
            &format!("SELECT {TX_COLUMNS} FROM transactions WHERE description LIKE ?1"),
            params![pattern],
        ) {
            Ok(rows) => Reply::ok(rows),
            Err(e) => Reply::schema_missing(format!("query failed: {e}")),
        }
    }

    pub fn find_by_fields(&self, filter: &TransactionFilter) -> Reply {
        if filter.is_empty() {
            return Reply::invalid("no filter fields provided");
        }
        match self.find_rows(filter) {
            Ok(rows) if rows.is_empty() => Reply::not_found("no transactions matched the filter"),
            Ok(rows) => Reply::ok(rows),
            Err(e) => Reply::schema_missing(format!("query failed: {e}")),
        }
    }

    // -----------------------------------------------------------------------
    // Updates and deletes
    // -----------------------------------------------------------------------

    pub fn update(
        &self,
        tx_id: i64,
        amount: i64,
        kind: &str,
        date: &str,
        description: &str,
    ) -> Reply {
        if let Some(msg) = validate::check_transaction_input(kind, date) {
            return Reply::invalid(msg);
        }
        let kind = kind.to_lowercase();
        match self
            .conn
            .query_row(
                &format!(
                    "UPDATE transactions SET amount = ?1, kind = ?2, date = ?3, description = ?4 \
                     WHERE id = ?5 RETURNING {TX_COLUMNS}"
                ),
                params![amount, kind, date, description, tx_id],
                Transaction::from_row,
            )
            .optional()
        {
            Ok(Some(tx)) => Reply::ok(tx),
            Ok(None) => Reply::no_content(format!(
                "nothing updated; transaction {tx_id} may not exist"
            )),
            Err(e) => Reply::schema_missing(format!("update failed: {e}")),
        }
    }

    /// Moves one tag link from `old_tag_id` to `new_tag_id`, scoped to the
    /// given transaction. No-op success when no link matched.
    pub fn remap_tag(&self, kind: TagKind, tx_id: i64, old_tag_id: i64, new_tag_id: i64) -> Reply {
        match db::table_exists(self.conn, kind.junction_table()) {
            Ok(true) => {}
            Ok(false) => {
                return Reply::not_found(format!(
                    "{} does not exist in the database",
                    kind.junction_table()
                ))
            }
            Err(e) => return Reply::schema_missing(format!("lookup failed: {e}")),
        }
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE transaction_id = ?2 AND {} = ?3",
            kind.junction_table(),
            kind.tag_column(),
            kind.tag_column()
        );
        match self.conn.execute(&sql, params![new_tag_id, tx_id, old_tag_id]) {
            Ok(_) => Reply::no_content("success"),
            Err(e) => Reply::schema_missing(format!("update failed: {e}")),
        }
    }

    /// Deletes the transaction and both junction-row sets. Reports success
    /// unconditionally.
    pub fn remove(&self, tx_id: i64) -> Reply {
        for sql in [
            "DELETE FROM transactions WHERE id = ?1",
            "DELETE FROM category_tag WHERE transaction_id = ?1",
            "DELETE FROM person_tag WHERE transaction_id = ?1",
        ] {
            if let Err(e) = self.conn.execute(sql, [tx_id]) {
                return Reply::schema_missing(format!("delete failed: {e}"));
            }
        }
        Reply::no_content("success")
    }

    pub fn unlink_category(&self, tx_id: i64, category_id: i64) -> Reply {
        self.unlink(TagKind::Category, tx_id, category_id)
    }

    pub fn unlink_person(&self, tx_id: i64, person_id: i64) -> Reply {
        self.unlink(TagKind::Person, tx_id, person_id)
    }

    fn unlink(&self, kind: TagKind, tx_id: i64, tag_id: i64) -> Reply {
        let sql = format!(
            "DELETE FROM {} WHERE transaction_id = ?1 AND {} = ?2",
            kind.junction_table(),
            kind.tag_column()
        );
        match self.conn.execute(&sql, params![tx_id, tag_id]) {
            Ok(_) => Reply::no_content("success"),
            Err(e) => Reply::schema_missing(format!("delete failed: {e}")),
        }
    }

    // -----------------------------------------------------------------------
    // CSV exchange
    // -----------------------------------------------------------------------

    /// Writes the full composite view of each entry to a semicolon-delimited
    /// file. Entries may be full rows or bare `{id}` stubs; only the id is
    /// read. Name lists keep their natural fetch order.
    pub fn export_csv(&self, entries: &[Value], path: &Path) -> Result<Reply> {
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(id_value) = entry.get("id") else {
                return Ok(Reply::not_found(format!("no id in entry {entry}")));
            };
            let Some(id) = id_value.as_i64() else {
                return Ok(Reply::invalid(format!("id is not an integer, got {id_value}")));
            };
            let full = self.get_full(id);
            if full.status == Status::NotFound {
                return Ok(Reply::not_found(format!(
                    "no transaction with id {id} in the database"
                )));
            }
            if full.status != Status::Ok {
                return Ok(full);
            }
            rows.push(full.content);
        }

        let mut writer = csv::WriterBuilder::new().delimiter(b';').from_path(path)?;
        writer.write_record(CSV_HEADER)?;
        for content in &rows {
            let categories = tag_names_of(content, "categories");
            let persons = tag_names_of(content, "persons");
            writer.write_record(&[
                content["amount"].as_i64().unwrap_or_default().to_string(),
                field_str(content, "kind"),
                field_str(content, "date"),
                field_str(content, "description"),
                serde_json::to_string(&categories)?,
                serde_json::to_string(&persons)?,
            ])?;
        }
        writer.flush()?;
        Ok(Reply::no_content("success"))
    }

    /// Reads a semicolon-delimited file in the export format, skipping rows
    /// that already exist as equivalent transactions. The first invalid row
    /// aborts the import; rows inserted before it remain (not atomic).
    pub fn import_csv(&self, path: &Path) -> Result<Reply> {
        let mut reader = csv::ReaderBuilder::new().delimiter(b';').from_path(path)?;
        let headers = reader.headers()?.clone();
        let mut columns = [0usize; 6];
        for (slot, name) in columns.iter_mut().zip(CSV_HEADER) {
            match headers.iter().position(|h| h == name) {
                Some(index) => *slot = index,
                None => return Ok(Reply::invalid(format!("missing CSV column \"{name}\""))),
            }
        }
        let [idx_amount, idx_kind, idx_date, idx_description, idx_categories, idx_persons] =
            columns;

        let mut log = String::new();
        for record in reader.records() {
            let record = record?;
            let cell = |index: usize| record.get(index).unwrap_or("").to_string();

            let raw_amount = cell(idx_amount);
            let Ok(amount) = raw_amount.trim().parse::<i64>() else {
                return Ok(Reply::invalid(format!(
                    "amount is not an integer, got \"{raw_amount}\""
                )));
            };
            let kind = cell(idx_kind);
            let date = cell(idx_date);
            let description = cell(idx_description);
            let mut categories = parse_list_cell(&cell(idx_categories));
            categories.sort();
            let mut persons = parse_list_cell(&cell(idx_persons));
            persons.sort();

            if let Some(msg) = validate::check_transaction_input(&kind, &date) {
                return Ok(Reply::invalid(msg));
            }
            let kind = kind.to_lowercase();

            if self.exists_equivalent(amount, &kind, &date, &description, &categories, &persons) {
                continue;
            }

            let created =
                self.write_with_tags(amount, &kind, &date, &description, &categories, &persons);
            if !created.is_success() {
                return Ok(created);
            }
            log.push_str(&format!(
                "added transaction {amount} {kind} {date} \"{description}\" \
                 categories={categories:?} persons={persons:?}\n"
            ));
        }

        if log.is_empty() {
            Ok(Reply::no_content("success"))
        } else {
            Ok(Reply::new(Status::Created, Value::Array(vec![]), log))
        }
    }

    // -----------------------------------------------------------------------
    // Row helpers
    // -----------------------------------------------------------------------

    fn transaction_exists(&self, tx_id: i64) -> rusqlite::Result<bool> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE id = ?1)",
            [tx_id],
            |row| row.get(0),
        )
    }

    fn fetch_many(&self, sql: &str, params: impl rusqlite::Params) -> rusqlite::Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, Transaction::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn find_rows(&self, filter: &TransactionFilter) -> rusqlite::Result<Vec<Transaction>> {
        let mut clauses = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        if let Some(amount) = filter.amount {
            clauses.push("amount = ?");
            values.push(SqlValue::Integer(amount));
        }
        if let Some(kind) = &filter.kind {
            clauses.push("kind = ?");
            values.push(SqlValue::Text(kind.clone()));
        }
        if let Some(date) = &filter.date {
            clauses.push("date = ?");
            values.push(SqlValue::Text(date.clone()));
        }
        if let Some(description) = &filter.description {
            clauses.push("description = ?");
            values.push(SqlValue::Text(description.clone()));
        }
        let sql = format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE {}",
            clauses.join(" AND ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), Transaction::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn tag_rows(&self, kind: TagKind, tx_id: i64) -> rusqlite::Result<Vec<TagEntity>> {
        let sql = format!(
            "SELECT e.id, e.name FROM {} e JOIN {} t ON e.id = t.{} WHERE t.transaction_id = ?1",
            kind.table(),
            kind.junction_table(),
            kind.tag_column()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([tx_id], TagEntity::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn tag_names(&self, kind: TagKind, tx_id: i64) -> rusqlite::Result<Vec<String>> {
        Ok(self
            .tag_rows(kind, tx_id)?
            .into_iter()
            .map(|row| row.name)
            .collect())
    }
}

/// Two-stage list-cell parse: strict JSON string array first, then a
/// permissive fallback that strips one bracket layer and quote characters
/// and splits on commas.
fn parse_list_cell(cell: &str) -> Vec<String> {
    if let Ok(list) = serde_json::from_str::<Vec<String>>(cell) {
        return list;
    }
    cell.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|part| part.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

fn to_json(content: impl serde::Serialize) -> Value {
    serde_json::to_value(content).unwrap_or(Value::Null)
}

fn field_str(content: &Value, key: &str) -> String {
    content
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Flattens embedded tag rows down to their names, preserving order.
fn tag_names_of(content: &Value, key: &str) -> Vec<String> {
    content
        .get(key)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use serde_json::json;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_write_then_get_by_id_round_trips() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let created = ledger.write(500, "expense", "2024-01-05", "lunch");
        assert_eq!(created.status, Status::Created);
        assert_eq!(created.content["amount"], 500);
        assert_eq!(created.content["kind"], "expense");
        assert_eq!(created.content["date"], "2024-01-05");

        let fetched = ledger.get_by_id(created.content_id().unwrap());
        assert_eq!(fetched.status, Status::Ok);
        assert_eq!(fetched.content["description"], "lunch");
    }

    #[test]
    fn test_write_rejects_bad_input() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        assert_eq!(
            ledger.write(500, "transfer", "2024-01-05", "").status,
            Status::InvalidInput
        );
        assert_eq!(
            ledger.write(500, "expense", "05.01.2024", "").status,
            Status::InvalidInput
        );
    }

    #[test]
    fn test_write_normalizes_kind_case() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let created = ledger.write(500, "Deposit", "2024-01-05", "");
        assert_eq!(created.content["kind"], "deposit");
    }

    #[test]
    fn test_duplicate_write_conflicts() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        assert_eq!(
            ledger.write(500, "expense", "2024-01-05", "lunch").status,
            Status::Created
        );
        assert_eq!(
            ledger.write(500, "expense", "2024-01-05", "lunch").status,
            Status::Conflict
        );
        // A different description is a different transaction.
        assert_eq!(
            ledger.write(500, "expense", "2024-01-05", "dinner").status,
            Status::Created
        );
    }

    #[test]
    fn test_write_with_tags_creates_entities_and_links() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let created = ledger.write_with_tags(
            250,
            "expense",
            "2024-02-01",
            "groceries",
            &strings(&["food", "household"]),
            &strings(&["kari"]),
        );
        assert_eq!(created.status, Status::Created);
        let tx_id = created.content_id().unwrap();

        let categories = ledger.linked_categories(tx_id);
        assert_eq!(categories.content.as_array().unwrap().len(), 2);
        let persons = ledger.linked_people(tx_id);
        assert_eq!(persons.content.as_array().unwrap().len(), 1);
        assert_eq!(persons.content[0]["name"], "kari");

        // Entities were created on the fly.
        assert_eq!(ledger.categories().get_by_name("food").status, Status::Ok);
        assert_eq!(ledger.people().get_by_name("kari").status, Status::Ok);
    }

    #[test]
    fn test_write_with_tags_reuses_existing_entities() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let existing = ledger.categories().add("food").content_id().unwrap();
        ledger.write_with_tags(10, "expense", "2024-02-01", "a", &strings(&["food"]), &[]);
        let count: i64 = conn
            .query_row("SELECT count(*) FROM categories", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            ledger.categories().get_by_name("food").content_id(),
            Some(existing)
        );
    }

    #[test]
    fn test_duplicate_tagged_write_conflicts_order_insensitively() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let first = ledger.write_with_tags(
            100,
            "expense",
            "2024-03-01",
            "dinner",
            &strings(&["food", "restaurant"]),
            &strings(&["kari", "ola"]),
        );
        assert_eq!(first.status, Status::Created);
        let second = ledger.write_with_tags(
            100,
            "expense",
            "2024-03-01",
            "dinner",
            &strings(&["restaurant", "food"]),
            &strings(&["ola", "kari"]),
        );
        assert_eq!(second.status, Status::Conflict);
    }

    #[test]
    fn test_different_tag_sets_are_not_duplicates() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        ledger.write_with_tags(100, "expense", "2024-03-01", "x", &strings(&["food"]), &[]);
        let other = ledger.write_with_tags(
            100,
            "expense",
            "2024-03-01",
            "x",
            &strings(&["travel"]),
            &[],
        );
        assert_eq!(other.status, Status::Created);
    }

    #[test]
    fn test_fixed_dedup_distinguishes_person_sets() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        ledger.write_with_tags(
            100,
            "expense",
            "2024-03-01",
            "x",
            &strings(&["food"]),
            &strings(&["kari"]),
        );
        let other = ledger.write_with_tags(
            100,
            "expense",
            "2024-03-01",
            "x",
            &strings(&["food"]),
            &strings(&["ola"]),
        );
        assert_eq!(other.status, Status::Created);
    }

    #[test]
    fn test_legacy_dedup_ignores_person_sets() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn).with_dedup_mode(DedupMode::Legacy);
        ledger.write_with_tags(
            100,
            "expense",
            "2024-03-01",
            "x",
            &strings(&["food"]),
            &strings(&["kari"]),
        );
        // Same categories, different person: the legacy comparison re-checks
        // category names and calls this a duplicate.
        let other = ledger.write_with_tags(
            100,
            "expense",
            "2024-03-01",
            "x",
            &strings(&["food"]),
            &strings(&["ola"]),
        );
        assert_eq!(other.status, Status::Conflict);
    }

    #[test]
    fn test_link_requires_both_endpoints() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let tx_id = ledger
            .write(100, "expense", "2024-01-05", "")
            .content_id()
            .unwrap();
        let cat_id = ledger.categories().add("food").content_id().unwrap();

        assert_eq!(ledger.link_category(tx_id, cat_id).status, Status::Created);
        assert_eq!(ledger.link_category(99, cat_id).status, Status::InvalidInput);
        assert_eq!(ledger.link_category(tx_id, 99).status, Status::InvalidInput);
        assert_eq!(ledger.link_person(tx_id, 99).status, Status::InvalidInput);
    }

    #[test]
    fn test_link_allows_duplicate_links() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let tx_id = ledger
            .write(100, "expense", "2024-01-05", "")
            .content_id()
            .unwrap();
        let cat_id = ledger.categories().add("food").content_id().unwrap();
        ledger.link_category(tx_id, cat_id);
        ledger.link_category(tx_id, cat_id);
        let links: i64 = conn
            .query_row("SELECT count(*) FROM category_tag", [], |r| r.get(0))
            .unwrap();
        assert_eq!(links, 2);
    }

    #[test]
    fn test_get_full_embeds_tag_rows() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let created = ledger.write_with_tags(
            300,
            "reimbursement",
            "2024-04-01",
            "trip",
            &strings(&["travel"]),
            &strings(&["ola"]),
        );
        let full = ledger.get_full(created.content_id().unwrap());
        assert_eq!(full.status, Status::Ok);
        assert_eq!(full.content["amount"], 300);
        assert_eq!(full.content["categories"][0]["name"], "travel");
        assert_eq!(full.content["persons"][0]["name"], "ola");
        assert!(full.content["persons"][0]["id"].is_i64());
    }

    #[test]
    fn test_get_full_not_found() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        assert_eq!(ledger.get_full(42).status, Status::NotFound);
    }

    #[test]
    fn test_by_amount_named_and_symbolic_comparators_agree() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        for (amount, date) in [(50, "2024-01-01"), (100, "2024-01-02"), (150, "2024-01-03")] {
            ledger.write(amount, "expense", date, "");
        }
        let named = ledger.by_amount("greater than", 100);
        assert_eq!(named.status, Status::Ok);
        let symbolic = ledger.by_amount(">", 100);
        assert_eq!(named.content, symbolic.content);
        assert_eq!(named.content.as_array().unwrap().len(), 1);
        assert_eq!(named.content[0]["amount"], 150);

        assert_eq!(
            ledger.by_amount("not equal", 100).content.as_array().unwrap().len(),
            2
        );
        assert_eq!(
            ledger.by_amount("less or equal", 100).content.as_array().unwrap().len(),
            2
        );
    }

    #[test]
    fn test_by_amount_rejects_unknown_comparator() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        assert_eq!(ledger.by_amount("about", 100).status, Status::InvalidInput);
    }

    #[test]
    fn test_by_amount_no_match_is_no_content() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        assert_eq!(ledger.by_amount(">", 100).status, Status::NoContent);
    }

    #[test]
    fn test_by_kind() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        ledger.write(100, "deposit", "2024-01-01", "");
        ledger.write(50, "expense", "2024-01-02", "");
        let reply = ledger.by_kind("deposit");
        assert_eq!(reply.content.as_array().unwrap().len(), 1);
        assert_eq!(ledger.by_kind("withdrawal").status, Status::NoContent);
        assert_eq!(ledger.by_kind("transfer").status, Status::InvalidInput);
    }

    #[test]
    fn test_between_dates_inclusive_and_on_date() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        for date in ["2024-01-01", "2024-01-15", "2024-01-31", "2024-02-01"] {
            ledger.write(10, "expense", date, date);
        }
        let range = ledger.between_dates("2024-01-01", "2024-01-31");
        assert_eq!(range.content.as_array().unwrap().len(), 3);
        let single = ledger.on_date("2024-01-15");
        assert_eq!(single.content.as_array().unwrap().len(), 1);
        assert_eq!(
            ledger.between_dates("start", "2024-01-31").status,
            Status::InvalidInput
        );
        assert_eq!(
            ledger.between_dates("2024-01-01", "end").status,
            Status::InvalidInput
        );
    }

    #[test]
    fn test_by_description_is_case_sensitive_containment() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        ledger.write(10, "expense", "2024-01-01", "Lunch at work");
        ledger.write(20, "expense", "2024-01-02", "lunch again");
        let reply = ledger.by_description("lunch");
        assert_eq!(reply.status, Status::Ok);
        assert_eq!(reply.content.as_array().unwrap().len(), 1);
        assert_eq!(reply.content[0]["amount"], 20);
        // No match still reports Ok with an empty list.
        let empty = ledger.by_description("breakfast");
        assert_eq!(empty.status, Status::Ok);
        assert_eq!(empty.content.as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_find_by_fields_conjunction_and_zero_amount() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        ledger.write(0, "expense", "2024-01-01", "freebie");
        ledger.write(100, "expense", "2024-01-01", "");
        let filter = TransactionFilter {
            amount: Some(0),
            kind: Some("expense".into()),
            ..Default::default()
        };
        let reply = ledger.find_by_fields(&filter);
        assert_eq!(reply.status, Status::Ok);
        assert_eq!(reply.content.as_array().unwrap().len(), 1);
        assert_eq!(reply.content[0]["description"], "freebie");

        assert_eq!(
            ledger.find_by_fields(&TransactionFilter::default()).status,
            Status::InvalidInput
        );
        let missing = TransactionFilter {
            date: Some("1999-01-01".into()),
            ..Default::default()
        };
        assert_eq!(ledger.find_by_fields(&missing).status, Status::NotFound);
    }

    #[test]
    fn test_update_revalidates_and_reports_stale_id() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let tx_id = ledger
            .write(100, "expense", "2024-01-05", "old")
            .content_id()
            .unwrap();

        let updated = ledger.update(tx_id, 200, "deposit", "2024-01-06", "new");
        assert_eq!(updated.status, Status::Ok);
        assert_eq!(updated.content["amount"], 200);
        assert_eq!(updated.content["description"], "new");

        assert_eq!(
            ledger.update(tx_id, 200, "transfer", "2024-01-06", "x").status,
            Status::InvalidInput
        );
        assert_eq!(
            ledger.update(999, 200, "deposit", "2024-01-06", "x").status,
            Status::NoContent
        );
    }

    #[test]
    fn test_remap_tag_scoped_to_transaction() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let food = ledger.categories().add("food").content_id().unwrap();
        let travel = ledger.categories().add("travel").content_id().unwrap();
        let tx_a = ledger
            .write(10, "expense", "2024-01-01", "a")
            .content_id()
            .unwrap();
        let tx_b = ledger
            .write(20, "expense", "2024-01-02", "b")
            .content_id()
            .unwrap();
        ledger.link_category(tx_a, food);
        ledger.link_category(tx_b, food);

        let reply = ledger.remap_tag(TagKind::Category, tx_a, food, travel);
        assert_eq!(reply.status, Status::NoContent);
        assert_eq!(ledger.linked_categories(tx_a).content[0]["name"], "travel");
        // The other transaction keeps its original tag.
        assert_eq!(ledger.linked_categories(tx_b).content[0]["name"], "food");
    }

    #[test]
    fn test_remap_tag_missing_junction_table() {
        let (_dir, conn) = test_db();
        conn.execute_batch("DROP TABLE person_tag;").unwrap();
        let ledger = Ledger::new(&conn);
        let reply = ledger.remap_tag(TagKind::Person, 1, 1, 2);
        assert_eq!(reply.status, Status::NotFound);
        assert!(reply.message.contains("person_tag"));
    }

    #[test]
    fn test_remap_tag_no_match_is_noop_success() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        assert_eq!(
            ledger.remap_tag(TagKind::Category, 1, 1, 2).status,
            Status::NoContent
        );
    }

    #[test]
    fn test_remove_deletes_junction_rows_too() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let created = ledger.write_with_tags(
            100,
            "expense",
            "2024-01-05",
            "lunch",
            &strings(&["food"]),
            &strings(&["kari"]),
        );
        let tx_id = created.content_id().unwrap();

        assert_eq!(ledger.remove(tx_id).status, Status::NoContent);
        assert_eq!(ledger.get_by_id(tx_id).status, Status::NotFound);
        for table in ["category_tag", "person_tag"] {
            let count: i64 = conn
                .query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))
                .unwrap();
            assert_eq!(count, 0, "stale rows in {table}");
        }
        // Removing again still reports success.
        assert_eq!(ledger.remove(tx_id).status, Status::NoContent);
    }

    #[test]
    fn test_unlink_removes_single_pair() {
        let (_dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let tx_id = ledger
            .write(100, "expense", "2024-01-05", "")
            .content_id()
            .unwrap();
        let food = ledger.categories().add("food").content_id().unwrap();
        let travel = ledger.categories().add("travel").content_id().unwrap();
        ledger.link_category(tx_id, food);
        ledger.link_category(tx_id, travel);

        assert_eq!(ledger.unlink_category(tx_id, food).status, Status::NoContent);
        let left = ledger.linked_categories(tx_id);
        assert_eq!(left.content.as_array().unwrap().len(), 1);
        assert_eq!(left.content[0]["name"], "travel");
    }

    #[test]
    fn test_parse_list_cell_json_and_fallback() {
        assert_eq!(parse_list_cell(r#"["mat","reise"]"#), strings(&["mat", "reise"]));
        assert_eq!(parse_list_cell("[]"), Vec::<String>::new());
        // Permissive fallback: single-quoted literal with spaces.
        assert_eq!(
            parse_list_cell("['mat', 'reise']"),
            strings(&["mat", "reise"])
        );
        assert_eq!(parse_list_cell("mat, reise"), strings(&["mat", "reise"]));
        assert_eq!(parse_list_cell(""), Vec::<String>::new());
    }

    #[test]
    fn test_export_csv_writes_header_and_flattened_rows() {
        let (dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let created = ledger.write_with_tags(
            500,
            "expense",
            "2024-01-05",
            "lunch",
            &strings(&["food"]),
            &strings(&["kari", "ola"]),
        );
        let path = dir.path().join("out.csv");
        let entries = vec![json!({"id": created.content_id().unwrap()})];
        let reply = ledger.export_csv(&entries, &path).unwrap();
        assert_eq!(reply.status, Status::NoContent);

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "pris;type;dato;beskrivelse;kategorier;personer");
        let row = lines.next().unwrap();
        assert!(row.starts_with("500;expense;2024-01-05;lunch;"));
        assert!(row.contains(r#"[""food""]"#) || row.contains(r#"["food"]"#));
    }

    #[test]
    fn test_export_csv_rejects_bad_entries() {
        let (dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let path = dir.path().join("out.csv");
        let missing_id = ledger.export_csv(&[json!({"amount": 1})], &path).unwrap();
        assert_eq!(missing_id.status, Status::NotFound);
        let bad_id = ledger.export_csv(&[json!({"id": "seven"})], &path).unwrap();
        assert_eq!(bad_id.status, Status::InvalidInput);
        let unknown = ledger.export_csv(&[json!({"id": 99})], &path).unwrap();
        assert_eq!(unknown.status, Status::NotFound);
    }

    #[test]
    fn test_import_csv_round_trip() {
        let (dir, conn) = test_db();
        let path = dir.path().join("roundtrip.csv");
        {
            let ledger = Ledger::new(&conn);
            ledger.write_with_tags(
                500,
                "expense",
                "2024-01-05",
                "lunch",
                &strings(&["food"]),
                &strings(&["kari"]),
            );
            ledger.write(-200, "withdrawal", "2024-01-06", "cash");
            let entries = vec![json!({"id": 1}), json!({"id": 2})];
            ledger.export_csv(&entries, &path).unwrap();
        }

        let dir2 = tempfile::tempdir().unwrap();
        let conn2 = get_connection(&dir2.path().join("fresh.db")).unwrap();
        init_db(&conn2).unwrap();
        let fresh = Ledger::new(&conn2);
        let reply = fresh.import_csv(&path).unwrap();
        assert_eq!(reply.status, Status::Created);
        assert_eq!(reply.message.lines().count(), 2);

        let lunch = fresh.get_full(1);
        assert_eq!(lunch.content["amount"], 500);
        assert_eq!(lunch.content["categories"][0]["name"], "food");
        assert_eq!(lunch.content["persons"][0]["name"], "kari");

        // Importing the same file again inserts nothing.
        let again = fresh.import_csv(&path).unwrap();
        assert_eq!(again.status, Status::NoContent);
        assert_eq!(again.message, "success");
        let count: i64 = conn2
            .query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_import_csv_skips_equivalent_rows_only() {
        let (dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        ledger.write_with_tags(
            500,
            "expense",
            "2024-01-05",
            "lunch",
            &strings(&["food"]),
            &[],
        );
        let path = dir.path().join("mixed.csv");
        std::fs::write(
            &path,
            "pris;type;dato;beskrivelse;kategorier;personer\n\
             500;expense;2024-01-05;lunch;[\"food\"];[]\n\
             700;deposit;2024-01-07;;[];[]\n",
        )
        .unwrap();
        let reply = ledger.import_csv(&path).unwrap();
        assert_eq!(reply.status, Status::Created);
        assert_eq!(reply.message.lines().count(), 1);
        assert!(reply.message.contains("700"));
    }

    #[test]
    fn test_import_csv_aborts_on_invalid_row() {
        let (dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let path = dir.path().join("bad.csv");
        std::fs::write(
            &path,
            "pris;type;dato;beskrivelse;kategorier;personer\n\
             100;deposit;2024-01-01;;[];[]\n\
             oops;deposit;2024-01-02;;[];[]\n\
             300;deposit;2024-01-03;;[];[]\n",
        )
        .unwrap();
        let reply = ledger.import_csv(&path).unwrap();
        assert_eq!(reply.status, Status::InvalidInput);
        // The row before the bad one stays: the import is not atomic.
        let count: i64 = conn
            .query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_import_csv_requires_known_columns() {
        let (dir, conn) = test_db();
        let ledger = Ledger::new(&conn);
        let path = dir.path().join("wrong.csv");
        std::fs::write(&path, "amount;kind;date\n1;deposit;2024-01-01\n").unwrap();
        let reply = ledger.import_csv(&path).unwrap();
        assert_eq!(reply.status, Status::InvalidInput);
        assert!(reply.message.contains("pris"));
    }
}

use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::models::{TagEntity, Transaction};
use crate::response::{Reply, Status};

/// Selects the entity table, junction table and junction column for the two
/// tag kinds. All table and column names are static; caller input is never
/// interpolated into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Category,
    Person,
}

impl TagKind {
    pub fn table(&self) -> &'static str {
        match self {
            TagKind::Category => "categories",
            TagKind::Person => "people",
        }
    }

    pub fn junction_table(&self) -> &'static str {
        match self {
            TagKind::Category => "category_tag",
            TagKind::Person => "person_tag",
        }
    }

    pub fn tag_column(&self) -> &'static str {
        match self {
            TagKind::Category => "category_id",
            TagKind::Person => "person_id",
        }
    }

    pub fn noun(&self) -> &'static str {
        match self {
            TagKind::Category => "category",
            TagKind::Person => "person",
        }
    }

    pub fn noun_plural(&self) -> &'static str {
        match self {
            TagKind::Category => "categories",
            TagKind::Person => "people",
        }
    }

    pub fn parse(token: &str) -> Option<TagKind> {
        match token.to_lowercase().as_str() {
            "category" => Some(TagKind::Category),
            "person" => Some(TagKind::Person),
            _ => None,
        }
    }
}

/// CRUD over one of the two `(id, name)` entity tables. The contract is
/// identical for categories and people; the kind only picks table names.
pub struct Registry<'a> {
    conn: &'a Connection,
    kind: TagKind,
}

impl<'a> Registry<'a> {
    pub fn new(conn: &'a Connection, kind: TagKind) -> Self {
        Registry { conn, kind }
    }

    pub fn kind(&self) -> TagKind {
        self.kind
    }

    pub fn add(&self, name: &str) -> Reply {
        if name.trim().is_empty() {
            return Reply::invalid(format!("expected a {} name, got an empty string", self.kind.noun()));
        }
        let sql = format!(
            "INSERT INTO {}(name) VALUES (?1) RETURNING id, name",
            self.kind.table()
        );
        match self.conn.query_row(&sql, [name], TagEntity::from_row) {
            Ok(row) => Reply::created(row),
            Err(e) => Reply::schema_missing(format!(
                "could not add {} {name}: {e}",
                self.kind.noun()
            )),
        }
    }

    pub fn get_by_id(&self, id: i64) -> Reply {
        let sql = format!("SELECT id, name FROM {} WHERE id = ?1", self.kind.table());
        match self.conn.query_row(&sql, [id], TagEntity::from_row).optional() {
            Ok(Some(row)) => Reply::ok(row),
            Ok(None) => Reply::not_found(format!("no {} with id {id}", self.kind.noun())),
            Err(e) => Reply::schema_missing(format!("lookup failed: {e}")),
        }
    }

    pub fn get_by_name(&self, name: &str) -> Reply {
        let sql = format!("SELECT id, name FROM {} WHERE name = ?1", self.kind.table());
        match self.conn.query_row(&sql, [name], TagEntity::from_row).optional() {
            Ok(Some(row)) => Reply::ok(row),
            Ok(None) => Reply::not_found(format!("no {} named {name}", self.kind.noun())),
            Err(e) => Reply::schema_missing(format!("lookup failed: {e}")),
        }
    }

    /// Resolve an existing entity by name, creating it when absent.
    pub fn get_or_create(&self, name: &str) -> Reply {
        let found = self.get_by_name(name);
        if found.status == Status::NotFound {
            return self.add(name);
        }
        found
    }

    /// All transactions this entity is linked to, fetched in one batched
    /// `IN (…)` query over the junction rows.
    pub fn linked_transactions(&self, id: i64) -> Reply {
        let sql = format!(
            "SELECT transaction_id FROM {} WHERE {} = ?1",
            self.kind.junction_table(),
            self.kind.tag_column()
        );
        let ids: Vec<i64> = match self
            .conn
            .prepare(&sql)
            .and_then(|mut stmt| {
                stmt.query_map([id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<i64>>>()
            }) {
            Ok(ids) => ids,
            Err(e) => return Reply::schema_missing(format!("lookup failed: {e}")),
        };

        if ids.is_empty() {
            return Reply::no_content(format!(
                "no transactions linked to {} {id}",
                self.kind.noun()
            ));
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT id, amount, kind, date, description FROM transactions WHERE id IN ({placeholders})"
        );
        match self.conn.prepare(&sql).and_then(|mut stmt| {
            stmt.query_map(params_from_iter(ids), Transaction::from_row)?
                .collect::<rusqlite::Result<Vec<Transaction>>>()
        }) {
            Ok(rows) => Reply::ok(rows),
            Err(e) => Reply::schema_missing(format!("lookup failed: {e}")),
        }
    }

    pub fn update(&self, id: i64, new_name: &str) -> Reply {
        if new_name.trim().is_empty() {
            return Reply::invalid(format!("expected a {} name, got an empty string", self.kind.noun()));
        }
        let sql = format!(
            "UPDATE {} SET name = ?1 WHERE id = ?2 RETURNING id, name",
            self.kind.table()
        );
        match self
            .conn
            .query_row(&sql, rusqlite::params![new_name, id], TagEntity::from_row)
            .optional()
        {
            // A stale id is not an error: nothing matched, nothing changed.
            Ok(None) => Reply::no_content(format!("nothing updated; {} {id} may not exist", self.kind.noun())),
            Ok(Some(row)) => Reply::ok(row),
            Err(e) => Reply::schema_missing(format!("update failed: {e}")),
        }
    }

    /// Deletes the entity and its junction rows. Idempotent: reports success
    /// even when nothing existed.
    pub fn remove(&self, id: i64) -> Reply {
        let sql = format!("DELETE FROM {} WHERE id = ?1", self.kind.table());
        if let Err(e) = self.conn.execute(&sql, [id]) {
            return Reply::schema_missing(format!("delete failed: {e}"));
        }
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            self.kind.junction_table(),
            self.kind.tag_column()
        );
        if let Err(e) = self.conn.execute(&sql, [id]) {
            return Reply::schema_missing(format!("delete failed: {e}"));
        }
        Reply::no_content("success")
    }

    pub fn list(&self) -> Reply {
        let sql = format!("SELECT id, name FROM {} ORDER BY name ASC", self.kind.table());
        match self.conn.prepare(&sql).and_then(|mut stmt| {
            stmt.query_map([], TagEntity::from_row)?
                .collect::<rusqlite::Result<Vec<TagEntity>>>()
        }) {
            Ok(rows) if rows.is_empty() => {
                Reply::no_content(format!("no {} registered", self.kind.noun_plural()))
            }
            Ok(rows) => Reply::ok(rows),
            Err(e) => Reply::schema_missing(format!("lookup failed: {e}")),
        }
    }
}

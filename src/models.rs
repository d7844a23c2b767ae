use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub amount: i64,
    pub kind: String,
    pub date: String,
    #[serde(default)]
    pub description: String,
}

impl Transaction {
    /// Row mapper for `SELECT id, amount, kind, date, description` shapes.
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        Ok(Transaction {
            id: row.get(0)?,
            amount: row.get(1)?,
            kind: row.get(2)?,
            date: row.get(3)?,
            description: row.get(4)?,
        })
    }
}

/// A category or person row. Both registries share the two-column
/// `(id, name)` shape; name is the natural key, id the surrogate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntity {
    pub id: i64,
    pub name: String,
}

impl TagEntity {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<TagEntity> {
        Ok(TagEntity {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }
}

/// Conjunctive filter over transaction fields. `None` means the field does
/// not participate; `Some(0)` is a real zero-amount filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub amount: Option<i64>,
    pub kind: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
}

impl TransactionFilter {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.kind.is_none()
            && self.date.is_none()
            && self.description.is_none()
    }
}

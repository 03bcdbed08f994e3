use serde::{Deserialize, Serialize};

/// Backend tables that emit row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Offers,
    Messages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// A row-level change delivered by the change feed.
///
/// `record` is the new row exactly as the feed encoded it; consumers decode
/// it into the model type they expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub table: Table,
    pub kind: ChangeKind,
    pub record: serde_json::Value,
}

impl RowChange {
    pub fn new<T: Serialize>(table: Table, kind: ChangeKind, row: &T) -> serde_json::Result<Self> {
        Ok(Self {
            table,
            kind,
            record: serde_json::to_value(row)?,
        })
    }
}

/// `(table, event, column = value)` listener filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: Table,
    pub kind: ChangeKind,
    pub column: String,
    pub value: String,
}

impl ChangeFilter {
    pub fn new(table: Table, kind: ChangeKind, column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            table,
            kind,
            column: column.into(),
            value: value.to_string(),
        }
    }

    pub fn matches(&self, change: &RowChange) -> bool {
        change.table == self.table
            && change.kind == self.kind
            && change
                .record
                .get(&self.column)
                .and_then(|v| v.as_str())
                .is_some_and(|v| v == self.value)
    }
}

//! Result rows and row mapping traits

use crate::error::{OrmError, OrmResult};
use crate::value::{FromValue, Value, decode};

/// A single result row: ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append, handy for scripting backend responses.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// Append a column. A repeated column name replaces the earlier value.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Typed access to a column.
    pub fn try_get<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| OrmError::decode(column, "column not present in row"))?;
        decode(column, value)
    }
}

/// Buffered result of a SELECT.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    rows: Vec<Row>,
    freed: bool,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows, freed: false }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// First row, if any.
    pub fn row(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn result(&self) -> &[Row] {
        &self.rows
    }

    /// Release the backing buffer once the rows have been consumed.
    pub fn free(&mut self) {
        self.rows = Vec::new();
        self.freed = true;
    }

    pub fn is_freed(&self) -> bool {
        self.freed
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Trait for types that can be built from a [`Row`].
///
/// Entities convert to rows with [`Entity::to_row`](crate::Entity::to_row), so
/// this is also how a fetched entity is decoded into a plain struct.
///
/// # Example
/// ```ignore
/// struct Post { id: i64, title: String }
///
/// impl FromRow for Post {
///     fn from_row(row: &Row) -> OrmResult<Self> {
///         Ok(Self { id: row.try_get("id")?, title: row.try_get("title")? })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> OrmResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_replaces_duplicate_columns() {
        let mut row = Row::new().with("id", 1).with("title", "a");
        row.push("title", "b");
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("title"), Some(&Value::from("b")));
    }

    #[test]
    fn try_get_reports_missing_column() {
        let row = Row::new().with("id", "3");
        assert_eq!(row.try_get::<i64>("id").unwrap(), 3);
        let err = row.try_get::<i64>("missing").unwrap_err();
        assert!(matches!(err, OrmError::Decode { .. }));
    }

    #[test]
    fn free_drops_rows() {
        let mut rs = ResultSet::new(vec![Row::new().with("id", 1)]);
        assert_eq!(rs.num_rows(), 1);
        rs.free();
        assert!(rs.is_freed());
        assert_eq!(rs.num_rows(), 0);
    }
}

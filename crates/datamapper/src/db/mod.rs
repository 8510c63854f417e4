//! The database collaborator.
//!
//! The mapper builds SQL itself (see [`crate::query`]) and only needs a
//! backend that can run statements, report generated ids and list a table's
//! columns. Everything else (escaping, identifier protection, `?` binding,
//! transaction bookkeeping) is provided on top of those primitives.
//!
//! Calls are synchronous: each one blocks until the backend answers.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod transaction;

pub use memory::MemoryDatabase;
#[cfg(feature = "postgres")]
pub use postgres::PgDatabase;
pub use transaction::{TransactionEnd, TransactionState};

use crate::error::{OrmError, OrmResult};
use crate::ident;
use crate::row::ResultSet;
use crate::value::Value;

/// Column metadata reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: String,
    pub data_type: Option<String>,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
        }
    }
}

/// A backend the mapper can execute SQL against.
pub trait Database: Send + Sync {
    /// Run a statement that returns rows.
    fn query(&self, sql: &str) -> OrmResult<ResultSet>;

    /// Run a statement and return the number of affected rows.
    fn execute(&self, sql: &str) -> OrmResult<u64>;

    /// Id generated by the last INSERT on this connection.
    fn insert_id(&self) -> OrmResult<Option<i64>>;

    /// Columns of `table`, in table order. Unknown tables yield an empty list.
    fn field_metadata(&self, table: &str) -> OrmResult<Vec<FieldMeta>>;

    fn transaction_state(&self) -> &TransactionState;

    /// Render a value as a SQL literal.
    fn escape(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => self.escape_str(s),
        }
    }

    /// Quote a string literal.
    fn escape_str(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Quote the identifier part of `item` where needed.
    fn protect_identifiers(&self, item: &str) -> String {
        ident::protect_identifiers(item)
    }

    /// Substitute `?` placeholders with escaped values and run the query.
    fn query_binds(&self, sql: &str, binds: &[Value]) -> OrmResult<ResultSet> {
        let sql = bind_placeholders(sql, binds, |v| self.escape(v))?;
        self.query(&sql)
    }

    /// Begin (or nest) a transaction.
    fn trans_begin(&self) -> OrmResult<()> {
        if self.transaction_state().begin() {
            self.execute("BEGIN")?;
        }
        Ok(())
    }

    /// Complete the current transaction level.
    ///
    /// Returns `false` when the transaction has failed (and, at the outermost
    /// level, has been rolled back).
    fn trans_complete(&self) -> OrmResult<bool> {
        match self.transaction_state().complete() {
            TransactionEnd::Pending(status) => Ok(status),
            TransactionEnd::Commit => {
                self.execute("COMMIT")?;
                Ok(true)
            }
            TransactionEnd::Rollback => {
                self.execute("ROLLBACK")?;
                Ok(false)
            }
        }
    }

    /// Commit every open level immediately.
    fn trans_commit(&self) -> OrmResult<()> {
        if self.transaction_state().reset() {
            self.execute("COMMIT")?;
        }
        Ok(())
    }

    /// Roll back every open level immediately.
    fn trans_rollback(&self) -> OrmResult<()> {
        if self.transaction_state().reset() {
            self.execute("ROLLBACK")?;
        }
        Ok(())
    }

    /// Mark the current transaction as failed.
    fn trans_fail(&self) {
        self.transaction_state().fail();
    }

    fn trans_status(&self) -> bool {
        self.transaction_state().status()
    }

    fn trans_strict(&self, strict: bool) {
        self.transaction_state().set_strict(strict);
    }

    /// Disable transactions on this connection.
    fn trans_off(&self) {
        self.transaction_state().set_enabled(false);
    }
}

/// Replace each `?` outside string literals with the next rendered bind.
pub(crate) fn bind_placeholders(
    sql: &str,
    binds: &[Value],
    render: impl Fn(&Value) -> String,
) -> OrmResult<String> {
    let mut out = String::with_capacity(sql.len() + binds.len() * 8);
    let mut binds = binds.iter();
    let mut in_literal = false;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_literal = !in_literal;
                out.push(ch);
            }
            '?' if !in_literal => {
                let value = binds.next().ok_or_else(|| {
                    OrmError::query_build("more '?' placeholders than bound values")
                })?;
                out.push_str(&render(value));
            }
            _ => out.push(ch),
        }
    }
    if binds.next().is_some() {
        return Err(OrmError::query_build(
            "more bound values than '?' placeholders",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_literals() {
        let db = MemoryDatabase::new();
        assert_eq!(db.escape(&Value::from("O'Brien")), "'O''Brien'");
        assert_eq!(db.escape(&Value::Null), "NULL");
        assert_eq!(db.escape(&Value::from(3)), "3");
        assert_eq!(db.escape(&Value::from(true)), "TRUE");
    }

    #[test]
    fn binds_placeholders_outside_literals() {
        let sql = bind_placeholders(
            "SELECT * FROM posts WHERE title = ? AND body <> '?' AND id = ?",
            &[Value::from("it's"), Value::from(4)],
            |v| MemoryDatabase::new().escape(v),
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM posts WHERE title = 'it''s' AND body <> '?' AND id = 4"
        );
    }

    #[test]
    fn bind_count_mismatch_is_an_error() {
        let err = bind_placeholders("SELECT ?", &[], |v| v.to_string()).unwrap_err();
        assert!(matches!(err, OrmError::QueryBuild(_)));
        assert!(bind_placeholders("SELECT 1", &[Value::from(1)], |v| v.to_string()).is_err());
    }

    #[test]
    fn transaction_round_trip_is_logged() {
        let db = MemoryDatabase::new();
        db.trans_begin().unwrap();
        db.trans_begin().unwrap();
        assert!(db.trans_complete().unwrap());
        assert!(db.trans_complete().unwrap());
        assert_eq!(db.log(), vec!["BEGIN".to_string(), "COMMIT".to_string()]);
    }
}

//! SQL logging via `tracing`.
//!
//! [`TracingDatabase`] wraps any backend and emits one event per statement on
//! the `datamapper.sql` target before handing it over.
//!
//! ```ignore
//! use datamapper::{MemoryDatabase, TracingDatabase};
//! use tracing::Level;
//!
//! let db = TracingDatabase::new(MemoryDatabase::new())
//!     .level(Level::INFO)
//!     .max_sql_length(500);
//! ```

use tracing::Level;

use crate::db::{Database, FieldMeta, TransactionState};
use crate::error::OrmResult;
use crate::row::ResultSet;
use crate::value::Value;

/// Type of SQL statement, detected from its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    /// BEGIN / COMMIT / ROLLBACK
    Transaction,
    Other,
}

impl QueryType {
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        let keyword: String = trimmed
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();
        match keyword.as_str() {
            "SELECT" => QueryType::Select,
            "INSERT" => QueryType::Insert,
            "UPDATE" => QueryType::Update,
            "DELETE" => QueryType::Delete,
            "BEGIN" | "COMMIT" | "ROLLBACK" => QueryType::Transaction,
            _ => QueryType::Other,
        }
    }
}

/// A backend wrapper that logs every statement through `tracing`.
#[derive(Debug, Clone)]
pub struct TracingDatabase<D> {
    inner: D,
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in bytes, on a char boundary). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl<D: Database> TracingDatabase<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            level: Level::DEBUG,
            max_sql_length: Some(200),
        }
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    fn truncate_sql<'a>(&self, sql: &'a str) -> std::borrow::Cow<'a, str> {
        match self.max_sql_length {
            Some(max) if sql.len() > max => {
                let mut end = max;
                while !sql.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{}...", &sql[..end]).into()
            }
            _ => sql.into(),
        }
    }

    fn emit(&self, sql: &str) {
        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let query_type = QueryType::from_sql(sql);
        let shown = self.truncate_sql(sql);
        emit_at_level!(
            self.level,
            target: "datamapper.sql",
            query_type = ?query_type,
            sql = %shown,
        );
    }
}

impl<D: Database> Database for TracingDatabase<D> {
    fn query(&self, sql: &str) -> OrmResult<ResultSet> {
        self.emit(sql);
        self.inner.query(sql)
    }

    fn execute(&self, sql: &str) -> OrmResult<u64> {
        self.emit(sql);
        self.inner.execute(sql)
    }

    fn insert_id(&self) -> OrmResult<Option<i64>> {
        self.inner.insert_id()
    }

    fn field_metadata(&self, table: &str) -> OrmResult<Vec<FieldMeta>> {
        self.inner.field_metadata(table)
    }

    fn transaction_state(&self) -> &TransactionState {
        self.inner.transaction_state()
    }

    fn escape(&self, value: &Value) -> String {
        self.inner.escape(value)
    }

    fn escape_str(&self, s: &str) -> String {
        self.inner.escape_str(s)
    }

    fn protect_identifiers(&self, item: &str) -> String {
        self.inner.protect_identifiers(item)
    }
}

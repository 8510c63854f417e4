//! In-process recording backend.
//!
//! `MemoryDatabase` does not interpret SQL. It records every statement it is
//! given and answers SELECTs from scripted responses, which is what the
//! mapper's own tests need: assert on the exact SQL that was produced and
//! feed back the rows a real server would have returned.
//!
//! # Example
//! ```ignore
//! let db = MemoryDatabase::new().with_table("posts", &["id", "title"]);
//! db.respond("FROM posts", vec![Row::new().with("id", 1).with("title", "Hello")]);
//! db.fail_on("INSERT INTO audit");
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Database, FieldMeta, TransactionState};
use crate::error::{OrmError, OrmResult};
use crate::row::{ResultSet, Row};

#[derive(Debug)]
struct Scripted {
    pattern: String,
    rows: Vec<Row>,
    once: bool,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Vec<FieldMeta>>,
    log: Vec<String>,
    responses: Vec<Scripted>,
    failures: Vec<String>,
    last_insert_id: Option<i64>,
    next_id: i64,
    affected_rows: u64,
}

/// A scriptable backend that records all SQL it receives.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
    transactions: TransactionState,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        let db = Self::default();
        db.lock().affected_rows = 1;
        db
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a table and its columns (builder form).
    pub fn with_table(self, table: &str, columns: &[&str]) -> Self {
        self.add_table(table, columns);
        self
    }

    pub fn add_table(&self, table: &str, columns: &[&str]) {
        let fields = columns.iter().map(|c| FieldMeta::new(*c)).collect();
        self.lock().tables.insert(table.to_string(), fields);
    }

    /// Answer every SELECT containing `pattern` with `rows`.
    ///
    /// Responses are matched in registration order; the first match wins.
    pub fn respond(&self, pattern: impl Into<String>, rows: Vec<Row>) {
        self.lock().responses.push(Scripted {
            pattern: pattern.into(),
            rows,
            once: false,
        });
    }

    /// Like [`respond`](Self::respond), but the response is consumed by its first match.
    pub fn respond_once(&self, pattern: impl Into<String>, rows: Vec<Row>) {
        self.lock().responses.push(Scripted {
            pattern: pattern.into(),
            rows,
            once: true,
        });
    }

    /// Make every statement containing `pattern` fail with a query error.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.lock().failures.push(pattern.into());
    }

    /// Row count reported by subsequent UPDATE/DELETE statements.
    pub fn set_affected_rows(&self, rows: u64) {
        self.lock().affected_rows = rows;
    }

    /// Set the id the next INSERT will report minus one.
    pub fn set_next_id(&self, last_used: i64) {
        self.lock().next_id = last_used;
    }

    /// All statements received so far.
    pub fn log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Statements received so far that start with `keyword` (case-insensitive).
    pub fn statements(&self, keyword: &str) -> Vec<String> {
        let keyword = keyword.to_ascii_uppercase();
        self.lock()
            .log
            .iter()
            .filter(|sql| sql.trim_start().to_ascii_uppercase().starts_with(&keyword))
            .cloned()
            .collect()
    }

    pub fn last_statement(&self) -> Option<String> {
        self.lock().log.last().cloned()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    fn record(&self, sql: &str) -> OrmResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.log.push(sql.to_string());
        if let Some(pattern) = state.failures.iter().find(|p| sql.contains(p.as_str())) {
            return Err(OrmError::Query(format!(
                "statement rejected (matched '{pattern}'): {sql}"
            )));
        }
        Ok(state)
    }
}

impl Database for MemoryDatabase {
    fn query(&self, sql: &str) -> OrmResult<ResultSet> {
        let mut state = self.record(sql)?;
        let Some(pos) = state
            .responses
            .iter()
            .position(|r| sql.contains(r.pattern.as_str()))
        else {
            return Ok(ResultSet::default());
        };
        let rows = if state.responses[pos].once {
            state.responses.remove(pos).rows
        } else {
            state.responses[pos].rows.clone()
        };
        Ok(ResultSet::new(rows))
    }

    fn execute(&self, sql: &str) -> OrmResult<u64> {
        let mut state = self.record(sql)?;
        if sql.trim_start().to_ascii_uppercase().starts_with("INSERT") {
            state.next_id += 1;
            state.last_insert_id = Some(state.next_id);
            return Ok(1);
        }
        match sql.trim() {
            "BEGIN" | "COMMIT" | "ROLLBACK" => Ok(0),
            _ => Ok(state.affected_rows),
        }
    }

    fn insert_id(&self) -> OrmResult<Option<i64>> {
        Ok(self.lock().last_insert_id)
    }

    fn field_metadata(&self, table: &str) -> OrmResult<Vec<FieldMeta>> {
        Ok(self.lock().tables.get(table).cloned().unwrap_or_default())
    }

    fn transaction_state(&self) -> &TransactionState {
        &self.transactions
    }
}

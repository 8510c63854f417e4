//! Blocking PostgreSQL backend.
//!
//! Wraps a `tokio_postgres::Client` and drives it from a private
//! current-thread runtime, so the mapper's synchronous call model is kept.
//! Statements go over the simple query protocol: the mapper already renders
//! escaped literals, and every value comes back as text.

use tokio::runtime::Runtime;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

use super::{Database, FieldMeta, TransactionState};
use crate::error::{OrmError, OrmResult};
use crate::row::{ResultSet, Row};
use crate::value::Value;

/// A PostgreSQL connection usable as a mapper [`Database`].
pub struct PgDatabase {
    client: Client,
    runtime: Runtime,
    transactions: TransactionState,
}

impl PgDatabase {
    /// Connect using a libpq-style connection string or URL.
    pub fn connect(url: &str) -> OrmResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| OrmError::Connection(e.to_string()))?;
        let (client, connection) = runtime
            .block_on(tokio_postgres::connect(url, NoTls))
            .map_err(|e| OrmError::Connection(e.to_string()))?;
        // Polled whenever `block_on` drives the runtime.
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(target: "datamapper.db", error = %e, "postgres connection error");
            }
        });
        Ok(Self {
            client,
            runtime,
            transactions: TransactionState::new(),
        })
    }

    fn simple_query(&self, sql: &str) -> OrmResult<Vec<SimpleQueryMessage>> {
        Ok(self.runtime.block_on(self.client.simple_query(sql))?)
    }
}

impl std::fmt::Debug for PgDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDatabase")
            .field("closed", &self.client.is_closed())
            .field("transactions", &self.transactions)
            .finish()
    }
}

impl Database for PgDatabase {
    fn query(&self, sql: &str) -> OrmResult<ResultSet> {
        let mut rows = Vec::new();
        for message in self.simple_query(sql)? {
            if let SimpleQueryMessage::Row(pg_row) = message {
                let mut row = Row::new();
                for (i, column) in pg_row.columns().iter().enumerate() {
                    let value = pg_row
                        .get(i)
                        .map_or(Value::Null, |text| Value::Text(text.to_string()));
                    row.push(column.name(), value);
                }
                rows.push(row);
            }
        }
        Ok(ResultSet::new(rows))
    }

    fn execute(&self, sql: &str) -> OrmResult<u64> {
        let affected = self
            .simple_query(sql)?
            .into_iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::CommandComplete(n) => Some(n),
                _ => None,
            })
            .last()
            .unwrap_or(0);
        Ok(affected)
    }

    fn insert_id(&self) -> OrmResult<Option<i64>> {
        let rows = self.query("SELECT lastval() AS id")?;
        match rows.row() {
            Some(row) => row.try_get("id"),
            None => Ok(None),
        }
    }

    fn field_metadata(&self, table: &str) -> OrmResult<Vec<FieldMeta>> {
        let sql = format!(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = {} \
             ORDER BY ordinal_position",
            self.escape_str(table)
        );
        self.query(&sql)?
            .result()
            .iter()
            .map(|row| {
                Ok(FieldMeta {
                    name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                })
            })
            .collect()
    }

    fn transaction_state(&self) -> &TransactionState {
        &self.transactions
    }
}

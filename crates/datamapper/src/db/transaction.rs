//! Transaction bookkeeping shared by every backend.
//!
//! Backends only know how to run `BEGIN`/`COMMIT`/`ROLLBACK`; the depth
//! counter, failure status and strict mode live in [`TransactionState`], and
//! the provided methods of [`Database`](super::Database) drive it.
//!
//! Semantics:
//! - `begin` on an idle connection issues `BEGIN`; nested begins only bump the depth.
//! - `complete` on a nested level only decrements the depth and reports the
//!   current status.
//! - `complete` on the outermost level commits when nothing failed, otherwise
//!   rolls back. In non-strict mode the failure status is then reset, so the
//!   next transaction starts clean; in strict mode it sticks and every later
//!   transaction group rolls back too.
//!
//! For explicit commit/rollback around a block, use the [`transaction!`] macro.
//!
//! # Example
//!
//! ```ignore
//! use datamapper::{Database, OrmResult};
//!
//! fn transfer(db: &dyn Database) -> OrmResult<()> {
//!     datamapper::transaction!(db, {
//!         db.execute("UPDATE accounts SET balance = balance - 100 WHERE id = 1")?;
//!         db.execute("UPDATE accounts SET balance = balance + 100 WHERE id = 2")?;
//!         Ok(())
//!     })
//! }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::OrmResult;

/// Runs the given block inside a mapper-tracked transaction.
///
/// - Begins (or nests) a transaction via `trans_begin`.
/// - Completes on `Ok(_)`; if the transaction was marked failed meanwhile the
///   outermost level rolls back and the macro reports `OrmError::Query`.
/// - Marks the transaction failed and completes (rolling back) on `Err(_)`.
///
/// The block must evaluate to `datamapper::OrmResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($db:expr, $body:block) => {{
        let __dm_db = $db;
        $crate::Database::trans_begin(__dm_db)?;
        let __dm_result: $crate::OrmResult<_> = (|| $body)();
        match __dm_result {
            Ok(value) => {
                if $crate::Database::trans_complete(__dm_db)? {
                    Ok(value)
                } else {
                    Err($crate::OrmError::Query(
                        "transaction rolled back".to_string(),
                    ))
                }
            }
            Err(error) => {
                $crate::Database::trans_fail(__dm_db);
                match $crate::Database::trans_complete(__dm_db) {
                    Ok(_) => Err(error),
                    Err(rollback_err) => Err($crate::OrmError::Other(format!(
                        "{error} (rollback failed: {rollback_err})"
                    ))),
                }
            }
        }
    }};
}

/// What the caller must do after [`TransactionState::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEnd {
    /// Still nested (or no transaction open); carries the current status.
    Pending(bool),
    Commit,
    Rollback,
}

#[derive(Debug)]
struct Inner {
    enabled: bool,
    depth: u32,
    status: bool,
    strict: bool,
}

/// Depth/status/strictness of the connection's transaction.
#[derive(Debug)]
pub struct TransactionState {
    inner: Mutex<Inner>,
}

impl Default for TransactionState {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                enabled: true,
                depth: 0,
                status: true,
                strict: true,
            }),
        }
    }
}

impl TransactionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter a transaction level. Returns `true` when `BEGIN` must be issued.
    pub fn begin(&self) -> bool {
        let mut inner = self.lock();
        if !inner.enabled {
            return false;
        }
        inner.depth += 1;
        inner.depth == 1
    }

    /// Leave a transaction level.
    pub fn complete(&self) -> TransactionEnd {
        let mut inner = self.lock();
        match inner.depth {
            0 => TransactionEnd::Pending(inner.status),
            1 => {
                inner.depth = 0;
                if inner.status {
                    TransactionEnd::Commit
                } else {
                    if !inner.strict {
                        inner.status = true;
                    }
                    TransactionEnd::Rollback
                }
            }
            _ => {
                inner.depth -= 1;
                TransactionEnd::Pending(inner.status)
            }
        }
    }

    /// Drop every level at once (explicit commit/rollback). Returns `true`
    /// when a transaction was open.
    pub fn reset(&self) -> bool {
        let mut inner = self.lock();
        let open = inner.depth > 0;
        inner.depth = 0;
        if !inner.strict {
            inner.status = true;
        }
        open
    }

    /// Mark the running transaction as failed.
    pub fn fail(&self) {
        let mut inner = self.lock();
        if inner.depth > 0 {
            inner.status = false;
        }
    }

    /// Mark the transaction failed if `result` is a database error.
    pub fn track<T>(&self, result: &OrmResult<T>) {
        if let Err(err) = result {
            if err.is_database() {
                self.fail();
            }
        }
    }

    pub fn status(&self) -> bool {
        self.lock().status
    }

    pub fn depth(&self) -> u32 {
        self.lock().depth
    }

    pub fn set_strict(&self, strict: bool) {
        self.lock().strict = strict;
    }

    /// Disable (or re-enable) transactions altogether.
    pub fn set_enabled(&self, enabled: bool) {
        self.lock().enabled = enabled;
    }

    /// Clear a sticky failure left behind by strict mode.
    pub fn clear_status(&self) {
        self.lock().status = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrmError;

    #[test]
    fn nested_levels_only_commit_at_the_top() {
        let state = TransactionState::new();
        assert!(state.begin());
        assert!(!state.begin());
        assert_eq!(state.complete(), TransactionEnd::Pending(true));
        assert_eq!(state.complete(), TransactionEnd::Commit);
        assert_eq!(state.depth(), 0);
    }

    #[test]
    fn strict_failure_sticks() {
        let state = TransactionState::new();
        state.begin();
        state.track::<()>(&Err(OrmError::Query("boom".into())));
        assert_eq!(state.complete(), TransactionEnd::Rollback);
        assert!(!state.status());

        state.begin();
        assert_eq!(state.complete(), TransactionEnd::Rollback);
    }

    #[test]
    fn non_strict_failure_is_isolated() {
        let state = TransactionState::new();
        state.set_strict(false);
        state.begin();
        state.fail();
        assert_eq!(state.complete(), TransactionEnd::Rollback);
        assert!(state.status());
        state.begin();
        assert_eq!(state.complete(), TransactionEnd::Commit);
    }

    #[test]
    fn non_database_errors_do_not_fail_transaction() {
        let state = TransactionState::new();
        state.begin();
        state.track::<()>(&Err(OrmError::config("bad model")));
        assert!(state.status());
        assert_eq!(state.complete(), TransactionEnd::Commit);
    }

    #[test]
    fn disabled_transactions_never_begin() {
        let state = TransactionState::new();
        state.set_enabled(false);
        assert!(!state.begin());
        assert_eq!(state.complete(), TransactionEnd::Pending(true));
    }
}

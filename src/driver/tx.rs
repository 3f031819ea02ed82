use parking_lot::Mutex;

use super::{Driver, ExecResult, Rows, Transaction};
use crate::{context::Context, dialect::Dialect, errors::EntError, sql::Statement};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
}

/// Driver scoped to one transaction.
///
/// Every statement, `commit` and `rollback` fails with `TransactionClosed`
/// once the transaction has been committed or rolled back, and `tx` fails
/// with `NestedTransaction`. The state lock is held while a statement runs,
/// so a commit never interleaves with an in-flight statement.
pub struct TxDriver {
    tx: Box<dyn Transaction>,
    dialect: Dialect,
    state: Mutex<TxState>,
}

impl TxDriver {
    pub fn new(tx: Box<dyn Transaction>, dialect: Dialect) -> Self {
        Self {
            tx,
            dialect,
            state: Mutex::new(TxState::Active),
        }
    }

    pub fn state(&self) -> TxState {
        *self.state.lock()
    }

    pub fn commit(&self) -> Result<(), EntError> {
        let mut state = self.state.lock();
        if *state != TxState::Active {
            return Err(EntError::TransactionClosed);
        }
        match self.tx.commit() {
            Ok(()) => {
                *state = TxState::Committed;
                tracing::debug!("transaction committed");
                Ok(())
            }
            Err(err) => {
                // A failed commit leaves nothing to retry; release the transaction.
                if let Err(rollback) = self.tx.rollback() {
                    tracing::warn!(error = %rollback, "rollback after failed commit");
                }
                *state = TxState::RolledBack;
                Err(err)
            }
        }
    }

    pub fn rollback(&self) -> Result<(), EntError> {
        let mut state = self.state.lock();
        if *state != TxState::Active {
            return Err(EntError::TransactionClosed);
        }
        *state = TxState::RolledBack;
        tracing::debug!("transaction rolled back");
        self.tx.rollback()
    }
}

impl Driver for TxDriver {
    fn exec(&self, ctx: &Context, stmt: &Statement) -> Result<ExecResult, EntError> {
        let state = self.state.lock();
        if *state != TxState::Active {
            return Err(EntError::TransactionClosed);
        }
        self.tx.exec(ctx, stmt)
    }

    fn query(&self, ctx: &Context, stmt: &Statement) -> Result<Rows, EntError> {
        let state = self.state.lock();
        if *state != TxState::Active {
            return Err(EntError::TransactionClosed);
        }
        self.tx.query(ctx, stmt)
    }

    fn tx(&self, _ctx: &Context) -> Result<Box<dyn Transaction>, EntError> {
        Err(EntError::NestedTransaction)
    }

    /// Closing is a no-op; the transaction ends through commit or rollback.
    fn close(&self) -> Result<(), EntError> {
        Ok(())
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn in_transaction(&self) -> bool {
        true
    }
}

impl Drop for TxDriver {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if *state == TxState::Active {
            *state = TxState::RolledBack;
            tracing::warn!("transaction dropped while active, rolling back");
            if let Err(err) = self.tx.rollback() {
                tracing::warn!(error = %err, "rollback on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Transaction for Recorder {
        fn exec(&self, _ctx: &Context, _stmt: &Statement) -> Result<ExecResult, EntError> {
            self.calls.lock().push("exec");
            Ok(ExecResult::default())
        }

        fn query(&self, _ctx: &Context, _stmt: &Statement) -> Result<Rows, EntError> {
            self.calls.lock().push("query");
            Ok(Vec::new())
        }

        fn commit(&self) -> Result<(), EntError> {
            self.calls.lock().push("commit");
            Ok(())
        }

        fn rollback(&self) -> Result<(), EntError> {
            self.calls.lock().push("rollback");
            Ok(())
        }
    }

    fn driver() -> (TxDriver, Arc<Mutex<Vec<&'static str>>>) {
        let recorder = Recorder::default();
        let calls = Arc::clone(&recorder.calls);
        (TxDriver::new(Box::new(recorder), Dialect::Sqlite), calls)
    }

    #[test]
    fn test_statements_after_commit_are_rejected() {
        let (tx, calls) = driver();
        let ctx = Context::background();
        tx.exec(&ctx, &Statement::new("UPDATE t SET a = 1")).unwrap();
        tx.commit().unwrap();
        assert_eq!(tx.state(), TxState::Committed);
        assert!(matches!(
            tx.query(&ctx, &Statement::new("SELECT 1")),
            Err(EntError::TransactionClosed)
        ));
        assert!(matches!(tx.commit(), Err(EntError::TransactionClosed)));
        assert!(matches!(tx.rollback(), Err(EntError::TransactionClosed)));
        assert_eq!(*calls.lock(), vec!["exec", "commit"]);
    }

    #[test]
    fn test_nested_tx_is_refused() {
        let (tx, _calls) = driver();
        assert!(tx.in_transaction());
        assert!(matches!(
            tx.tx(&Context::background()),
            Err(EntError::NestedTransaction)
        ));
    }

    #[test]
    fn test_drop_rolls_back_active_transaction() {
        let (tx, calls) = driver();
        drop(tx);
        assert_eq!(*calls.lock(), vec!["rollback"]);

        let (tx, calls) = driver();
        tx.rollback().unwrap();
        drop(tx);
        assert_eq!(*calls.lock(), vec!["rollback"]);
    }
}

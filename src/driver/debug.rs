use std::sync::Arc;

use super::{Driver, ExecResult, Rows, Transaction};
use crate::{context::Context, dialect::Dialect, errors::EntError, sql::Statement};

/// Sink for debug lines; one call per logged statement.
pub type Logger = Arc<dyn Fn(&str) + Send + Sync>;

/// Emits each line as a `tracing` info event on the `entgraph::debug` target.
pub fn default_logger() -> Logger {
    Arc::new(|line: &str| tracing::info!(target: "entgraph::debug", "{line}"))
}

/// Logs every statement before handing it to the wrapped driver.
pub struct DebugDriver {
    inner: Arc<dyn Driver>,
    log: Logger,
}

impl DebugDriver {
    pub fn new(inner: Arc<dyn Driver>, log: Logger) -> Self {
        Self { inner, log }
    }
}

impl Driver for DebugDriver {
    fn exec(&self, ctx: &Context, stmt: &Statement) -> Result<ExecResult, EntError> {
        (self.log)(&format!("driver.exec: {stmt}"));
        self.inner.exec(ctx, stmt)
    }

    fn query(&self, ctx: &Context, stmt: &Statement) -> Result<Rows, EntError> {
        (self.log)(&format!("driver.query: {stmt}"));
        self.inner.query(ctx, stmt)
    }

    fn tx(&self, ctx: &Context) -> Result<Box<dyn Transaction>, EntError> {
        let tx = self.inner.tx(ctx)?;
        let id = format!("{:08x}", rand::random::<u32>());
        (self.log)(&format!("driver.tx({id}): started"));
        Ok(Box::new(DebugTransaction {
            id,
            inner: tx,
            log: Arc::clone(&self.log),
        }))
    }

    fn close(&self) -> Result<(), EntError> {
        self.inner.close()
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }
}

struct DebugTransaction {
    id: String,
    inner: Box<dyn Transaction>,
    log: Logger,
}

impl Transaction for DebugTransaction {
    fn exec(&self, ctx: &Context, stmt: &Statement) -> Result<ExecResult, EntError> {
        (self.log)(&format!("tx({}).exec: {stmt}", self.id));
        self.inner.exec(ctx, stmt)
    }

    fn query(&self, ctx: &Context, stmt: &Statement) -> Result<Rows, EntError> {
        (self.log)(&format!("tx({}).query: {stmt}", self.id));
        self.inner.query(ctx, stmt)
    }

    fn commit(&self) -> Result<(), EntError> {
        (self.log)(&format!("tx({}): committed", self.id));
        self.inner.commit()
    }

    fn rollback(&self) -> Result<(), EntError> {
        (self.log)(&format!("tx({}): rolled back", self.id));
        self.inner.rollback()
    }
}

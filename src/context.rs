//! Cancellation and deadline carrier passed to every statement execution.
//!
//! A [`Context`] is cheap to clone and is checked by drivers before, during
//! and after a statement runs. Children inherit the cancellation state and
//! the earliest deadline of their ancestors.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use crate::errors::EntError;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<Context>,
}

#[derive(Clone, Debug)]
pub struct Context {
    inner: Arc<Inner>,
}

/// Cancels the context it was created with and every child derived from it.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    ctx: Context,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: None,
                parent: None,
            }),
        }
    }

    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let ctx = self.child(self.deadline());
        let handle = CancelHandle { ctx: ctx.clone() };
        (ctx, handle)
    }

    /// Child context expiring at `deadline`, or earlier if the parent does.
    pub fn with_deadline(&self, deadline: Instant) -> Context {
        let effective = match self.deadline() {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        self.child(Some(effective))
    }

    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// `Some` once the context or an ancestor is cancelled or past its deadline.
    pub fn err(&self) -> Option<EntError> {
        if self.cancelled() {
            return Some(EntError::Cancelled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(EntError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    pub fn check(&self) -> Result<(), EntError> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn cancelled(&self) -> bool {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if ctx.inner.cancelled.load(Ordering::Acquire) {
                return true;
            }
            current = ctx.inner.parent.as_ref();
        }
        false
    }

    fn child(&self, deadline: Option<Instant>) -> Context {
        Context {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                parent: Some(self.clone()),
            }),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.ctx.inner.cancelled.store(true, Ordering::Release);
    }
}

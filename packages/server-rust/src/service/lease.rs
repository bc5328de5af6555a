use std::ops::{Deref, DerefMut};

use polback_core::ExecutionContext;

use crate::traits::PolicyExecutor;

/// An execution context on loan from a [`PolicyExecutor`].
///
/// The context goes back to the executor when the lease is dropped, whether
/// the call succeeded, failed, panicked or was cancelled mid-run.
pub struct ContextLease<'a> {
    executor: &'a dyn PolicyExecutor,
    ctx: Option<Box<dyn ExecutionContext>>,
}

impl<'a> ContextLease<'a> {
    /// Acquires a fresh context from `executor`.
    ///
    /// # Errors
    ///
    /// Propagates the executor's acquisition failure.
    pub fn acquire(executor: &'a dyn PolicyExecutor) -> anyhow::Result<Self> {
        let ctx = executor.acquire_context()?;
        Ok(Self {
            executor,
            ctx: Some(ctx),
        })
    }
}

impl Deref for ContextLease<'_> {
    type Target = dyn ExecutionContext;

    fn deref(&self) -> &Self::Target {
        // Only `drop` takes the context out.
        match &self.ctx {
            Some(ctx) => &**ctx,
            None => unreachable!("context lease used after release"),
        }
    }
}

impl DerefMut for ContextLease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.ctx {
            Some(ctx) => &mut **ctx,
            None => unreachable!("context lease used after release"),
        }
    }
}

impl Drop for ContextLease<'_> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.executor.release_context(ctx);
        }
    }
}

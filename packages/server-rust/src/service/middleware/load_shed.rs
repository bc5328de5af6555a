//! Concurrency limit for invocations.
//!
//! A call takes a permit when it enters the pipeline and gives it back when
//! its policy run is over. With every permit taken, new calls fail fast with
//! `PolicyBackedError::Overloaded` instead of queueing behind slow policies.

use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower::{Layer, Service};
use tracing::warn;

use crate::service::operation::{Invocation, Outcome, OutcomeFuture, PolicyBackedError};

/// Tower layer sharing one permit pool between every service it wraps.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl LoadShedLayer {
    #[must_use]
    pub fn new(max_concurrent_invocations: u32) -> Self {
        let limit = usize::try_from(max_concurrent_invocations).unwrap_or(usize::MAX);
        Self {
            permits: Arc::new(Semaphore::new(limit.min(Semaphore::MAX_PERMITS))),
            limit,
        }
    }

    /// Invocations currently holding a permit.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.limit.saturating_sub(self.permits.available_permits())
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            permits: Arc::clone(&self.permits),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    permits: Arc<Semaphore>,
}

impl<S> LoadShedService<S> {
    fn admit(&self, invocation: &Invocation) -> Result<OwnedSemaphorePermit, PolicyBackedError> {
        Arc::clone(&self.permits).try_acquire_owned().map_err(|_| {
            warn!(
                call_id = invocation.call_id,
                interface = %invocation.interface_id,
                operation = %invocation.operation,
                "invocation rejected: concurrency limit reached"
            );
            PolicyBackedError::Overloaded
        })
    }
}

impl<S> Service<Invocation> for LoadShedService<S>
where
    S: Service<Invocation, Response = Outcome, Error = PolicyBackedError> + Send,
    S::Future: Send + 'static,
{
    type Response = Outcome;
    type Error = PolicyBackedError;
    type Future = OutcomeFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let permit = match self.admit(&invocation) {
            Ok(permit) => permit,
            Err(err) => return Box::pin(std::future::ready(Err(err))),
        };
        let run = self.inner.call(invocation);
        Box::pin(async move {
            let _permit = permit;
            run.await
        })
    }
}

//! Per-invocation timing and outcome.
//!
//! Every call runs inside an `invocation` span carrying its call id,
//! interface, operation and selector. When the call finishes the span gets
//! `duration_ms` and `outcome` (`"ok"` or the error kind) and one summary
//! line is logged. Spans only; no metrics registry.

use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{field, info, info_span, Instrument, Span};

use crate::service::operation::{Invocation, Outcome, OutcomeFuture, PolicyBackedError};

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

/// `"ok"` for a successful call, the error kind otherwise.
fn outcome_label(result: &Result<Outcome, PolicyBackedError>) -> &'static str {
    result.as_ref().map_or_else(PolicyBackedError::kind, |_| "ok")
}

fn invocation_span(invocation: &Invocation) -> Span {
    let selector = invocation
        .selector
        .map_or_else(|| "implicit".to_string(), |id| id.to_string());
    info_span!(
        "invocation",
        call_id = invocation.call_id,
        interface = %invocation.interface_id,
        operation = %invocation.operation,
        selector = %selector,
        args = invocation.args.len(),
        duration_ms = field::Empty,
        outcome = field::Empty,
    )
}

impl<S> Service<Invocation> for MetricsService<S>
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
        let span = invocation_span(&invocation);
        let run = self.inner.call(invocation);

        Box::pin(
            async move {
                let started = Instant::now();
                let result = run.await;

                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                let outcome = outcome_label(&result);
                let span = Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome);
                info!(duration_ms, outcome, "invocation finished");

                result
            }
            .instrument(span),
        )
    }
}

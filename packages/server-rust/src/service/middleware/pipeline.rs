//! Pipeline composition: combines all middleware layers into a single service stack.

use std::sync::Arc;

use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use crate::service::config::PolbackConfig;
use crate::service::dispatcher::Dispatcher;
use crate::service::proxy::InvocationService;

/// Build the invocation pipeline by wrapping the `Dispatcher` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded, only if a limit is configured
/// 2. `MetricsLayer` -- record timing and outcome (closest to the dispatcher)
#[must_use]
pub fn build_invocation_pipeline(
    dispatcher: &Arc<Dispatcher>,
    config: &PolbackConfig,
) -> InvocationService {
    let dispatcher = Arc::clone(dispatcher);
    match config.max_concurrent_invocations {
        Some(limit) => InvocationService::new(
            ServiceBuilder::new()
                .layer(LoadShedLayer::new(limit))
                .layer(MetricsLayer)
                .service(dispatcher),
        ),
        None => InvocationService::new(ServiceBuilder::new().layer(MetricsLayer).service(dispatcher)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Tower layer that wraps each bus dispatch in a `tracing` span.
//!
//! The span records the action, resource type, outcome (`success`,
//! `failure` or `error`) and duration.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::error::BusError;
use crate::outcome::Outcome;
use crate::pipeline::Input;

// ---------------------------------------------------------------------------
// TracingLayer
// ---------------------------------------------------------------------------

/// Wraps a bus service in [`TracingService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLayer;

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

// ---------------------------------------------------------------------------
// TracingService
// ---------------------------------------------------------------------------

/// Runs the inner service inside a `bus` span and records how the dispatch
/// ended once its future resolves.
#[derive(Debug, Clone)]
pub struct TracingService<S> {
    inner: S,
}

impl<S, I> Service<I> for TracingService<S>
where
    I: Input,
    S: Service<I, Response = Outcome, Error = BusError> + Send,
    S::Future: Send + 'static,
{
    type Response = Outcome;
    type Error = BusError;
    type Future = Pin<Box<dyn Future<Output = Result<Outcome, BusError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, input: I) -> Self::Future {
        let action = input.action();
        let resource_type = input.resource_type().to_string();

        let span = info_span!(
            "bus",
            action = action,
            resource_type = %resource_type,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(input);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let duration_ms = start.elapsed().as_millis();

                let outcome = match &result {
                    Ok(outcome) => outcome.label(),
                    Err(_) => "error",
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_u64 = duration_ms as u64;
                tracing::Span::current().record("duration_ms", duration_u64);
                tracing::Span::current().record("outcome", outcome);

                match &result {
                    Err(err) => tracing::warn!(
                        action,
                        resource_type = %resource_type,
                        duration_ms = duration_u64,
                        error = %err,
                        "dispatch aborted"
                    ),
                    Ok(_) => tracing::info!(
                        action,
                        resource_type = %resource_type,
                        duration_ms = duration_u64,
                        outcome,
                        "dispatch complete"
                    ),
                }

                result
            }
            .instrument(span),
        )
    }
}

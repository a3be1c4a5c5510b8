//! W3C trace context handling for every hop of a `/cep` request.
//!
//! [`TracePropagator`] is an explicit handle built once at startup and cloned
//! into each component. Nothing here touches the global tracer provider or the
//! global text-map propagator.
//!
//! Propagation is best effort: a missing or unreadable `traceparent` header
//! yields an empty context, and the next span started under it becomes the root
//! of a new trace.

use http::HeaderMap;
use opentelemetry::{
    Context, KeyValue,
    propagation::TextMapPropagator,
    trace::{SpanKind, Status, TraceContextExt, Tracer as _},
};
use opentelemetry_http::{HeaderExtractor, HeaderInjector};
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace::Tracer};

/// Starts spans and moves their context in and out of HTTP headers.
#[derive(Clone)]
pub struct TracePropagator {
    tracer: Tracer,
    propagator: TraceContextPropagator,
}

impl std::fmt::Debug for TracePropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracePropagator").finish_non_exhaustive()
    }
}

impl TracePropagator {
    pub fn new(tracer: Tracer) -> Self {
        Self { tracer, propagator: TraceContextPropagator::new() }
    }

    /// Start a new trace. Used where a request enters the system.
    pub fn root(&self, name: &'static str) -> SpanScope {
        self.start(&Context::new(), name, SpanKind::Server)
    }

    /// Start a server span under a (possibly empty) remote parent.
    pub fn server(&self, parent: &Context, name: &'static str) -> SpanScope {
        self.start(parent, name, SpanKind::Server)
    }

    pub fn child(&self, parent: &Context, name: &'static str) -> SpanScope {
        self.start(parent, name, SpanKind::Internal)
    }

    /// Start a span for an outbound HTTP call.
    pub fn client(&self, parent: &Context, name: &'static str) -> SpanScope {
        self.start(parent, name, SpanKind::Client)
    }

    /// Write the context into outbound request headers.
    pub fn inject(&self, cx: &Context, headers: &mut HeaderMap) {
        self.propagator.inject_context(cx, &mut HeaderInjector(headers));
    }

    /// Read the context a caller sent along. Never fails.
    pub fn extract(&self, headers: &HeaderMap) -> Context {
        let cx = self
            .propagator
            .extract_with_context(&Context::new(), &HeaderExtractor(headers));

        if !cx.span().span_context().is_valid() {
            tracing::debug!(
                has_traceparent = headers.contains_key("traceparent"),
                "no usable inbound trace context, starting a new trace"
            );
        }

        cx
    }

    fn start(&self, parent: &Context, name: &'static str, kind: SpanKind) -> SpanScope {
        let span = self
            .tracer
            .span_builder(name)
            .with_kind(kind)
            .start_with_context(&self.tracer, parent);

        SpanScope { cx: parent.with_span(span) }
    }
}

/// Owns one started span; the span ends when the scope is dropped.
///
/// The wrapped [`Context`] is what gets handed to the next component down the
/// call chain.
pub struct SpanScope {
    cx: Context,
}

impl SpanScope {
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn trace_id(&self) -> String {
        self.cx.span().span_context().trace_id().to_string()
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    /// Mark the span as failed.
    pub fn fail(&self, description: impl Into<String>) {
        self.cx.span().set_status(Status::error(description.into()));
    }
}

impl Drop for SpanScope {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}

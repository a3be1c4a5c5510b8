//! Tracer provider lifecycle.
//!
//! The provider is created once per process, handed out only through the
//! [`TracePropagator`] it backs, and shut down explicitly on exit so batched
//! spans get flushed.

use anyhow::{Context as _, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};

use crate::{config::TelemetryConfig, trace::TracePropagator};

pub struct Telemetry {
    provider: SdkTracerProvider,
    propagator: TracePropagator,
}

impl Telemetry {
    /// Build the provider for `service_name`, exporting over OTLP/gRPC when
    /// enabled in `cfg`.
    pub fn init(cfg: &TelemetryConfig, service_name: &'static str) -> Result<Self> {
        if !cfg.enabled {
            tracing::info!(service_name, "span export disabled");
            return Ok(Self::disabled(service_name));
        }

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(cfg.otlp_endpoint.clone())
            .build()
            .with_context(|| {
                format!("Failed to build OTLP span exporter for {}", cfg.otlp_endpoint)
            })?;

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource(service_name))
            .build();

        tracing::info!(service_name, endpoint = %cfg.otlp_endpoint, "exporting spans over OTLP");
        Ok(Self::from_provider(provider, service_name))
    }

    /// Spans are still created and propagated, but nothing is exported.
    pub fn disabled(service_name: &'static str) -> Self {
        let provider = SdkTracerProvider::builder().with_resource(resource(service_name)).build();
        Self::from_provider(provider, service_name)
    }

    fn from_provider(provider: SdkTracerProvider, service_name: &'static str) -> Self {
        let propagator = TracePropagator::new(provider.tracer(service_name));
        Self { provider, propagator }
    }

    pub fn propagator(&self) -> TracePropagator {
        self.propagator.clone()
    }

    /// Flush pending spans and stop the exporter.
    pub fn shutdown(self) {
        if let Err(err) = self.provider.shutdown() {
            tracing::warn!(error = %err, "failed to shut down tracer provider");
        }
    }
}

fn resource(service_name: &'static str) -> Resource {
    Resource::builder().with_service_name(service_name).build()
}

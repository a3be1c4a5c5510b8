//! The resolver role: postal code → city → current temperature.
//!
//! The two lookups are strictly sequential. The weather lookup takes the city
//! the location lookup produced, so it cannot start before the first one has
//! succeeded, and it is never attempted when the first one fails.

use std::sync::Arc;

use http::HeaderMap;
use opentelemetry::{Context, KeyValue};

use crate::{
    config::Config,
    error::ServiceError,
    model::{CepRequest, ComposedResponse, LocationResult, PostalCode, WeatherReport},
    provider::{self, LocationLookup, WeatherLookup},
    trace::TracePropagator,
};

#[derive(Debug, Clone)]
pub struct Resolver {
    location: Arc<dyn LocationLookup>,
    weather: Arc<dyn WeatherLookup>,
    tracing: TracePropagator,
}

impl Resolver {
    pub fn new(
        location: Arc<dyn LocationLookup>,
        weather: Arc<dyn WeatherLookup>,
        tracing: TracePropagator,
    ) -> Self {
        Self { location, weather, tracing }
    }

    /// Wire up the ViaCEP and WeatherAPI clients described by `config`.
    pub fn from_config(config: &Config, tracing: TracePropagator) -> anyhow::Result<Self> {
        let http = provider::http_client(config.http.upstream_timeout())?;
        let location = provider::location_from_config(config, http.clone(), tracing.clone());
        let weather = provider::weather_from_config(config, http, tracing.clone())?;

        Ok(Self::new(location, weather, tracing))
    }

    /// Handle one inbound `/cep` request.
    ///
    /// The caller's trace context is taken from `headers` when present; a
    /// missing or broken one just starts a new trace.
    pub async fn handle(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<ComposedResponse, ServiceError> {
        let parent = self.tracing.extract(headers);
        let span = self.tracing.server(&parent, "handle_cep");

        let result = match CepRequest::parse(body) {
            Ok(code) => {
                span.set_attribute(KeyValue::new("cep", code.to_string()));
                self.resolve(&code, span.context()).await
            }
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            span.fail(err.to_string());
        }

        result
    }

    /// Run both lookup stages for an already validated code under `cx`.
    pub async fn resolve(
        &self,
        code: &PostalCode,
        cx: &Context,
    ) -> Result<ComposedResponse, ServiceError> {
        let location = self.locate(code, cx).await?;
        let report = self.current_weather(&location, cx).await?;

        tracing::info!(
            cep = %code,
            city = %location.city,
            temp_c = report.celsius,
            "zipcode resolved"
        );

        Ok(ComposedResponse::compose(location, report))
    }

    async fn locate(&self, code: &PostalCode, cx: &Context) -> Result<LocationResult, ServiceError> {
        let stage = self.tracing.child(cx, "get_location");
        tracing::info!(cep = %code, trace_id = %stage.trace_id(), "querying location service");

        match self.location.resolve_city(code, stage.context()).await {
            Ok(location) if !location.is_empty() => Ok(location),
            Ok(_) => {
                stage.fail("empty locality");
                tracing::warn!(cep = %code, "location service returned no city");
                Err(ServiceError::ZipcodeNotFound(code.to_string()))
            }
            Err(err) => {
                stage.fail(format!("{err:#}"));
                tracing::warn!(cep = %code, error = %format!("{err:#}"), "location lookup failed");
                Err(ServiceError::ZipcodeNotFound(code.to_string()))
            }
        }
    }

    async fn current_weather(
        &self,
        location: &LocationResult,
        cx: &Context,
    ) -> Result<WeatherReport, ServiceError> {
        let stage = self.tracing.child(cx, "get_weather");
        tracing::info!(city = %location.city, trace_id = %stage.trace_id(), "querying weather service");

        self.weather
            .current_weather(&location.city, stage.context())
            .await
            .map_err(|err| {
                stage.fail(format!("{err:#}"));
                tracing::warn!(city = %location.city, error = %format!("{err:#}"), "weather lookup failed");
                ServiceError::WeatherUnavailable
            })
    }
}

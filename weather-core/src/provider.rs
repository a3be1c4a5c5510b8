use crate::{
    Config, LocationResult, PostalCode, WeatherReport,
    provider::{viacep::ViaCepClient, weatherapi::WeatherApiClient},
    trace::TracePropagator,
};
use anyhow::Context as _;
use async_trait::async_trait;
use opentelemetry::Context;
use reqwest::Client;
use std::{fmt::Debug, sync::Arc, time::Duration};

pub mod viacep;
pub mod weatherapi;

/// Postal code → city.
#[async_trait]
pub trait LocationLookup: Send + Sync + Debug {
    /// `cx` is the caller's span; implementations start their own client span
    /// under it and propagate that downstream.
    async fn resolve_city(&self, code: &PostalCode, cx: &Context) -> anyhow::Result<LocationResult>;
}

/// City → current temperature.
#[async_trait]
pub trait WeatherLookup: Send + Sync + Debug {
    async fn current_weather(&self, city: &str, cx: &Context) -> anyhow::Result<WeatherReport>;
}

/// Shared outbound HTTP client. One per process; requests reuse its pool.
pub fn http_client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Construct the ViaCEP-backed location lookup from config.
pub fn location_from_config(
    config: &Config,
    http: Client,
    tracing: TracePropagator,
) -> Arc<dyn LocationLookup> {
    Arc::new(ViaCepClient::new(config.location.base_url.clone(), http, tracing))
}

/// Construct the WeatherAPI-backed weather lookup from config.
///
/// Fails when no API key is configured.
pub fn weather_from_config(
    config: &Config,
    http: Client,
    tracing: TracePropagator,
) -> anyhow::Result<Arc<dyn WeatherLookup>> {
    let api_key = config.weather_api_key()?;

    Ok(Arc::new(WeatherApiClient::new(
        config.weather.base_url.clone(),
        api_key.to_owned(),
        config.weather.lang.clone(),
        http,
        tracing,
    )))
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}

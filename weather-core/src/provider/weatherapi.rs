use anyhow::{Context as _, Result};
use async_trait::async_trait;
use http::HeaderMap;
use opentelemetry::{Context, KeyValue};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    model::{WeatherReport, WeatherSample},
    provider::truncate_body,
    trace::TracePropagator,
};

use super::WeatherLookup;

#[derive(Clone)]
pub struct WeatherApiClient {
    base_url: String,
    api_key: String,
    lang: String,
    http: Client,
    tracing: TracePropagator,
}

impl std::fmt::Debug for WeatherApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherApiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("lang", &self.lang)
            .finish_non_exhaustive()
    }
}

impl WeatherApiClient {
    pub fn new(
        base_url: String,
        api_key: String,
        lang: String,
        http: Client,
        tracing: TracePropagator,
    ) -> Self {
        Self { base_url, api_key, lang, http, tracing }
    }

    async fn fetch_current(&self, city: &str, cx: &Context) -> Result<WeatherSample> {
        let mut headers = HeaderMap::new();
        self.tracing.inject(cx, &mut headers);

        let res = self
            .http
            .get(&self.base_url)
            .headers(headers)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", city),
                ("lang", self.lang.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request to WeatherAPI.com (current)")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read WeatherAPI current response body")?;

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "WeatherAPI current request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: WaResponse =
            serde_json::from_str(&body).context("Failed to parse WeatherAPI current JSON")?;

        Ok(WeatherSample { celsius: parsed.current.temp_c })
    }
}

// Only the Celsius reading is read; `temp_f` and friends are ignored on purpose.
#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    current: WaCurrent,
}

#[async_trait]
impl WeatherLookup for WeatherApiClient {
    async fn current_weather(&self, city: &str, cx: &Context) -> Result<WeatherReport> {
        let span = self.tracing.client(cx, "GET weatherapi");
        span.set_attribute(KeyValue::new("weather.city", city.to_string()));

        match self.fetch_current(city, span.context()).await {
            Ok(sample) => Ok(sample.into()),
            Err(err) => {
                span.fail(format!("{err:#}"));
                Err(err)
            }
        }
    }
}

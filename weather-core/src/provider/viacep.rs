use anyhow::{Context as _, Result, anyhow, bail};
use async_trait::async_trait;
use http::HeaderMap;
use opentelemetry::{Context, KeyValue};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    model::{LocationResult, PostalCode},
    provider::truncate_body,
    trace::TracePropagator,
};

use super::LocationLookup;

#[derive(Debug, Clone)]
pub struct ViaCepClient {
    base_url: String,
    http: Client,
    tracing: TracePropagator,
}

impl ViaCepClient {
    pub fn new(base_url: String, http: Client, tracing: TracePropagator) -> Self {
        Self { base_url, http, tracing }
    }

    fn url(&self, code: &PostalCode) -> String {
        format!("{}/{}/json/", self.base_url.trim_end_matches('/'), code)
    }

    async fn fetch(&self, url: &str, code: &PostalCode, cx: &Context) -> Result<LocationResult> {
        let mut headers = HeaderMap::new();
        self.tracing.inject(cx, &mut headers);

        let res = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .context("Failed to send request to ViaCEP")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read ViaCEP response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "ViaCEP request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: VcResponse =
            serde_json::from_str(&body).context("Failed to parse ViaCEP JSON")?;

        if parsed.is_error() {
            bail!("ViaCEP has no record for zipcode {code}");
        }

        Ok(LocationResult { city: parsed.localidade.unwrap_or_default() })
    }
}

#[derive(Debug, Deserialize)]
struct VcResponse {
    localidade: Option<String>,
    /// Unknown codes come back as 200 with `"erro": true` (or `"true"`).
    erro: Option<serde_json::Value>,
}

impl VcResponse {
    fn is_error(&self) -> bool {
        match &self.erro {
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

#[async_trait]
impl LocationLookup for ViaCepClient {
    async fn resolve_city(&self, code: &PostalCode, cx: &Context) -> Result<LocationResult> {
        let url = self.url(code);
        let span = self.tracing.client(cx, "GET viacep");
        span.set_attribute(KeyValue::new("url.full", url.clone()));

        let result = self.fetch(&url, code, span.context()).await;
        if let Err(err) = &result {
            span.fail(format!("{err:#}"));
        }

        result
    }
}

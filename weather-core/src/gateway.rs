//! The client-facing gateway role.
//!
//! Validates the inbound code, starts the trace, and relays the request to the
//! resolver. Every resolver-side failure, its 404 included, reaches the client
//! as a 500 carrying the failure description.

use http::{HeaderMap, StatusCode};
use opentelemetry::{Context, KeyValue};
use reqwest::Client;

use crate::{
    config::Config,
    error::ServiceError,
    model::{CepRequest, ComposedResponse, PostalCode},
    provider::{self, truncate_body},
    trace::{SpanScope, TracePropagator},
};

#[derive(Debug, Clone)]
pub struct Gateway {
    http: Client,
    resolver_url: String,
    tracing: TracePropagator,
}

impl Gateway {
    pub fn new(http: Client, resolver_url: String, tracing: TracePropagator) -> Self {
        Self { http, resolver_url, tracing }
    }

    pub fn from_config(config: &Config, tracing: TracePropagator) -> anyhow::Result<Self> {
        let http = provider::http_client(config.http.upstream_timeout())?;
        Ok(Self::new(http, config.gateway.resolver_url.clone(), tracing))
    }

    /// Handle one inbound `/cep` request.
    ///
    /// Invalid input is rejected before any span is started or any call is made.
    pub async fn handle(&self, body: &[u8]) -> Result<ComposedResponse, ServiceError> {
        let code = CepRequest::parse(body)?;

        let root = self.tracing.root("handle_cep");
        root.set_attribute(KeyValue::new("cep", code.to_string()));
        tracing::info!(cep = %code, trace_id = %root.trace_id(), "forwarding zipcode to resolver");

        let result = self.forward(&code, root.context()).await;
        if let Err(err) = &result {
            root.fail(err.to_string());
            tracing::warn!(cep = %code, error = %err, "resolver call failed");
        }

        result
    }

    async fn forward(
        &self,
        code: &PostalCode,
        cx: &Context,
    ) -> Result<ComposedResponse, ServiceError> {
        let span = self.tracing.client(cx, "forward_to_resolver");
        span.set_attribute(KeyValue::new("url.full", self.resolver_url.clone()));

        let mut headers = HeaderMap::new();
        self.tracing.inject(span.context(), &mut headers);

        let payload = CepRequest { cep: code.as_str().to_owned() };
        let res = self
            .http
            .post(&self.resolver_url)
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                upstream(&span, format!("failed to send request to resolver: {err}"))
            })?;

        match res.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(upstream(&span, format!("can not find zipcode: {code}")));
            }
            status => {
                let body = match res.text().await {
                    Ok(body) => body,
                    Err(err) => {
                        tracing::warn!(%status, error = %err, "failed to read resolver error body");
                        "<unreadable body>".to_string()
                    }
                };
                return Err(upstream(
                    &span,
                    format!(
                        "resolver returned non-200 status code: {status}: {}",
                        truncate_body(body.trim())
                    ),
                ));
            }
        }

        res.json::<ComposedResponse>().await.map_err(|err| {
            upstream(&span, format!("failed to decode response from resolver: {err}"))
        })
    }
}

fn upstream(span: &SpanScope, message: String) -> ServiceError {
    span.fail(message.clone());
    ServiceError::Upstream(message)
}

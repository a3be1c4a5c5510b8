//! Core library for the `cep-weather` services.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Lookup clients for the postal code (ViaCEP) and weather (WeatherAPI) services
//! - The resolver and gateway roles, and their HTTP surface
//! - Explicit W3C trace context propagation between every hop
//!
//! It is used by the `cep-weather` binary, but the roles can also be embedded
//! in other services or driven directly from tests.

pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod provider;
pub mod resolver;
pub mod server;
pub mod telemetry;
pub mod trace;

pub use config::Config;
pub use error::ServiceError;
pub use gateway::Gateway;
pub use model::{ComposedResponse, LocationResult, PostalCode, WeatherReport, WeatherSample};
pub use provider::{LocationLookup, WeatherLookup};
pub use resolver::Resolver;
pub use telemetry::Telemetry;
pub use trace::{SpanScope, TracePropagator};

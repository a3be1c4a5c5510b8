use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Number of digits in a Brazilian postal code (CEP).
pub const CEP_LEN: usize = 8;

/// Inbound body accepted by both the gateway and the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CepRequest {
    pub cep: String,
}

impl CepRequest {
    /// Decode a raw JSON body and validate the code it carries.
    ///
    /// Malformed JSON, a missing `cep` field and a badly formed code all
    /// collapse into [`ServiceError::InvalidZipcode`].
    pub fn parse(body: &[u8]) -> Result<PostalCode, ServiceError> {
        let request: CepRequest =
            serde_json::from_slice(body).map_err(|_| ServiceError::InvalidZipcode)?;
        PostalCode::parse(&request.cep)
    }
}

/// A postal code that passed validation: exactly eight ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostalCode(String);

impl PostalCode {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        if raw.len() != CEP_LEN || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ServiceError::InvalidZipcode);
        }

        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PostalCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of the postal code lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationResult {
    pub city: String,
}

impl LocationResult {
    /// An empty locality is as good as no answer at all.
    pub fn is_empty(&self) -> bool {
        self.city.trim().is_empty()
    }
}

/// The single temperature value fetched from the weather service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherSample {
    pub celsius: f64,
}

/// Temperature in the three reported units.
///
/// Only the Celsius value comes from upstream; the other two are always derived
/// from it so the units can never disagree with each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherReport {
    pub celsius: f64,
    pub fahrenheit: f64,
    pub kelvin: f64,
}

impl WeatherReport {
    pub fn from_celsius(celsius: f64) -> Self {
        Self {
            celsius,
            fahrenheit: celsius * 1.8 + 32.0,
            kelvin: celsius + 273.15,
        }
    }
}

impl From<WeatherSample> for WeatherReport {
    fn from(sample: WeatherSample) -> Self {
        Self::from_celsius(sample.celsius)
    }
}

/// Body returned to the client on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedResponse {
    pub city: String,
    #[serde(rename = "temp_C")]
    pub temp_c: f64,
    #[serde(rename = "temp_F")]
    pub temp_f: f64,
    #[serde(rename = "temp_K")]
    pub temp_k: f64,
}

impl ComposedResponse {
    pub fn compose(location: LocationResult, report: WeatherReport) -> Self {
        Self {
            city: location.city,
            temp_c: report.celsius,
            temp_f: report.fahrenheit,
            temp_k: report.kelvin,
        }
    }
}

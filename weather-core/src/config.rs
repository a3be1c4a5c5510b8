use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Gateway role: where it listens and where the resolver lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen: String,
    /// Full URL of the resolver's `POST /cep` endpoint.
    pub resolver_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            resolver_url: "http://127.0.0.1:8181/cep".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub listen: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { listen: "0.0.0.0:8181".to_string() }
    }
}

/// ViaCEP endpoint. The postal code and `/json/` are appended to `base_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub base_url: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self { base_url: "http://viacep.com.br/ws".to_string() }
    }
}

/// WeatherAPI.com endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    /// Never has a built-in default; comes from the file or `WEATHER_API_KEY`.
    pub api_key: Option<String>,
    pub lang: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "http://api.weatherapi.com/v1/current.json".to_string(),
            api_key: None,
            lang: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Deadline for one inbound request, including every outbound call it makes.
    pub request_timeout_secs: u64,
    /// How long in-flight requests may keep running after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { request_timeout_secs: 10, shutdown_grace_secs: 10 }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Budget for outbound calls made while serving one request.
    ///
    /// Kept below [`Self::request_timeout`] so a slow upstream surfaces as its
    /// own error before the inbound deadline fires.
    pub fn upstream_timeout(&self) -> Duration {
        let deadline = self.request_timeout();
        let margin = (deadline / 10).max(Duration::from_millis(100));
        deadline.saturating_sub(margin).max(deadline / 2)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Export spans over OTLP/gRPC. When off, spans are still created and
    /// propagated, just never exported.
    pub enabled: bool,
    pub otlp_endpoint: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: false, otlp_endpoint: "http://127.0.0.1:4317".to_string() }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [gateway]
/// resolver_url = "http://resolver:8181/cep"
///
/// [weather]
/// api_key = "..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub resolver: ResolverConfig,
    pub location: LocationConfig,
    pub weather: WeatherConfig,
    pub http: HttpConfig,
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load config from `path` (or the platform default), then apply
    /// environment overrides.
    ///
    /// A missing default file means defaults; a missing explicit `path` is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) if !path.exists() => {
                bail!(
                    "Config file not found: {}\n\
                     Hint: create it with `cep-weather --config {} configure`.",
                    path.display(),
                    path.display()
                );
            }
            Some(path) => path.to_path_buf(),
            None => Self::config_file_path()?,
        };

        let mut cfg = Self::load_from(&path)?;
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Overlay values from the environment. Empty variables are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("GATEWAY_LISTEN") {
            self.gateway.listen = v;
        }
        if let Some(v) = var("RESOLVER_URL") {
            self.gateway.resolver_url = v;
        }
        if let Some(v) = var("RESOLVER_LISTEN") {
            self.resolver.listen = v;
        }
        if let Some(v) = var("LOCATION_URL") {
            self.location.base_url = v;
        }
        if let Some(v) = var("WEATHER_URL") {
            self.weather.base_url = v;
        }
        if let Some(v) = var("WEATHER_API_KEY") {
            self.weather.api_key = Some(v);
        }
        if let Some(v) = var("WEATHER_LANG") {
            self.weather.lang = v;
        }
        if let Some(v) = var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            self.telemetry.otlp_endpoint = v;
            self.telemetry.enabled = true;
        }
    }

    /// Returns the weather API key or explains how to provide one.
    pub fn weather_api_key(&self) -> Result<&str> {
        self.weather
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "No WeatherAPI key configured.\n\
                     Hint: set WEATHER_API_KEY or run `cep-weather configure`."
                )
            })
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the default config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "cep-weather", "cep-weather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_have_no_api_key() {
        let cfg = Config::default();
        let err = cfg.weather_api_key().unwrap_err();

        assert!(err.to_string().contains("No WeatherAPI key configured"));
        assert_eq!(cfg.weather.lang, "en");
        assert!(!cfg.telemetry.enabled);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [weather]
            api_key = "FILE_KEY"

            [http]
            request_timeout_secs = 3
            "#,
        )
        .expect("valid toml");

        assert_eq!(cfg.weather_api_key().expect("key"), "FILE_KEY");
        assert_eq!(cfg.weather.base_url, WeatherConfig::default().base_url);
        assert_eq!(cfg.http.request_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.http.shutdown_grace(), Duration::from_secs(10));
        assert_eq!(cfg.gateway.resolver_url, "http://127.0.0.1:8181/cep");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config::default();
        cfg.weather.api_key = Some("FILE_KEY".into());

        cfg.apply_env(env(&[
            ("WEATHER_API_KEY", "ENV_KEY"),
            ("RESOLVER_URL", "http://resolver:8181/cep"),
            ("LOCATION_URL", ""),
        ]));

        assert_eq!(cfg.weather_api_key().expect("key"), "ENV_KEY");
        assert_eq!(cfg.gateway.resolver_url, "http://resolver:8181/cep");
        // empty values are ignored
        assert_eq!(cfg.location.base_url, LocationConfig::default().base_url);
    }

    #[test]
    fn otlp_endpoint_env_enables_telemetry() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317")]));

        assert!(cfg.telemetry.enabled);
        assert_eq!(cfg.telemetry.otlp_endpoint, "http://collector:4317");
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let mut cfg = Config::default();
        cfg.weather.api_key = Some("   ".into());
        assert!(cfg.weather_api_key().is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = std::env::temp_dir().join("cep-weather-does-not-exist/config.toml");
        let cfg = Config::load_from(&path).expect("defaults");
        assert_eq!(cfg.resolver.listen, "0.0.0.0:8181");
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let path = std::env::temp_dir().join("cep-weather-does-not-exist/explicit.toml");
        let err = Config::load(Some(&path)).unwrap_err();

        assert!(err.to_string().contains("Config file not found"), "{err}");
        assert!(err.to_string().contains("explicit.toml"), "{err}");
    }

    #[test]
    fn upstream_budget_is_below_request_deadline() {
        let mut http = HttpConfig::default();
        assert_eq!(http.upstream_timeout(), Duration::from_secs(9));

        http.request_timeout_secs = 1;
        assert_eq!(http.upstream_timeout(), Duration::from_millis(900));
        assert!(http.upstream_timeout() < http.request_timeout());
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("cep-weather-cfg-{}", std::process::id()));
        let path = dir.join("config.toml");

        let mut cfg = Config::default();
        cfg.weather.api_key = Some("SAVED".into());
        cfg.weather.lang = "pt".into();
        cfg.save(&path).expect("saved");

        let loaded = Config::load_from(&path).expect("loaded");
        assert_eq!(loaded.weather.api_key.as_deref(), Some("SAVED"));
        assert_eq!(loaded.weather.lang, "pt");

        let _ = fs::remove_dir_all(dir);
    }
}

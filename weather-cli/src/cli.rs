use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cep_weather_core::{Config, Gateway, PostalCode, Resolver, Telemetry, server};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cep-weather", version, about = "Current weather by Brazilian postal code")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the client-facing gateway (`POST /cep`).
    Gateway,

    /// Serve the resolver that performs the location and weather lookups.
    Resolver,

    /// Resolve one postal code in-process and print the report.
    Lookup {
        /// Eight-digit postal code, e.g. 01001000.
        cep: String,
    },

    /// Store the WeatherAPI credentials in the config file.
    Configure,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(self.config.as_deref()),
            Command::Gateway => serve_gateway(Config::load(self.config.as_deref())?).await,
            Command::Resolver => serve_resolver(Config::load(self.config.as_deref())?).await,
            Command::Lookup { cep } => lookup(Config::load(self.config.as_deref())?, &cep).await,
        }
    }
}

async fn serve_gateway(config: Config) -> Result<()> {
    let telemetry = Telemetry::init(&config.telemetry, "gateway")?;
    let gateway = Gateway::from_config(&config, telemetry.propagator())?;
    tracing::info!(resolver = %config.gateway.resolver_url, "starting gateway");

    let listener = bind(&config.gateway.listen).await?;
    let router = server::gateway_router(gateway, config.http.request_timeout());
    let result =
        server::serve(listener, router, config.http.shutdown_grace(), server::shutdown_signal()).await;

    telemetry.shutdown();
    result
}

async fn serve_resolver(config: Config) -> Result<()> {
    let telemetry = Telemetry::init(&config.telemetry, "resolver")?;
    let resolver = Resolver::from_config(&config, telemetry.propagator())?;
    tracing::info!(
        location = %config.location.base_url,
        weather = %config.weather.base_url,
        "starting resolver"
    );

    let listener = bind(&config.resolver.listen).await?;
    let router = server::resolver_router(resolver, config.http.request_timeout());
    let result =
        server::serve(listener, router, config.http.shutdown_grace(), server::shutdown_signal()).await;

    telemetry.shutdown();
    result
}

async fn bind(listen: &str) -> Result<TcpListener> {
    TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))
}

async fn lookup(config: Config, cep: &str) -> Result<()> {
    let code = PostalCode::parse(cep).with_context(|| format!("'{cep}' is not a valid zipcode"))?;

    let telemetry = Telemetry::init(&config.telemetry, "cep-weather-cli")?;
    let propagator = telemetry.propagator();
    let resolver = Resolver::from_config(&config, propagator.clone())?;

    let result = {
        let root = propagator.root("lookup");
        resolver.resolve(&code, root.context()).await
    };
    telemetry.shutdown();

    let report = result?;
    println!("{} ({})", report.city, code);
    println!("  {:.1} °C", report.temp_c);
    println!("  {:.1} °F", report.temp_f);
    println!("  {:.2} K", report.temp_k);

    Ok(())
}

fn configure(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::config_file_path()?,
    };
    let mut config = Config::load_from(&path)?;

    let api_key = inquire::Password::new("WeatherAPI key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read WeatherAPI key")?;

    let current_lang = config.weather.lang.clone();
    let lang = inquire::Text::new("Response language:")
        .with_default(&current_lang)
        .prompt()
        .context("Failed to read language")?;

    config.weather.api_key = Some(api_key.trim().to_string());
    config.weather.lang = lang.trim().to_string();
    config.save(&path)?;

    println!("Saved configuration to {}", path.display());
    Ok(())
}

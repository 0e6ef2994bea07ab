use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::config::SourceConfig;

const ASK_LOCATION: &str =
    "Which location should I check? Try something like \"weather in Tokyo\".";
const NOT_CONFIGURED: &str =
    "Weather lookups aren't configured on this instance, so I can't fetch a forecast right now.";
const DEGRADED: &str =
    "The weather service is having trouble at the moment. Please try again in a bit.";

/// Upstream error code for an unrecognized location query.
const CODE_NO_MATCHING_LOCATION: i64 = 1006;

/// Normalized current-conditions report. Every field except the resolved
/// location name is optional; the formatter renders absences as N/A so the
/// output shape stays stable.
#[derive(Debug, Clone, Default)]
pub struct Forecast {
    pub location: String,
    pub condition: Option<String>,
    pub temp_c: Option<f64>,
    pub feelslike_c: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_kph: Option<f64>,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    /// Upstream local time, "YYYY-MM-DD HH:MM".
    pub localtime: Option<String>,
}

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("no matching location for {0:?}")]
    LocationNotFound(String),
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn current(&self, location: &str) -> Result<Forecast, ForecastError>;
}

/// Produce the weather reply for a classified location slot. Never returns
/// an error: every failure mode resolves to a user-displayable string.
pub async fn handle(location: &str, source: Option<&dyn ForecastSource>) -> String {
    let location = location.trim();
    if location.is_empty() {
        return ASK_LOCATION.to_string();
    }
    let Some(source) = source else {
        return NOT_CONFIGURED.to_string();
    };

    match source.current(location).await {
        Ok(forecast) => format_forecast(&forecast),
        Err(ForecastError::LocationNotFound(query)) => format!(
            "I couldn't find a location matching \"{}\". Could you try a nearby city name?",
            query
        ),
        Err(err) => {
            warn!("forecast lookup failed for {}: {}", location, err);
            DEGRADED.to_string()
        }
    }
}

fn format_forecast(forecast: &Forecast) -> String {
    format!(
        "Weather for {}:\n\
         Condition: {}\n\
         Temperature: {} (feels like {})\n\
         Humidity: {}\n\
         Wind: {}\n\
         Sunrise: {} | Sunset: {}\n\
         Local time: {}",
        forecast.location,
        text_or_na(forecast.condition.as_deref()),
        measure_or_na(forecast.temp_c, "°C"),
        measure_or_na(forecast.feelslike_c, "°C"),
        measure_or_na(forecast.humidity, "%"),
        measure_or_na(forecast.wind_kph, " km/h"),
        text_or_na(forecast.sunrise.as_deref()),
        text_or_na(forecast.sunset.as_deref()),
        local_time_or_unavailable(forecast.localtime.as_deref()),
    )
}

fn text_or_na(value: Option<&str>) -> String {
    match value {
        Some(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => "N/A".to_string(),
    }
}

fn measure_or_na(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, unit),
        None => "N/A".to_string(),
    }
}

/// Expand the upstream "YYYY-MM-DD HH:MM" stamp into day, date and time.
fn local_time_or_unavailable(localtime: Option<&str>) -> String {
    let Some(raw) = localtime else {
        return "unavailable".to_string();
    };
    match NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M") {
        Ok(stamp) => stamp.format("%A, %Y-%m-%d, %H:%M").to_string(),
        Err(_) => raw.trim().to_string(),
    }
}

// weatherapi.com response shapes. Only the reqwest impl below knows about
// them; everything else goes through `Forecast`.
#[derive(Debug, Deserialize)]
struct ApiReport {
    location: Option<ApiLocation>,
    current: Option<ApiCurrent>,
    forecast: Option<ApiForecast>,
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    name: Option<String>,
    country: Option<String>,
    localtime: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiCurrent {
    temp_c: Option<f64>,
    feelslike_c: Option<f64>,
    humidity: Option<f64>,
    wind_kph: Option<f64>,
    condition: Option<ApiCondition>,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiForecast {
    #[serde(default)]
    forecastday: Vec<ApiForecastDay>,
}

#[derive(Debug, Deserialize)]
struct ApiForecastDay {
    astro: Option<ApiAstro>,
}

#[derive(Debug, Deserialize)]
struct ApiAstro {
    sunrise: Option<String>,
    sunset: Option<String>,
}

pub struct WeatherApiSource {
    client: Client,
    api_url: String,
    api_key: String,
}

impl WeatherApiSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client for the weather service")?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ForecastSource for WeatherApiSource {
    async fn current(&self, location: &str) -> Result<Forecast, ForecastError> {
        let response = self
            .client
            .get(format!("{}/forecast.json", self.api_url))
            .query(&[("key", self.api_key.as_str()), ("q", location), ("days", "1")])
            .send()
            .await
            .context("Failed to reach the weather service")?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            if body["error"]["code"].as_i64() == Some(CODE_NO_MATCHING_LOCATION) {
                return Err(ForecastError::LocationNotFound(location.to_string()));
            }
            return Err(ForecastError::Upstream(anyhow::anyhow!(
                "weather service returned HTTP {}: {}",
                status,
                body["error"]["message"].as_str().unwrap_or("")
            )));
        }

        let report: ApiReport = response
            .json()
            .await
            .context("Failed to parse the weather response")?;
        Ok(normalize(location, report))
    }
}

fn normalize(query: &str, report: ApiReport) -> Forecast {
    let location = report.location.as_ref();
    let display_name = match location.and_then(|l| l.name.clone()) {
        Some(name) => match location.and_then(|l| l.country.clone()) {
            Some(country) => format!("{}, {}", name, country),
            None => name,
        },
        None => query.to_string(),
    };

    let astro = report
        .forecast
        .and_then(|f| f.forecastday.into_iter().next())
        .and_then(|day| day.astro);

    Forecast {
        location: display_name,
        condition: report
            .current
            .as_ref()
            .and_then(|c| c.condition.as_ref())
            .and_then(|c| c.text.clone()),
        temp_c: report.current.as_ref().and_then(|c| c.temp_c),
        feelslike_c: report.current.as_ref().and_then(|c| c.feelslike_c),
        humidity: report.current.as_ref().and_then(|c| c.humidity),
        wind_kph: report.current.as_ref().and_then(|c| c.wind_kph),
        sunrise: astro.as_ref().and_then(|a| a.sunrise.clone()),
        sunset: astro.as_ref().and_then(|a| a.sunset.clone()),
        localtime: location.and_then(|l| l.localtime.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Forecast);

    #[async_trait]
    impl ForecastSource for FixedSource {
        async fn current(&self, _location: &str) -> Result<Forecast, ForecastError> {
            Ok(self.0.clone())
        }
    }

    struct NotFoundSource;

    #[async_trait]
    impl ForecastSource for NotFoundSource {
        async fn current(&self, location: &str) -> Result<Forecast, ForecastError> {
            Err(ForecastError::LocationNotFound(location.to_string()))
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl ForecastSource for BrokenSource {
        async fn current(&self, _location: &str) -> Result<Forecast, ForecastError> {
            Err(ForecastError::Upstream(anyhow::anyhow!("503 from upstream")))
        }
    }

    fn full_forecast() -> Forecast {
        Forecast {
            location: "Tokyo, Japan".to_string(),
            condition: Some("Partly cloudy".to_string()),
            temp_c: Some(27.0),
            feelslike_c: Some(29.5),
            humidity: Some(65.0),
            wind_kph: Some(12.2),
            sunrise: Some("05:12 AM".to_string()),
            sunset: Some("06:20 PM".to_string()),
            localtime: Some("2026-08-30 14:05".to_string()),
        }
    }

    #[tokio::test]
    async fn empty_location_asks_for_one() {
        let source = FixedSource(full_forecast());
        let reply = handle("  ", Some(&source)).await;
        assert_eq!(reply, ASK_LOCATION);
    }

    #[tokio::test]
    async fn missing_credential_degrades_gracefully() {
        let reply = handle("Tokyo", None).await;
        assert_eq!(reply, NOT_CONFIGURED);
    }

    #[tokio::test]
    async fn unknown_location_names_the_query() {
        let reply = handle("Atlantis", Some(&NotFoundSource)).await;
        assert!(reply.contains("Atlantis"));
        assert!(reply.contains("couldn't find"));
    }

    #[tokio::test]
    async fn upstream_failure_yields_generic_message() {
        let reply = handle("Tokyo", Some(&BrokenSource)).await;
        assert_eq!(reply, DEGRADED);
    }

    #[tokio::test]
    async fn full_report_renders_every_field() {
        let reply = handle("Tokyo", Some(&FixedSource(full_forecast()))).await;
        assert!(reply.contains("Tokyo, Japan"));
        assert!(reply.contains("Partly cloudy"));
        assert!(reply.contains("27.0°C"));
        assert!(reply.contains("feels like 29.5°C"));
        assert!(reply.contains("65.0%"));
        assert!(reply.contains("12.2 km/h"));
        assert!(reply.contains("05:12 AM"));
        assert!(reply.contains("Sunday, 2026-08-30, 14:05"));
    }

    #[tokio::test]
    async fn missing_fields_render_as_na_not_omitted() {
        let sparse = Forecast {
            location: "Tokyo".to_string(),
            ..Forecast::default()
        };
        let reply = handle("Tokyo", Some(&FixedSource(sparse))).await;
        assert!(reply.contains("Condition: N/A"));
        assert!(reply.contains("Temperature: N/A"));
        assert!(reply.contains("Local time: unavailable"));
    }

    #[tokio::test]
    async fn unresponsive_upstream_fails_within_the_client_timeout() {
        use std::time::Duration;

        // A listener that accepts connections but never writes a response.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = SourceConfig {
            api_url: format!("http://{}", addr),
            api_key: "k".to_string(),
            timeout: Duration::from_millis(250),
        };
        let source = WeatherApiSource::new(&config).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), source.current("Tokyo"))
            .await
            .expect("request must give up once the client timeout elapses");
        assert!(matches!(outcome, Err(ForecastError::Upstream(_))));
    }

    #[test]
    fn normalize_prefers_resolved_name_over_query() {
        let report = ApiReport {
            location: Some(ApiLocation {
                name: Some("Tokyo".to_string()),
                country: Some("Japan".to_string()),
                localtime: Some("2026-08-30 14:05".to_string()),
            }),
            current: None,
            forecast: None,
        };
        let forecast = normalize("tokio", report);
        assert_eq!(forecast.location, "Tokyo, Japan");
        assert!(forecast.condition.is_none());
    }
}

//! Current conditions from Open-Meteo.

use crate::config::{Config, Units, seconds};
use crate::error::FetchError;
use crate::producer::{PollSettings, Producer, Source};
use crate::summary::Reading;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Shown while the weather section is switched off.
pub const DISABLED_TEXT: &str = "Weather: off";
/// Shown before the first fetch and after a failed one.
pub const UNAVAILABLE_TEXT: &str = "Weather: --";

/// Public Open-Meteo endpoint.
pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

const FETCH_TIMEOUT: Duration = Duration::from_secs(8);

/// Producer publishing current [`Conditions`].
pub type WeatherProvider = Producer<OpenMeteo>;

/// One successful reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    pub temperature: f64,
    /// WMO weather interpretation code.
    pub code: Option<u16>,
    pub units: Units,
}

impl Conditions {
    /// e.g. `72°F Partly cloudy`
    pub fn summary(&self) -> String {
        format!(
            "{:.0}{} {}",
            self.temperature,
            self.units.symbol(),
            describe(self.code)
        )
    }
}

/// Text for a weather reading, sentinels included.
pub fn display_text(reading: &Reading<Conditions>) -> String {
    match reading {
        Reading::Ready(conditions) => conditions.summary(),
        Reading::Disabled => DISABLED_TEXT.to_string(),
        Reading::Unavailable => UNAVAILABLE_TEXT.to_string(),
    }
}

/// Short description of a WMO code.
pub fn describe(code: Option<u16>) -> &'static str {
    match code {
        Some(0) => "Clear",
        Some(1) => "Mainly clear",
        Some(2) => "Partly cloudy",
        Some(3) => "Overcast",
        Some(45) => "Fog",
        Some(48) => "Rime fog",
        Some(51) => "Light drizzle",
        Some(53) => "Drizzle",
        Some(55) => "Heavy drizzle",
        Some(56 | 57) => "Freezing drizzle",
        Some(61) => "Light rain",
        Some(63) => "Rain",
        Some(65) => "Heavy rain",
        Some(66 | 67) => "Freezing rain",
        Some(71) => "Light snow",
        Some(73) => "Snow",
        Some(75) => "Heavy snow",
        Some(77) => "Snow grains",
        Some(80 | 81) => "Rain showers",
        Some(82) => "Violent showers",
        Some(85 | 86) => "Snow showers",
        Some(95) => "Thunderstorm",
        Some(96 | 99) => "Thunderstorm hail",
        _ => "Weather",
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: Option<CurrentWeather>,
    current: Option<Current>,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: Option<f64>,
    weathercode: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct Current {
    temperature_2m: Option<f64>,
    weather_code: Option<u16>,
}

impl ForecastResponse {
    /// Prefer the legacy `current_weather` block, fall back to `current`.
    fn reading(self) -> Option<(f64, Option<u16>)> {
        if let Some(cw) = self.current_weather {
            return cw.temperature.map(|t| (t, cw.weathercode));
        }
        self.current
            .and_then(|c| c.temperature_2m.map(|t| (t, c.weather_code)))
    }
}

/// Open-Meteo forecast client.
#[derive(Debug, Clone)]
pub struct OpenMeteo {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteo {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(OPEN_METEO_URL)
    }

    /// Point at another endpoint (a local mirror, or a test server).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("ribbon-display/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Source for OpenMeteo {
    type Output = Conditions;

    fn name(&self) -> &'static str {
        "weather"
    }

    fn settings(&self, config: &Config) -> PollSettings {
        PollSettings {
            enabled: config.weather.enabled,
            refresh: seconds(config.weather.refresh_s),
        }
    }

    async fn fetch(&self, config: &Config) -> Result<Conditions, FetchError> {
        let weather = &config.weather;
        let latitude = weather.latitude.to_string();
        let longitude = weather.longitude.to_string();
        let response: ForecastResponse = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("current_weather", "true"),
                ("temperature_unit", weather.units.temperature_unit()),
                ("timezone", "auto"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let (temperature, code) = response.reading().ok_or(FetchError::MissingReading)?;
        Ok(Conditions {
            temperature,
            code,
            units: weather.units,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_formatting() {
        let conditions = Conditions {
            temperature: 71.6,
            code: Some(2),
            units: Units::Imperial,
        };
        assert_eq!(conditions.summary(), "72°F Partly cloudy");

        let metric = Conditions {
            temperature: -3.2,
            code: Some(1234),
            units: Units::Metric,
        };
        assert_eq!(metric.summary(), "-3°C Weather");
    }

    #[test]
    fn test_sentinel_texts() {
        assert_eq!(display_text(&Reading::Disabled), "Weather: off");
        assert_eq!(display_text(&Reading::Unavailable), "Weather: --");
    }

    #[test]
    fn test_parse_current_weather_block() {
        let body = r#"{"current_weather": {"temperature": 18.4, "weathercode": 61}}"#;
        let response: ForecastResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.reading(), Some((18.4, Some(61))));
    }

    #[test]
    fn test_parse_current_block() {
        let body = r#"{"current": {"temperature_2m": 5.0, "weather_code": 3}}"#;
        let response: ForecastResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.reading(), Some((5.0, Some(3))));
    }

    #[test]
    fn test_missing_temperature_is_no_reading() {
        let body = r#"{"current_weather": {"weathercode": 0}, "latitude": 1.0}"#;
        let response: ForecastResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.reading(), None);
    }

    #[test]
    fn test_settings_follow_config() {
        let source = OpenMeteo::new().unwrap();
        let mut config = Config::default();
        config.weather.enabled = false;
        config.weather.refresh_s = 60.0;
        let settings = source.settings(&config);
        assert!(!settings.enabled);
        assert_eq!(settings.refresh, Duration::from_secs(60));
    }
}

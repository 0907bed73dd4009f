//! Weather from the Open-Meteo forecast API

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ArgumentSpec, FETCH_TIMEOUT, Widget, WidgetContext, WidgetKind, parse_params};
use crate::cache::FetchRequest;
use crate::error::{FetchError, WidgetError};

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

const CELSIUS: &str = "celsius";
const FAHRENHEIT: &str = "fahrenheit";

/// Timestamp layout of the API's local times
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

const CURRENT_FIELDS: [(&str, &str); 5] = [
    ("temperature_2m", "temperature"),
    ("relative_humidity_2m", "relative_humidity"),
    ("apparent_temperature", "apparent_temperature"),
    ("precipitation", "precipitation"),
    ("rain", "rain"),
];

pub static KIND: WidgetKind = WidgetKind {
    name: "openmeteo",
    cache_type: "openmeteo",
    description: "Current weather and a short forecast",
    default_cache: None,
    session_timeout_secs: 3600,
    alternate_durations: &[],
    arguments: &[
        ArgumentSpec::new("latitude", "float", None),
        ArgumentSpec::new("longitude", "float", None),
        ArgumentSpec::new("timezone", "str", None),
        ArgumentSpec::new("units", "str", Some(CELSIUS)),
        ArgumentSpec::new("days", "int", Some("3")),
        ArgumentSpec::new("graph", "bool", Some("true")),
        ArgumentSpec::new("animation", "bool", Some("true")),
        ArgumentSpec::new("min", "bool", Some("true")),
        ArgumentSpec::new("max", "bool", Some("true")),
    ],
    build,
};

fn default_units() -> String {
    CELSIUS.to_string()
}

fn default_days() -> i64 {
    3
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Params {
    latitude: Option<f64>,
    longitude: Option<f64>,
    timezone: Option<String>,
    #[serde(default = "default_units")]
    units: String,
    #[serde(default = "default_days")]
    days: i64,
    #[serde(default = "default_true")]
    graph: bool,
    #[serde(default = "default_true")]
    animation: bool,
    #[serde(default = "default_true")]
    min: bool,
    #[serde(default = "default_true")]
    max: bool,
}

/// The slice of the forecast response this widget reads
#[derive(Debug, Deserialize)]
struct Forecast {
    #[serde(default)]
    utc_offset_seconds: i64,
    #[serde(default)]
    current: serde_json::Map<String, Value>,
    hourly: Option<Series>,
    daily: Option<Series>,
}

/// Column-oriented series: a `time` column plus one column per variable
#[derive(Debug, Deserialize)]
struct Series {
    time: Vec<String>,
    #[serde(flatten)]
    columns: serde_json::Map<String, Value>,
}

impl Series {
    /// `[time, value]` pairs for `column`, values rounded to one decimal
    fn points(&self, column: &str, take: usize) -> Vec<(String, f64)> {
        let values = self.columns.get(column).and_then(Value::as_array);
        self.time
            .iter()
            .take(take)
            .enumerate()
            .map(|(idx, time)| {
                let value = values
                    .and_then(|v| v.get(idx))
                    .and_then(Value::as_f64)
                    .unwrap_or_default();
                (time.clone(), round1(value))
            })
            .collect()
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// The precipitation in progress (within the last hour) and the next one
/// expected, as `[time, amount, minutes away]`.
fn precipitation_windows(points: &[(String, f64)], now: NaiveDateTime) -> (Option<Value>, Option<Value>) {
    let mut current = None;
    let mut upcoming = None;

    for (time, value) in points {
        if *value == 0.0 {
            continue;
        }
        let Ok(at) = NaiveDateTime::parse_from_str(time, TIME_FORMAT) else {
            continue;
        };
        let minutes_since = (now - at).num_seconds() as f64 / 60.0;
        if current.is_none() && now > at && minutes_since < 60.0 {
            current = Some(json!([time, value, minutes_since]));
        }
        if upcoming.is_none() && at > now {
            upcoming = Some(json!([time, value, -minutes_since]));
        }
    }

    (current, upcoming)
}

pub struct OpenMeteo {
    latitude: f64,
    longitude: f64,
    timezone: String,
    params: Params,
    url: String,
}

fn build(params: Value) -> Result<Box<dyn Widget>, WidgetError> {
    Ok(Box::new(OpenMeteo::from_params(params)?))
}

fn init_error(message: impl Into<String>) -> WidgetError {
    WidgetError::Init {
        widget: KIND.name.to_string(),
        message: message.into(),
    }
}

impl OpenMeteo {
    pub fn from_params(params: Value) -> Result<Self, WidgetError> {
        let params: Params = parse_params(&KIND, params)?;

        let latitude = params
            .latitude
            .ok_or_else(|| init_error("Missing 'latitude' parameter. It is required."))?;
        let longitude = params
            .longitude
            .ok_or_else(|| init_error("Missing 'longitude' parameter. It is required."))?;
        let timezone = params
            .timezone
            .clone()
            .filter(|tz| !tz.trim().is_empty())
            .ok_or_else(|| init_error("Missing 'timezone' parameter. It is required."))?;

        if !(1..=7).contains(&params.days) {
            return Err(init_error("Invalid 'days' parameter. It must be between 1 and 7."));
        }
        if params.units != CELSIUS && params.units != FAHRENHEIT {
            return Err(init_error(format!("Invalid 'units': {}", params.units)));
        }

        Ok(Self {
            latitude,
            longitude,
            timezone,
            params,
            url: FORECAST_URL.to_string(),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// One extra day is requested so the hourly graph covers whole days
    fn forecast_days(&self) -> i64 {
        if self.params.graph { self.params.days + 1 } else { 1 }
    }

    fn request_url(&self) -> Result<String, FetchError> {
        let mut query = vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("current", CURRENT_FIELDS.map(|(api, _)| api).join(",")),
            ("timezone", self.timezone.clone()),
            ("forecast_days", self.forecast_days().to_string()),
        ];
        if self.params.graph {
            query.push(("hourly", "temperature_2m,precipitation,precipitation_probability".to_string()));
            query.push(("daily", "temperature_2m_max,temperature_2m_min,precipitation_sum".to_string()));
        }
        if self.params.units == FAHRENHEIT {
            query.push(("temperature_unit", FAHRENHEIT.to_string()));
        }
        Ok(FetchError::url_with_params(&self.url, &query)?.to_string())
    }

    /// Shape the API response for the dashboard; `now` is the location's
    /// local wall-clock time.
    fn summarize(&self, forecast: &Forecast, now: NaiveDateTime) -> Value {
        let units = if self.params.units == FAHRENHEIT { "\u{b0}F" } else { "\u{b0}C" };

        let current: serde_json::Map<String, Value> = CURRENT_FIELDS
            .iter()
            .map(|(api, name)| (name.to_string(), forecast.current.get(*api).cloned().unwrap_or(Value::Null)))
            .collect();

        let mut data = json!({
            "units": units,
            "current": current,
            "display": {
                "graph": self.params.graph,
                "animation": self.params.animation,
                "min": self.params.min,
                "max": self.params.max,
            },
        });

        if self.params.graph {
            // hourly points for the extra day are dropped to line up with the daily series
            let hours = (self.params.days * 24) as usize;
            if let Some(hourly) = &forecast.hourly {
                let precipitation = hourly.points("precipitation", hours);
                let (current, upcoming) = precipitation_windows(&precipitation, now);
                data["hourly"] = json!({
                    "temperature": hourly.points("temperature_2m", hours),
                    "precipitation": precipitation,
                    "precipitation_current": current,
                    "precipitation_upcoming": upcoming,
                });
            }
            if let Some(daily) = &forecast.daily {
                let days = daily.time.len();
                data["daily"] = json!({
                    "temperature_min": daily.points("temperature_2m_min", days),
                    "temperature_max": daily.points("temperature_2m_max", days),
                    "precipitation": daily.points("precipitation_sum", days),
                });
            }
            let today = now.date();
            let day_names: Vec<String> = (0..self.forecast_days())
                .map(|i| (today + ChronoDuration::days(i)).format("%a").to_string())
                .collect();
            data["day_names"] = json!(day_names);
        }

        data
    }
}

#[async_trait]
impl Widget for OpenMeteo {
    fn kind(&self) -> &'static WidgetKind {
        &KIND
    }

    fn cache_duration(&self) -> Option<&str> {
        None
    }

    async fn fetch_data(&self, ctx: &WidgetContext) -> Result<Value, WidgetError> {
        let req = FetchRequest::get(self.request_url()?).timeout(FETCH_TIMEOUT);
        let forecast: Forecast = ctx.web_fetch(self, req, None).await?.json()?;

        let now = (Utc::now() + ChronoDuration::seconds(forecast.utc_offset_seconds)).naive_utc();
        Ok(self.summarize(&forecast, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheContext;
    use mockito::Matcher;
    use tempfile::TempDir;

    fn params() -> Value {
        json!({"latitude": 45.5, "longitude": -73.6, "timezone": "America/Toronto", "days": 1})
    }

    fn forecast() -> Forecast {
        let hours: Vec<String> = (0..48).map(|h| format!("2024-05-{:02}T{:02}:00", 1 + h / 24, h % 24)).collect();
        let mut precipitation = vec![0.0; 48];
        precipitation[9] = 0.44;
        precipitation[15] = 1.0;
        serde_json::from_value(json!({
            "utc_offset_seconds": -14400,
            "current": {"temperature_2m": 12.3, "relative_humidity_2m": 80, "apparent_temperature": 10.9,
                        "precipitation": 0.0, "rain": 0.0},
            "hourly": {"time": hours, "temperature_2m": vec![10.04; 48], "precipitation": precipitation},
            "daily": {"time": ["2024-05-01", "2024-05-02"], "temperature_2m_max": [15.26, 17.0],
                      "temperature_2m_min": [5.0, 6.1], "precipitation_sum": [1.44, 0.0]}
        }))
        .unwrap()
    }

    #[test]
    fn test_required_parameters() {
        assert!(matches!(OpenMeteo::from_params(json!({"latitude": 1.0})), Err(WidgetError::Init { .. })));
        assert!(matches!(
            OpenMeteo::from_params(json!({"latitude": 1.0, "longitude": 2.0, "timezone": "UTC", "days": 9})),
            Err(WidgetError::Init { .. })
        ));
        assert!(matches!(
            OpenMeteo::from_params(json!({"latitude": 1.0, "longitude": 2.0, "timezone": "UTC", "units": "kelvin"})),
            Err(WidgetError::Init { .. })
        ));
    }

    #[test]
    fn test_uses_session_timeout_partition() {
        let widget = OpenMeteo::from_params(params()).unwrap();
        assert!(widget.cache_duration().is_none());
        let footprint = widget.footprint();
        assert!(footprint.duration.is_none());
        assert_eq!(footprint.fallback_seconds, 3600);
    }

    #[test]
    fn test_summarize_trims_extra_day_and_finds_rain() {
        let widget = OpenMeteo::from_params(params()).unwrap();
        let now = NaiveDateTime::parse_from_str("2024-05-01T09:30", TIME_FORMAT).unwrap();

        let data = widget.summarize(&forecast(), now);

        assert_eq!(data["units"], "\u{b0}C");
        assert_eq!(data["current"]["temperature"], 12.3);
        assert_eq!(data["hourly"]["temperature"].as_array().unwrap().len(), 24);
        assert_eq!(data["hourly"]["temperature"][0], json!(["2024-05-01T00:00", 10.0]));
        assert_eq!(data["hourly"]["precipitation_current"], json!(["2024-05-01T09:00", 0.4, 30.0]));
        assert_eq!(data["hourly"]["precipitation_upcoming"], json!(["2024-05-01T15:00", 1.0, 330.0]));
        assert_eq!(data["daily"]["temperature_max"][0], json!(["2024-05-01", 15.3]));
        assert_eq!(data["day_names"], json!(["Wed", "Thu"]));
    }

    #[tokio::test]
    async fn test_fetch_builds_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("timezone".into(), "America/Toronto".into()),
                Matcher::UrlEncoded("forecast_days".into(), "2".into()),
                Matcher::UrlEncoded("temperature_unit".into(), "fahrenheit".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"utc_offset_seconds": 0, "current": {"temperature_2m": 50.1}}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let ctx = WidgetContext::new(CacheContext::shared(dir.path(), reqwest::Client::new()), None);
        let mut p = params();
        p["units"] = json!("fahrenheit");
        let widget = OpenMeteo::from_params(p)
            .unwrap()
            .with_url(format!("{}/v1/forecast", server.url()));

        let data = widget.fetch_data(&ctx).await.unwrap();

        assert_eq!(data["units"], "\u{b0}F");
        assert_eq!(data["current"]["temperature"], 50.1);
        assert!(data.get("hourly").is_none());
        mock.assert_async().await;
        assert!(dir.path().join("requests-openmeteo-3600.sqlite").exists());
    }
}

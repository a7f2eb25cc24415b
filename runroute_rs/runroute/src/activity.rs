//! Activity feed records as served by the dashboard's `/api/activities`.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::geo::Route;
use crate::RouteError;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityMap {
    #[serde(default, deserialize_with = "non_empty")]
    pub summary_polyline: Option<String>,
}

/// One activity and the route to draw for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityRoute {
    pub id: u64,
    #[serde(alias = "name", default)]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_local_time")]
    pub start_date_local: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "non_empty")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    pub polyline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<ActivityMap>,
    #[serde(rename = "runType", default, skip_serializing_if = "Option::is_none")]
    pub run_type: Option<String>,
}

impl ActivityRoute {
    /// The encoded route, preferring the flattened `polyline` field.
    pub fn encoded_route(&self) -> Option<&str> {
        self.polyline
            .as_deref()
            .or_else(|| self.map.as_ref()?.summary_polyline.as_deref())
    }

    pub fn has_route(&self) -> bool {
        self.encoded_route().is_some()
    }

    /// `None` when the activity has no route.
    pub fn decode_route(&self) -> Result<Option<Route>, RouteError> {
        self.encoded_route().map(Route::decode).transpose()
    }

    /// File stem such as `2026-02-11_morning-long-run`.
    pub fn slug(&self) -> String {
        let words: Vec<String> = self
            .title
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        let name = if words.is_empty() {
            format!("activity-{}", self.id)
        } else {
            words.join("-")
        };
        match self.start_date_local {
            Some(date) => format!("{}_{name}", date.format("%Y-%m-%d")),
            None => name,
        }
    }
}

/// Parsed `/api/activities` payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityFeed {
    pub activities: Vec<ActivityRoute>,
    #[serde(rename = "totalMi", default, skip_serializing_if = "Option::is_none")]
    pub total_mi: Option<f64>,
    #[serde(rename = "goalMi", default, skip_serializing_if = "Option::is_none")]
    pub goal_mi: Option<f64>,
}

impl ActivityFeed {
    pub fn find(&self, id: u64) -> Option<&ActivityRoute> {
        self.activities.iter().find(|a| a.id == id)
    }

    pub fn with_routes(&self) -> impl Iterator<Item = &ActivityRoute> {
        self.activities.iter().filter(|a| a.has_route())
    }
}

/// Accepts the dashboard envelope, a bare array, or raw tracker records.
pub fn parse_activity_feed(json: &str) -> Result<ActivityFeed, RouteError> {
    let value: Value = serde_json::from_str(json).map_err(feed_error)?;
    match value {
        Value::Object(mut obj) => {
            if let Some(err) = obj.remove("error") {
                let message = match err {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                return Err(RouteError::Feed(message));
            }
            if !obj.contains_key("activities") {
                return Err(RouteError::Feed("payload has no activities".into()));
            }
            serde_json::from_value(Value::Object(obj)).map_err(feed_error)
        }
        Value::Array(_) => {
            let activities = serde_json::from_value(value).map_err(feed_error)?;
            Ok(ActivityFeed {
                activities,
                ..ActivityFeed::default()
            })
        }
        _ => Err(RouteError::Feed("expected an object or an array".into())),
    }
}

fn feed_error(err: serde_json::Error) -> RouteError {
    RouteError::Feed(err.to_string())
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn lenient_local_time<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_local_time(raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp {raw:?}"))),
    }
}

/// Local wall-clock time; a trailing `Z` or offset is dropped, not applied.
fn parse_local_time(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    let trimmed = raw.strip_suffix('Z').unwrap_or(raw);
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    const DASHBOARD: &str = r#"{
        "activities": [
            {"id": 1, "title": "Morning Long Run", "start_date_local": "2026-02-11T07:24:00",
             "distance": "13.3 mi", "polyline": "_p~iF~ps|U_ulLnnqC_mqNvxq`@", "city": "Concord",
             "runType": "Easy Long Run"},
            {"id": 2, "title": "Treadmill", "start_date_local": "2026-02-10T06:15:00Z",
             "polyline": null, "city": ""},
            {"id": 3, "title": "Tempo Run", "start_date_local": "2026-02-09T05:45:00",
             "polyline": ""}
        ],
        "weekDays": [],
        "totalMi": 26.2,
        "goalMi": 50
    }"#;

    #[test]
    fn parses_dashboard_envelope() {
        let feed = parse_activity_feed(DASHBOARD).unwrap();
        assert_eq!(feed.activities.len(), 3);
        assert_eq!(feed.total_mi, Some(26.2));
        assert_eq!(feed.goal_mi, Some(50.0));

        let first = feed.find(1).unwrap();
        assert_eq!(first.city.as_deref(), Some("Concord"));
        assert_eq!(first.run_type.as_deref(), Some("Easy Long Run"));
        assert_eq!(first.decode_route().unwrap().unwrap().len(), 3);

        let second = feed.find(2).unwrap();
        assert_eq!(second.city, None);
        assert_eq!(second.start_date_local.unwrap().hour(), 6);

        assert_eq!(feed.with_routes().count(), 1);
    }

    #[test]
    fn empty_polyline_means_no_route() {
        let feed = parse_activity_feed(DASHBOARD).unwrap();
        let tempo = feed.find(3).unwrap();
        assert!(!tempo.has_route());
        assert_eq!(tempo.decode_route().unwrap(), None);
    }

    #[test]
    fn raw_tracker_records_use_summary_polyline() {
        let raw = r#"[{"id": 99, "name": "Lunch Run", "start_date_local": "2026-01-05T12:00:00Z",
                      "map": {"id": "a99", "summary_polyline": "_p~iF~ps|U_ulLnnqC"}}]"#;
        let feed = parse_activity_feed(raw).unwrap();
        let run = &feed.activities[0];
        assert_eq!(run.title, "Lunch Run");
        assert_eq!(run.encoded_route(), Some("_p~iF~ps|U_ulLnnqC"));
        assert_eq!(feed.total_mi, None);
    }

    #[test]
    fn error_payload_is_reported() {
        let err = parse_activity_feed(r#"{"error": "Strava not connected"}"#).unwrap_err();
        assert!(matches!(err, RouteError::Feed(msg) if msg == "Strava not connected"));
    }

    #[test]
    fn unexpected_shapes_are_rejected() {
        assert!(matches!(parse_activity_feed("42"), Err(RouteError::Feed(_))));
        assert!(matches!(parse_activity_feed("{}"), Err(RouteError::Feed(_))));
        assert!(matches!(parse_activity_feed("[{"), Err(RouteError::Feed(_))));
    }

    #[test]
    fn malformed_route_surfaces_on_decode() {
        let feed = parse_activity_feed(r#"[{"id": 5, "polyline": "_p~iF"}]"#).unwrap();
        assert!(feed.activities[0].decode_route().is_err());
    }

    #[test]
    fn slug_uses_date_and_title() {
        let feed = parse_activity_feed(DASHBOARD).unwrap();
        assert_eq!(feed.find(1).unwrap().slug(), "2026-02-11_morning-long-run");

        let untitled: ActivityRoute = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(untitled.slug(), "activity-7");
    }

    #[test]
    fn local_time_ignores_offset() {
        let expected = NaiveDate::from_ymd_opt(2026, 2, 10)
            .unwrap()
            .and_hms_opt(6, 15, 0)
            .unwrap();
        assert_eq!(parse_local_time("2026-02-10T06:15:00Z"), Some(expected));
        assert_eq!(parse_local_time("2026-02-10T06:15:00-08:00"), Some(expected));
        assert_eq!(parse_local_time("2026-02-10 06:15:00"), Some(expected));
        assert_eq!(parse_local_time("yesterday"), None);
    }
}

//! Feed payload decoding.
//!
//! Two upstream formats are supported: binary GTFS-realtime feeds and the
//! opendatasoft-style JSON dataset API, which nests further JSON documents
//! inside string fields. Both decode into the same normalized event stream.
//! An empty feed is a valid, non-error result; individual records that fail
//! to parse are skipped so one bad entity never poisons the whole payload.

use chrono::{DateTime, NaiveDateTime, Utc};
use gtfs_realtime::FeedMessage;
use prost::Message;
use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::domain::{ArrivalEvent, DestinationRef, LineId, StopId};

use super::error::FetchError;

/// Decode a binary GTFS-realtime feed into normalized arrival events.
///
/// Only trip updates are considered; vehicle positions and alerts carry no
/// arrival predictions. The trip's terminal stop is recorded as the
/// destination reference for later name resolution.
pub fn decode_gtfs_rt(body: &[u8]) -> Result<Vec<ArrivalEvent>, FetchError> {
    let feed = FeedMessage::decode(body)
        .map_err(|e| FetchError::decode(format!("invalid GTFS-realtime feed: {e}")))?;

    let mut events = Vec::new();

    for entity in &feed.entity {
        let Some(trip_update) = &entity.trip_update else {
            continue;
        };

        let Some(line_id) = trip_update
            .trip
            .route_id
            .as_deref()
            .and_then(|id| LineId::parse(id).ok())
        else {
            continue;
        };

        // The last stop of the update sequence stands in for the headsign,
        // which GTFS-realtime does not carry.
        let Some(terminus) = trip_update
            .stop_time_update
            .iter()
            .rev()
            .find_map(|stu| stu.stop_id.as_deref())
            .and_then(|id| StopId::parse(id).ok())
        else {
            continue;
        };

        for stu in &trip_update.stop_time_update {
            let Some(stop_id) = stu
                .stop_id
                .as_deref()
                .and_then(|id| StopId::parse(id).ok())
            else {
                continue;
            };

            let Some(arrival) = &stu.arrival else {
                continue;
            };

            let Some(expected_at) = arrival.time.and_then(|t| DateTime::from_timestamp(t, 0))
            else {
                continue;
            };

            events.push(ArrivalEvent {
                stop_id,
                line_id: line_id.clone(),
                destination: DestinationRef::Stop(terminus.clone()),
                expected_at,
                delay_seconds: arrival.delay,
            });
        }
    }

    Ok(events)
}

#[derive(Debug, Deserialize)]
struct RecordsPayload {
    #[serde(default)]
    results: Vec<WaitingRecord>,
}

#[derive(Debug, Deserialize)]
struct WaitingRecord {
    #[serde(deserialize_with = "string_or_number")]
    pointid: String,

    #[serde(deserialize_with = "string_or_number")]
    lineid: String,

    /// JSON document nested inside a string field.
    #[serde(default)]
    passingtimes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PassingTime {
    #[serde(default)]
    destination: Option<LocalizedText>,

    #[serde(default, rename = "expectedArrivalTime")]
    expected_arrival_time: Option<String>,
}

/// Multilingual text as the provider ships it. Also used for the stop
/// metadata dataset, which nests the same shape inside a string field.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct LocalizedText {
    #[serde(default)]
    en: Option<String>,

    #[serde(default)]
    fr: Option<String>,

    #[serde(default)]
    nl: Option<String>,
}

impl LocalizedText {
    /// Pick the best available language, in en → fr → nl precedence.
    pub(crate) fn pick(&self) -> Option<&str> {
        [&self.en, &self.fr, &self.nl]
            .into_iter()
            .find_map(|v| v.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// The dataset API is inconsistent about whether ids are strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Decode an opendatasoft-style JSON waiting-times payload.
pub fn decode_records(body: &[u8]) -> Result<Vec<ArrivalEvent>, FetchError> {
    let payload: RecordsPayload = serde_json::from_slice(body)
        .map_err(|e| FetchError::decode(format!("invalid records payload: {e}")))?;

    let mut events = Vec::new();

    for record in payload.results {
        let (Ok(stop_id), Ok(line_id)) = (
            StopId::parse(&record.pointid),
            LineId::parse(&record.lineid),
        ) else {
            warn!(
                pointid = %record.pointid,
                lineid = %record.lineid,
                "skipping record with empty ids"
            );
            continue;
        };

        let raw_times = record.passingtimes.as_deref().unwrap_or("[]");
        let passing_times: Vec<PassingTime> = match serde_json::from_str(raw_times) {
            Ok(times) => times,
            Err(e) => {
                warn!(stop = %stop_id, error = %e, "skipping unparsable passing times");
                continue;
            }
        };

        for passing_time in passing_times {
            let Some(expected_at) = passing_time
                .expected_arrival_time
                .as_deref()
                .and_then(parse_arrival_time)
            else {
                continue;
            };

            let destination = passing_time
                .destination
                .as_ref()
                .and_then(|d| d.pick())
                .unwrap_or("Unknown")
                .to_string();

            events.push(ArrivalEvent {
                stop_id: stop_id.clone(),
                line_id: line_id.clone(),
                destination: DestinationRef::Name(destination),
                expected_at,
                // The dataset API reports no schedule deviation.
                delay_seconds: None,
            });
        }
    }

    Ok(events)
}

/// Parse a provider arrival timestamp.
///
/// Prefers RFC 3339; naive timestamps (no offset) are taken as UTC.
fn parse_arrival_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_realtime::trip_update::{StopTimeEvent, StopTimeUpdate};
    use gtfs_realtime::{FeedEntity, FeedHeader, TripDescriptor, TripUpdate};

    fn feed_with_trip(route_id: &str, stops: &[(&str, i64, Option<i32>)]) -> Vec<u8> {
        let stop_time_update = stops
            .iter()
            .map(|(stop_id, time, delay)| StopTimeUpdate {
                stop_id: Some(stop_id.to_string()),
                arrival: Some(StopTimeEvent {
                    time: Some(*time),
                    delay: *delay,
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect();

        let message = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                ..Default::default()
            },
            entity: vec![FeedEntity {
                id: "trip-1".to_string(),
                trip_update: Some(TripUpdate {
                    trip: TripDescriptor {
                        route_id: Some(route_id.to_string()),
                        ..Default::default()
                    },
                    stop_time_update,
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };

        message.encode_to_vec()
    }

    #[test]
    fn gtfs_rt_trip_updates_become_events() {
        let body = feed_with_trip("3040", &[("8122", 1_700_000_000, Some(60)), ("8131", 1_700_000_300, None)]);
        let events = decode_gtfs_rt(&body).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stop_id.as_str(), "8122");
        assert_eq!(events[0].line_id.as_str(), "3040");
        assert_eq!(events[0].delay_seconds, Some(60));
        // Destination points at the trip's terminal stop.
        assert_eq!(
            events[0].destination,
            DestinationRef::Stop(StopId::parse("8131").unwrap())
        );
        assert_eq!(events[0].expected_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn empty_gtfs_rt_feed_is_not_an_error() {
        let message = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                ..Default::default()
            },
            entity: vec![],
        };
        let events = decode_gtfs_rt(&message.encode_to_vec()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn truncated_gtfs_rt_feed_is_a_decode_error() {
        let mut body = feed_with_trip("3040", &[("8122", 1_700_000_000, None)]);
        body.truncate(body.len() / 2);
        body.push(0xFF);

        assert!(matches!(
            decode_gtfs_rt(&body),
            Err(FetchError::Decode { .. })
        ));
    }

    #[test]
    fn json_records_become_events() {
        let body = serde_json::json!({
            "results": [{
                "pointid": 8122,
                "lineid": "1",
                "passingtimes": "[{\"destination\":{\"fr\":\"STOCKEL\"},\"expectedArrivalTime\":\"2026-08-27T12:30:00+02:00\"}]"
            }]
        });
        let events = decode_records(body.to_string().as_bytes()).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stop_id.as_str(), "8122");
        assert_eq!(events[0].line_id.as_str(), "1");
        assert_eq!(
            events[0].destination,
            DestinationRef::Name("STOCKEL".to_string())
        );
        assert_eq!(events[0].delay_seconds, None);
    }

    #[test]
    fn english_text_wins_over_french() {
        let body = serde_json::json!({
            "results": [{
                "pointid": "8122",
                "lineid": "1",
                "passingtimes": "[{\"destination\":{\"fr\":\"STOCKEL\",\"en\":\"STOCKEL (EN)\"},\"expectedArrivalTime\":\"2026-08-27T12:30:00\"}]"
            }]
        });
        let events = decode_records(body.to_string().as_bytes()).unwrap();
        assert_eq!(
            events[0].destination,
            DestinationRef::Name("STOCKEL (EN)".to_string())
        );
    }

    #[test]
    fn bad_passing_times_skip_only_that_record() {
        let body = serde_json::json!({
            "results": [
                {"pointid": "1", "lineid": "1", "passingtimes": "not json"},
                {"pointid": "2", "lineid": "2", "passingtimes": "[{\"expectedArrivalTime\":\"2026-08-27T12:30:00\"}]"}
            ]
        });
        let events = decode_records(body.to_string().as_bytes()).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stop_id.as_str(), "2");
        assert_eq!(events[0].destination, DestinationRef::Name("Unknown".to_string()));
    }

    #[test]
    fn empty_results_are_valid() {
        let events = decode_records(br#"{"results": []}"#).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn non_json_payload_is_a_decode_error() {
        assert!(matches!(
            decode_records(b"<html>530 upstream error</html>"),
            Err(FetchError::Decode { .. })
        ));
    }

    #[test]
    fn naive_timestamps_are_taken_as_utc() {
        let parsed = parse_arrival_time("2026-08-27T12:30:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-08-27T12:30:00+00:00");
    }
}

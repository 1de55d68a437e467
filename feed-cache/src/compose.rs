//! Folds decoded arrival events into the published payload shape.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future;
use tracing::debug;

use crate::domain::{Arrival, ArrivalEvent, DestinationRef, LineId, StopId, StopStatus, StopsData};
use crate::entities::EntityCache;

/// Builds [`StopsData`] payloads for one provider's monitored stops.
///
/// The composer owns the monitored-stop skeleton: every configured stop is
/// present in every payload it produces, with its line mapping possibly
/// empty. Stop names and coordinates come from the entity cache.
pub struct ResultComposer {
    entities: Arc<EntityCache>,
    monitored_stops: Vec<StopId>,
    monitored_lines: Vec<LineId>,
}

impl ResultComposer {
    pub fn new(
        entities: Arc<EntityCache>,
        monitored_stops: Vec<StopId>,
        monitored_lines: Vec<LineId>,
    ) -> Self {
        Self {
            entities,
            monitored_stops,
            monitored_lines,
        }
    }

    /// The default shape for this provider: every monitored stop, no lines.
    ///
    /// Served on the degraded path, so only cached stop details are
    /// consulted; nothing here touches the network.
    pub async fn empty_payload(&self) -> StopsData {
        let mut data = StopsData::default();
        for stop_id in &self.monitored_stops {
            let info = self.entities.cached_stop_info(stop_id).await;
            data.stops_data.insert(
                stop_id.clone(),
                StopStatus {
                    name: info.name.clone(),
                    coordinates: info.coordinates,
                    lines: BTreeMap::new(),
                },
            );
        }
        data
    }

    /// Fold decoded events into the payload, preserving feed order within
    /// each (stop, line) group. Events for unmonitored stops or unadmitted
    /// lines are dropped.
    pub async fn compose(&self, events: &[ArrivalEvent]) -> StopsData {
        let infos = future::join_all(
            self.monitored_stops
                .iter()
                .map(|stop_id| self.entities.stop_info(stop_id)),
        )
        .await;

        let mut data = StopsData::default();
        for (stop_id, info) in self.monitored_stops.iter().zip(infos) {
            data.stops_data.insert(
                stop_id.clone(),
                StopStatus {
                    name: info.name.clone(),
                    coordinates: info.coordinates,
                    lines: BTreeMap::new(),
                },
            );
        }

        let mut dropped = 0usize;
        for event in events {
            if !data.stops_data.contains_key(&event.stop_id) {
                dropped += 1;
                continue;
            }
            if !self.line_admitted(&event.stop_id, &event.line_id).await {
                dropped += 1;
                continue;
            }

            let destination = match &event.destination {
                DestinationRef::Name(name) => name.clone(),
                DestinationRef::Stop(terminal) => {
                    self.entities.stop_info(terminal).await.name.clone()
                }
            };

            let Some(status) = data.stops_data.get_mut(&event.stop_id) else {
                continue;
            };
            status
                .lines
                .entry(event.line_id.clone())
                .or_default()
                .push(Arrival {
                    destination,
                    expected_arrival_time: event.expected_at.to_rfc3339(),
                    delay_seconds: event.delay_seconds,
                });
        }

        if dropped > 0 {
            debug!(dropped, "dropped events outside the monitored set");
        }
        data
    }

    /// Whether a line is published for a stop. A stop-specific association
    /// set takes precedence; otherwise the global monitored-line list
    /// applies, and an empty list admits everything.
    async fn line_admitted(&self, stop_id: &StopId, line_id: &LineId) -> bool {
        if let Some(lines) = self.entities.lines_for(stop_id).await {
            return lines.contains(line_id);
        }
        self.monitored_lines.is_empty() || self.monitored_lines.contains(line_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::StopClient;
    use crate::fetch::{FetchClient, FetchError, FetchResponse};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::time::Duration;

    /// Serves a stop-lookup body per requested stop id, else an empty page.
    struct StopDirectory(HashMap<String, String>);

    #[async_trait]
    impl FetchClient for StopDirectory {
        async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
            let body = self
                .0
                .iter()
                .find(|(id, _)| url.contains(id.as_str()))
                .map(|(_, body)| body.clone())
                .unwrap_or_else(|| r#"{"results": []}"#.to_string());
            Ok(FetchResponse::ok(body))
        }
    }

    fn stop_record(name: &str) -> String {
        format!(
            r#"{{"results": [{{"name": "{{\"fr\": \"{name}\"}}", "gpscoordinates": "{{\"latitude\": 50.85, \"longitude\": 4.35}}"}}]}}"#
        )
    }

    fn entity_cache(stops: &[(&str, &str)]) -> Arc<EntityCache> {
        let directory = StopDirectory(
            stops
                .iter()
                .map(|(id, name)| (id.to_string(), stop_record(name)))
                .collect(),
        );
        let client = StopClient::new(
            Arc::new(directory),
            "https://example.test/stops".to_string(),
            "key".to_string(),
        );
        Arc::new(EntityCache::new(client, Duration::from_secs(3600), 100))
    }

    fn event(stop: &str, line: &str, destination: &str, minute: u32) -> ArrivalEvent {
        ArrivalEvent {
            stop_id: StopId::parse(stop).unwrap(),
            line_id: LineId::parse(line).unwrap(),
            destination: DestinationRef::Name(destination.to_string()),
            expected_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, minute, 0).unwrap(),
            delay_seconds: None,
        }
    }

    fn composer(
        entities: Arc<EntityCache>,
        stops: &[&str],
        lines: &[&str],
    ) -> ResultComposer {
        ResultComposer::new(
            entities,
            stops.iter().map(|s| StopId::parse(s).unwrap()).collect(),
            lines.iter().map(|l| LineId::parse(l).unwrap()).collect(),
        )
    }

    #[tokio::test]
    async fn empty_payload_lists_every_monitored_stop_with_no_lines() {
        let entities = entity_cache(&[]);
        let composer = composer(entities, &["8122", "8161"], &[]);

        let data = composer.empty_payload().await;

        assert_eq!(data.stops_data.len(), 2);
        for (stop_id, status) in &data.stops_data {
            assert!(status.lines.is_empty());
            // Nothing cached, so the name degrades to the stop id.
            assert_eq!(status.name, stop_id.as_str());
        }
    }

    #[tokio::test]
    async fn compose_folds_events_under_their_stop_and_line() {
        let entities = entity_cache(&[("8122", "Trone"), ("8161", "Arts-Loi")]);
        let composer = composer(entities, &["8122", "8161"], &[]);

        let events = [
            event("8122", "5", "Erasme", 10),
            event("8122", "5", "Herrmann-Debroux", 14),
            event("8161", "1", "Gare de l'Ouest", 12),
        ];
        let data = composer.compose(&events).await;

        let trone = &data.stops_data[&StopId::parse("8122").unwrap()];
        assert_eq!(trone.name, "Trone");
        let line5 = &trone.lines[&LineId::parse("5").unwrap()];
        assert_eq!(line5.len(), 2);
        // Feed order is preserved within the group.
        assert_eq!(line5[0].destination, "Erasme");
        assert_eq!(line5[1].destination, "Herrmann-Debroux");
        assert_eq!(line5[0].expected_arrival_time, "2026-03-14T09:10:00+00:00");

        let arts_loi = &data.stops_data[&StopId::parse("8161").unwrap()];
        assert_eq!(arts_loi.lines.len(), 1);
    }

    #[tokio::test]
    async fn unmonitored_stops_are_dropped_but_monitored_ones_remain() {
        let entities = entity_cache(&[]);
        let composer = composer(entities, &["8122"], &[]);

        let events = [event("9999", "5", "Erasme", 10)];
        let data = composer.compose(&events).await;

        assert_eq!(data.stops_data.len(), 1);
        let status = &data.stops_data[&StopId::parse("8122").unwrap()];
        assert!(status.lines.is_empty());
    }

    #[tokio::test]
    async fn global_line_filter_applies_when_no_association_exists() {
        let entities = entity_cache(&[]);
        let composer = composer(entities, &["8122"], &["5"]);

        let events = [event("8122", "5", "Erasme", 10), event("8122", "6", "Roi Baudouin", 11)];
        let data = composer.compose(&events).await;

        let status = &data.stops_data[&StopId::parse("8122").unwrap()];
        assert!(status.lines.contains_key(&LineId::parse("5").unwrap()));
        assert!(!status.lines.contains_key(&LineId::parse("6").unwrap()));
    }

    #[tokio::test]
    async fn stop_association_overrides_the_global_filter() {
        let entities = entity_cache(&[]);
        let mut associations = HashMap::new();
        associations.insert(
            StopId::parse("8122").unwrap(),
            vec![LineId::parse("6").unwrap()],
        );
        entities.replace_associations(associations).await;

        let composer = composer(entities, &["8122"], &["5"]);
        let events = [event("8122", "5", "Erasme", 10), event("8122", "6", "Roi Baudouin", 11)];
        let data = composer.compose(&events).await;

        let status = &data.stops_data[&StopId::parse("8122").unwrap()];
        // The association admits line 6 and shadows the global list.
        assert!(status.lines.contains_key(&LineId::parse("6").unwrap()));
        assert!(!status.lines.contains_key(&LineId::parse("5").unwrap()));
    }

    #[tokio::test]
    async fn terminal_stop_destinations_resolve_to_names() {
        let entities = entity_cache(&[("8122", "Trone"), ("8731", "Erasme")]);
        let composer = composer(entities, &["8122"], &[]);

        let events = [ArrivalEvent {
            stop_id: StopId::parse("8122").unwrap(),
            line_id: LineId::parse("5").unwrap(),
            destination: DestinationRef::Stop(StopId::parse("8731").unwrap()),
            expected_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 10, 0).unwrap(),
            delay_seconds: Some(120),
        }];
        let data = composer.compose(&events).await;

        let status = &data.stops_data[&StopId::parse("8122").unwrap()];
        let arrivals = &status.lines[&LineId::parse("5").unwrap()];
        assert_eq!(arrivals[0].destination, "Erasme");
        assert_eq!(arrivals[0].delay_seconds, Some(120));
    }
}

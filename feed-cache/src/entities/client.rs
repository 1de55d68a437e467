//! Stop metadata dataset client.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::domain::{Coordinates, StopId};
use crate::fetch::{FetchClient, FetchError, LocalizedText};

use super::StopInfo;

#[derive(Debug, Deserialize)]
struct StopRecordsPayload {
    #[serde(default)]
    results: Vec<StopRecord>,
}

#[derive(Debug, Deserialize)]
struct StopRecord {
    /// Localized name document nested inside a string field.
    #[serde(default)]
    name: Option<String>,

    /// Coordinate document nested inside a string field.
    #[serde(default)]
    gpscoordinates: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GpsCoordinates {
    #[serde(default)]
    latitude: Option<serde_json::Value>,

    #[serde(default)]
    longitude: Option<serde_json::Value>,
}

/// Fetches individual stop records from the provider's stops dataset.
pub struct StopClient {
    client: Arc<dyn FetchClient>,
    endpoint: String,
    api_key: String,
}

impl StopClient {
    pub fn new(
        client: Arc<dyn FetchClient>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Fetch one stop's name and coordinates.
    ///
    /// Returns `Ok(None)` when the dataset has no record for the id or the
    /// record carries no usable name.
    pub async fn fetch_stop(&self, id: &StopId) -> Result<Option<StopInfo>, FetchError> {
        // Ids are provider-controlled opaque strings; let the URL encoder
        // deal with whatever characters they contain.
        let filter = format!("id=\"{}\"", id.as_str());
        let url = reqwest::Url::parse_with_params(
            &self.endpoint,
            [
                ("where", filter.as_str()),
                ("limit", "1"),
                ("apikey", self.api_key.as_str()),
            ],
        )
        .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let response = self.client.get(url.as_str()).await?;

        match response.status {
            401 | 403 => return Err(FetchError::Unauthorized),
            429 => return Err(FetchError::RateLimited),
            status if !(200..300).contains(&status) => {
                let message = String::from_utf8_lossy(&response.body)
                    .chars()
                    .take(500)
                    .collect();
                return Err(FetchError::Api { status, message });
            }
            _ => {}
        }

        let payload: StopRecordsPayload = serde_json::from_slice(&response.body)
            .map_err(|e| FetchError::Decode {
                message: format!("invalid stop record payload: {e}"),
            })?;

        let Some(record) = payload.results.into_iter().next() else {
            return Ok(None);
        };

        let Some(name) = record
            .name
            .as_deref()
            .and_then(|raw| serde_json::from_str::<LocalizedText>(raw).ok())
            .and_then(|text| text.pick().map(str::to_string))
        else {
            warn!(stop = %id, "stop record carries no usable name");
            return Ok(None);
        };

        let coordinates = record
            .gpscoordinates
            .as_deref()
            .and_then(|raw| serde_json::from_str::<GpsCoordinates>(raw).ok())
            .and_then(|gps| {
                let lat = gps.latitude.as_ref().and_then(value_as_f64)?;
                let lon = gps.longitude.as_ref().and_then(value_as_f64)?;
                Some(Coordinates { lat, lon })
            });

        Ok(Some(StopInfo { name, coordinates }))
    }
}

/// The dataset ships coordinates sometimes as numbers, sometimes as strings.
fn value_as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

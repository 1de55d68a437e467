//! The externally consumed payload shape.
//!
//! This is the fixed contract with the API layer: every monitored stop is
//! always present, `lines` is an empty mapping rather than an omitted key,
//! and key order is deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{LineId, StopId};

/// WGS84 coordinates of a stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// One predicted arrival as exposed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    /// Destination display text.
    pub destination: String,

    /// Predicted arrival time, RFC 3339.
    pub expected_arrival_time: String,

    /// Delay against schedule in seconds, `null` when unknown.
    pub delay_seconds: Option<i32>,
}

/// Realtime status of a single stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopStatus {
    /// Stop display name.
    pub name: String,

    /// Stop coordinates, `null` when unknown.
    pub coordinates: Option<Coordinates>,

    /// Arrivals per line, in provider order. Always present, possibly empty.
    pub lines: BTreeMap<LineId, Vec<Arrival>>,
}

/// The complete composed payload for one feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopsData {
    pub stops_data: BTreeMap<StopId, StopStatus>,
}

//! Normalized realtime events decoded from an upstream feed.

use chrono::{DateTime, Utc};

use super::{LineId, StopId};

/// Where a vehicle is headed, as reported by the feed.
///
/// JSON feeds carry the destination as display text; GTFS-realtime trip
/// updates only identify the trip's terminal stop, which the composer later
/// resolves to a name through the entity cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationRef {
    /// Display text straight from the feed.
    Name(String),
    /// Terminal stop of the trip; resolved to a name at composition time.
    Stop(StopId),
}

/// One predicted arrival, decoded from a realtime feed.
///
/// This is the normalized form shared by every feed format. Events keep the
/// provider's ordering; the composer relies on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalEvent {
    /// Stop the vehicle will arrive at.
    pub stop_id: StopId,

    /// Line the vehicle is serving.
    pub line_id: LineId,

    /// Where the vehicle is headed.
    pub destination: DestinationRef,

    /// Predicted arrival time.
    pub expected_at: DateTime<Utc>,

    /// Delay against schedule in seconds, when the feed reports one.
    pub delay_seconds: Option<i32>,
}

//! Reference data about stops: names, coordinates, line associations.
//!
//! This data changes on the provider's timescale of days, not seconds, so
//! it lives in its own longer-TTL caches and is used to enrich the realtime
//! feed rather than being fetched alongside it.

mod cache;
mod client;

use std::sync::Arc;

pub use cache::EntityCache;
pub use client::StopClient;

use crate::domain::{Coordinates, StopId};

/// Display metadata for one stop.
#[derive(Debug, Clone, PartialEq)]
pub struct StopInfo {
    pub name: String,
    pub coordinates: Option<Coordinates>,
}

impl StopInfo {
    /// Fallback for stops the dataset cannot resolve: the id stands in for
    /// the name so the composed payload never loses a configured stop.
    pub fn placeholder(id: &StopId) -> Arc<Self> {
        Arc::new(StopInfo {
            name: id.as_str().to_string(),
            coordinates: None,
        })
    }
}

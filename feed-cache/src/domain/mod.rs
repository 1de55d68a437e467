//! Domain vocabulary shared across the crate.

mod event;
mod id;
mod payload;

pub use event::{ArrivalEvent, DestinationRef};
pub use id::{InvalidId, LineId, StopId};
pub use payload::{Arrival, Coordinates, StopStatus, StopsData};

//! Stop and line identifier types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when parsing an invalid identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id: {reason}")]
pub struct InvalidId {
    kind: &'static str,
    reason: &'static str,
}

/// A provider stop identifier (e.g. `"8122"` for ROODEBEEK).
///
/// Providers use opaque strings; the only guarantee this type adds is that
/// the id is non-empty and carries no surrounding whitespace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StopId(String);

impl StopId {
    /// Parse a stop id from a string.
    pub fn parse(s: &str) -> Result<Self, InvalidId> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(InvalidId {
                kind: "stop",
                reason: "must not be empty",
            });
        }
        Ok(StopId(trimmed.to_string()))
    }

    /// Returns the stop id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StopId({})", self.0)
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A provider line identifier (e.g. `"1"`, `"T92"`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(String);

impl LineId {
    /// Parse a line id from a string.
    pub fn parse(s: &str) -> Result<Self, InvalidId> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(InvalidId {
                kind: "line",
                reason: "must not be empty",
            });
        }
        Ok(LineId(trimmed.to_string()))
    }

    /// Returns the line id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LineId({})", self.0)
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

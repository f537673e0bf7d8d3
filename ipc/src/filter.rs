//! Receive-side source filters

use core_types::Endpoint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which senders a receive accepts
///
/// Unlike a raw endpoint with a magic wildcard value, the filter makes the
/// "any sender" case explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFilter {
    /// Accept the first sender to arrive
    Any,
    /// Accept only this endpoint
    From(Endpoint),
}

impl SourceFilter {
    /// Builds a filter from an endpoint, mapping `Endpoint::ANY` to `Any`
    pub fn from_endpoint(endpoint: Endpoint) -> Self {
        if endpoint == Endpoint::ANY {
            SourceFilter::Any
        } else {
            SourceFilter::From(endpoint)
        }
    }

    /// Checks whether `source` passes the filter
    pub fn matches(&self, source: Endpoint) -> bool {
        match self {
            SourceFilter::Any => true,
            SourceFilter::From(expected) => *expected == source,
        }
    }

    /// Returns the specific endpoint, if any
    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            SourceFilter::Any => None,
            SourceFilter::From(endpoint) => Some(*endpoint),
        }
    }

    /// Checks if this is the wildcard filter
    pub fn is_any(&self) -> bool {
        matches!(self, SourceFilter::Any)
    }
}

impl fmt::Display for SourceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFilter::Any => write!(f, "ANY"),
            SourceFilter::From(endpoint) => write!(f, "{}", endpoint),
        }
    }
}

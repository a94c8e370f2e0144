//! Result types for discovery output.

use crate::PmtuError;
use serde::{Deserialize, Serialize};

/// Stable classification of a family-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ResolutionFailure,
    Unreachable,
    Timeout,
    FragmentationBlocked,
    TransportError,
    InvalidInput,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::ResolutionFailure => write!(f, "resolution_failure"),
            ErrorKind::Unreachable => write!(f, "unreachable"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::FragmentationBlocked => write!(f, "fragmentation_blocked"),
            ErrorKind::TransportError => write!(f, "transport_error"),
            ErrorKind::InvalidInput => write!(f, "invalid_input"),
        }
    }
}

/// Outcome for one address family: a discovered path MTU or a classified
/// error, never both. Constructed only through [`FamilyResult::found`] and
/// [`FamilyResult::failed`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyResult {
    /// Discovered path MTU in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmtu: Option<u16>,
    /// True when the probe budget ran out before the search fully converged;
    /// `pmtu` is then the largest size confirmed so far.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
    /// Failure classification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    /// Human-readable failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl FamilyResult {
    /// A successful discovery.
    pub fn found(pmtu: u16, partial: bool) -> Self {
        Self {
            pmtu: Some(pmtu),
            partial,
            error: None,
            error_detail: None,
        }
    }

    /// A classified failure.
    pub fn failed(err: &PmtuError) -> Self {
        Self {
            pmtu: None,
            partial: false,
            error: Some(err.kind()),
            error_detail: Some(err.to_string()),
        }
    }

    /// True when a path MTU was discovered.
    pub fn is_ok(&self) -> bool {
        self.pmtu.is_some()
    }
}

/// Discovery output for both families. A family whose address did not
/// resolve is absent, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombinedResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v4: Option<FamilyResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v6: Option<FamilyResult>,
}

impl CombinedResult {
    /// Both sub-results set to the same failure; used when resolution fails
    /// entirely and no probes are sent.
    pub fn total_failure(err: &PmtuError) -> Self {
        Self {
            v4: Some(FamilyResult::failed(err)),
            v6: Some(FamilyResult::failed(err)),
        }
    }

    /// Serializes the results to JSON with indentation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serializes the results to compact JSON.
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

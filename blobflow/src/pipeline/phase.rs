//! Pipeline phases.

use crate::errors::PolicyOrderingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named bucket of policies with a fixed position in the global order.
///
/// Phases run in the order `Serialize`, `Unphased`, `Deserialize`, `Retry`,
/// `Sign`. Policies registered without a phase belong to `Unphased`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelinePhase {
    /// Request body serialization.
    Serialize,
    /// Policies without an explicit phase.
    #[serde(rename = "None")]
    Unphased,
    /// Response body deserialization.
    Deserialize,
    /// Retry engines.
    Retry,
    /// Request signing. Runs closest to the transport.
    Sign,
}

impl PipelinePhase {
    /// All phases in execution order.
    pub const ORDER: [Self; 5] = [
        Self::Serialize,
        Self::Unphased,
        Self::Deserialize,
        Self::Retry,
        Self::Sign,
    ];

    /// Returns the phase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serialize => "Serialize",
            Self::Unphased => "None",
            Self::Deserialize => "Deserialize",
            Self::Retry => "Retry",
            Self::Sign => "Sign",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Serialize => 0,
            Self::Unphased => 1,
            Self::Deserialize => 2,
            Self::Retry => 3,
            Self::Sign => 4,
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelinePhase {
    type Err = PolicyOrderingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ORDER
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| PolicyOrderingError::InvalidPhase(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_matches_index() {
        for (i, phase) in PipelinePhase::ORDER.iter().enumerate() {
            assert_eq!(phase.index(), i);
        }
        assert!(PipelinePhase::Serialize < PipelinePhase::Sign);
    }

    #[test]
    fn test_parse_known_names() {
        assert_eq!("Retry".parse::<PipelinePhase>().unwrap(), PipelinePhase::Retry);
        assert_eq!("None".parse::<PipelinePhase>().unwrap(), PipelinePhase::Unphased);
        assert_eq!(PipelinePhase::Deserialize.to_string(), "Deserialize");
    }

    #[test]
    fn test_parse_unknown_name() {
        let err = "retry".parse::<PipelinePhase>().unwrap_err();
        assert_eq!(err, PolicyOrderingError::InvalidPhase("retry".to_string()));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&PipelinePhase::Unphased).unwrap();
        assert_eq!(json, "\"None\"");
        let phase: PipelinePhase = serde_json::from_str("\"Sign\"").unwrap();
        assert_eq!(phase, PipelinePhase::Sign);
    }
}

//! The closed set of partitioning strategies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which partitioning algorithm a distribution manager dispatches to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    RoundRobin,
    Knapsack,
    #[default]
    SpaceFillingCurve,
    ProximityFillingCurve,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::RoundRobin,
        Strategy::Knapsack,
        Strategy::SpaceFillingCurve,
        Strategy::ProximityFillingCurve,
    ];

    /// Canonical configuration spelling.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "ROUNDROBIN",
            Strategy::Knapsack => "KNAPSACK",
            Strategy::SpaceFillingCurve => "SFC",
            Strategy::ProximityFillingCurve => "PFC",
        }
    }

    /// Whether the strategy reads item anchors.
    pub fn uses_anchors(&self) -> bool {
        matches!(self, Strategy::SpaceFillingCurve | Strategy::ProximityFillingCurve)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown strategy: {0}")]
pub struct StrategyParseError(pub String);

impl FromStr for Strategy {
    type Err = StrategyParseError;

    /// Case-insensitive; `_`, `-` and spaces are ignored, so `round_robin`,
    /// `RoundRobin` and `ROUNDROBIN` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match key.as_str() {
            "ROUNDROBIN" | "RR" => Ok(Strategy::RoundRobin),
            "KNAPSACK" => Ok(Strategy::Knapsack),
            "SFC" | "SPACEFILLINGCURVE" => Ok(Strategy::SpaceFillingCurve),
            "PFC" | "PROXIMITYFC" | "PROXIMITYFILLINGCURVE" => Ok(Strategy::ProximityFillingCurve),
            _ => Err(StrategyParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_names() {
        for s in Strategy::ALL {
            assert_eq!(s.name().parse::<Strategy>().unwrap(), s);
        }
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("RoundRobin".parse(), Ok(Strategy::RoundRobin));
        assert_eq!("round_robin".parse(), Ok(Strategy::RoundRobin));
        assert_eq!("knapsack".parse(), Ok(Strategy::Knapsack));
        assert_eq!("space-filling-curve".parse(), Ok(Strategy::SpaceFillingCurve));
        assert_eq!("ProximityFC".parse(), Ok(Strategy::ProximityFillingCurve));
    }

    #[test]
    fn rejects_unknown() {
        let err = "HILBERT".parse::<Strategy>().unwrap_err();
        assert_eq!(err.to_string(), "unknown strategy: HILBERT");
    }

    #[test]
    fn default_is_sfc() {
        assert_eq!(Strategy::default(), Strategy::SpaceFillingCurve);
        assert!(Strategy::default().uses_anchors());
        assert!(!Strategy::Knapsack.uses_anchors());
    }
}

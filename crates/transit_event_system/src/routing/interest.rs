use crate::types::ZoneId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The zones a downstream subscriber wants events for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interest {
    /// Every zone, including events that are not zone scoped
    All,
    /// Only the listed zones
    Zones(BTreeSet<ZoneId>),
}

impl Interest {
    pub fn zones<I, Z>(zones: I) -> Self
    where
        I: IntoIterator<Item = Z>,
        Z: Into<ZoneId>,
    {
        Interest::Zones(zones.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, zone: &ZoneId) -> bool {
        match self {
            Interest::All => true,
            Interest::Zones(zones) => zones.contains(zone),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Interest::All)
    }

    /// The zones both interests cover.
    pub fn intersect(&self, other: &Interest) -> Interest {
        match (self, other) {
            (Interest::All, other) | (other, Interest::All) => other.clone(),
            (Interest::Zones(a), Interest::Zones(b)) => Interest::Zones(a.intersection(b).cloned().collect()),
        }
    }

    /// True when no zone-scoped event can match.
    pub fn is_empty(&self) -> bool {
        match self {
            Interest::All => false,
            Interest::Zones(zones) => zones.is_empty(),
        }
    }
}

impl std::fmt::Display for Interest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interest::All => f.write_str("{all}"),
            Interest::Zones(zones) => {
                let tokens: Vec<&str> = zones.iter().map(ZoneId::as_str).collect();
                write!(f, "{{{}}}", tokens.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching() {
        let z01 = ZoneId::from("Z01");
        let z02 = ZoneId::from("Z02");
        assert!(Interest::All.matches(&z01));
        assert!(Interest::zones(["Z01"]).matches(&z01));
        assert!(!Interest::zones(["Z01"]).matches(&z02));
        assert!(!Interest::zones(Vec::<&str>::new()).matches(&z01));
    }

    #[test]
    fn test_intersection() {
        let requested = Interest::zones(["Z01", "Z02", "Z03"]);
        let entitled = Interest::zones(["Z02", "Z03", "Z09"]);
        assert_eq!(requested.intersect(&entitled), Interest::zones(["Z02", "Z03"]));
        assert_eq!(Interest::All.intersect(&entitled), entitled);
        assert_eq!(requested.intersect(&Interest::All), requested);
        assert!(Interest::zones(["Z01"]).intersect(&Interest::zones(["Z02"])).is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(Interest::All.to_string(), "{all}");
        assert_eq!(Interest::zones(["Z02", "Z01"]).to_string(), "{Z01,Z02}");
    }
}

use serde::{Deserialize, Serialize};

/// A protocol revision number as sent in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(pub i32);

impl ProtocolVersion {
    pub const V1_19_4: ProtocolVersion = ProtocolVersion(762);
    pub const V1_20: ProtocolVersion = ProtocolVersion(763);
    pub const V1_20_2: ProtocolVersion = ProtocolVersion(764);

    /// First revision with a separate configuration state after login.
    pub const FIRST_WITH_CONFIGURATION: ProtocolVersion = Self::V1_20_2;

    pub fn number(self) -> i32 {
        self.0
    }

    /// Release name of the revision, if known.
    pub fn name(self) -> Option<&'static str> {
        match self.0 {
            754 => Some("1.16.5"),
            755 => Some("1.17"),
            756 => Some("1.17.1"),
            757 => Some("1.18.1"),
            758 => Some("1.18.2"),
            759 => Some("1.19"),
            760 => Some("1.19.2"),
            761 => Some("1.19.3"),
            762 => Some("1.19.4"),
            763 => Some("1.20.1"),
            764 => Some("1.20.2"),
            765 => Some("1.20.4"),
            766 => Some("1.20.6"),
            767 => Some("1.21.1"),
            _ => None,
        }
    }

    pub fn has_configuration_state(self) -> bool {
        self >= Self::FIRST_WITH_CONFIGURATION
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Inclusive range of protocol revisions a definition applies to.
/// A missing bound is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VersionRange {
    pub min: Option<ProtocolVersion>,
    pub max: Option<ProtocolVersion>,
}

impl VersionRange {
    pub const ALL: VersionRange = VersionRange {
        min: None,
        max: None,
    };

    pub const fn new(min: ProtocolVersion, max: ProtocolVersion) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub const fn since(min: ProtocolVersion) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub const fn until(max: ProtocolVersion) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn contains(&self, version: ProtocolVersion) -> bool {
        self.min.map_or(true, |min| version >= min) && self.max.map_or(true, |max| version <= max)
    }

    pub fn overlaps(&self, other: &VersionRange) -> bool {
        let lo_ok = match (self.min, other.max) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        };
        let hi_ok = match (other.min, self.max) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        };
        lo_ok && hi_ok
    }
}

impl std::fmt::Display for VersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.min, self.max) {
            (None, None) => f.write_str("all versions"),
            (Some(min), None) => write!(f, ">= {}", min.0),
            (None, Some(max)) => write!(f, "<= {}", max.0),
            (Some(min), Some(max)) => write!(f, "{}..={}", min.0, max.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_contains() {
        let r = VersionRange::new(ProtocolVersion(762), ProtocolVersion(763));
        assert!(!r.contains(ProtocolVersion(761)));
        assert!(r.contains(ProtocolVersion(762)));
        assert!(r.contains(ProtocolVersion(763)));
        assert!(!r.contains(ProtocolVersion(764)));
        assert!(VersionRange::ALL.contains(ProtocolVersion(1)));
        assert!(VersionRange::since(ProtocolVersion::V1_20_2).contains(ProtocolVersion(900)));
    }

    #[test]
    fn test_range_overlaps() {
        let old = VersionRange::until(ProtocolVersion(763));
        let new = VersionRange::since(ProtocolVersion(764));
        assert!(!old.overlaps(&new));
        assert!(!new.overlaps(&old));
        assert!(old.overlaps(&VersionRange::ALL));
        let mid = VersionRange::new(ProtocolVersion(763), ProtocolVersion(764));
        assert!(mid.overlaps(&old));
        assert!(mid.overlaps(&new));
    }

    #[test]
    fn test_version_display() {
        assert_eq!(ProtocolVersion::V1_20_2.to_string(), "764 (1.20.2)");
        assert_eq!(ProtocolVersion(1).to_string(), "1");
        assert!(ProtocolVersion::V1_20_2.has_configuration_state());
        assert!(!ProtocolVersion::V1_20.has_configuration_state());
    }
}

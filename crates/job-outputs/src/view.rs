//! Comparison layouts offered by the result viewer.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::descriptor::OutputVariant;

/// Requested layout for a result volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewMode {
    #[default]
    SideBySide,
    Overlay,
    LrOnly,
    HrOnly,
}

impl ViewMode {
    pub const ALL: [ViewMode; 4] = [
        ViewMode::SideBySide,
        ViewMode::Overlay,
        ViewMode::LrOnly,
        ViewMode::HrOnly,
    ];

    /// Whether the layout needs both the low- and high-resolution volumes.
    pub fn requires_both(&self) -> bool {
        !matches!(self, Self::HrOnly)
    }

    /// Layout picked when a job is first loaded.
    pub fn initial_for(variant: OutputVariant) -> Self {
        match variant {
            OutputVariant::Paired => Self::SideBySide,
            OutputVariant::Single => Self::HrOnly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SideBySide => "side-by-side",
            Self::Overlay => "overlay",
            Self::LrOnly => "lr-only",
            Self::HrOnly => "hr-only",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SideBySide => "Side by Side",
            Self::Overlay => "Overlay",
            Self::LrOnly => "LR Only",
            Self::HrOnly => "HR Only",
        }
    }
}

impl std::fmt::Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("unknown view mode: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_both() {
        assert!(ViewMode::SideBySide.requires_both());
        assert!(ViewMode::Overlay.requires_both());
        assert!(ViewMode::LrOnly.requires_both());
        assert!(!ViewMode::HrOnly.requires_both());
    }

    #[test]
    fn test_initial_mode() {
        assert_eq!(
            ViewMode::initial_for(OutputVariant::Paired),
            ViewMode::SideBySide
        );
        assert_eq!(ViewMode::initial_for(OutputVariant::Single), ViewMode::HrOnly);
    }

    #[test]
    fn test_parse_round_trip() {
        for mode in ViewMode::ALL {
            assert_eq!(mode.as_str().parse::<ViewMode>().unwrap(), mode);
        }
        assert!("sideways".parse::<ViewMode>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ViewMode::LrOnly).unwrap();
        assert_eq!(json, "\"lr-only\"");
    }
}

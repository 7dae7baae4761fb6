//! Output descriptors as reported by the job API.

use serde::{Deserialize, Serialize};

/// One entry of a job's `output_files`.
///
/// On the wire an entry is either a bare file reference or an object with
/// `lr` and `hr` references. A bare reference is a single high-resolution
/// result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputDescriptor {
    Single(String),
    Paired { lr: String, hr: String },
}

impl OutputDescriptor {
    pub fn variant(&self) -> OutputVariant {
        match self {
            Self::Single(_) => OutputVariant::Single,
            Self::Paired { .. } => OutputVariant::Paired,
        }
    }

    /// The high-resolution reference, present for both variants.
    pub fn high(&self) -> &str {
        match self {
            Self::Single(hr) => hr,
            Self::Paired { hr, .. } => hr,
        }
    }

    /// The low-resolution reference, only present on paired entries.
    pub fn low(&self) -> Option<&str> {
        match self {
            Self::Single(_) => None,
            Self::Paired { lr, .. } => Some(lr),
        }
    }
}

/// Shape shared by every entry of an output sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputVariant {
    Single,
    Paired,
}

impl OutputVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Paired => "paired",
        }
    }
}

impl std::fmt::Display for OutputVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered output sequence whose variant is decided once, from its first
/// entry.
///
/// The upstream service emits uniform sequences. Entries that disagree with
/// the first one are not reinterpreted: their indices are recorded in
/// [`OutputSet::mismatched`] and the resolver refuses to resolve them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSet {
    entries: Vec<OutputDescriptor>,
    variant: Option<OutputVariant>,
    mismatched: Vec<usize>,
}

impl OutputSet {
    pub fn new(entries: Vec<OutputDescriptor>) -> Self {
        let variant = entries.first().map(OutputDescriptor::variant);
        let mismatched = match variant {
            Some(expected) => entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.variant() != expected)
                .map(|(index, _)| index)
                .collect(),
            None => Vec::new(),
        };

        Self {
            entries,
            variant,
            mismatched,
        }
    }

    /// Variant of the sequence, `None` when it is empty.
    pub fn variant(&self) -> Option<OutputVariant> {
        self.variant
    }

    pub fn entries(&self) -> &[OutputDescriptor] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&OutputDescriptor> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices whose variant differs from the first entry's.
    pub fn mismatched(&self) -> &[usize] {
        &self.mismatched
    }

    pub fn is_homogeneous(&self) -> bool {
        self.mismatched.is_empty()
    }

    /// Clamp a requested index into `[0, len - 1]` (0 for an empty set).
    pub fn clamp_index(&self, index: usize) -> usize {
        index.min(self.entries.len().saturating_sub(1))
    }
}

impl From<Vec<OutputDescriptor>> for OutputSet {
    fn from(entries: Vec<OutputDescriptor>) -> Self {
        Self::new(entries)
    }
}

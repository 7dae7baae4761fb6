//! Output resolution.
//!
//! [`resolve`] maps a job's output description, the selected output index
//! and the requested [`ViewMode`] to the locators the renderer needs, or to
//! the reason the layout cannot be shown.

use thiserror::Error;

use crate::descriptor::{OutputSet, OutputVariant};
use crate::locator::{ResourceLocator, normalize_reference};
use crate::view::ViewMode;

/// Everything the resolver reads from a job record.
#[derive(Debug, Clone, Copy)]
pub struct OutputSource<'a> {
    pub job_id: &'a str,
    pub outputs: &'a OutputSet,
    /// Top-level low-resolution reference, used only when `outputs` is empty.
    pub lr_fallback: Option<&'a str>,
    /// Top-level high-resolution reference, used only when `outputs` is empty.
    pub hr_fallback: Option<&'a str>,
}

impl<'a> OutputSource<'a> {
    pub fn new(job_id: &'a str, outputs: &'a OutputSet) -> Self {
        Self {
            job_id,
            outputs,
            lr_fallback: None,
            hr_fallback: None,
        }
    }

    pub fn with_fallback(mut self, lr: Option<&'a str>, hr: Option<&'a str>) -> Self {
        self.lr_fallback = lr;
        self.hr_fallback = hr;
        self
    }
}

/// Where resolved locators came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedSource {
    /// Entry `index` of an output sequence of `count` entries.
    Output {
        variant: OutputVariant,
        index: usize,
        count: usize,
    },
    /// The job's top-level references.
    Fallback,
}

/// Locators for one displayable output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResources {
    pub mode: ViewMode,
    pub source: ResolvedSource,
    pub low: Option<ResourceLocator>,
    pub high: Option<ResourceLocator>,
}

impl ResolvedResources {
    /// Index of the resolved output entry, 0 for fallback references.
    pub fn index(&self) -> usize {
        match self.source {
            ResolvedSource::Output { index, .. } => index,
            ResolvedSource::Fallback => 0,
        }
    }

    /// Layouts these locators can support.
    pub fn supported_modes(&self) -> Vec<ViewMode> {
        ViewMode::ALL
            .into_iter()
            .filter(|mode| supports(*mode, self.low.is_some(), self.high.is_some()))
            .collect()
    }
}

/// Why a layout cannot be shown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unavailable {
    #[error("no result files available")]
    NoResources,
    #[error("{mode} requires a low-resolution volume")]
    MissingLowResolution { mode: ViewMode },
    #[error("{mode} requires a high-resolution volume")]
    MissingHighResolution { mode: ViewMode },
    #[error("output {index} does not match the {expected} layout of the first output")]
    MismatchedDescriptor {
        index: usize,
        expected: OutputVariant,
    },
}

/// Resolve the locators to display for `selected_index` in `mode`.
///
/// `selected_index` is clamped into the output sequence. Every raw reference
/// is normalized on its own with [`normalize_reference`].
pub fn resolve(
    source: &OutputSource<'_>,
    selected_index: usize,
    mode: ViewMode,
) -> Result<ResolvedResources, Unavailable> {
    let outputs = source.outputs;

    let (resolved_source, low, high) = match outputs.variant() {
        None => {
            let low = source
                .lr_fallback
                .and_then(|r| normalize_reference(source.job_id, r));
            let high = source
                .hr_fallback
                .and_then(|r| normalize_reference(source.job_id, r));
            if low.is_none() && high.is_none() {
                return Err(Unavailable::NoResources);
            }
            (ResolvedSource::Fallback, low, high)
        }
        Some(variant) => {
            let index = outputs.clamp_index(selected_index);
            let Some(descriptor) = outputs.get(index) else {
                return Err(Unavailable::NoResources);
            };
            if descriptor.variant() != variant {
                return Err(Unavailable::MismatchedDescriptor {
                    index,
                    expected: variant,
                });
            }

            let low = match variant {
                OutputVariant::Paired => descriptor
                    .low()
                    .and_then(|r| normalize_reference(source.job_id, r)),
                OutputVariant::Single => None,
            };
            let high = normalize_reference(source.job_id, descriptor.high());

            let resolved_source = ResolvedSource::Output {
                variant,
                index,
                count: outputs.len(),
            };
            (resolved_source, low, high)
        }
    };

    if high.is_none() {
        return Err(Unavailable::MissingHighResolution { mode });
    }
    if mode.requires_both() && low.is_none() {
        return Err(Unavailable::MissingLowResolution { mode });
    }

    Ok(ResolvedResources {
        mode,
        source: resolved_source,
        low,
        high,
    })
}

fn supports(mode: ViewMode, has_low: bool, has_high: bool) -> bool {
    has_high && (!mode.requires_both() || has_low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::OutputDescriptor;

    fn paired(lr: &str, hr: &str) -> OutputDescriptor {
        OutputDescriptor::Paired {
            lr: lr.to_string(),
            hr: hr.to_string(),
        }
    }

    fn single(hr: &str) -> OutputDescriptor {
        OutputDescriptor::Single(hr.to_string())
    }

    #[test]
    fn test_paired_output_resolves_both_tiers() {
        let outputs = OutputSet::new(vec![paired("scan/a_lr.nii.gz", "scan/a_hr.nii.gz")]);
        let source = OutputSource::new("j2", &outputs);

        let resolved = resolve(&source, 0, ViewMode::SideBySide).unwrap();

        assert_eq!(resolved.high.unwrap().as_str(), "/files/j2/a_hr.nii.gz");
        assert_eq!(resolved.low.unwrap().as_str(), "/files/j2/a_lr.nii.gz");
    }

    #[test]
    fn test_single_output_only_exposes_high() {
        let outputs = OutputSet::new(vec![single("out/vol.nii.gz")]);
        let source = OutputSource::new("j5", &outputs);

        let resolved = resolve(&source, 0, ViewMode::HrOnly).unwrap();
        assert!(resolved.low.is_none());
        assert_eq!(resolved.high.unwrap().as_str(), "/files/j5/vol.nii.gz");
    }

    #[test]
    fn test_single_output_rejects_paired_layouts() {
        let outputs = OutputSet::new(vec![single("out/vol.nii.gz")]);
        let source = OutputSource::new("j5", &outputs);

        for mode in [ViewMode::SideBySide, ViewMode::Overlay, ViewMode::LrOnly] {
            assert_eq!(
                resolve(&source, 0, mode),
                Err(Unavailable::MissingLowResolution { mode })
            );
        }
    }

    #[test]
    fn test_hr_only_does_not_need_low_resolution() {
        let outputs = OutputSet::new(vec![paired("", "scan/a_hr.nii.gz")]);
        let source = OutputSource::new("j2", &outputs);

        assert!(resolve(&source, 0, ViewMode::HrOnly).is_ok());
        assert_eq!(
            resolve(&source, 0, ViewMode::SideBySide),
            Err(Unavailable::MissingLowResolution {
                mode: ViewMode::SideBySide
            })
        );
    }

    #[test]
    fn test_selected_index_is_clamped() {
        let outputs = OutputSet::new(vec![paired("a_lr", "a_hr"), paired("b_lr", "b_hr")]);
        let source = OutputSource::new("j3", &outputs);

        let resolved = resolve(&source, 9, ViewMode::Overlay).unwrap();
        assert_eq!(resolved.index(), 1);
        assert_eq!(resolved.high.unwrap().as_str(), "/files/j3/b_hr");
    }

    #[test]
    fn test_empty_outputs_without_fallback_is_unavailable() {
        let outputs = OutputSet::default();
        let source = OutputSource::new("j4", &outputs);

        for mode in ViewMode::ALL {
            assert_eq!(resolve(&source, 0, mode), Err(Unavailable::NoResources));
        }
    }

    #[test]
    fn test_empty_outputs_use_fallback() {
        let outputs = OutputSet::default();
        let source = OutputSource::new("j6", &outputs)
            .with_fallback(Some("/files/j6/lr.nii"), Some("results/hr.nii"));

        let resolved = resolve(&source, 3, ViewMode::SideBySide).unwrap();
        assert_eq!(resolved.source, ResolvedSource::Fallback);
        assert_eq!(resolved.low.unwrap().as_str(), "/files/j6/lr.nii");
        assert_eq!(resolved.high.unwrap().as_str(), "/files/j6/hr.nii");
    }

    #[test]
    fn test_mismatched_entry_is_not_guessed() {
        let outputs = OutputSet::new(vec![paired("a_lr", "a_hr"), single("b_hr")]);
        let source = OutputSource::new("j7", &outputs);

        assert!(resolve(&source, 0, ViewMode::SideBySide).is_ok());
        assert_eq!(
            resolve(&source, 1, ViewMode::HrOnly),
            Err(Unavailable::MismatchedDescriptor {
                index: 1,
                expected: OutputVariant::Paired
            })
        );
    }

    #[test]
    fn test_supported_modes() {
        let outputs = OutputSet::new(vec![single("vol.nii")]);
        let source = OutputSource::new("j8", &outputs);
        let resolved = resolve(&source, 0, ViewMode::HrOnly).unwrap();
        assert_eq!(resolved.supported_modes(), vec![ViewMode::HrOnly]);
    }
}

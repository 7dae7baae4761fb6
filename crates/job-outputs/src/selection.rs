//! Per-viewer selection state.

use crate::descriptor::OutputSet;
use crate::resolver::{OutputSource, ResolvedResources, Unavailable, resolve};
use crate::view::ViewMode;

/// Overlay opacity used for a fresh viewer.
pub const DEFAULT_OPACITY: f32 = 0.5;

/// Selection state of one viewer session. Never persisted.
///
/// The state is bound to one job and one output sequence. [`sync`] rebinds
/// it, resetting the selected index to 0 and picking the initial view mode
/// whenever either changes.
///
/// [`sync`]: ViewSelection::sync
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSelection {
    job_id: Option<String>,
    outputs: OutputSet,
    mode: ViewMode,
    selected_index: usize,
    opacity: f32,
}

impl Default for ViewSelection {
    fn default() -> Self {
        Self {
            job_id: None,
            outputs: OutputSet::default(),
            mode: ViewMode::default(),
            selected_index: 0,
            opacity: DEFAULT_OPACITY,
        }
    }
}

impl ViewSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the current job and outputs.
    ///
    /// Returns `true` when the binding changed and the selection was reset.
    pub fn sync(&mut self, job_id: &str, outputs: &OutputSet) -> bool {
        let same_job = self.job_id.as_deref() == Some(job_id);
        if same_job && &self.outputs == outputs {
            return false;
        }

        self.job_id = Some(job_id.to_string());
        self.outputs = outputs.clone();
        self.selected_index = 0;
        self.mode = outputs
            .variant()
            .map(ViewMode::initial_for)
            .unwrap_or_default();
        true
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    /// Select an output entry, clamped to the bound sequence.
    pub fn select(&mut self, index: usize) {
        self.selected_index = self.outputs.clamp_index(index);
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Set the overlay opacity, clamped to `[0, 1]`. NaN is ignored.
    pub fn set_opacity(&mut self, opacity: f32) {
        if !opacity.is_nan() {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
    }

    /// Resolve the current selection against `source`.
    pub fn resolve(&self, source: &OutputSource<'_>) -> Result<ResolvedResources, Unavailable> {
        resolve(source, self.selected_index, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::OutputDescriptor;

    fn paired_set(n: usize) -> OutputSet {
        OutputSet::new(
            (0..n)
                .map(|i| OutputDescriptor::Paired {
                    lr: format!("s{i}_lr.nii"),
                    hr: format!("s{i}_hr.nii"),
                })
                .collect(),
        )
    }

    #[test]
    fn test_initial_mode_follows_variant() {
        let mut selection = ViewSelection::new();
        selection.sync("j1", &OutputSet::new(vec![OutputDescriptor::Single("v.nii".into())]));
        assert_eq!(selection.mode(), ViewMode::HrOnly);

        selection.sync("j2", &paired_set(1));
        assert_eq!(selection.mode(), ViewMode::SideBySide);
    }

    #[test]
    fn test_index_resets_on_job_change() {
        let outputs = paired_set(3);
        let mut selection = ViewSelection::new();
        selection.sync("j1", &outputs);
        selection.select(2);
        assert_eq!(selection.selected_index(), 2);

        assert!(selection.sync("j2", &outputs));
        assert_eq!(selection.selected_index(), 0);
    }

    #[test]
    fn test_index_resets_on_outputs_change() {
        let mut selection = ViewSelection::new();
        selection.sync("j1", &paired_set(2));
        selection.select(1);

        assert!(selection.sync("j1", &paired_set(3)));
        assert_eq!(selection.selected_index(), 0);
    }

    #[test]
    fn test_resync_same_binding_keeps_state() {
        let outputs = paired_set(3);
        let mut selection = ViewSelection::new();
        selection.sync("j1", &outputs);
        selection.select(1);
        selection.set_mode(ViewMode::Overlay);

        assert!(!selection.sync("j1", &outputs));
        assert_eq!(selection.selected_index(), 1);
        assert_eq!(selection.mode(), ViewMode::Overlay);
    }

    #[test]
    fn test_select_clamps() {
        let mut selection = ViewSelection::new();
        selection.sync("j1", &paired_set(2));
        selection.select(10);
        assert_eq!(selection.selected_index(), 1);
    }

    #[test]
    fn test_opacity_clamps() {
        let mut selection = ViewSelection::new();
        assert_eq!(selection.opacity(), DEFAULT_OPACITY);
        selection.set_opacity(1.7);
        assert_eq!(selection.opacity(), 1.0);
        selection.set_opacity(-0.2);
        assert_eq!(selection.opacity(), 0.0);
        selection.set_opacity(f32::NAN);
        assert_eq!(selection.opacity(), 0.0);
    }

    #[test]
    fn test_resolve_current_selection() {
        let outputs = paired_set(2);
        let mut selection = ViewSelection::new();
        selection.sync("j9", &outputs);
        selection.select(1);

        let resolved = selection.resolve(&OutputSource::new("j9", &outputs)).unwrap();
        assert_eq!(resolved.high.unwrap().as_str(), "/files/j9/s1_hr.nii");
    }
}

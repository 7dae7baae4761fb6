//! Result viewing for job records.
//!
//! Binds the pure resolver in `job-outputs` to [`JobRecord`]: the output
//! sequence and the top-level fallback references come from the record.

use std::sync::Arc;

use job_outputs::{
    OutputSet, OutputSource, ResolvedResources, Unavailable, ViewMode, ViewSelection, resolve,
};

use crate::domain::JobRecord;

/// Resolve one output of `job` for `mode`.
pub fn resolve_job(
    job: &JobRecord,
    selected_index: usize,
    mode: ViewMode,
) -> Result<ResolvedResources, Unavailable> {
    let outputs = job.output_set();
    resolve(&source(job, &outputs), selected_index, mode)
}

fn source<'a>(job: &'a JobRecord, outputs: &'a OutputSet) -> OutputSource<'a> {
    OutputSource::new(job.id.as_str(), outputs)
        .with_fallback(job.lr_file_url.as_deref(), job.hr_file_url.as_deref())
}

/// The view mode a freshly loaded job opens in.
pub fn initial_mode(job: &JobRecord, outputs: &OutputSet) -> ViewMode {
    match outputs.variant() {
        Some(variant) => ViewMode::initial_for(variant),
        None if job.lr_file_url.is_some() && job.hr_file_url.is_some() => ViewMode::SideBySide,
        None => ViewMode::HrOnly,
    }
}

/// One viewer session: the job on display and its selection state.
#[derive(Debug, Clone, Default)]
pub struct JobViewer {
    job: Option<Arc<JobRecord>>,
    outputs: OutputSet,
    /// Top-level references of the job on display.
    fallback: (Option<String>, Option<String>),
    selection: ViewSelection,
}

impl JobViewer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `job`. The selection resets when the job or its outputs
    /// change and is kept across refreshes of the same results. Without
    /// outputs, a change of the fallback references also resets it.
    ///
    /// Returns `true` when the selection was reset.
    pub fn show(&mut self, job: Arc<JobRecord>) -> bool {
        let outputs = job.output_set();
        let fallback = (job.lr_file_url.clone(), job.hr_file_url.clone());
        let rebound = self.selection.sync(job.id.as_str(), &outputs);
        let reset = rebound || (outputs.is_empty() && fallback != self.fallback);
        if reset {
            self.selection.set_mode(initial_mode(&job, &outputs));
        }
        self.outputs = outputs;
        self.fallback = fallback;
        self.job = Some(job);
        reset
    }

    pub fn job(&self) -> Option<&Arc<JobRecord>> {
        self.job.as_ref()
    }

    pub fn selection(&self) -> &ViewSelection {
        &self.selection
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.selection.set_mode(mode);
    }

    pub fn select(&mut self, index: usize) {
        self.selection.select(index);
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.selection.set_opacity(opacity);
    }

    /// Resolve the current selection.
    pub fn resolve(&self) -> Result<ResolvedResources, Unavailable> {
        let job = self.job.as_deref().ok_or(Unavailable::NoResources)?;
        self.selection.resolve(&source(job, &self.outputs))
    }
}

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use mri_sr_client::api::{FileListQuery, HttpJobApi, InferenceRequest, JobApi, ModelConfig};
use mri_sr_client::domain::{JobId, JobListQuery, JobRecord, JobStatus, JobType, UploadFile};
use mri_sr_client::job_outputs::{ResolvedResources, ResourceLocator, ViewMode};
use mri_sr_client::jobs::JobService;
use mri_sr_client::polling::{JobPoller, PollEvent};
use mri_sr_client::viewer::JobViewer;
use mri_sr_client::ClientConfig;
use tracing::{debug, info};

use crate::output::{OutputManager, format_size};

/// Runs subcommands against one service and poller.
pub struct CommandExecutor {
    service: JobService<HttpJobApi>,
    poller: JobPoller<HttpJobApi>,
    output: OutputManager,
}

impl CommandExecutor {
    pub fn new(config: &ClientConfig, output: OutputManager) -> anyhow::Result<Self> {
        let api = HttpJobApi::new(config).context("Failed to create API client")?;
        debug!(base_url = %api.base_url(), "API client ready");

        let service = JobService::from_config(Arc::new(api), config);
        let poller = JobPoller::with_config(service.clone(), config.poller_config());
        Ok(Self {
            service,
            poller,
            output,
        })
    }

    pub async fn list(
        &self,
        page: u32,
        size: Option<u32>,
        status: Option<JobStatus>,
        job_type: Option<JobType>,
    ) -> anyhow::Result<()> {
        let mut query = JobListQuery::page(page);
        if let Some(size) = size {
            query = query.with_size(size);
        }
        if let Some(status) = status {
            query = query.with_status(status);
        }
        if let Some(job_type) = job_type {
            query = query.with_type(job_type);
        }

        let jobs = self.service.list(&query).await?;
        self.output.print_jobs(&jobs)
    }

    pub async fn show(&self, id: &JobId) -> anyhow::Result<()> {
        let job = self.service.get(id).await?;
        self.output.print_job(&job)
    }

    /// Follow `id` until it is terminal, with a progress bar in text mode.
    pub async fn watch(&self, id: &JobId, interval: Option<Duration>) -> anyhow::Result<()> {
        let poller = match interval {
            Some(interval) => JobPoller::with_config(
                self.service.clone(),
                self.poller.config().with_interval(interval),
            ),
            None => self.poller.clone(),
        };

        let bar = (!self.output.is_json()).then(|| progress_bar(id));
        let on_event = |event: &PollEvent| {
            let Some(bar) = &bar else { return };
            match event {
                PollEvent::Update(job) => {
                    bar.set_position(u64::from(job.progress));
                    bar.set_message(job.status.label());
                }
                PollEvent::Error {
                    error,
                    consecutive_failures,
                    persistent,
                } => {
                    let note = if *persistent { " (still failing)" } else { "" };
                    bar.set_message(format!(
                        "retrying after {} failure(s){note}: {}",
                        consecutive_failures,
                        error.user_message()
                    ));
                }
            }
        };

        let result = tokio::select! {
            result = poller.wait_for_terminal_with(id, on_event) => result,
            _ = tokio::signal::ctrl_c() => {
                poller.shutdown();
                if let Some(bar) = &bar {
                    bar.abandon_with_message("interrupted");
                }
                anyhow::bail!("Interrupted while watching job {id}");
            }
        };

        let job = result?;
        if let Some(bar) = &bar {
            bar.finish_with_message(job.status.label());
        }
        info!(job_id = %id, status = %job.status, "Job finished");
        self.output.print_job(&job)
    }

    pub async fn upload(&self, paths: &[impl AsRef<Path>], watch: bool) -> anyhow::Result<()> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let file = UploadFile::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            debug!(file = %file.name, size = %format_size(file.size()), "Prepared upload");
            files.push(file);
        }

        let response = self.service.submit_upload(files).await?;
        self.output
            .print_message(&response.message, Some(response.job_id.as_str()))?;
        if watch {
            self.watch(&response.job_id, None).await?;
        }
        Ok(())
    }

    pub async fn retry(&self, id: &JobId, watch: bool) -> anyhow::Result<()> {
        let response = self.service.retry_job(id).await?;
        self.output
            .print_message(&response.message, Some(response.job_id.as_str()))?;
        if watch {
            self.watch(&response.job_id, None).await?;
        }
        Ok(())
    }

    pub async fn cancel(&self, id: &JobId) -> anyhow::Result<()> {
        let response = self.service.cancel_job(id).await?;
        self.output.print_message(&response.message, Some(id.as_str()))
    }

    pub async fn infer(
        &self,
        lr_file_id: String,
        model: Option<String>,
        scale: Option<f32>,
        watch: bool,
    ) -> anyhow::Result<()> {
        let mut request = InferenceRequest::new(lr_file_id);
        if model.is_some() || scale.is_some() {
            request = request.with_model_config(ModelConfig {
                model_name: model,
                scale_factor: scale,
            });
        }

        let response = self.service.run_inference(&request).await?;
        self.output.print_message(
            &response.message,
            Some(response.inference_job_id.as_str()),
        )?;
        if watch {
            self.watch(&response.inference_job_id, None).await?;
        }
        Ok(())
    }

    pub async fn resolve(
        &self,
        id: &JobId,
        index: usize,
        mode: Option<ViewMode>,
    ) -> anyhow::Result<()> {
        let (job, resolved) = self.resolve_view(id, index, mode).await?;
        self.output.print_resolved(&job, &resolved)
    }

    pub async fn download(
        &self,
        id: &JobId,
        output_dir: &Path,
        index: usize,
        mode: Option<ViewMode>,
    ) -> anyhow::Result<()> {
        let (job, resolved) = self.resolve_view(id, index, mode).await?;
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        let api = self.service.api();
        for locator in [&resolved.low, &resolved.high].into_iter().flatten() {
            let target = output_dir.join(local_filename(locator)?);
            let bytes = api
                .download(locator)
                .await
                .with_context(|| format!("Failed to download {}", locator.as_str()))?;
            tokio::fs::write(&target, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", target.display()))?;
            info!(job_id = %job.id, file = %target.display(), size = bytes.len(), "Downloaded result file");
            self.output.print_message(
                &format!("Saved {} ({})", target.display(), format_size(bytes.len() as u64)),
                None,
            )?;
        }
        Ok(())
    }

    pub async fn files(&self, job: Option<JobId>, limit: Option<u32>) -> anyhow::Result<()> {
        let query = FileListQuery { job_id: job, limit };
        let files = self.service.api().list_files(&query).await?;
        self.output.print_files(&files)
    }

    async fn resolve_view(
        &self,
        id: &JobId,
        index: usize,
        mode: Option<ViewMode>,
    ) -> anyhow::Result<(Arc<JobRecord>, ResolvedResources)> {
        let job = self.service.get(id).await?;
        let mut viewer = JobViewer::new();
        viewer.show(job.clone());
        viewer.select(index);
        if let Some(mode) = mode {
            viewer.set_mode(mode);
        }

        let resolved = viewer
            .resolve()
            .with_context(|| format!("Cannot display results of job {id}"))?;
        Ok((job, resolved))
    }
}

/// Name under which a downloaded file is saved: the locator's last path
/// segment without query or fragment.
fn local_filename(locator: &ResourceLocator) -> anyhow::Result<&str> {
    let name = locator.filename();
    let name = name.split(['?', '#']).next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." {
        anyhow::bail!("Cannot derive a file name from {}", locator.as_str());
    }
    Ok(name)
}

fn progress_bar(id: &JobId) -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{prefix} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.set_prefix(id.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

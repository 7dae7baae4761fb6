use colored::*;
use mri_sr_client::api::FileMetadata;
use mri_sr_client::domain::{JobRecord, JobStatus, PagedJobs};
use mri_sr_client::job_outputs::{ResolvedResources, ResolvedSource};
use serde::Serialize;
use serde_json::{Value, json};

/// Renders command results as colored text or as JSON.
pub struct OutputManager {
    json: bool,
}

impl OutputManager {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn print_job(&self, job: &JobRecord) -> anyhow::Result<()> {
        if self.json {
            return self.print_json(job);
        }

        println!("{} {}", "Job:".green().bold(), job.id.as_str().cyan());
        println!("  {}: {}", "Status".yellow(), status_colored(job.status));
        if let Some(job_type) = job.job_type {
            println!("  {}: {}", "Type".yellow(), job_type.as_str().cyan());
        }
        if job.status == JobStatus::Processing {
            println!("  {}: {}%", "Progress".yellow(), job.progress);
        }
        println!("  {}: {}", "Created".yellow(), job.created_at.to_rfc3339());
        println!("  {}: {}", "Updated".yellow(), job.updated_at.to_rfc3339());
        if let Some(at) = job.completed_at {
            println!("  {}: {}", "Completed".yellow(), at.to_rfc3339());
        }
        if let Some(reason) = job.failure_reason() {
            println!("  {}: {}", "Error".yellow(), reason.red());
        }
        if let Some(metrics) = job.completed_metrics().filter(|m| !m.is_empty()) {
            println!("  {}:", "Metrics".yellow());
            for (name, value) in metrics {
                println!("    {}: {}", name.green(), format!("{value:.4}").cyan());
            }
        }
        let outputs = job.output_set();
        if !outputs.is_empty() {
            println!("  {}: {}", "Outputs".yellow(), outputs.len());
        }
        Ok(())
    }

    pub fn print_jobs(&self, page: &PagedJobs) -> anyhow::Result<()> {
        if self.json {
            return self.print_json(page);
        }

        if page.items.is_empty() {
            println!("{}", "No jobs found.".yellow());
            return Ok(());
        }

        println!(
            "{:<38} {:<12} {:<14} {:>8}  {}",
            "ID".bold(),
            "STATUS".bold(),
            "TYPE".bold(),
            "PROGRESS".bold(),
            "UPDATED".bold()
        );
        for job in &page.items {
            let job_type = job.job_type.map_or("-", |t| t.as_str());
            // Pad before coloring so escape codes do not skew the columns.
            let status = format!("{:<12}", job.status.as_str());
            println!(
                "{:<38} {} {:<14} {:>7}%  {}",
                job.id.as_str(),
                status_colored_str(job.status, &status),
                job_type,
                job.progress,
                job.updated_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        println!(
            "\nPage {} of {} ({} jobs)",
            page.page,
            page.pages.max(1),
            page.total
        );
        Ok(())
    }

    pub fn print_resolved(&self, job: &JobRecord, resolved: &ResolvedResources) -> anyhow::Result<()> {
        if self.json {
            return self.print_json(&resolved_json(job, resolved));
        }

        println!("{} {}", "Job:".green().bold(), job.id.as_str().cyan());
        println!("  {}: {}", "Mode".yellow(), resolved.mode.label().cyan());
        match resolved.source {
            ResolvedSource::Output {
                variant,
                index,
                count,
            } => println!(
                "  {}: {} output {} of {}",
                "Source".yellow(),
                variant.as_str(),
                index + 1,
                count
            ),
            ResolvedSource::Fallback => println!("  {}: job files", "Source".yellow()),
        }
        if let Some(low) = &resolved.low {
            println!("  {}: {}", "LR".yellow(), low.as_str().blue());
        }
        if let Some(high) = &resolved.high {
            println!("  {}: {}", "HR".yellow(), high.as_str().blue());
        }
        let modes: Vec<&str> = resolved
            .supported_modes()
            .iter()
            .map(|mode| mode.as_str())
            .collect();
        println!("  {}: {}", "Modes".yellow(), modes.join(", "));
        Ok(())
    }

    pub fn print_files(&self, files: &[FileMetadata]) -> anyhow::Result<()> {
        if self.json {
            return self.print_json(&files);
        }

        if files.is_empty() {
            println!("{}", "No files found.".yellow());
            return Ok(());
        }
        for file in files {
            let job = file.job_id.as_ref().map_or("-", |id| id.as_str());
            println!(
                "{:<38} {:<32} {:>12}  {}",
                file.id,
                file.filename.cyan(),
                format_size(file.file_size),
                job
            );
        }
        Ok(())
    }

    /// One-line confirmation of a mutation.
    pub fn print_message(&self, message: &str, job_id: Option<&str>) -> anyhow::Result<()> {
        if self.json {
            return self.print_json(&json!({ "message": message, "job_id": job_id }));
        }
        match job_id {
            Some(id) => println!("{} {} ({})", "✓".green(), message, id.cyan()),
            None => println!("{} {}", "✓".green(), message),
        }
        Ok(())
    }

    pub fn print_error(&self, message: &str) {
        if self.json {
            let error_json = json!({ "status": "error", "message": message });
            println!("{error_json}");
        } else {
            eprintln!("{} {}", "Error:".red().bold(), message);
        }
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

fn resolved_json(job: &JobRecord, resolved: &ResolvedResources) -> Value {
    let source = match resolved.source {
        ResolvedSource::Output {
            variant,
            index,
            count,
        } => json!({ "kind": "output", "variant": variant.as_str(), "index": index, "count": count }),
        ResolvedSource::Fallback => json!({ "kind": "fallback" }),
    };
    json!({
        "job_id": job.id,
        "mode": resolved.mode,
        "source": source,
        "lr": resolved.low.as_ref().map(|l| l.as_str()),
        "hr": resolved.high.as_ref().map(|h| h.as_str()),
        "supported_modes": resolved.supported_modes(),
    })
}

fn status_colored(status: JobStatus) -> ColoredString {
    status_colored_str(status, status.as_str())
}

fn status_colored_str(status: JobStatus, text: &str) -> ColoredString {
    match status {
        JobStatus::Pending => text.normal(),
        JobStatus::Processing => text.blue(),
        JobStatus::Completed => text.green(),
        JobStatus::Failed => text.red(),
        JobStatus::Cancelled => text.yellow(),
    }
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(524_288_000), "500.0 MB");
    }

    #[test]
    fn test_resolved_json_shape() {
        let job: JobRecord = serde_json::from_value(json!({
            "id": "j2",
            "status": "completed",
            "created_at": "2025-03-01T10:00:00Z",
            "updated_at": "2025-03-01T10:05:00Z",
            "output_files": [
                {"lr": "/data/j2/a_lr.nii.gz", "hr": "/data/j2/a_hr.nii.gz"}
            ],
        }))
        .unwrap();
        let resolved = mri_sr_client::viewer::resolve_job(
            &job,
            0,
            mri_sr_client::job_outputs::ViewMode::SideBySide,
        )
        .unwrap();

        let value = resolved_json(&job, &resolved);
        assert_eq!(value["mode"], "side-by-side");
        assert_eq!(value["source"]["kind"], "output");
        assert_eq!(value["lr"], "/files/j2/a_lr.nii.gz");
        assert_eq!(value["hr"], "/files/j2/a_hr.nii.gz");
    }
}

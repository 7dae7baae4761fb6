use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mri_sr_client::domain::{JobId, JobStatus, JobType};
use mri_sr_client::job_outputs::ViewMode;

#[derive(Parser, Debug)]
#[command(name = "mrisr", author, version, about, long_about = None)]
pub struct Args {
    /// Base URL of the job service
    #[arg(long, env = "MRISR_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, env = "MRISR_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, env = "MRISR_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log filter directive, applied over RUST_LOG and --verbose
    #[arg(long, env = "MRISR_LOG_FILTER", global = true)]
    pub log_filter: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List jobs, newest first
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long)]
        size: Option<u32>,

        #[arg(long)]
        status: Option<JobStatus>,

        #[arg(long = "type")]
        job_type: Option<JobType>,
    },

    /// Show one job
    Show { job_id: JobId },

    /// Poll a job until it reaches a terminal state
    Watch {
        job_id: JobId,

        /// Polling interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Upload scan files, creating a preprocessing job
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Watch the created job afterwards
        #[arg(long)]
        watch: bool,
    },

    /// Retry a failed or cancelled job
    Retry {
        job_id: JobId,

        #[arg(long)]
        watch: bool,
    },

    /// Cancel a pending or processing job
    Cancel { job_id: JobId },

    /// Start super-resolution inference on an uploaded file
    Infer {
        lr_file_id: String,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        scale: Option<f32>,

        #[arg(long)]
        watch: bool,
    },

    /// Print the result files a job's viewer would display
    Resolve {
        job_id: JobId,

        /// Output entry to select
        #[arg(long, default_value_t = 0)]
        index: usize,

        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// Download the resolved result files of a job
    Download {
        job_id: JobId,

        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        #[arg(long, default_value_t = 0)]
        index: usize,

        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// List uploaded files
    Files {
        #[arg(long)]
        job: Option<JobId>,

        #[arg(long)]
        limit: Option<u32>,
    },
}

/// Viewer layout accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    SideBySide,
    Overlay,
    LrOnly,
    HrOnly,
}

impl From<ModeArg> for ViewMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::SideBySide => ViewMode::SideBySide,
            ModeArg::Overlay => ViewMode::Overlay,
            ModeArg::LrOnly => ViewMode::LrOnly,
            ModeArg::HrOnly => ViewMode::HrOnly,
        }
    }
}

//! Domain types of the job API.

pub mod job;
pub mod time;
pub mod upload;

pub use job::{
    DEFAULT_PAGE_SIZE, JobId, JobListQuery, JobRecord, JobStatus, JobType, PagedJobs,
};
pub use upload::{
    ALLOWED_EXTENSIONS, MAX_FILE_SIZE, MAX_FILES_PER_UPLOAD, UploadFile, validate_upload,
};

//! Job API client.

pub mod auth;
pub mod client;
pub mod http;
pub mod models;

pub use auth::{SharedToken, StaticToken, TokenProvider};
pub use client::JobApi;
pub use http::HttpJobApi;
pub use models::{
    CancelResponse, FileListQuery, FileMetadata, InferenceRequest, InferenceResponse,
    ModelConfig, RetryResponse, UploadResponse,
};

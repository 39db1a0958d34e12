//! # ultraocr
//!
//! Client for the UltraOCR document processing api: authenticate, submit documents
//! (through pre-signed upload urls or inline), then poll jobs and batches until the
//! server is done with them.
//!
//! ```rust,no_run
//! use ultraocr::{Client, QueryParams, Submission, DocumentSource};
//!
//! # async fn run() -> ultraocr::Result<()> {
//! let mut client = Client::new()?.with_auto_refresh("client-id", "client-secret", 60);
//! client.set_timeout(120);
//!
//! let submission = Submission::file("./rg.jpg")
//!     .with_facematch(DocumentSource::path("./selfie.jpg"))
//!     .with_params(QueryParams::new().with("facematch", "true"));
//!
//! let job = client.create_and_wait_job("rg", &submission).await?;
//! println!("{} -> {}", job.job_ksuid, job.status);
//! # Ok(())
//! # }
//! ```
//!
//! A single client is safe to share between tasks: the token refresh is serialized
//! internally, and configuration can only be changed through `&mut self`.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod polling;
pub mod queries;
pub mod submission;
pub mod transport;

pub use auth::{Credentials, RefreshPolicy};
pub use client::{Client, QueryParams};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use models::{
    BatchInfo, BatchJob, BatchResultStorage, BatchStatus, CreatedJob, JobInfo, JobResult,
    JobState, OcrResult, SignedUrl,
};
pub use polling::Pollable;
pub use submission::{DocumentSource, Encoding, ResourceKind, Submission, encode_base64};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use tokio_util::sync::CancellationToken;

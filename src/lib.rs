//! project-box - backend for academic capstone project records
//!
//! This crate tracks student projects and their file resources with:
//! - Allocation of unique, human-readable project numbers (`P001-1/24`)
//! - Swappable object storage backends (local filesystem, GCS) with presigned URLs
//! - redb embedded database for project records (ACID, MVCC, crash-safe)
//! - Best-effort search-index events published to a message broker
//! - REST API with multipart upload support

pub mod allocator;
pub mod api;
pub mod config;
pub mod lifecycle;
pub mod object_store;
pub mod pdf;
pub mod publisher;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use lifecycle::ProjectManager;
use object_store::{ObjectStore, UrlSigner};
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub object_store: Arc<dyn ObjectStore>,
    /// Present when the local backend serves its own signed URLs
    pub url_signer: Option<UrlSigner>,
    pub projects: ProjectManager,
}

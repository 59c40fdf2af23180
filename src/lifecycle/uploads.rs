//! Upload staging for project resources.
//!
//! Files are classified up front, then uploaded through an [`UploadBatch`]
//! that remembers every object it wrote. A batch that is dropped without
//! being committed (request cancelled or timed out) removes its objects in
//! a background task.

use std::sync::Arc;

use bytes::Bytes;

use super::{ProjectError, ResourceUpload};
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::pdf;
use crate::storage::models::{Classified, NewResource, PdfPage, ResourceType};

/// A classified upload that has not touched the object store yet.
#[derive(Debug)]
pub(super) struct PreparedUpload {
    title: String,
    file_name: Option<String>,
    classified: Classified,
    data: Bytes,
}

/// Classify every upload. Nothing is written if any file is rejected.
pub(super) fn prepare(uploads: Vec<ResourceUpload>) -> Result<Vec<PreparedUpload>, ProjectError> {
    uploads
        .into_iter()
        .map(|upload| {
            let file = upload.file;
            let label = file.file_name.as_deref().unwrap_or("<unnamed>").to_string();

            let classified =
                ResourceType::classify(file.content_type.as_deref(), file.file_name.as_deref())
                    .ok_or_else(|| {
                        ProjectError::UnsupportedResourceType(format!(
                            "{label} ({})",
                            file.content_type.as_deref().unwrap_or("no content type")
                        ))
                    })?;

            if file.data.is_empty() {
                return Err(ProjectError::Validation(format!("file {label} is empty")));
            }

            let title = upload
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .or_else(|| file.file_name.as_deref())
                .map(str::to_string)
                .ok_or_else(|| {
                    ProjectError::Validation("resource title or file name is required".to_string())
                })?;

            Ok(PreparedUpload {
                title,
                file_name: file.file_name,
                classified,
                data: file.data,
            })
        })
        .collect()
}

/// Object key for a new upload: a fresh UUID, keeping a safe file extension.
fn object_key(file_name: Option<&str>) -> String {
    let ext = file_name
        .and_then(|n| std::path::Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("resources/{}{ext}", uuid::Uuid::new_v4())
}

/// Extract PDF text off the async runtime. Failures keep the resource without text.
async fn extract_text(data: Bytes, label: &str) -> Option<Vec<PdfPage>> {
    match tokio::task::spawn_blocking(move || pdf::extract_pages(&data)).await {
        Ok(Ok(pages)) => Some(pages),
        Ok(Err(e)) => {
            tracing::warn!(file = label, error = %e, "PDF text extraction failed, storing resource without text");
            None
        }
        Err(e) => {
            tracing::warn!(file = label, error = %e, "PDF text extraction task failed");
            None
        }
    }
}

async fn delete_objects(store: &dyn ObjectStore, bucket: &str, keys: &[String]) {
    for key in keys {
        delete_object(store, bucket, key).await;
    }
}

async fn delete_object(store: &dyn ObjectStore, bucket: &str, key: &str) {
    if let Err(e) = store.delete(bucket, key).await {
        tracing::warn!(bucket, key, error = %e, "Failed to remove uploaded object");
    }
}

/// Objects written on behalf of one uncommitted mutation.
pub(super) struct UploadBatch {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    uploaded: Vec<String>,
    committed: bool,
}

impl UploadBatch {
    pub(super) fn new(store: Arc<dyn ObjectStore>, bucket: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            uploaded: Vec::new(),
            committed: false,
        }
    }

    /// Upload every prepared file, returning rows ready for the store.
    /// Stops at the first failure; objects already written stay tracked.
    pub(super) async fn upload_all(
        &mut self,
        prepared: Vec<PreparedUpload>,
    ) -> Result<Vec<NewResource>, ObjectStoreError> {
        let mut resources = Vec::with_capacity(prepared.len());
        for upload in prepared {
            let key = object_key(upload.file_name.as_deref());
            self.store
                .put(
                    &self.bucket,
                    &key,
                    upload.data.clone(),
                    &upload.classified.mime_type,
                )
                .await?;
            self.uploaded.push(key.clone());

            let pages = if upload.classified.resource_type == ResourceType::Pdf {
                extract_text(upload.data.clone(), &upload.title).await
            } else {
                None
            };

            tracing::debug!(bucket = %self.bucket, key = %key, size = upload.data.len(), "Uploaded resource object");
            resources.push(NewResource {
                title: upload.title,
                bucket: self.bucket.clone(),
                object_key: key,
                file_name: upload.file_name,
                mime_type: upload.classified.mime_type,
                resource_type: upload.classified.resource_type,
                byte_size: upload.data.len() as u64,
                pages,
            });
        }
        Ok(resources)
    }

    /// Number of objects written so far.
    pub(super) fn len(&self) -> usize {
        self.uploaded.len()
    }

    /// Delete every object this batch wrote.
    ///
    /// A key stays tracked until its delete finishes, so if the rollback
    /// itself is cancelled the drop guard picks up whatever is left.
    pub(super) async fn rollback(mut self) {
        if !self.uploaded.is_empty() {
            tracing::info!(count = self.uploaded.len(), bucket = %self.bucket, "Removing uploads of failed mutation");
        }
        while let Some(key) = self.uploaded.last() {
            delete_object(self.store.as_ref(), &self.bucket, key).await;
            self.uploaded.pop();
        }
    }

    /// The rows referencing the uploads are committed; keep the objects.
    pub(super) fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for UploadBatch {
    fn drop(&mut self) {
        if self.committed || self.uploaded.is_empty() {
            return;
        }
        let keys = std::mem::take(&mut self.uploaded);
        let store = Arc::clone(&self.store);
        let bucket = self.bucket.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(count = keys.len(), bucket = %bucket, "Mutation abandoned before commit, removing its uploads");
                handle.spawn(async move {
                    delete_objects(store.as_ref(), &bucket, &keys).await;
                });
            }
            Err(_) => {
                tracing::error!(bucket = %bucket, keys = ?keys, "No runtime to remove abandoned uploads");
            }
        }
    }
}

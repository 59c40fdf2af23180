use super::uploads::{self, UploadBatch};
use super::{ProjectError, ProjectManager, UpdateProjectInput};
use crate::publisher::IndexAction;
use crate::storage::models::ProjectAggregate;

impl ProjectManager {
    /// Apply metadata, relationship and resource changes in one transaction.
    /// The project number never changes.
    pub async fn update(
        &self,
        id: u64,
        input: UpdateProjectInput,
    ) -> Result<ProjectAggregate, ProjectError> {
        let current = self.get(id)?;
        let mut changes = self.validate_update(&current, &input)?;
        let prepared = uploads::prepare(input.add_resources)?;

        let mut batch = UploadBatch::new(self.objects.clone(), &self.settings.resource_bucket);
        changes.add_resources = match batch.upload_all(prepared).await {
            Ok(resources) => resources,
            Err(e) => {
                tracing::warn!(project_id = id, error = %e, "Resource upload failed, abandoning project update");
                batch.rollback().await;
                return Err(ProjectError::StorageUploadFailed(e));
            }
        };

        let updated = match self.store.update_project(id, &changes) {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                batch.rollback().await;
                return Err(ProjectError::NotFound(format!("Project {id}")));
            }
            Err(e) => {
                tracing::error!(project_id = id, error = %e, "Failed to persist project update");
                batch.rollback().await;
                return Err(e.into());
            }
        };
        batch.commit();

        // The rows are gone; leftover objects are orphans at worst.
        for resource in &updated.removed_resources {
            if let Err(e) = self
                .objects
                .delete(&resource.bucket, &resource.object_key)
                .await
            {
                tracing::warn!(
                    project_id = id,
                    resource_id = resource.id,
                    key = %resource.object_key,
                    error = %e,
                    "Failed to delete object of removed resource"
                );
            }
        }

        tracing::info!(
            project_id = id,
            added = changes.add_resources.len(),
            removed = updated.removed_resources.len(),
            "Project updated"
        );

        self.publish_upsert(IndexAction::Update, &updated.aggregate).await;
        Ok(updated.aggregate)
    }
}

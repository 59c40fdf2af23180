use super::{ProjectError, ProjectManager};
use crate::publisher::{IndexAction, IndexEvent};
use crate::storage::models::{ProjectAggregate, ResourceRecord};

impl ProjectManager {
    /// Delete a project and everything it owns.
    ///
    /// Rows go in one transaction; backing objects are removed afterwards and
    /// a failure there only leaves orphans behind. The number stays claimed.
    pub async fn delete(&self, id: u64) -> Result<ProjectAggregate, ProjectError> {
        let removed = self
            .store
            .delete_project(id)?
            .ok_or_else(|| ProjectError::NotFound(format!("Project {id}")))?;

        for resource in &removed.resources {
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
                    "Failed to delete object of deleted project"
                );
            }
        }

        tracing::info!(
            project_id = id,
            project_number = %removed.project.project_number,
            resources = removed.resources.len(),
            "Project deleted"
        );

        self.publish(IndexEvent::deleted(id)).await;
        Ok(removed)
    }

    /// Remove a single resource. The object goes first so a failed delete
    /// leaves the row pointing at a still-present object.
    pub async fn remove_resource(&self, resource_id: u64) -> Result<ResourceRecord, ProjectError> {
        let resource = self.resource(resource_id)?;

        self.objects
            .delete(&resource.bucket, &resource.object_key)
            .await
            .map_err(|e| {
                tracing::error!(resource_id, key = %resource.object_key, error = %e, "Failed to delete resource object");
                ProjectError::StorageDeleteFailed(e)
            })?;

        let removed = match self.store.delete_resource(resource_id) {
            Ok(Some(removed)) => removed,
            Ok(None) => return Err(ProjectError::NotFound(format!("Resource {resource_id}"))),
            Err(e) => {
                // The row survives but its object is gone.
                tracing::error!(
                    resource_id,
                    project_id = resource.project_id,
                    bucket = %resource.bucket,
                    key = %resource.object_key,
                    error = %e,
                    "Resource row references a deleted object"
                );
                return Err(e.into());
            }
        };

        tracing::info!(resource_id, project_id = removed.project_id, "Resource removed");

        match self.store.get_project(removed.project_id) {
            Ok(Some(aggregate)) => self.publish_upsert(IndexAction::Update, &aggregate).await,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(project_id = removed.project_id, error = %e, "Failed to reload project for index event");
            }
        }

        Ok(removed)
    }
}

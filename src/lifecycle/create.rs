use super::uploads::{self, UploadBatch};
use super::{CreateProjectInput, ProjectError, ProjectManager};
use crate::allocator::NumberScope;
use crate::publisher::IndexAction;
use crate::storage::models::{NewProject, ProjectAggregate};

impl ProjectManager {
    /// Create a project with its staff, members, keywords and resources.
    ///
    /// The project number is allocated only after every input has been
    /// validated and classified. A number consumed by a create that later
    /// fails is not handed out again.
    pub async fn create(&self, input: CreateProjectInput) -> Result<ProjectAggregate, ProjectError> {
        let validated = self.validate_create(&input)?;

        let CreateProjectInput {
            academic_year,
            semester,
            program_id,
            course_id,
            is_public,
            staff,
            resources,
            ..
        } = input;
        let prepared = uploads::prepare(resources)?;

        let scope = NumberScope::new(academic_year, semester, course_id);
        let number = self.allocate_number(scope)?;

        let mut batch = UploadBatch::new(self.objects.clone(), &self.settings.resource_bucket);
        let new_resources = match batch.upload_all(prepared).await {
            Ok(resources) => resources,
            Err(e) => {
                tracing::warn!(
                    project_number = %number.number,
                    uploaded = batch.len(),
                    error = %e,
                    "Resource upload failed, abandoning project create"
                );
                batch.rollback().await;
                return Err(ProjectError::StorageUploadFailed(e));
            }
        };

        let new = NewProject {
            project_number: number.number.clone(),
            title_th: validated.title_th,
            title_en: validated.title_en,
            abstract_text: validated.abstract_text,
            academic_year,
            semester,
            program_id,
            course_id,
            is_public,
            staff,
            members: validated.members,
            keyword_ids: validated.keyword_ids,
            resources: new_resources,
        };

        let aggregate = match self.store.insert_project(&new) {
            Ok(aggregate) => aggregate,
            Err(e) => {
                tracing::error!(project_number = %number.number, error = %e, "Failed to persist project");
                batch.rollback().await;
                return Err(e.into());
            }
        };
        batch.commit();

        tracing::info!(
            project_id = aggregate.project.id,
            project_number = %aggregate.project.project_number,
            resources = aggregate.resources.len(),
            "Project created"
        );

        self.publish_upsert(IndexAction::Create, &aggregate).await;
        Ok(aggregate)
    }
}

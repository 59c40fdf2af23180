//! Project lifecycle: create, update and delete of the project aggregate.
//!
//! Every mutation follows the same discipline:
//! 1. validate and classify uploads before touching anything,
//! 2. upload objects, tracking each one in an [`uploads::UploadBatch`],
//! 3. write the aggregate in a single store transaction,
//! 4. on failure delete the tracked objects, on success publish an index event.
//!
//! Index events are best-effort: a publish failure is logged and never
//! undoes a committed write.

mod create;
mod delete;
mod update;
mod uploads;
mod validate;


use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::allocator::{AllocatedNumber, AllocationError, NumberScope, ProjectNumberAllocator};
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::publisher::{
    IndexAction, IndexEvent, MessagePublisher, ProgramRef, ProjectSnapshot, ResourceRef, StaffRef,
};
use crate::storage::models::{
    CourseRecord, KeywordRecord, NewProject, Patch, PdfPage, ProgramRecord, ProjectAggregate,
    ProjectChanges, ProjectFilter, ProjectRecord, ProjectRole, ResourceRecord, ResourceType,
    StaffAssignment, StaffRecord, UpdatedProject,
};
use crate::storage::{Database, DatabaseError};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("{0}")]
    Validation(String),
    #[error("Project number allocation conflict for scope {scope}; retry the request")]
    AllocationConflict { scope: String },
    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(String),
    #[error("Failed to upload resource: {0}")]
    StorageUploadFailed(#[source] ObjectStoreError),
    #[error("Failed to delete resource object: {0}")]
    StorageDeleteFailed(#[source] ObjectStoreError),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

impl From<AllocationError> for ProjectError {
    fn from(e: AllocationError) -> Self {
        match e {
            AllocationError::Conflict { scope } => ProjectError::AllocationConflict { scope },
            AllocationError::Invariant(msg) => ProjectError::Invariant(msg),
            AllocationError::Database(e) => ProjectError::Database(e),
        }
    }
}

/// Persistence needed by the project aggregate.
pub trait ProjectStore: Send + Sync {
    fn insert_project(&self, new: &NewProject) -> Result<ProjectAggregate, DatabaseError>;
    fn get_project(&self, id: u64) -> Result<Option<ProjectAggregate>, DatabaseError>;
    fn get_project_by_number(&self, number: &str)
        -> Result<Option<ProjectAggregate>, DatabaseError>;
    fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectRecord>, DatabaseError>;
    fn update_project(
        &self,
        id: u64,
        changes: &ProjectChanges,
    ) -> Result<Option<UpdatedProject>, DatabaseError>;
    fn delete_project(&self, id: u64) -> Result<Option<ProjectAggregate>, DatabaseError>;
    fn get_resource(&self, id: u64) -> Result<Option<ResourceRecord>, DatabaseError>;
    fn get_resource_pages(&self, id: u64) -> Result<Vec<PdfPage>, DatabaseError>;
    fn delete_resource(&self, id: u64) -> Result<Option<ResourceRecord>, DatabaseError>;
}

/// Read access to reference data owned by other systems.
pub trait CatalogLookup: Send + Sync {
    fn program(&self, id: u64) -> Result<Option<ProgramRecord>, DatabaseError>;
    fn course(&self, id: u64) -> Result<Option<CourseRecord>, DatabaseError>;
    fn staff(&self, id: u64) -> Result<Option<StaffRecord>, DatabaseError>;
    fn keyword(&self, id: u64) -> Result<Option<KeywordRecord>, DatabaseError>;
}

impl ProjectStore for Database {
    fn insert_project(&self, new: &NewProject) -> Result<ProjectAggregate, DatabaseError> {
        Database::insert_project(self, new)
    }

    fn get_project(&self, id: u64) -> Result<Option<ProjectAggregate>, DatabaseError> {
        Database::get_project(self, id)
    }

    fn get_project_by_number(
        &self,
        number: &str,
    ) -> Result<Option<ProjectAggregate>, DatabaseError> {
        Database::get_project_by_number(self, number)
    }

    fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectRecord>, DatabaseError> {
        Database::list_projects(self, filter)
    }

    fn update_project(
        &self,
        id: u64,
        changes: &ProjectChanges,
    ) -> Result<Option<UpdatedProject>, DatabaseError> {
        Database::update_project(self, id, changes)
    }

    fn delete_project(&self, id: u64) -> Result<Option<ProjectAggregate>, DatabaseError> {
        Database::delete_project(self, id)
    }

    fn get_resource(&self, id: u64) -> Result<Option<ResourceRecord>, DatabaseError> {
        Database::get_resource(self, id)
    }

    fn get_resource_pages(&self, id: u64) -> Result<Vec<PdfPage>, DatabaseError> {
        Database::get_resource_pages(self, id)
    }

    fn delete_resource(&self, id: u64) -> Result<Option<ResourceRecord>, DatabaseError> {
        Database::delete_resource(self, id)
    }
}

impl CatalogLookup for Database {
    fn program(&self, id: u64) -> Result<Option<ProgramRecord>, DatabaseError> {
        self.get_program(id)
    }

    fn course(&self, id: u64) -> Result<Option<CourseRecord>, DatabaseError> {
        self.get_course(id)
    }

    fn staff(&self, id: u64) -> Result<Option<StaffRecord>, DatabaseError> {
        self.get_staff(id)
    }

    fn keyword(&self, id: u64) -> Result<Option<KeywordRecord>, DatabaseError> {
        self.get_keyword(id)
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Resource metadata paired with its file. A blank title falls back to the file name.
#[derive(Debug, Clone)]
pub struct ResourceUpload {
    pub title: Option<String>,
    pub file: UploadedFile,
}

#[derive(Debug, Clone)]
pub struct CreateProjectInput {
    pub title_th: String,
    pub title_en: String,
    pub abstract_text: Option<String>,
    pub academic_year: i32,
    pub semester: u8,
    pub program_id: u64,
    pub course_id: u64,
    pub is_public: bool,
    pub staff: Vec<StaffAssignment>,
    pub members: Vec<String>,
    pub keyword_ids: Vec<u64>,
    pub resources: Vec<ResourceUpload>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProjectInput {
    pub title_th: Option<String>,
    pub title_en: Option<String>,
    pub abstract_text: Patch<String>,
    pub is_public: Option<bool>,
    pub add_staff: Vec<StaffAssignment>,
    pub remove_staff: Vec<u64>,
    pub add_members: Vec<String>,
    pub remove_members: Vec<String>,
    pub add_keywords: Vec<u64>,
    pub remove_keywords: Vec<u64>,
    pub add_resources: Vec<ResourceUpload>,
    pub remove_resources: Vec<u64>,
}

// ============================================================================
// Manager
// ============================================================================

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Bucket that receives uploaded resources
    pub resource_bucket: String,
    /// Exchange that receives index events
    pub exchange: String,
    /// Lifetime of presigned resource URLs
    pub url_ttl: Duration,
    /// Whole-allocation attempts before an allocation conflict is surfaced
    pub allocation_retries: u32,
}

pub struct ProjectManager {
    store: Arc<dyn ProjectStore>,
    catalog: Arc<dyn CatalogLookup>,
    allocator: ProjectNumberAllocator,
    objects: Arc<dyn ObjectStore>,
    publisher: Arc<dyn MessagePublisher>,
    settings: LifecycleSettings,
}

impl ProjectManager {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        catalog: Arc<dyn CatalogLookup>,
        allocator: ProjectNumberAllocator,
        objects: Arc<dyn ObjectStore>,
        publisher: Arc<dyn MessagePublisher>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            allocator,
            objects,
            publisher,
            settings,
        }
    }

    /// Wire every collaborator to the same database.
    pub fn with_database(
        db: Database,
        objects: Arc<dyn ObjectStore>,
        publisher: Arc<dyn MessagePublisher>,
        settings: LifecycleSettings,
    ) -> Self {
        let db = Arc::new(db);
        Self::new(
            db.clone(),
            db.clone(),
            ProjectNumberAllocator::new(db),
            objects,
            publisher,
            settings,
        )
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get(&self, id: u64) -> Result<ProjectAggregate, ProjectError> {
        self.store
            .get_project(id)?
            .ok_or_else(|| ProjectError::NotFound(format!("Project {id}")))
    }

    pub fn get_by_number(&self, number: &str) -> Result<ProjectAggregate, ProjectError> {
        self.store
            .get_project_by_number(number)?
            .ok_or_else(|| ProjectError::NotFound(format!("Project {number}")))
    }

    pub fn list(&self, filter: &ProjectFilter) -> Result<Vec<ProjectRecord>, ProjectError> {
        Ok(self.store.list_projects(filter)?)
    }

    pub fn resource(&self, id: u64) -> Result<ResourceRecord, ProjectError> {
        self.store
            .get_resource(id)?
            .ok_or_else(|| ProjectError::NotFound(format!("Resource {id}")))
    }

    pub fn resource_pages(&self, id: u64) -> Result<Vec<PdfPage>, ProjectError> {
        self.resource(id)?;
        Ok(self.store.get_resource_pages(id)?)
    }

    /// A download URL for the resource, or `None` if the backend cannot sign one.
    pub async fn resource_url(&self, resource: &ResourceRecord) -> Option<String> {
        match self
            .objects
            .presigned_url(&resource.bucket, &resource.object_key, self.settings.url_ttl)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(resource_id = resource.id, error = %e, "Failed to presign resource URL");
                None
            }
        }
    }

    // ========================================================================
    // Shared steps
    // ========================================================================

    /// Allocate a project number, retrying whole allocations that lost their race.
    fn allocate_number(&self, scope: NumberScope) -> Result<AllocatedNumber, ProjectError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.allocator.allocate(scope) {
                Ok(number) => return Ok(number),
                Err(AllocationError::Conflict { .. })
                    if attempt < self.settings.allocation_retries =>
                {
                    tracing::debug!(scope = %scope, attempt, "Retrying project number allocation");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Build the denormalized document the search indexer consumes.
    fn snapshot(&self, aggregate: &ProjectAggregate) -> Result<ProjectSnapshot, DatabaseError> {
        let project = &aggregate.project;

        let program = self.catalog.program(project.program_id)?.map(|p| ProgramRef {
            id: p.id,
            name: p.name,
        });

        let mut advisor = None;
        let mut co_advisors = Vec::new();
        let mut committees = Vec::new();
        for assignment in &aggregate.staff {
            let name = self
                .catalog
                .staff(assignment.staff_id)?
                .map(|s| s.display_name())
                .unwrap_or_else(|| format!("staff #{}", assignment.staff_id));
            let staff = StaffRef {
                id: assignment.staff_id,
                name,
            };
            match assignment.role {
                ProjectRole::Advisor => advisor = Some(staff),
                ProjectRole::CoAdvisor => co_advisors.push(staff),
                ProjectRole::Committee => committees.push(staff),
            }
        }

        let mut keywords = Vec::with_capacity(aggregate.keyword_ids.len());
        for id in &aggregate.keyword_ids {
            if let Some(k) = self.catalog.keyword(*id)? {
                keywords.push(k.keyword);
            }
        }

        let mut resources = Vec::with_capacity(aggregate.resources.len());
        for r in &aggregate.resources {
            let pages = if r.resource_type == ResourceType::Pdf && r.page_count > 0 {
                self.store
                    .get_resource_pages(r.id)?
                    .into_iter()
                    .map(|p| p.text)
                    .collect()
            } else {
                Vec::new()
            };
            resources.push(ResourceRef {
                id: r.id,
                title: r.title.clone(),
                resource_type: r.resource_type.as_str().to_string(),
                pages,
            });
        }

        Ok(ProjectSnapshot {
            id: project.id,
            project_number: project.project_number.clone(),
            title_th: project.title_th.clone(),
            title_en: project.title_en.clone(),
            abstract_text: project.abstract_text.clone(),
            academic_year: project.academic_year,
            semester: project.semester,
            is_public: project.is_public,
            program,
            advisor,
            co_advisors,
            committees,
            members: aggregate.members.clone(),
            keywords,
            resources,
            created_at: project.created_at,
            updated_at: project.updated_at,
        })
    }

    /// Publish a create/update event. Failures are logged, never returned.
    async fn publish_upsert(&self, action: IndexAction, aggregate: &ProjectAggregate) {
        let project_id = aggregate.project.id;
        match self.snapshot(aggregate) {
            Ok(snapshot) => self.publish(IndexEvent::upsert(action, snapshot)).await,
            Err(e) => {
                tracing::warn!(project_id, error = %e, "Failed to build index snapshot, event dropped");
            }
        }
    }

    async fn publish(&self, event: IndexEvent) {
        let project_id = event.project_id;
        let routing_key = event.action.routing_key();
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(project_id, error = %e, "Failed to encode index event");
                return;
            }
        };

        if let Err(e) = self
            .publisher
            .publish(&self.settings.exchange, routing_key, &payload)
            .await
        {
            tracing::warn!(
                project_id,
                routing_key,
                error = %e,
                "Index publish failed; search index may be stale"
            );
        }
    }
}

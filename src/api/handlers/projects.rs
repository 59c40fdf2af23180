use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

use super::resources::{resource_to_response, ResourceResponse};
use super::parse_id;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend, Page};
use crate::lifecycle::{CreateProjectInput, ResourceUpload, UpdateProjectInput, UploadedFile};
use crate::storage::models::{
    Patch, ProjectAggregate, ProjectFilter, ProjectRecord, StaffAssignment,
};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: u64,
    pub project_number: String,
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
    pub resources: Vec<ResourceResponse>,
    pub created_at: String,
    pub updated_at: String,
}

/// Core project fields, as returned by the list endpoint.
#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    pub id: u64,
    pub project_number: String,
    pub title_th: String,
    pub title_en: String,
    pub academic_year: i32,
    pub semester: u8,
    pub program_id: u64,
    pub course_id: u64,
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Metadata for one uploaded file, matched to `files` parts by position.
#[derive(Debug, Default, Deserialize)]
pub struct ResourceMeta {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub title_th: String,
    pub title_en: String,
    #[serde(default)]
    pub abstract_text: Option<String>,
    pub academic_year: i32,
    pub semester: u8,
    pub program_id: u64,
    pub course_id: u64,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub staff: Vec<StaffAssignment>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub keyword_ids: Vec<u64>,
    #[serde(default)]
    pub resources: Vec<ResourceMeta>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub title_th: Option<String>,
    #[serde(default)]
    pub title_en: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub abstract_text: Option<Option<String>>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub add_staff: Vec<StaffAssignment>,
    #[serde(default)]
    pub remove_staff: Vec<u64>,
    #[serde(default)]
    pub add_members: Vec<String>,
    #[serde(default)]
    pub remove_members: Vec<String>,
    #[serde(default)]
    pub add_keywords: Vec<u64>,
    #[serde(default)]
    pub remove_keywords: Vec<u64>,
    #[serde(default)]
    pub remove_resources: Vec<u64>,
    #[serde(default)]
    pub resources: Vec<ResourceMeta>,
}

#[derive(Debug, Deserialize)]
pub struct ListProjectsParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub academic_year: Option<i32>,
    #[serde(default)]
    pub semester: Option<u8>,
    #[serde(default)]
    pub program_id: Option<u64>,
    #[serde(default)]
    pub course_id: Option<u64>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ByNumberParams {
    pub number: String,
}

fn default_limit() -> u32 {
    20
}

/// Distinguishes between a missing field (`None`) and an explicit `null` (`Some(None)`).
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: DeserializeOwned,
    D: Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /projects (multipart: `project` JSON part plus any number of `files` parts)
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<JSend<ProjectResponse>>, ApiError> {
    let form = read_form(multipart, "project", state.config.max_upload_size).await?;
    let json = form
        .json
        .ok_or_else(|| ApiError::bad_request("project field is required"))?;
    let req: CreateProjectRequest = serde_json::from_str(&json)
        .map_err(|e| ApiError::bad_request(format!("Invalid project field: {e}")))?;

    let resources = pair_files(req.resources, form.files)?;
    let input = CreateProjectInput {
        title_th: req.title_th,
        title_en: req.title_en,
        abstract_text: req.abstract_text,
        academic_year: req.academic_year,
        semester: req.semester,
        program_id: req.program_id,
        course_id: req.course_id,
        is_public: req.is_public,
        staff: req.staff,
        members: req.members,
        keyword_ids: req.keyword_ids,
        resources,
    };

    let aggregate = state.projects.create(input).await?;
    Ok(JSend::success(project_to_response(&state, &aggregate).await))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<ProjectResponse>>, ApiError> {
    let id = parse_id(&id, "project")?;
    let aggregate = state.projects.get(id)?;
    Ok(JSend::success(project_to_response(&state, &aggregate).await))
}

pub async fn get_project_by_number(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ByNumberParams>,
) -> Result<Json<JSend<ProjectResponse>>, ApiError> {
    let aggregate = state.projects.get_by_number(params.number.trim())?;
    Ok(JSend::success(project_to_response(&state, &aggregate).await))
}

/// PUT /projects/:id (multipart: `changes` JSON part plus `files` parts to add)
pub async fn update_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<JSend<ProjectResponse>>, ApiError> {
    let id = parse_id(&id, "project")?;
    let form = read_form(multipart, "changes", state.config.max_upload_size).await?;
    let mut req: UpdateProjectRequest = match form.json {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| ApiError::bad_request(format!("Invalid changes field: {e}")))?,
        None => UpdateProjectRequest::default(),
    };

    let metas = std::mem::take(&mut req.resources);
    let add_resources = pair_files(metas, form.files)?;
    let input = update_input(req, add_resources);

    let aggregate = state.projects.update(id, input).await?;
    Ok(JSend::success(project_to_response(&state, &aggregate).await))
}

/// PATCH /projects/:id (JSON changes, no file uploads)
pub async fn patch_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateProjectRequest>,
) -> Result<Json<JSend<ProjectResponse>>, ApiError> {
    let id = parse_id(&id, "project")?;
    if !req.resources.is_empty() {
        return Err(ApiError::bad_request(
            "resources can only be added with a multipart PUT",
        ));
    }

    let aggregate = state.projects.update(id, update_input(req, Vec::new())).await?;
    Ok(JSend::success(project_to_response(&state, &aggregate).await))
}

pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    let id = parse_id(&id, "project")?;
    state.projects.delete(id).await?;
    Ok(JSend::success(()))
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListProjectsParams>,
) -> Result<Json<JSend<Page<ProjectSummary>>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let filter = ProjectFilter {
        academic_year: params.academic_year,
        semester: params.semester,
        program_id: params.program_id,
        course_id: params.course_id,
        is_public: params.is_public,
    };
    let projects = state.projects.list(&filter)?;

    Ok(Page::slice(
        projects.as_slice(),
        params.limit,
        params.offset,
        project_to_summary,
    ))
}

// ============================================================================
// Multipart
// ============================================================================

struct ProjectForm {
    json: Option<String>,
    files: Vec<UploadedFile>,
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(format!("Request body too large: {}", e.body_text()))
    } else {
        ApiError::bad_request(format!("Invalid multipart data: {}", e.body_text()))
    }
}

/// Collect the JSON part named `json_field` and every `files` part.
async fn read_form(
    mut multipart: Multipart,
    json_field: &str,
    max_upload_size: u64,
) -> Result<ProjectForm, ApiError> {
    let mut form = ProjectForm {
        json: None,
        files: Vec::new(),
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        if name == json_field {
            form.json = Some(field.text().await.map_err(multipart_error)?);
        } else if name == "files" {
            let file_name = field.file_name().map(|s| s.to_string());
            let content_type = field.content_type().map(|s| s.to_string());
            let data = field.bytes().await.map_err(multipart_error)?;

            if data.len() as u64 > max_upload_size {
                return Err(ApiError::payload_too_large(format!(
                    "File exceeds maximum upload size of {max_upload_size} bytes"
                )));
            }

            form.files.push(UploadedFile {
                file_name,
                content_type,
                data,
            });
        }
        // Unknown fields are ignored
    }

    Ok(form)
}

/// Pair resource metadata with uploaded files by position.
/// Files without metadata take their title from the file name.
fn pair_files(
    metas: Vec<ResourceMeta>,
    files: Vec<UploadedFile>,
) -> Result<Vec<ResourceUpload>, ApiError> {
    if metas.len() > files.len() {
        return Err(ApiError::bad_request(format!(
            "{} resource entries but only {} files",
            metas.len(),
            files.len()
        )));
    }

    let mut metas = metas.into_iter();
    Ok(files
        .into_iter()
        .map(|file| ResourceUpload {
            title: metas.next().and_then(|m| m.title),
            file,
        })
        .collect())
}

fn update_input(req: UpdateProjectRequest, add_resources: Vec<ResourceUpload>) -> UpdateProjectInput {
    UpdateProjectInput {
        title_th: req.title_th,
        title_en: req.title_en,
        abstract_text: Patch::from(req.abstract_text),
        is_public: req.is_public,
        add_staff: req.add_staff,
        remove_staff: req.remove_staff,
        add_members: req.add_members,
        remove_members: req.remove_members,
        add_keywords: req.add_keywords,
        remove_keywords: req.remove_keywords,
        add_resources,
        remove_resources: req.remove_resources,
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn project_to_response(state: &AppState, aggregate: &ProjectAggregate) -> ProjectResponse {
    let mut resources = Vec::with_capacity(aggregate.resources.len());
    for resource in &aggregate.resources {
        let url = state.projects.resource_url(resource).await;
        resources.push(resource_to_response(resource, url));
    }

    let project = &aggregate.project;
    ProjectResponse {
        id: project.id,
        project_number: project.project_number.clone(),
        title_th: project.title_th.clone(),
        title_en: project.title_en.clone(),
        abstract_text: project.abstract_text.clone(),
        academic_year: project.academic_year,
        semester: project.semester,
        program_id: project.program_id,
        course_id: project.course_id,
        is_public: project.is_public,
        staff: aggregate.staff.clone(),
        members: aggregate.members.clone(),
        keyword_ids: aggregate.keyword_ids.clone(),
        resources,
        created_at: project.created_at.to_rfc3339(),
        updated_at: project.updated_at.to_rfc3339(),
    }
}

fn project_to_summary(project: &ProjectRecord) -> ProjectSummary {
    ProjectSummary {
        id: project.id,
        project_number: project.project_number.clone(),
        title_th: project.title_th.clone(),
        title_en: project.title_en.clone(),
        academic_year: project.academic_year,
        semester: project.semester,
        program_id: project.program_id,
        course_id: project.course_id,
        is_public: project.is_public,
        created_at: project.created_at.to_rfc3339(),
        updated_at: project.updated_at.to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn file(name: &str) -> UploadedFile {
        UploadedFile {
            file_name: Some(name.to_string()),
            content_type: None,
            data: Bytes::from_static(b"x"),
        }
    }

    #[test]
    fn test_pair_files_by_position() {
        let metas = vec![ResourceMeta {
            title: Some("Final report".to_string()),
        }];
        let paired = pair_files(metas, vec![file("a.pdf"), file("b.png")]).unwrap();
        assert_eq!(paired.len(), 2);
        assert_eq!(paired[0].title.as_deref(), Some("Final report"));
        assert_eq!(paired[1].title, None);
    }

    #[test]
    fn test_pair_files_rejects_extra_metadata() {
        let metas = vec![ResourceMeta::default(), ResourceMeta::default()];
        assert!(pair_files(metas, vec![file("a.pdf")]).is_err());
    }

    #[test]
    fn test_update_request_distinguishes_null_from_absent() {
        let cleared: UpdateProjectRequest =
            serde_json::from_str(r#"{"abstract_text": null}"#).unwrap();
        assert_eq!(cleared.abstract_text, Some(None));

        let untouched: UpdateProjectRequest = serde_json::from_str(r#"{"is_public": true}"#).unwrap();
        assert_eq!(untouched.abstract_text, None);
        assert!(Patch::from(untouched.abstract_text).is_absent());
    }
}

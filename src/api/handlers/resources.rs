use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use super::parse_id;
use crate::api::response::{ApiError, JSend};
use crate::storage::models::{PdfPage, ResourceRecord, ResourceType};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ResourceResponse {
    pub id: u64,
    pub project_id: u64,
    pub title: String,
    pub file_name: Option<String>,
    pub mime_type: String,
    pub resource_type: ResourceType,
    pub byte_size: u64,
    pub page_count: u32,
    /// Presigned download URL; absent when the backend cannot sign one
    pub url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ResourcePagesResponse {
    pub resource_id: u64,
    pub pages: Vec<PdfPage>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn get_resource(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<ResourceResponse>>, ApiError> {
    let id = parse_id(&id, "resource")?;
    let resource = state.projects.resource(id)?;
    let url = state.projects.resource_url(&resource).await;
    Ok(JSend::success(resource_to_response(&resource, url)))
}

pub async fn get_resource_pages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<ResourcePagesResponse>>, ApiError> {
    let id = parse_id(&id, "resource")?;
    let pages = state.projects.resource_pages(id)?;
    Ok(JSend::success(ResourcePagesResponse {
        resource_id: id,
        pages,
    }))
}

pub async fn delete_resource(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    let id = parse_id(&id, "resource")?;
    state.projects.remove_resource(id).await?;
    Ok(JSend::success(()))
}

// ============================================================================
// Helpers
// ============================================================================

pub(super) fn resource_to_response(
    resource: &ResourceRecord,
    url: Option<String>,
) -> ResourceResponse {
    ResourceResponse {
        id: resource.id,
        project_id: resource.project_id,
        title: resource.title.clone(),
        file_name: resource.file_name.clone(),
        mime_type: resource.mime_type.clone(),
        resource_type: resource.resource_type,
        byte_size: resource.byte_size,
        page_count: resource.page_count,
        url,
        created_at: resource.created_at.to_rfc3339(),
    }
}

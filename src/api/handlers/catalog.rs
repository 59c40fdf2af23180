use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::storage::models::CatalogImport;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CatalogImportResponse {
    pub programs: u64,
    pub courses: u64,
    pub staff: u64,
    pub keywords: u64,
}

/// Upsert reference data (programs, courses, staff, keywords) in one transaction.
pub async fn import_catalog(
    State(state): State<Arc<AppState>>,
    AppJson(import): AppJson<CatalogImport>,
) -> Result<Json<JSend<CatalogImportResponse>>, ApiError> {
    for course in &import.courses {
        let known = import.programs.iter().any(|p| p.id == course.program_id)
            || state.db.get_program(course.program_id)?.is_some();
        if !known {
            return Err(ApiError::bad_request(format!(
                "course {} references unknown program {}",
                course.id, course.program_id
            )));
        }
    }

    let stats = state.db.import_catalog(&import)?;

    tracing::info!(
        programs = stats.programs,
        courses = stats.courses,
        staff = stats.staff,
        keywords = stats.keywords,
        "Imported catalog"
    );

    Ok(JSend::success(CatalogImportResponse {
        programs: stats.programs,
        courses: stats.courses,
        staff: stats.staff,
        keywords: stats.keywords,
    }))
}

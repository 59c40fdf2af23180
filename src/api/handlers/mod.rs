mod admin;
mod catalog;
mod objects;
mod projects;
mod resources;

use crate::api::response::ApiError;

pub use admin::{admin_purge, health};
pub use catalog::import_catalog;
pub use objects::serve_object;
pub use projects::{
    create_project, delete_project, get_project, get_project_by_number, list_projects,
    patch_project, update_project,
};
pub use resources::{delete_resource, get_resource, get_resource_pages};

/// Parse a numeric path id
fn parse_id(raw: &str, what: &str) -> Result<u64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("{what} id must be a non-negative integer")))
}

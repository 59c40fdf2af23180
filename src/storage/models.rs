use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Three-state patch value for partial updates that survives serialization round-trips.
/// Unlike `Option<Option<T>>`, each variant has a distinct wire representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Patch<T> {
    /// Field was not included in the request (no change).
    #[default]
    Absent,
    /// Field was explicitly set to null (clear it).
    Null,
    /// Field was set to a new value.
    Value(T),
}

impl<T> From<Option<Option<T>>> for Patch<T> {
    fn from(v: Option<Option<T>>) -> Self {
        match v {
            None => Patch::Absent,
            Some(None) => Patch::Null,
            Some(Some(v)) => Patch::Value(v),
        }
    }
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    /// Apply the patch to an optional field.
    pub fn apply_to(self, field: &mut Option<T>) {
        match self {
            Patch::Absent => {}
            Patch::Null => *field = None,
            Patch::Value(v) => *field = Some(v),
        }
    }
}

/// Classification of a project resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Archive,
    Document,
    Image,
    Pdf,
    Presentation,
    Spreadsheet,
    Video,
}

/// The outcome of classifying an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub resource_type: ResourceType,
    pub mime_type: String,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Archive => "archive",
            ResourceType::Document => "document",
            ResourceType::Image => "image",
            ResourceType::Pdf => "pdf",
            ResourceType::Presentation => "presentation",
            ResourceType::Spreadsheet => "spreadsheet",
            ResourceType::Video => "video",
        }
    }

    /// Map a MIME type to a resource type. Unknown types yield `None`.
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        let resource_type = match essence.as_str() {
            "application/pdf" => ResourceType::Pdf,
            "application/msword"
            | "application/rtf"
            | "application/vnd.oasis.opendocument.text"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "text/markdown"
            | "text/plain" => ResourceType::Document,
            "application/vnd.ms-excel"
            | "application/vnd.oasis.opendocument.spreadsheet"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "text/csv" => ResourceType::Spreadsheet,
            "application/vnd.ms-powerpoint"
            | "application/vnd.oasis.opendocument.presentation"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                ResourceType::Presentation
            }
            "image/gif" | "image/jpeg" | "image/png" | "image/svg+xml" | "image/webp" => {
                ResourceType::Image
            }
            "video/mp4" | "video/quicktime" | "video/webm" => ResourceType::Video,
            "application/gzip"
            | "application/x-7z-compressed"
            | "application/x-tar"
            | "application/zip" => ResourceType::Archive,
            _ => return None,
        };
        Some(resource_type)
    }

    /// Map a file extension (without the dot, any case) to a resource type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let resource_type = match ext.to_ascii_lowercase().as_str() {
            "pdf" => ResourceType::Pdf,
            "doc" | "docx" | "md" | "odt" | "rtf" | "txt" => ResourceType::Document,
            "csv" | "ods" | "xls" | "xlsx" => ResourceType::Spreadsheet,
            "odp" | "ppt" | "pptx" => ResourceType::Presentation,
            "gif" | "jpeg" | "jpg" | "png" | "svg" | "webp" => ResourceType::Image,
            "mov" | "mp4" | "webm" => ResourceType::Video,
            "7z" | "gz" | "tar" | "zip" => ResourceType::Archive,
            _ => return None,
        };
        Some(resource_type)
    }

    /// Classify an upload from its declared content type, falling back to the file extension.
    /// `application/octet-stream` counts as undeclared.
    pub fn classify(content_type: Option<&str>, file_name: Option<&str>) -> Option<Classified> {
        let declared = content_type
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");

        if let Some(mime) = declared.as_deref() {
            if let Some(resource_type) = Self::from_mime(mime) {
                return Some(Classified {
                    resource_type,
                    mime_type: mime.to_string(),
                });
            }
        }

        let ext = file_name
            .and_then(|n| std::path::Path::new(n).extension())
            .and_then(|e| e.to_str())?;
        let resource_type = Self::from_extension(ext)?;

        let mime_type = file_name
            .and_then(|n| mime_guess::from_path(n).first())
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Some(Classified {
            resource_type,
            mime_type,
        })
    }
}

/// Role a staff member plays on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    Advisor,
    CoAdvisor,
    Committee,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffAssignment {
    pub staff_id: u64,
    pub role: ProjectRole,
}

/// Core project row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: u64,
    pub project_number: String,
    pub title_th: String,
    pub title_en: String,
    #[serde(default)]
    pub abstract_text: Option<String>,
    pub academic_year: i32,
    pub semester: u8,
    pub program_id: u64,
    pub course_id: u64,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A file-backed resource attached to a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: u64,
    pub project_id: u64,
    pub title: String,
    pub bucket: String,
    pub object_key: String,
    #[serde(default)]
    pub file_name: Option<String>,
    pub mime_type: String,
    pub resource_type: ResourceType,
    pub byte_size: u64,
    /// Number of extracted PDF pages stored for this resource
    #[serde(default)]
    pub page_count: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfPage {
    pub page_number: u32,
    pub text: String,
}

/// A project with every row it owns.
#[derive(Debug, Clone)]
pub struct ProjectAggregate {
    pub project: ProjectRecord,
    pub staff: Vec<StaffAssignment>,
    pub members: Vec<String>,
    pub keyword_ids: Vec<u64>,
    pub resources: Vec<ResourceRecord>,
}

/// A resource about to be written; its object is already in the object store.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub title: String,
    pub bucket: String,
    pub object_key: String,
    pub file_name: Option<String>,
    pub mime_type: String,
    pub resource_type: ResourceType,
    pub byte_size: u64,
    pub pages: Option<Vec<PdfPage>>,
}

/// Everything needed to insert a project aggregate in one transaction.
#[derive(Debug, Clone)]
pub struct NewProject {
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
    pub resources: Vec<NewResource>,
}

/// A validated set of changes applied to an existing aggregate in one transaction.
#[derive(Debug, Clone, Default)]
pub struct ProjectChanges {
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
    pub add_resources: Vec<NewResource>,
    pub remove_resources: Vec<u64>,
}

/// Result of a committed update.
#[derive(Debug, Clone)]
pub struct UpdatedProject {
    pub aggregate: ProjectAggregate,
    /// Resources whose rows were removed; their objects still need deleting.
    pub removed_resources: Vec<ResourceRecord>,
}

/// Filters for listing projects. `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub academic_year: Option<i32>,
    pub semester: Option<u8>,
    pub program_id: Option<u64>,
    pub course_id: Option<u64>,
    pub is_public: Option<bool>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &ProjectRecord) -> bool {
        self.academic_year.map_or(true, |y| project.academic_year == y)
            && self.semester.map_or(true, |s| project.semester == s)
            && self.program_id.map_or(true, |p| project.program_id == p)
            && self.course_id.map_or(true, |c| project.course_id == c)
            && self.is_public.map_or(true, |v| project.is_public == v)
    }
}

// ============================================================================
// Catalog (reference data owned by other systems)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramRecord {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRecord {
    pub id: u64,
    pub program_id: u64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffRecord {
    pub id: u64,
    #[serde(default)]
    pub prefix: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl StaffRecord {
    pub fn display_name(&self) -> String {
        match self.prefix.as_deref().filter(|p| !p.is_empty()) {
            Some(prefix) => format!("{prefix} {} {}", self.first_name, self.last_name),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub id: u64,
    pub program_id: u64,
    pub keyword: String,
}

/// A bulk upsert of reference data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogImport {
    #[serde(default)]
    pub programs: Vec<ProgramRecord>,
    #[serde(default)]
    pub courses: Vec<CourseRecord>,
    #[serde(default)]
    pub staff: Vec<StaffRecord>,
    #[serde(default)]
    pub keywords: Vec<KeywordRecord>,
}

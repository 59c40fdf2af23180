use redb::TableDefinition;

/// Project rows: id -> ProjectRecord (msgpack)
pub const PROJECTS: TableDefinition<u64, &[u8]> = TableDefinition::new("projects");

/// Project number index: number -> project id
pub const PROJECT_NUMBERS: TableDefinition<&str, u64> = TableDefinition::new("project_numbers");

/// Staff assignments: project id -> msgpack Vec<StaffAssignment>
pub const PROJECT_STAFF: TableDefinition<u64, &[u8]> = TableDefinition::new("project_staff");

/// Student members: project id -> msgpack Vec<String>
pub const PROJECT_MEMBERS: TableDefinition<u64, &[u8]> = TableDefinition::new("project_members");

/// Keyword links: project id -> msgpack Vec<u64>
pub const PROJECT_KEYWORDS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("project_keywords");

/// Resource index: project id -> msgpack Vec<u64> of resource ids
pub const PROJECT_RESOURCES: TableDefinition<u64, &[u8]> =
    TableDefinition::new("project_resources");

/// Resource rows: id -> ResourceRecord (msgpack)
pub const RESOURCES: TableDefinition<u64, &[u8]> = TableDefinition::new("resources");

/// Extracted PDF text: resource id -> msgpack Vec<PdfPage>
pub const RESOURCE_PAGES: TableDefinition<u64, &[u8]> = TableDefinition::new("resource_pages");

/// Id sequences: sequence name -> last issued id
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Project number counters: "year/semester/course" -> last issued counter
pub const NUMBER_COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("number_counters");

/// Every project number ever issued: number -> scope key. Never pruned.
pub const NUMBER_CLAIMS: TableDefinition<&str, &str> = TableDefinition::new("number_claims");

/// Catalog tables: id -> record (msgpack)
pub const PROGRAMS: TableDefinition<u64, &[u8]> = TableDefinition::new("programs");
pub const COURSES: TableDefinition<u64, &[u8]> = TableDefinition::new("courses");
pub const STAFF: TableDefinition<u64, &[u8]> = TableDefinition::new("staff");
pub const KEYWORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("keywords");

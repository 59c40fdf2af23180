use project_box::allocator::NumberScope;
use project_box::storage::models::{
    CatalogImport, CourseRecord, KeywordRecord, NewProject, NewResource, Patch, PdfPage,
    ProgramRecord, ProjectChanges, ProjectFilter, ProjectRole, ResourceType, StaffAssignment,
    StaffRecord,
};
use project_box::storage::{Database, DatabaseError};

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn sample_resource(key: &str, pages: Option<Vec<PdfPage>>) -> NewResource {
    NewResource {
        title: format!("Resource {key}"),
        bucket: "resources".to_string(),
        object_key: format!("resources/{key}"),
        file_name: Some(key.to_string()),
        mime_type: "application/pdf".to_string(),
        resource_type: ResourceType::Pdf,
        byte_size: 2048,
        pages,
    }
}

fn sample_project(number: &str) -> NewProject {
    NewProject {
        project_number: number.to_string(),
        title_th: "โครงงานทดสอบ".to_string(),
        title_en: "Test Project".to_string(),
        abstract_text: None,
        academic_year: 2024,
        semester: 1,
        program_id: 1,
        course_id: 10,
        is_public: true,
        staff: vec![StaffAssignment {
            staff_id: 100,
            role: ProjectRole::Advisor,
        }],
        members: vec!["6401001".to_string()],
        keyword_ids: vec![500],
        resources: vec![],
    }
}

fn page(n: u32, text: &str) -> PdfPage {
    PdfPage {
        page_number: n,
        text: text.to_string(),
    }
}

// ============================================================================
// Projects
// ============================================================================

#[test]
fn test_insert_and_get_project() {
    let (_dir, db) = test_db();
    let mut new = sample_project("P001-1/24");
    new.resources = vec![sample_resource("a.pdf", Some(vec![page(1, "one"), page(2, "two")]))];

    let created = db.insert_project(&new).unwrap();
    assert_eq!(created.resources.len(), 1);
    assert_eq!(created.resources[0].page_count, 2);
    assert_eq!(created.resources[0].project_id, created.project.id);

    let fetched = db
        .get_project(created.project.id)
        .unwrap()
        .expect("project should exist");
    assert_eq!(fetched.project.project_number, "P001-1/24");
    assert_eq!(fetched.project.title_en, "Test Project");
    assert_eq!(fetched.staff, new.staff);
    assert_eq!(fetched.members, vec!["6401001"]);
    assert_eq!(fetched.keyword_ids, vec![500]);

    let pages = db.get_resource_pages(created.resources[0].id).unwrap();
    assert_eq!(pages, vec![page(1, "one"), page(2, "two")]);
}

#[test]
fn test_get_project_by_number() {
    let (_dir, db) = test_db();
    let created = db.insert_project(&sample_project("P007-2/25")).unwrap();

    let fetched = db
        .get_project_by_number("P007-2/25")
        .unwrap()
        .expect("project should exist");
    assert_eq!(fetched.project.id, created.project.id);
    assert!(db.get_project_by_number("P008-2/25").unwrap().is_none());
}

#[test]
fn test_get_project_not_found() {
    let (_dir, db) = test_db();
    assert!(db.get_project(42).unwrap().is_none());
    assert!(db.get_resource(42).unwrap().is_none());
    assert!(db.get_resource_pages(42).unwrap().is_empty());
}

#[test]
fn test_duplicate_project_number_rejected() {
    let (_dir, db) = test_db();
    db.insert_project(&sample_project("P001-1/24")).unwrap();

    let result = db.insert_project(&sample_project("P001-1/24"));
    assert!(matches!(result, Err(DatabaseError::Integrity(_))));
    assert_eq!(db.list_projects(&ProjectFilter::default()).unwrap().len(), 1);
}

#[test]
fn test_two_advisors_rejected_on_insert() {
    let (_dir, db) = test_db();
    let mut new = sample_project("P001-1/24");
    new.staff.push(StaffAssignment {
        staff_id: 101,
        role: ProjectRole::Advisor,
    });

    assert!(matches!(
        db.insert_project(&new),
        Err(DatabaseError::Integrity(_))
    ));
    assert!(db.list_projects(&ProjectFilter::default()).unwrap().is_empty());
}

#[test]
fn test_list_projects_with_filters() {
    let (_dir, db) = test_db();
    db.insert_project(&sample_project("P001-1/24")).unwrap();

    let mut second = sample_project("P001-2/24");
    second.semester = 2;
    second.is_public = false;
    db.insert_project(&second).unwrap();

    let mut other_course = sample_project("P002-1/24");
    other_course.course_id = 11;
    db.insert_project(&other_course).unwrap();

    let all = db.list_projects(&ProjectFilter::default()).unwrap();
    assert_eq!(all.len(), 3);
    // id order
    assert!(all.windows(2).all(|w| w[0].id < w[1].id));

    let semester_two = db
        .list_projects(&ProjectFilter {
            semester: Some(2),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(semester_two.len(), 1);
    assert_eq!(semester_two[0].project_number, "P001-2/24");

    let course_11 = db
        .list_projects(&ProjectFilter {
            course_id: Some(11),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(course_11.len(), 1);

    let public_2024 = db
        .list_projects(&ProjectFilter {
            academic_year: Some(2024),
            is_public: Some(true),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(public_2024.len(), 2);
}

#[test]
fn test_update_project_relationships() {
    let (_dir, db) = test_db();
    let mut new = sample_project("P001-1/24");
    new.resources = vec![sample_resource("old.pdf", Some(vec![page(1, "old")]))];
    let created = db.insert_project(&new).unwrap();
    let id = created.project.id;
    let old_resource = created.resources[0].id;

    let changes = ProjectChanges {
        title_th: Some("ชื่อใหม่".to_string()),
        abstract_text: Patch::Value("Now with an abstract".to_string()),
        is_public: Some(false),
        add_staff: vec![
            StaffAssignment {
                staff_id: 101,
                role: ProjectRole::Committee,
            },
            // Re-adding an existing staff member replaces their role
            StaffAssignment {
                staff_id: 100,
                role: ProjectRole::CoAdvisor,
            },
        ],
        add_members: vec!["6401002".to_string(), "6401001".to_string()],
        remove_keywords: vec![500],
        add_resources: vec![sample_resource("new.pdf", None)],
        remove_resources: vec![old_resource],
        ..Default::default()
    };

    let updated = db.update_project(id, &changes).unwrap().expect("project exists");
    let aggregate = updated.aggregate;

    assert_eq!(aggregate.project.title_th, "ชื่อใหม่");
    assert_eq!(aggregate.project.title_en, "Test Project");
    assert_eq!(
        aggregate.project.abstract_text.as_deref(),
        Some("Now with an abstract")
    );
    assert!(!aggregate.project.is_public);
    assert_eq!(aggregate.project.project_number, "P001-1/24");
    assert!(aggregate.project.updated_at >= aggregate.project.created_at);

    assert_eq!(aggregate.staff.len(), 2);
    assert!(aggregate
        .staff
        .iter()
        .any(|s| s.staff_id == 100 && s.role == ProjectRole::CoAdvisor));
    assert_eq!(aggregate.members, vec!["6401001", "6401002"]);
    assert!(aggregate.keyword_ids.is_empty());

    assert_eq!(updated.removed_resources.len(), 1);
    assert_eq!(updated.removed_resources[0].id, old_resource);
    assert_eq!(aggregate.resources.len(), 1);
    assert_eq!(aggregate.resources[0].object_key, "resources/new.pdf");
    assert!(db.get_resource(old_resource).unwrap().is_none());
    assert!(db.get_resource_pages(old_resource).unwrap().is_empty());
}

#[test]
fn test_update_clears_abstract_with_null_patch() {
    let (_dir, db) = test_db();
    let mut new = sample_project("P001-1/24");
    new.abstract_text = Some("to be removed".to_string());
    let created = db.insert_project(&new).unwrap();

    let changes = ProjectChanges {
        abstract_text: Patch::Null,
        ..Default::default()
    };
    let updated = db
        .update_project(created.project.id, &changes)
        .unwrap()
        .unwrap();
    assert_eq!(updated.aggregate.project.abstract_text, None);
}

#[test]
fn test_update_rejects_foreign_resource_and_rolls_back() {
    let (_dir, db) = test_db();
    let first = db.insert_project(&sample_project("P001-1/24")).unwrap();
    let mut other = sample_project("P002-1/24");
    other.resources = vec![sample_resource("theirs.pdf", None)];
    let other = db.insert_project(&other).unwrap();

    let changes = ProjectChanges {
        title_en: Some("Should not stick".to_string()),
        remove_resources: vec![other.resources[0].id],
        ..Default::default()
    };
    let result = db.update_project(first.project.id, &changes);
    assert!(matches!(result, Err(DatabaseError::Integrity(_))));

    let unchanged = db.get_project(first.project.id).unwrap().unwrap();
    assert_eq!(unchanged.project.title_en, "Test Project");
    assert!(db.get_resource(other.resources[0].id).unwrap().is_some());
}

#[test]
fn test_update_missing_project_returns_none() {
    let (_dir, db) = test_db();
    let changes = ProjectChanges {
        is_public: Some(false),
        ..Default::default()
    };
    assert!(db.update_project(99, &changes).unwrap().is_none());
}

#[test]
fn test_delete_project_cascades() {
    let (_dir, db) = test_db();
    let mut new = sample_project("P001-1/24");
    new.resources = vec![
        sample_resource("a.pdf", Some(vec![page(1, "text")])),
        sample_resource("b.pdf", None),
    ];
    let created = db.insert_project(&new).unwrap();
    let id = created.project.id;

    let removed = db.delete_project(id).unwrap().expect("project existed");
    assert_eq!(removed.resources.len(), 2);

    assert!(db.get_project(id).unwrap().is_none());
    assert!(db.get_project_by_number("P001-1/24").unwrap().is_none());
    for r in &created.resources {
        assert!(db.get_resource(r.id).unwrap().is_none());
        assert!(db.get_resource_pages(r.id).unwrap().is_empty());
    }

    assert!(db.delete_project(id).unwrap().is_none());
}

#[test]
fn test_delete_resource_unlinks_from_project() {
    let (_dir, db) = test_db();
    let mut new = sample_project("P001-1/24");
    new.resources = vec![
        sample_resource("keep.pdf", None),
        sample_resource("drop.pdf", Some(vec![page(1, "gone")])),
    ];
    let created = db.insert_project(&new).unwrap();
    let drop_id = created.resources[1].id;

    let removed = db.delete_resource(drop_id).unwrap().expect("resource existed");
    assert_eq!(removed.object_key, "resources/drop.pdf");

    let project = db.get_project(created.project.id).unwrap().unwrap();
    assert_eq!(project.resources.len(), 1);
    assert_eq!(project.resources[0].object_key, "resources/keep.pdf");
    assert!(db.get_resource_pages(drop_id).unwrap().is_empty());
    assert!(db.delete_resource(drop_id).unwrap().is_none());
}

#[test]
fn test_ids_are_not_reused_after_delete() {
    let (_dir, db) = test_db();
    let first = db.insert_project(&sample_project("P001-1/24")).unwrap();
    db.delete_project(first.project.id).unwrap();

    let second = db.insert_project(&sample_project("P002-1/24")).unwrap();
    assert!(second.project.id > first.project.id);
}

// ============================================================================
// Catalog
// ============================================================================

#[test]
fn test_catalog_import_upserts() {
    let (_dir, db) = test_db();
    let import = CatalogImport {
        programs: vec![ProgramRecord {
            id: 1,
            name: "Computer Science".to_string(),
        }],
        courses: vec![CourseRecord {
            id: 10,
            program_id: 1,
            code: "CS499".to_string(),
            name: "Capstone".to_string(),
        }],
        staff: vec![StaffRecord {
            id: 100,
            prefix: None,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: Some("ada@example.edu".to_string()),
        }],
        keywords: vec![KeywordRecord {
            id: 500,
            program_id: 1,
            keyword: "compilers".to_string(),
        }],
    };

    let stats = db.import_catalog(&import).unwrap();
    assert_eq!(stats.programs, 1);
    assert_eq!(stats.keywords, 1);

    assert_eq!(db.get_course(10).unwrap().unwrap().code, "CS499");
    assert_eq!(
        db.get_staff(100).unwrap().unwrap().display_name(),
        "Ada Lovelace"
    );

    let renamed = CatalogImport {
        programs: vec![ProgramRecord {
            id: 1,
            name: "Computing".to_string(),
        }],
        ..Default::default()
    };
    db.import_catalog(&renamed).unwrap();
    assert_eq!(db.get_program(1).unwrap().unwrap().name, "Computing");
    assert!(db.get_keyword(500).unwrap().is_some());
    assert!(db.get_keyword(501).unwrap().is_none());
}

// ============================================================================
// Admin
// ============================================================================

#[test]
fn test_purge_all() {
    let (_dir, db) = test_db();
    let mut new = sample_project("P001-1/24");
    new.resources = vec![sample_resource("a.pdf", None)];
    db.insert_project(&new).unwrap();
    db.insert_project(&sample_project("P002-1/24")).unwrap();
    db.advance_counter(&NumberScope::new(2024, 1, 10), None)
        .unwrap();

    let stats = db.purge_all().unwrap();
    assert_eq!(stats.projects, 2);
    assert_eq!(stats.resources, 1);

    assert!(db.list_projects(&ProjectFilter::default()).unwrap().is_empty());
    assert!(db.get_project_by_number("P001-1/24").unwrap().is_none());
    assert_eq!(
        db.counter_value(&NumberScope::new(2024, 1, 10)).unwrap(),
        None
    );
    assert!(!db.number_claimed("P001-1/24").unwrap());
}

#[test]
fn test_database_reopen_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let db = Database::open(dir.path().join("data")).unwrap();
        db.insert_project(&sample_project("P001-1/24"))
            .unwrap()
            .project
            .id
    };

    let db = Database::open(dir.path().join("data")).unwrap();
    let project = db.get_project(id).unwrap().expect("project persisted");
    assert_eq!(project.project.project_number, "P001-1/24");
}

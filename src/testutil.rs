//! Shared test helpers: seeded catalog, fault-injecting object store and
//! a publisher that records what it was asked to send.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::allocator::ProjectNumberAllocator;
use crate::config::{Config, LifecycleConfig, NodeConfig, PublisherConfig, StorageConfig};
use crate::lifecycle::{
    CreateProjectInput, LifecycleSettings, ProjectManager, ProjectStore, ResourceUpload,
    UploadedFile,
};
use crate::object_store::{LocalStore, ObjectStore, ObjectStoreError, UrlSigner};
use crate::publisher::{LogPublisher, MessagePublisher, PublishError};
use crate::storage::models::{
    CatalogImport, CourseRecord, KeywordRecord, NewProject, PdfPage, ProgramRecord,
    ProjectAggregate, ProjectChanges, ProjectFilter, ProjectRecord, ProjectRole, ResourceRecord,
    StaffAssignment, StaffRecord, UpdatedProject,
};
use crate::storage::{Database, DatabaseError};
use crate::AppState;

pub const BUCKET: &str = "test-resources";
pub const EXCHANGE: &str = "test.search";

pub const PROGRAM_CS: u64 = 1;
pub const PROGRAM_IT: u64 = 2;
pub const COURSE_CS_PROJECT: u64 = 10;
pub const COURSE_CS_SEMINAR: u64 = 11;
pub const COURSE_IT_PROJECT: u64 = 20;
pub const STAFF_A: u64 = 100;
pub const STAFF_B: u64 = 101;
pub const STAFF_C: u64 = 102;
pub const KEYWORD_CS_ML: u64 = 500;
pub const KEYWORD_CS_WEB: u64 = 501;
pub const KEYWORD_IT_NET: u64 = 600;

/// Reference data shared by lifecycle and API tests.
pub fn sample_catalog() -> CatalogImport {
    let staff = |id, first: &str, last: &str| StaffRecord {
        id,
        prefix: Some("Dr.".to_string()),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: None,
    };
    let keyword = |id, program_id, keyword: &str| KeywordRecord {
        id,
        program_id,
        keyword: keyword.to_string(),
    };
    CatalogImport {
        programs: vec![
            ProgramRecord {
                id: PROGRAM_CS,
                name: "Computer Science".to_string(),
            },
            ProgramRecord {
                id: PROGRAM_IT,
                name: "Information Technology".to_string(),
            },
        ],
        courses: vec![
            CourseRecord {
                id: COURSE_CS_PROJECT,
                program_id: PROGRAM_CS,
                code: "CS499".to_string(),
                name: "Capstone Project".to_string(),
            },
            CourseRecord {
                id: COURSE_CS_SEMINAR,
                program_id: PROGRAM_CS,
                code: "CS498".to_string(),
                name: "Project Seminar".to_string(),
            },
            CourseRecord {
                id: COURSE_IT_PROJECT,
                program_id: PROGRAM_IT,
                code: "IT499".to_string(),
                name: "IT Project".to_string(),
            },
        ],
        staff: vec![
            staff(STAFF_A, "Ada", "Lovelace"),
            staff(STAFF_B, "Alan", "Turing"),
            staff(STAFF_C, "Grace", "Hopper"),
        ],
        keywords: vec![
            keyword(KEYWORD_CS_ML, PROGRAM_CS, "machine learning"),
            keyword(KEYWORD_CS_WEB, PROGRAM_CS, "web"),
            keyword(KEYWORD_IT_NET, PROGRAM_IT, "networking"),
        ],
    }
}

pub fn open_seeded_db(temp_dir: &tempfile::TempDir) -> Database {
    let db = Database::open(temp_dir.path().join("data")).expect("Failed to open test database");
    db.import_catalog(&sample_catalog())
        .expect("Failed to seed catalog");
    db
}

pub fn upload(name: &str, content_type: Option<&str>, data: &[u8]) -> ResourceUpload {
    ResourceUpload {
        title: None,
        file: UploadedFile {
            file_name: Some(name.to_string()),
            content_type: content_type.map(str::to_string),
            data: Bytes::copy_from_slice(data),
        },
    }
}

/// A valid create request in the CS capstone course.
pub fn create_input(resources: Vec<ResourceUpload>) -> CreateProjectInput {
    CreateProjectInput {
        title_th: "ระบบจัดการโครงงาน".to_string(),
        title_en: "Project Management System".to_string(),
        abstract_text: Some("A system for managing projects.".to_string()),
        academic_year: 2024,
        semester: 1,
        program_id: PROGRAM_CS,
        course_id: COURSE_CS_PROJECT,
        is_public: true,
        staff: vec![
            StaffAssignment {
                staff_id: STAFF_A,
                role: ProjectRole::Advisor,
            },
            StaffAssignment {
                staff_id: STAFF_B,
                role: ProjectRole::Committee,
            },
        ],
        members: vec!["6401001".to_string(), "6401002".to_string()],
        keyword_ids: vec![KEYWORD_CS_ML],
        resources,
    }
}

/// A minimal PDF with one line of text per page.
pub fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

// ============================================================================
// Object store with fault injection
// ============================================================================

/// In-memory object store. Puts can be made to fail or hang after a
/// number of successes; deletes can be made to fail or hang.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    puts: AtomicUsize,
    put_failure_at: Mutex<Option<usize>>,
    put_stall_at: Mutex<Option<usize>>,
    fail_deletes: AtomicBool,
    stall_deletes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `n` puts succeed, then fail every later one.
    pub fn fail_puts_after(&self, n: usize) {
        *self.put_failure_at.lock().unwrap() = Some(n);
    }

    /// Let `n` puts succeed, then never complete later ones.
    pub fn stall_puts_after(&self, n: usize) {
        *self.put_stall_at.lock().unwrap() = Some(n);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Deletes started while set never complete.
    pub fn stall_deletes(&self, stall: bool) {
        self.stall_deletes.store(stall, Ordering::SeqCst);
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let done = self.puts.fetch_add(1, Ordering::SeqCst);
        let fail = matches!(*self.put_failure_at.lock().unwrap(), Some(n) if done >= n);
        if fail {
            return Err(ObjectStoreError::Backend("injected put failure".to_string()));
        }
        let stall = matches!(*self.put_stall_at.lock().unwrap(), Some(n) if done >= n);
        if stall {
            std::future::pending::<()>().await;
        }
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend("injected delete failure".to_string()));
        }
        if self.stall_deletes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.contains(bucket, key))
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError> {
        Ok(format!("memory://{bucket}/{key}?ttl={}", ttl.as_secs()))
    }
}

// ============================================================================
// Publisher that records events
// ============================================================================

#[derive(Debug, Clone)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub payload: serde_json::Value,
}

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Published>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<Published> {
        self.events.lock().unwrap().clone()
    }

    pub fn routing_keys(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.routing_key).collect()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::HttpStatus(503));
        }
        self.events.lock().unwrap().push(Published {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

// ============================================================================
// Store that refuses writes
// ============================================================================

/// Which writes a [`FailingWrites`] store refuses.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreFaults {
    pub inserts: bool,
    pub updates: bool,
    pub resource_deletes: bool,
}

/// Delegates to a real database but fails the writes named in `faults`.
pub struct FailingWrites {
    pub db: Database,
    pub faults: StoreFaults,
}

impl ProjectStore for FailingWrites {
    fn insert_project(&self, new: &NewProject) -> Result<ProjectAggregate, DatabaseError> {
        if self.faults.inserts {
            return Err(DatabaseError::Integrity("injected insert failure".to_string()));
        }
        self.db.insert_project(new)
    }

    fn get_project(&self, id: u64) -> Result<Option<ProjectAggregate>, DatabaseError> {
        self.db.get_project(id)
    }

    fn get_project_by_number(
        &self,
        number: &str,
    ) -> Result<Option<ProjectAggregate>, DatabaseError> {
        self.db.get_project_by_number(number)
    }

    fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectRecord>, DatabaseError> {
        self.db.list_projects(filter)
    }

    fn update_project(
        &self,
        id: u64,
        changes: &ProjectChanges,
    ) -> Result<Option<UpdatedProject>, DatabaseError> {
        if self.faults.updates {
            return Err(DatabaseError::Integrity("injected update failure".to_string()));
        }
        self.db.update_project(id, changes)
    }

    fn delete_project(&self, id: u64) -> Result<Option<ProjectAggregate>, DatabaseError> {
        self.db.delete_project(id)
    }

    fn get_resource(&self, id: u64) -> Result<Option<ResourceRecord>, DatabaseError> {
        self.db.get_resource(id)
    }

    fn get_resource_pages(&self, id: u64) -> Result<Vec<PdfPage>, DatabaseError> {
        self.db.get_resource_pages(id)
    }

    fn delete_resource(&self, id: u64) -> Result<Option<ResourceRecord>, DatabaseError> {
        if self.faults.resource_deletes {
            return Err(DatabaseError::Integrity("injected resource delete failure".to_string()));
        }
        self.db.delete_resource(id)
    }
}

// ============================================================================
// Harnesses
// ============================================================================

pub fn test_settings() -> LifecycleSettings {
    LifecycleSettings {
        resource_bucket: BUCKET.to_string(),
        exchange: EXCHANGE.to_string(),
        url_ttl: Duration::from_secs(600),
        allocation_retries: 3,
    }
}

/// A manager over a seeded database, an in-memory object store and a
/// recording publisher.
pub struct Harness {
    pub db: Database,
    pub objects: Arc<MemoryStore>,
    pub publisher: Arc<RecordingPublisher>,
    pub manager: ProjectManager,
}

pub fn harness(temp_dir: &tempfile::TempDir) -> Harness {
    let db = open_seeded_db(temp_dir);
    let objects = Arc::new(MemoryStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let manager = ProjectManager::with_database(
        db.clone(),
        objects.clone(),
        publisher.clone(),
        test_settings(),
    );
    Harness {
        db,
        objects,
        publisher,
        manager,
    }
}

/// Like [`harness`], but every project insert fails.
pub fn harness_with_failing_inserts(temp_dir: &tempfile::TempDir) -> Harness {
    harness_with_store_faults(
        temp_dir,
        StoreFaults {
            inserts: true,
            ..Default::default()
        },
    )
}

/// Like [`harness`], but the project store refuses the given writes.
pub fn harness_with_store_faults(temp_dir: &tempfile::TempDir, faults: StoreFaults) -> Harness {
    let db = open_seeded_db(temp_dir);
    let objects = Arc::new(MemoryStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let shared = Arc::new(db.clone());
    let manager = ProjectManager::new(
        Arc::new(FailingWrites {
            db: db.clone(),
            faults,
        }),
        shared.clone(),
        ProjectNumberAllocator::new(shared),
        objects.clone(),
        publisher.clone(),
        test_settings(),
    );
    Harness {
        db,
        objects,
        publisher,
        manager,
    }
}

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    let storage = StorageConfig {
        local_storage_path: files_dir.to_string_lossy().to_string(),
        resource_bucket: BUCKET.to_string(),
        ..StorageConfig::default()
    };

    let config = Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        storage: storage.clone(),
        publisher: PublisherConfig::default(),
        lifecycle: LifecycleConfig::default(),
        test_mode: true,
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
        request_timeout: Duration::from_secs(30),
    };

    let db = open_seeded_db(temp_dir);
    let signer = UrlSigner::new(&storage.public_base_url, &storage.url_signing_secret);
    let object_store: Arc<dyn ObjectStore> = Arc::new(
        LocalStore::new(&files_dir, signer.clone()).expect("Failed to create test object store"),
    );

    let projects = ProjectManager::with_database(
        db.clone(),
        object_store.clone(),
        Arc::new(LogPublisher),
        LifecycleSettings {
            resource_bucket: storage.resource_bucket.clone(),
            exchange: config.publisher.exchange.clone(),
            url_ttl: storage.url_ttl,
            allocation_retries: config.lifecycle.allocation_retries,
        },
    );

    Arc::new(AppState {
        config,
        db,
        object_store,
        url_signer: Some(signer),
        projects,
    })
}

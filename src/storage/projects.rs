use chrono::{DateTime, Utc};
use redb::{ReadableTable, Table, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::db::{decode, encode, next_id, Database, DatabaseError};
use super::models::{
    NewProject, NewResource, PdfPage, ProjectAggregate, ProjectChanges, ProjectFilter,
    ProjectRecord, ProjectRole, ResourceRecord, StaffAssignment, UpdatedProject,
};
use super::tables::*;

type Blob = &'static [u8];

fn read_row<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, Blob>,
    id: u64,
) -> Result<Option<T>, DatabaseError> {
    match table.get(id)? {
        Some(data) => Ok(Some(decode(data.value())?)),
        None => Ok(None),
    }
}

fn read_list<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, Blob>,
    id: u64,
) -> Result<Vec<T>, DatabaseError> {
    Ok(read_row::<Vec<T>>(table, id)?.unwrap_or_default())
}

/// Store a list row, removing the row entirely when the list is empty.
fn write_list<T: Serialize>(
    table: &mut Table<u64, Blob>,
    id: u64,
    items: &[T],
) -> Result<(), DatabaseError> {
    if items.is_empty() {
        table.remove(id)?;
    } else {
        table.insert(id, encode(&items)?.as_slice())?;
    }
    Ok(())
}

/// Load the rows owned by a project from already-open tables.
fn assemble(
    project: ProjectRecord,
    staff: &impl ReadableTable<u64, Blob>,
    members: &impl ReadableTable<u64, Blob>,
    keywords: &impl ReadableTable<u64, Blob>,
    links: &impl ReadableTable<u64, Blob>,
    resources: &impl ReadableTable<u64, Blob>,
) -> Result<ProjectAggregate, DatabaseError> {
    let id = project.id;
    let resource_ids: Vec<u64> = read_list(links, id)?;
    let mut resource_rows = Vec::with_capacity(resource_ids.len());
    for rid in resource_ids {
        match read_row::<ResourceRecord>(resources, rid)? {
            Some(r) => resource_rows.push(r),
            None => {
                return Err(DatabaseError::Integrity(format!(
                    "project {id} links missing resource {rid}"
                )))
            }
        }
    }

    Ok(ProjectAggregate {
        staff: read_list(staff, id)?,
        members: read_list(members, id)?,
        keyword_ids: read_list(keywords, id)?,
        resources: resource_rows,
        project,
    })
}

fn load_in_write(
    txn: &WriteTransaction,
    id: u64,
) -> Result<Option<ProjectAggregate>, DatabaseError> {
    let projects = txn.open_table(PROJECTS)?;
    let Some(project) = read_row::<ProjectRecord>(&projects, id)? else {
        return Ok(None);
    };
    let aggregate = assemble(
        project,
        &txn.open_table(PROJECT_STAFF)?,
        &txn.open_table(PROJECT_MEMBERS)?,
        &txn.open_table(PROJECT_KEYWORDS)?,
        &txn.open_table(PROJECT_RESOURCES)?,
        &txn.open_table(RESOURCES)?,
    )?;
    Ok(Some(aggregate))
}

/// Insert resource rows (and their pages) and link them to the project.
fn insert_resources(
    txn: &WriteTransaction,
    project_id: u64,
    new_resources: &[NewResource],
    now: DateTime<Utc>,
) -> Result<Vec<ResourceRecord>, DatabaseError> {
    let mut created = Vec::with_capacity(new_resources.len());
    for new in new_resources {
        let id = next_id(txn, "resources")?;
        let pages = new.pages.as_deref().unwrap_or_default();
        let record = ResourceRecord {
            id,
            project_id,
            title: new.title.clone(),
            bucket: new.bucket.clone(),
            object_key: new.object_key.clone(),
            file_name: new.file_name.clone(),
            mime_type: new.mime_type.clone(),
            resource_type: new.resource_type,
            byte_size: new.byte_size,
            page_count: pages.len() as u32,
            created_at: now,
        };
        txn.open_table(RESOURCES)?
            .insert(id, encode(&record)?.as_slice())?;
        if !pages.is_empty() {
            txn.open_table(RESOURCE_PAGES)?
                .insert(id, encode(&pages)?.as_slice())?;
        }
        created.push(record);
    }

    if !created.is_empty() {
        let mut links = txn.open_table(PROJECT_RESOURCES)?;
        let mut ids: Vec<u64> = read_list(&links, project_id)?;
        ids.extend(created.iter().map(|r| r.id));
        write_list(&mut links, project_id, &ids)?;
    }

    Ok(created)
}

fn check_single_advisor(project_id: u64, staff: &[StaffAssignment]) -> Result<(), DatabaseError> {
    let advisors = staff
        .iter()
        .filter(|s| s.role == ProjectRole::Advisor)
        .count();
    if advisors > 1 {
        return Err(DatabaseError::Integrity(format!(
            "project {project_id} would have {advisors} advisors"
        )));
    }
    Ok(())
}

impl Database {
    // ========================================================================
    // Project aggregate operations
    // ========================================================================

    /// Insert a project with all of its owned rows in a single transaction.
    pub fn insert_project(&self, new: &NewProject) -> Result<ProjectAggregate, DatabaseError> {
        debug_assert!(
            !new.project_number.is_empty(),
            "project number must not be empty"
        );
        let write_txn = self.begin_write()?;
        let aggregate = {
            let id = next_id(&write_txn, "projects")?;
            check_single_advisor(id, &new.staff)?;
            let now = Utc::now();

            {
                let mut numbers = write_txn.open_table(PROJECT_NUMBERS)?;
                if numbers.get(new.project_number.as_str())?.is_some() {
                    return Err(DatabaseError::Integrity(format!(
                        "project number {} is already in use",
                        new.project_number
                    )));
                }
                numbers.insert(new.project_number.as_str(), id)?;
            }

            let project = ProjectRecord {
                id,
                project_number: new.project_number.clone(),
                title_th: new.title_th.clone(),
                title_en: new.title_en.clone(),
                abstract_text: new.abstract_text.clone(),
                academic_year: new.academic_year,
                semester: new.semester,
                program_id: new.program_id,
                course_id: new.course_id,
                is_public: new.is_public,
                created_at: now,
                updated_at: now,
            };
            write_txn
                .open_table(PROJECTS)?
                .insert(id, encode(&project)?.as_slice())?;

            write_list(&mut write_txn.open_table(PROJECT_STAFF)?, id, &new.staff)?;
            write_list(&mut write_txn.open_table(PROJECT_MEMBERS)?, id, &new.members)?;
            write_list(
                &mut write_txn.open_table(PROJECT_KEYWORDS)?,
                id,
                &new.keyword_ids,
            )?;

            let resources = insert_resources(&write_txn, id, &new.resources, now)?;

            ProjectAggregate {
                project,
                staff: new.staff.clone(),
                members: new.members.clone(),
                keyword_ids: new.keyword_ids.clone(),
                resources,
            }
        };
        write_txn.commit()?;
        Ok(aggregate)
    }

    /// Get a project aggregate by id
    pub fn get_project(&self, id: u64) -> Result<Option<ProjectAggregate>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let projects = read_txn.open_table(PROJECTS)?;
        let Some(project) = read_row::<ProjectRecord>(&projects, id)? else {
            return Ok(None);
        };

        let aggregate = assemble(
            project,
            &read_txn.open_table(PROJECT_STAFF)?,
            &read_txn.open_table(PROJECT_MEMBERS)?,
            &read_txn.open_table(PROJECT_KEYWORDS)?,
            &read_txn.open_table(PROJECT_RESOURCES)?,
            &read_txn.open_table(RESOURCES)?,
        )?;
        Ok(Some(aggregate))
    }

    /// Get a project aggregate by its project number
    pub fn get_project_by_number(
        &self,
        number: &str,
    ) -> Result<Option<ProjectAggregate>, DatabaseError> {
        let id = {
            let read_txn = self.begin_read()?;
            let numbers = read_txn.open_table(PROJECT_NUMBERS)?;
            let id = numbers.get(number)?.map(|v| v.value());
            id
        };

        match id {
            Some(id) => self.get_project(id),
            None => Ok(None),
        }
    }

    /// List core project rows matching the filter, in id order
    pub fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<ProjectRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(PROJECTS)?;

        let mut projects = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let project: ProjectRecord = decode(value.value())?;
            if filter.matches(&project) {
                projects.push(project);
            }
        }

        Ok(projects)
    }

    /// Apply a set of changes to a project in a single transaction.
    /// Returns `None` when the project does not exist.
    pub fn update_project(
        &self,
        id: u64,
        changes: &ProjectChanges,
    ) -> Result<Option<UpdatedProject>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let now = Utc::now();

        // Core row
        {
            let mut projects = write_txn.open_table(PROJECTS)?;
            let Some(mut project) = read_row::<ProjectRecord>(&projects, id)? else {
                return Ok(None);
            };
            if let Some(ref title) = changes.title_th {
                project.title_th = title.clone();
            }
            if let Some(ref title) = changes.title_en {
                project.title_en = title.clone();
            }
            changes.abstract_text.clone().apply_to(&mut project.abstract_text);
            if let Some(is_public) = changes.is_public {
                project.is_public = is_public;
            }
            project.updated_at = now;
            projects.insert(id, encode(&project)?.as_slice())?;
        }

        // Staff: removals first, then additions replace any existing role for the same staff
        {
            let mut table = write_txn.open_table(PROJECT_STAFF)?;
            let mut staff: Vec<StaffAssignment> = read_list(&table, id)?;
            staff.retain(|s| !changes.remove_staff.contains(&s.staff_id));
            for added in &changes.add_staff {
                staff.retain(|s| s.staff_id != added.staff_id);
                staff.push(added.clone());
            }
            check_single_advisor(id, &staff)?;
            write_list(&mut table, id, &staff)?;
        }

        {
            let mut table = write_txn.open_table(PROJECT_MEMBERS)?;
            let mut members: Vec<String> = read_list(&table, id)?;
            members.retain(|m| !changes.remove_members.contains(m));
            for added in &changes.add_members {
                if !members.contains(added) {
                    members.push(added.clone());
                }
            }
            write_list(&mut table, id, &members)?;
        }

        {
            let mut table = write_txn.open_table(PROJECT_KEYWORDS)?;
            let mut keywords: Vec<u64> = read_list(&table, id)?;
            keywords.retain(|k| !changes.remove_keywords.contains(k));
            for added in &changes.add_keywords {
                if !keywords.contains(added) {
                    keywords.push(*added);
                }
            }
            write_list(&mut table, id, &keywords)?;
        }

        // Resource removals
        let mut removed_resources = Vec::with_capacity(changes.remove_resources.len());
        if !changes.remove_resources.is_empty() {
            let mut links = write_txn.open_table(PROJECT_RESOURCES)?;
            let mut resources = write_txn.open_table(RESOURCES)?;
            let mut pages = write_txn.open_table(RESOURCE_PAGES)?;

            let mut ids: Vec<u64> = read_list(&links, id)?;
            for rid in &changes.remove_resources {
                if !ids.contains(rid) {
                    return Err(DatabaseError::Integrity(format!(
                        "resource {rid} does not belong to project {id}"
                    )));
                }
                ids.retain(|r| r != rid);
                let record = resources
                    .remove(*rid)?
                    .map(|v| decode::<ResourceRecord>(v.value()))
                    .transpose()?;
                pages.remove(*rid)?;
                if let Some(record) = record {
                    removed_resources.push(record);
                }
            }
            write_list(&mut links, id, &ids)?;
        }

        insert_resources(&write_txn, id, &changes.add_resources, now)?;

        let aggregate = load_in_write(&write_txn, id)?.ok_or_else(|| {
            DatabaseError::Integrity(format!("project {id} vanished during update"))
        })?;

        write_txn.commit()?;
        Ok(Some(UpdatedProject {
            aggregate,
            removed_resources,
        }))
    }

    /// Delete a project and every row it owns in a single transaction.
    /// Returns the removed aggregate, or `None` if it did not exist.
    /// Issued project numbers stay claimed.
    pub fn delete_project(&self, id: u64) -> Result<Option<ProjectAggregate>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let Some(aggregate) = load_in_write(&write_txn, id)? else {
            return Ok(None);
        };

        write_txn.open_table(PROJECTS)?.remove(id)?;
        write_txn
            .open_table(PROJECT_NUMBERS)?
            .remove(aggregate.project.project_number.as_str())?;
        write_txn.open_table(PROJECT_STAFF)?.remove(id)?;
        write_txn.open_table(PROJECT_MEMBERS)?.remove(id)?;
        write_txn.open_table(PROJECT_KEYWORDS)?.remove(id)?;
        write_txn.open_table(PROJECT_RESOURCES)?.remove(id)?;
        {
            let mut resources = write_txn.open_table(RESOURCES)?;
            let mut pages = write_txn.open_table(RESOURCE_PAGES)?;
            for resource in &aggregate.resources {
                resources.remove(resource.id)?;
                pages.remove(resource.id)?;
            }
        }

        write_txn.commit()?;
        Ok(Some(aggregate))
    }

    // ========================================================================
    // Resource operations
    // ========================================================================

    /// Get a resource by id
    pub fn get_resource(&self, id: u64) -> Result<Option<ResourceRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(RESOURCES)?;
        read_row(&table, id)
    }

    /// Extracted PDF pages for a resource, in page order
    pub fn get_resource_pages(&self, id: u64) -> Result<Vec<PdfPage>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(RESOURCE_PAGES)?;
        read_list(&table, id)
    }

    /// Delete a resource row, its pages and its link from the owning project.
    /// Returns the removed row, or `None` if it did not exist.
    pub fn delete_resource(&self, id: u64) -> Result<Option<ResourceRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let removed = {
            let mut resources = write_txn.open_table(RESOURCES)?;
            let removed = resources
                .remove(id)?
                .map(|v| decode::<ResourceRecord>(v.value()))
                .transpose()?;
            removed
        };
        let Some(resource) = removed else {
            return Ok(None);
        };

        write_txn.open_table(RESOURCE_PAGES)?.remove(id)?;
        {
            let mut links = write_txn.open_table(PROJECT_RESOURCES)?;
            let mut ids: Vec<u64> = read_list(&links, resource.project_id)?;
            ids.retain(|r| *r != id);
            write_list(&mut links, resource.project_id, &ids)?;
        }
        {
            let mut projects = write_txn.open_table(PROJECTS)?;
            if let Some(mut project) = read_row::<ProjectRecord>(&projects, resource.project_id)? {
                project.updated_at = Utc::now();
                projects.insert(project.id, encode(&project)?.as_slice())?;
            }
        }

        write_txn.commit()?;
        Ok(Some(resource))
    }
}

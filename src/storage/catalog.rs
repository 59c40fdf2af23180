use serde::de::DeserializeOwned;

use super::db::{decode, encode, Database, DatabaseError};
use super::models::{CatalogImport, CourseRecord, KeywordRecord, ProgramRecord, StaffRecord};
use super::tables::*;

/// Row counts written by a catalog import
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStats {
    pub programs: u64,
    pub courses: u64,
    pub staff: u64,
    pub keywords: u64,
}

impl Database {
    // ========================================================================
    // Catalog (reference data)
    // ========================================================================

    /// Upsert every record of the import in a single transaction
    pub fn import_catalog(&self, import: &CatalogImport) -> Result<CatalogStats, DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut programs = write_txn.open_table(PROGRAMS)?;
            for p in &import.programs {
                programs.insert(p.id, encode(p)?.as_slice())?;
            }
            let mut courses = write_txn.open_table(COURSES)?;
            for c in &import.courses {
                courses.insert(c.id, encode(c)?.as_slice())?;
            }
            let mut staff = write_txn.open_table(STAFF)?;
            for s in &import.staff {
                staff.insert(s.id, encode(s)?.as_slice())?;
            }
            let mut keywords = write_txn.open_table(KEYWORDS)?;
            for k in &import.keywords {
                keywords.insert(k.id, encode(k)?.as_slice())?;
            }
        }
        write_txn.commit()?;

        Ok(CatalogStats {
            programs: import.programs.len() as u64,
            courses: import.courses.len() as u64,
            staff: import.staff.len() as u64,
            keywords: import.keywords.len() as u64,
        })
    }

    fn get_catalog_row<T: DeserializeOwned>(
        &self,
        definition: redb::TableDefinition<'static, u64, &'static [u8]>,
        id: u64,
    ) -> Result<Option<T>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(definition)?;
        let row = match table.get(id)? {
            Some(data) => Some(decode(data.value())?),
            None => None,
        };
        Ok(row)
    }

    pub fn get_program(&self, id: u64) -> Result<Option<ProgramRecord>, DatabaseError> {
        self.get_catalog_row(PROGRAMS, id)
    }

    pub fn get_course(&self, id: u64) -> Result<Option<CourseRecord>, DatabaseError> {
        self.get_catalog_row(COURSES, id)
    }

    pub fn get_staff(&self, id: u64) -> Result<Option<StaffRecord>, DatabaseError> {
        self.get_catalog_row(STAFF, id)
    }

    pub fn get_keyword(&self, id: u64) -> Result<Option<KeywordRecord>, DatabaseError> {
        self.get_catalog_row(KEYWORDS, id)
    }
}

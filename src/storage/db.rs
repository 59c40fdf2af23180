use redb::{
    Database as RedbDatabase, ReadTransaction, ReadableTable, ReadableTableMetadata,
    WriteTransaction,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("Integrity error: {0}")]
    Integrity(String),
}

impl From<redb::CommitError> for DatabaseError {
    fn from(e: redb::CommitError) -> Self {
        DatabaseError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DatabaseError {
    fn from(e: redb::DatabaseError) -> Self {
        DatabaseError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DatabaseError {
    fn from(e: redb::Error) -> Self {
        DatabaseError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(e: redb::StorageError) -> Self {
        DatabaseError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(e: redb::TableError) -> Self {
        DatabaseError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DatabaseError {
    fn from(e: redb::TransactionError) -> Self {
        DatabaseError::Transaction(Box::new(e))
    }
}

pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

/// Statistics from a purge operation
#[derive(Debug, Default)]
pub struct PurgeStats {
    pub projects: u64,
    pub resources: u64,
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, DatabaseError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, DatabaseError> {
    Ok(rmp_serde::from_slice(data)?)
}

/// Issue the next id from a named sequence inside an open write transaction.
pub(crate) fn next_id(txn: &WriteTransaction, sequence: &str) -> Result<u64, DatabaseError> {
    let mut table = txn.open_table(SEQUENCES)?;
    let current = table.get(sequence)?.map(|v| v.value()).unwrap_or(0);
    let next = current + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("project-box.redb");
        let db = Arc::new(RedbDatabase::create(db_path)?);

        // Initialize application tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PROJECTS)?;
            let _ = write_txn.open_table(PROJECT_NUMBERS)?;
            let _ = write_txn.open_table(PROJECT_STAFF)?;
            let _ = write_txn.open_table(PROJECT_MEMBERS)?;
            let _ = write_txn.open_table(PROJECT_KEYWORDS)?;
            let _ = write_txn.open_table(PROJECT_RESOURCES)?;
            let _ = write_txn.open_table(RESOURCES)?;
            let _ = write_txn.open_table(RESOURCE_PAGES)?;
            let _ = write_txn.open_table(SEQUENCES)?;
            let _ = write_txn.open_table(NUMBER_COUNTERS)?;
            let _ = write_txn.open_table(NUMBER_CLAIMS)?;
            let _ = write_txn.open_table(PROGRAMS)?;
            let _ = write_txn.open_table(COURSES)?;
            let _ = write_txn.open_table(STAFF)?;
            let _ = write_txn.open_table(KEYWORDS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    // ========================================================================
    // Admin operations
    // ========================================================================

    /// Purge all data - for testing only
    pub fn purge_all(&self) -> Result<PurgeStats, DatabaseError> {
        let write_txn = self.begin_write()?;
        let stats = PurgeStats {
            projects: write_txn.open_table(PROJECTS)?.len()?,
            resources: write_txn.open_table(RESOURCES)?.len()?,
        };

        // Dropping and recreating is cheaper than removing row by row.
        macro_rules! reset {
            ($($table:expr),+ $(,)?) => {
                $(
                    write_txn.delete_table($table)?;
                    let _ = write_txn.open_table($table)?;
                )+
            };
        }
        reset!(
            PROJECTS,
            PROJECT_NUMBERS,
            PROJECT_STAFF,
            PROJECT_MEMBERS,
            PROJECT_KEYWORDS,
            PROJECT_RESOURCES,
            RESOURCES,
            RESOURCE_PAGES,
            SEQUENCES,
            NUMBER_COUNTERS,
            NUMBER_CLAIMS,
            PROGRAMS,
            COURSES,
            STAFF,
            KEYWORDS,
        );

        write_txn.commit()?;
        Ok(stats)
    }
}

mod catalog;
mod counters;
pub mod db;
pub mod models;
mod projects;
mod tables;

pub use catalog::CatalogStats;
pub use db::{Database, DatabaseError, PurgeStats};
pub use tables::*;

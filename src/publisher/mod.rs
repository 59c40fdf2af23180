//! Outbound change events for the search indexer.
//!
//! Delivery is at-most-once: a publish is attempted exactly once, inline with
//! the request that caused it, and a failure is only logged by the caller.
//! Consumers must tolerate a stale index.

mod log;
mod rabbit;

pub use log::LogPublisher;
pub use rabbit::RabbitHttpPublisher;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Broker returned HTTP {0}")]
    HttpStatus(u16),
    #[error("Message was not routed to any queue")]
    Unrouted,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexAction {
    Create,
    Update,
    Delete,
}

impl IndexAction {
    pub fn routing_key(self) -> &'static str {
        match self {
            IndexAction::Create => "project.created",
            IndexAction::Update => "project.updated",
            IndexAction::Delete => "project.deleted",
        }
    }
}

/// Denormalized project document consumed by the search indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub id: u64,
    pub project_number: String,
    pub title_th: String,
    pub title_en: String,
    pub abstract_text: Option<String>,
    pub academic_year: i32,
    pub semester: u8,
    pub is_public: bool,
    pub program: Option<ProgramRef>,
    pub advisor: Option<StaffRef>,
    pub co_advisors: Vec<StaffRef>,
    pub committees: Vec<StaffRef>,
    pub members: Vec<String>,
    pub keywords: Vec<String>,
    pub resources: Vec<ResourceRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: u64,
    pub title: String,
    pub resource_type: String,
    /// Extracted page text, in page order (PDF resources only)
    #[serde(default)]
    pub pages: Vec<String>,
}

/// The message body published for every project change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEvent {
    pub action: IndexAction,
    pub project_id: u64,
    pub project: Option<ProjectSnapshot>,
    pub occurred_at: DateTime<Utc>,
}

impl IndexEvent {
    pub fn upsert(action: IndexAction, snapshot: ProjectSnapshot) -> Self {
        Self {
            action,
            project_id: snapshot.id,
            project: Some(snapshot),
            occurred_at: Utc::now(),
        }
    }

    pub fn deleted(project_id: u64) -> Self {
        Self {
            action: IndexAction::Delete,
            project_id,
            project: None,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_keys() {
        assert_eq!(IndexAction::Create.routing_key(), "project.created");
        assert_eq!(IndexAction::Update.routing_key(), "project.updated");
        assert_eq!(IndexAction::Delete.routing_key(), "project.deleted");
    }

    #[test]
    fn test_deleted_event_has_no_snapshot() {
        let event = IndexEvent::deleted(42);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "delete");
        assert_eq!(json["project_id"], 42);
        assert!(json["project"].is_null());
    }

    #[test]
    fn test_publish_error_display() {
        assert_eq!(PublishError::HttpStatus(502).to_string(), "Broker returned HTTP 502");
    }
}

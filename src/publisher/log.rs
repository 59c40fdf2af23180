use async_trait::async_trait;

use super::{MessagePublisher, PublishError};

/// Publisher used when no broker is configured: events are only logged.
pub struct LogPublisher;

#[async_trait]
impl MessagePublisher for LogPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError> {
        tracing::debug!(
            exchange,
            routing_key,
            project_id = %payload["project_id"],
            "Index publishing disabled, dropping event"
        );
        Ok(())
    }
}

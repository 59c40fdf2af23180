use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{MessagePublisher, PublishError};

/// HTTP request timeout for a single publish.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes through the RabbitMQ management HTTP API
/// (`POST /api/exchanges/{vhost}/{exchange}/publish`).
///
/// One attempt per event, no retry.
pub struct RabbitHttpPublisher {
    client: Client,
    api_url: String,
    vhost: String,
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct PublishResponse {
    routed: bool,
}

impl RabbitHttpPublisher {
    pub fn new(
        api_url: &str,
        vhost: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            vhost: vhost.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn publish_url(&self, exchange: &str) -> String {
        format!(
            "{}/api/exchanges/{}/{}/publish",
            self.api_url,
            urlencoding::encode(&self.vhost),
            urlencoding::encode(exchange)
        )
    }

    fn request_body(
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, PublishError> {
        Ok(serde_json::json!({
            "properties": {
                "content_type": "application/json",
                "delivery_mode": 2,
            },
            "routing_key": routing_key,
            "payload": serde_json::to_string(payload)?,
            "payload_encoding": "string",
        }))
    }
}

#[async_trait]
impl MessagePublisher for RabbitHttpPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError> {
        let body = Self::request_body(routing_key, payload)?;

        let resp = self
            .client
            .post(self.publish_url(exchange))
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(PublishError::HttpStatus(resp.status().as_u16()));
        }

        let ack: PublishResponse = resp.json().await?;
        if !ack.routed {
            return Err(PublishError::Unrouted);
        }

        tracing::debug!(exchange, routing_key, "Published index event");
        Ok(())
    }
}

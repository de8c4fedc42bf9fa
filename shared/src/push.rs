//! Push-notification dispatch through the Expo push HTTP API.
//!
//! The client is constructed explicitly at startup and injected wherever
//! dispatch is needed. Per-token delivery failures never surface as errors:
//! the dispatcher aggregates ticket outcomes and returns only the tokens the
//! provider reports as permanently dead, so the caller can prune them.

use std::env;

use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Ticket errors that mean the token will never deliver again.
const PERMANENT_TOKEN_ERRORS: &[&str] = &["DeviceNotRegistered", "InvalidCredentials"];

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("push transport error: {0}")]
    Transport(String),

    #[error("push API error: {0}")]
    Api(String),
}

/// The delivery seam between the notification service and the transport.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Sends one message to every token; returns the tokens that should be
    /// pruned from device storage.
    async fn send(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: Option<serde_json::Value>,
    ) -> Result<Vec<String>, DispatchError>;
}

#[derive(Debug, Serialize)]
pub struct ExpoPushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ExpoPushResponse {
    pub data: Vec<ExpoPushTicket>,
}

#[derive(Debug, Deserialize)]
pub struct ExpoPushTicket {
    pub status: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<ExpoPushTicketDetails>,
}

#[derive(Debug, Deserialize)]
pub struct ExpoPushTicketDetails {
    #[serde(default)]
    pub error: Option<String>,
}

pub struct ExpoPushClient {
    client: Client,
    endpoint: String,
}

impl ExpoPushClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            endpoint: env::var("PUSH_API_URL").unwrap_or_else(|_| EXPO_PUSH_URL.to_string()),
        }
    }

    pub fn with_endpoint(client: Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

impl Default for ExpoPushClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationDispatcher for ExpoPushClient {
    async fn send(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: Option<serde_json::Value>,
    ) -> Result<Vec<String>, DispatchError> {
        if tokens.is_empty() {
            info!("No push tokens provided, skipping push notification");
            return Ok(Vec::new());
        }

        let messages: Vec<ExpoPushMessage> = tokens
            .iter()
            .map(|token| ExpoPushMessage {
                to: token.clone(),
                title: title.to_string(),
                body: body.to_string(),
                data: data.clone(),
                sound: Some("default".to_string()),
                badge: Some(1),
            })
            .collect();

        info!("Sending {} push notifications to Expo", messages.len());

        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .header("Accept-Encoding", "gzip, deflate")
            .header("Content-Type", "application/json")
            .json(&messages)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send push notifications: {}", e);
                DispatchError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(
                "Expo push API returned error status {}: {}",
                status, error_text
            );
            return Err(DispatchError::Api(format!("{} - {}", status, error_text)));
        }

        let push_response: ExpoPushResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Expo push response: {}", e);
            DispatchError::Api(format!("unparseable response: {}", e))
        })?;

        // Tickets come back in message order, so zip pairs each outcome with
        // the token it belongs to.
        let mut invalid_tokens = Vec::new();
        for (token, ticket) in tokens.iter().zip(push_response.data.iter()) {
            if ticket.status == "ok" {
                continue;
            }

            let detail = ticket
                .details
                .as_ref()
                .and_then(|d| d.error.as_deref())
                .unwrap_or("unknown");

            if PERMANENT_TOKEN_ERRORS.contains(&detail) {
                warn!(
                    "Push token permanently invalid ({}), marking for pruning",
                    detail
                );
                invalid_tokens.push(token.clone());
            } else {
                error!(
                    "Push notification failed: status={}, error={}, message={:?}",
                    ticket.status, detail, ticket.message
                );
            }
        }

        info!(
            "Push dispatch complete: {} sent, {} invalid tokens",
            tokens.len(),
            invalid_tokens.len()
        );

        Ok(invalid_tokens)
    }
}

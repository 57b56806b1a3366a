//! Outbound push notifications.
//!
//! Delivery is fire-and-forget from the caller's point of view: any error
//! means "not delivered" and the caller decides whether to retry later.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Push gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Push gateway rejected the message with status {0}")]
    Rejected(u16),

    #[error("No push transport configured")]
    NotConfigured,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct PushMessage<'a> {
    to: &'a str,
    notification: PushNotification<'a>,
    data: &'a HashMap<String, String>,
}

#[derive(Serialize)]
struct PushNotification<'a> {
    title: &'a str,
    body: &'a str,
}

/// Posts messages to an HTTP push gateway as JSON.
pub struct PushGatewayNotifier {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl PushGatewayNotifier {
    /// `timeout` bounds each send from connect to the last response byte.
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl Notifier for PushGatewayNotifier {
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Result<(), NotifyError> {
        let message = PushMessage {
            to: token,
            notification: PushNotification { title, body },
            data,
        };

        let mut request = self.client.post(&self.url).json(&message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        tracing::debug!("Push delivered: {}", title);
        Ok(())
    }
}

/// Stand-in used when no gateway is configured. Never reports success, so
/// notified flags stay unset until a real transport exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        _token: &str,
        title: &str,
        body: &str,
        _data: &HashMap<String, String>,
    ) -> Result<(), NotifyError> {
        tracing::info!("📭 Would notify: {} - {}", title, body);
        Err(NotifyError::NotConfigured)
    }
}

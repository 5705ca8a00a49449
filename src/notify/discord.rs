//! Discord webhook delivery.
//!
//! Posts each report as a single embed: the report title as the embed
//! title and the capped body as its description.
//!
//! Only failures where Discord cannot have accepted the post are
//! retryable: connection errors and 429. A timeout or a 5xx may follow a
//! successful post, so those are final.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::Notifier;
use crate::report::Report;
use crate::types::{Mode, SidepotError};

pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    embeds: [Embed<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: String,
}

impl<'a> WebhookPayload<'a> {
    fn from_report(report: &'a Report) -> Self {
        Self {
            embeds: [Embed {
                title: &report.title,
                description: report.body(),
            }],
        }
    }
}

/// Posts reports to Discord incoming webhooks.
pub struct DiscordNotifier {
    client: Client,
}

impl DiscordNotifier {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self { client })
    }

    /// Client that ignores proxy settings, for talking to local listeners.
    #[cfg(test)]
    pub(crate) fn direct(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .expect("webhook test client");
        Self { client }
    }
}

/// Map a failed send. Only a connection that never opened is retryable.
fn send_error(mode: Mode, e: &reqwest::Error) -> SidepotError {
    if e.is_connect() {
        SidepotError::TransientNetwork(format!("webhook unreachable: {e}"))
    } else if e.is_timeout() {
        SidepotError::DeliveryFailure {
            mode,
            message: format!("webhook timed out, report may have been posted: {e}"),
        }
    } else {
        SidepotError::DeliveryFailure {
            mode,
            message: e.to_string(),
        }
    }
}

/// Map a non-success status. 429 means the post was refused and is
/// retryable; every other status is final.
fn status_error(mode: Mode, status: StatusCode, body: &str) -> SidepotError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        SidepotError::TransientNetwork(format!("webhook status {status}"))
    } else {
        SidepotError::DeliveryFailure {
            mode,
            message: format!("HTTP {status}: {body}"),
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(&self, endpoint: &str, report: &Report) -> Result<(), SidepotError> {
        let payload = WebhookPayload::from_report(report);

        let resp = self
            .client
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| send_error(report.mode, &e))?;

        let status = resp.status();
        if status.is_success() {
            debug!(mode = %report.mode, %status, "Webhook accepted report");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        warn!(mode = %report.mode, %status, body = %body, "Webhook rejected report");

        Err(status_error(report.mode, status, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_payload_is_single_embed() {
        let report = Report::new(Mode::Pir, vec!["Week 4".into(), "Week 4: Team 3 - 150.00 (Δ 0.00)".into()]);
        let json = serde_json::to_value(WebhookPayload::from_report(&report)).unwrap();

        let embeds = json["embeds"].as_array().unwrap();
        assert_eq!(embeds.len(), 1);
        assert_eq!(embeds[0]["title"], "Price Is Right");
        assert_eq!(embeds[0]["description"], "Week 4\nWeek 4: Team 3 - 150.00 (Δ 0.00)");
    }

    #[test]
    fn test_client_builds() {
        assert!(DiscordNotifier::new().is_ok());
    }

    #[test]
    fn test_only_rate_limit_status_is_retryable() {
        let limited = status_error(Mode::Pir, StatusCode::TOO_MANY_REQUESTS, "");
        assert!(limited.is_transient());

        for status in [StatusCode::INTERNAL_SERVER_ERROR, StatusCode::BAD_GATEWAY, StatusCode::NOT_FOUND] {
            let err = status_error(Mode::Pir, status, "oops");
            assert!(!err.is_transient());
            assert!(matches!(err, SidepotError::DeliveryFailure { mode: Mode::Pir, .. }));
        }
    }

    #[tokio::test]
    async fn test_timeout_is_final() {
        // Accepts the connection and never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let notifier = DiscordNotifier::direct(Duration::from_millis(200));
        let report = Report::new(Mode::Survivor, vec!["Week 1".into()]);
        let err = notifier.deliver(&format!("http://{addr}/hook"), &report).await.unwrap_err();

        assert!(!err.is_transient());
        assert!(matches!(err, SidepotError::DeliveryFailure { mode: Mode::Survivor, .. }));
        server.abort();
    }

    #[tokio::test]
    async fn test_refused_connection_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let notifier = DiscordNotifier::direct(Duration::from_secs(2));
        let report = Report::new(Mode::Pir, vec!["Week 1".into()]);
        let err = notifier.deliver(&format!("http://{addr}/hook"), &report).await.unwrap_err();

        assert!(err.is_transient());
    }
}

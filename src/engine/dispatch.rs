//! Report dispatch.
//!
//! Sends a finished report to its mode's webhook, or in dry-run mode logs
//! and prints it without touching the network.

use std::sync::Arc;
use tracing::{info, warn};

use super::orchestrator::ModeStatus;
use crate::config::WebhookConfig;
use crate::notify::Notifier;
use crate::report::Report;
use crate::retry::RetryPolicy;
use crate::types::SidepotError;

pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    webhooks: WebhookConfig,
    dry_run: bool,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        webhooks: WebhookConfig,
        dry_run: bool,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            notifier,
            webhooks,
            dry_run,
            retry,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Deliver one report. Any failure comes back as `DeliveryFailure`.
    pub async fn dispatch(&self, report: &Report) -> Result<ModeStatus, SidepotError> {
        let mode = report.mode;

        if self.dry_run {
            info!(mode = %mode, lines = report.lines.len(), "[DRY RUN] Would post report");
            println!("\n{report}");
            return Ok(ModeStatus::DryRun);
        }

        let Some(endpoint) = self.webhooks.endpoint_for(mode) else {
            warn!(mode = %mode, "No webhook configured");
            return Err(SidepotError::DeliveryFailure {
                mode,
                message: "no webhook configured".into(),
            });
        };

        let notifier = self.notifier.as_ref();
        self.retry
            .run("deliver_report", move || notifier.deliver(endpoint, report))
            .await
            .map_err(|e| match e {
                SidepotError::DeliveryFailure { .. } => e,
                other => SidepotError::DeliveryFailure {
                    mode,
                    message: other.to_string(),
                },
            })?;

        info!(mode = %mode, "Report delivered");
        Ok(ModeStatus::Delivered)
    }
}

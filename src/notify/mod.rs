//! Notification channels.
//!
//! Defines the `Notifier` trait used to push finished reports and provides
//! the Discord webhook implementation. Delivery is fire-and-forget: only
//! success or failure is observed, never the response content.

pub mod discord;

use async_trait::async_trait;

use crate::report::Report;
use crate::types::SidepotError;

/// Abstraction over push endpoints for reports.
///
/// Implementations return `TransientNetwork` only when the endpoint cannot
/// have accepted the report (connection refused, rate limited). Anything
/// that might have been posted, a timeout included, is `DeliveryFailure`
/// so the retry loop never posts twice.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, endpoint: &str, report: &Report) -> Result<(), SidepotError>;
}

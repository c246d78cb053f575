//! Audit trail for mutating commands.

use std::fmt;
use std::future::Future;

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::db;
use crate::models::AuditLogEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    ImportSchedule,
    ExportSchedule,
    SwapRequest,
    SwapResponse,
    SwapReview,
    VacationRequest,
    VacationReview,
    UserChange,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Login => "login",
            AuditAction::ImportSchedule => "import_schedule",
            AuditAction::ExportSchedule => "export_schedule",
            AuditAction::SwapRequest => "swap_request",
            AuditAction::SwapResponse => "swap_response",
            AuditAction::SwapReview => "swap_review",
            AuditAction::VacationRequest => "vacation_request",
            AuditAction::VacationReview => "vacation_review",
            AuditAction::UserChange => "user_change",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuditLogEntry {
    pub fn new(user_name: &str, action: AuditAction, details: JsonValue, success: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_name: user_name.to_string(),
            action: action.as_str().to_string(),
            details,
            timestamp: Utc::now(),
            success,
        }
    }
}

/// Merges the error message into `details` when the outcome failed.
pub fn outcome_details<T>(mut details: JsonValue, outcome: &anyhow::Result<T>) -> JsonValue {
    if let Err(err) = outcome {
        match details.as_object_mut() {
            Some(map) => {
                map.insert("error".to_string(), json!(format!("{err:#}")));
            }
            None => details = json!({ "context": details, "error": format!("{err:#}") }),
        }
    }
    details
}

/// Runs `work` and records its outcome for `user_name`, success or not.
pub async fn audited<T, F>(
    pool: &PgPool,
    user_name: &str,
    action: AuditAction,
    details: JsonValue,
    work: F,
) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let outcome = work.await;
    if let Err(err) = &outcome {
        warn!(user = user_name, %action, "action failed: {err:#}");
    }
    let entry = AuditLogEntry::new(
        user_name,
        action,
        outcome_details(details, &outcome),
        outcome.is_ok(),
    );
    let recorded = db::record_audit(pool, &entry).await;
    settle(action, outcome, recorded)
}

/// The work has already committed by the time the audit row is written, so a
/// failed write is logged and the work's own outcome is returned.
fn settle<T>(
    action: AuditAction,
    outcome: anyhow::Result<T>,
    recorded: anyhow::Result<()>,
) -> anyhow::Result<T> {
    if let Err(err) = recorded {
        warn!(%action, "failed to record audit entry: {err:#}");
    }
    outcome
}

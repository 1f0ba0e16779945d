//! Security audit logging.
//!
//! Security-relevant events go to the `audit` tracing target with
//! structured fields so they can be routed and alerted on separately from
//! request logs.

use tracing::{info, warn};

/// Security audit events that should be logged for monitoring and alerting.
#[derive(Debug, Clone)]
pub enum AuditEvent<'a> {
    /// Owner token did not match on delete or validate.
    OwnerTokenMismatch {
        file_id: &'a str,
        operation: &'static str,
    },
    /// Download blocked by policy.
    DownloadDenied {
        file_id: &'a str,
        remote_addr: &'a str,
        reason: &'a str,
    },
    /// Source exceeded its request budget.
    RateLimited {
        remote_addr: &'a str,
        path: &'a str,
    },
    /// File removed by its owner or by the expiry sweep.
    FileDeleted {
        file_id: &'a str,
        initiator: &'static str,
    },
}

/// Log a security audit event with structured fields.
pub fn log_audit_event(event: AuditEvent<'_>) {
    match event {
        AuditEvent::OwnerTokenMismatch { file_id, operation } => {
            warn!(
                target: "audit",
                event_type = "owner_token_mismatch",
                %file_id,
                operation,
                "Owner token mismatch"
            );
        },
        AuditEvent::DownloadDenied {
            file_id,
            remote_addr,
            reason,
        } => {
            warn!(
                target: "audit",
                event_type = "download_denied",
                %file_id,
                %remote_addr,
                reason,
                "Download denied"
            );
        },
        AuditEvent::RateLimited { remote_addr, path } => {
            warn!(
                target: "audit",
                event_type = "rate_limited",
                %remote_addr,
                %path,
                "Rate limit exceeded"
            );
        },
        AuditEvent::FileDeleted { file_id, initiator } => {
            info!(
                target: "audit",
                event_type = "file_deleted",
                %file_id,
                initiator,
                "File deleted"
            );
        },
    }
}

use serde::{Deserialize, Serialize};

use crate::attachments::{AttachmentDescriptor, AttachmentResolver};
use crate::audit_log::{decode_with_report, encode, AuditEntry};
use crate::completeness::{assess, CompletenessReport};
use crate::error::ValidationError;
use crate::record::{ApplicationRecord, PermitDomain};
use crate::status::{PermitStatus, StatusCatalog};

/// Everything derived when a record is opened. Recomputed on every open.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDetail {
    pub application_id: String,
    pub domain: Option<PermitDomain>,
    pub status: String,
    pub status_label: String,
    pub history: Vec<AuditEntry>,
    pub malformed_history_blocks: usize,
    pub attachments: Vec<AttachmentDescriptor>,
    pub completeness: CompletenessReport,
    pub record: ApplicationRecord,
}

impl ApplicationDetail {
    #[must_use]
    pub fn build(record: &ApplicationRecord, resolver: &AttachmentResolver) -> Self {
        let report = decode_with_report(record.remarks_blob());
        let status_label = PermitStatus::parse(&record.status)
            .map_or_else(|| record.status.clone(), |status| status.display_label().to_string());

        Self {
            application_id: record.application_id.clone(),
            domain: record.domain(),
            status: record.status.clone(),
            status_label,
            history: report.entries,
            malformed_history_blocks: report.malformed_blocks,
            attachments: resolver.resolve(record, &record.application_id),
            completeness: assess(Some(record)),
            record: record.clone(),
        }
    }
}

/// An admin's requested status change, as entered.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StatusChange {
    pub status: String,
    #[serde(default)]
    pub note: String,
    pub actor: String,
}

/// A validated change ready to be sent to the backend.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct PreparedChange {
    pub application_id: String,
    pub status: PermitStatus,
    pub comment: AuditEntry,
    /// The record's blob with `comment` prepended.
    pub remarks_after: String,
}

/// Validate `change` against `record` and build the audit entry it produces.
///
/// The note doubles as the rejection reason.
///
/// # Errors
/// Returns [`ValidationError::EmptyInput`] for a blank application id or
/// actor, [`ValidationError::UnknownDomain`] when the record's domain cannot
/// be determined, and anything [`StatusCatalog::validate_transition`] returns.
pub fn prepare_status_change(
    catalog: &StatusCatalog,
    record: &ApplicationRecord,
    change: &StatusChange,
) -> Result<PreparedChange, ValidationError> {
    if record.application_id.trim().is_empty() {
        return Err(ValidationError::EmptyInput("application_id"));
    }
    let actor = change.actor.trim();
    if actor.is_empty() {
        return Err(ValidationError::EmptyInput("updated_by"));
    }
    let domain = record
        .domain()
        .ok_or_else(|| ValidationError::UnknownDomain(record.application_id.clone()))?;
    let status = catalog.validate_transition(domain, &record.status, &change.status, &change.note)?;

    let note = change.note.trim();
    let text = if note.is_empty() {
        format!("Status updated to {}", status.display_label())
    } else {
        note.to_string()
    };
    let comment = AuditEntry::now(actor, text);
    let remarks_after = encode(record.remarks_blob(), &comment);

    Ok(PreparedChange {
        application_id: record.application_id.clone(),
        status,
        comment,
        remarks_after,
    })
}

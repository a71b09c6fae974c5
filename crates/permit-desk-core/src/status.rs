use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::record::PermitDomain;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PermitStatus {
    Pending,
    UnderReview,
    DocumentVerification,
    FieldInspectionScheduled,
    PaymentVerification,
    ForManagerApproval,
    PrintingProcessing,
    ReadyForRelease,
    Approved,
    Rejected,
}

const STANDARD_WORKFLOW: &[PermitStatus] = &[
    PermitStatus::Pending,
    PermitStatus::UnderReview,
    PermitStatus::Approved,
    PermitStatus::Rejected,
];

const FRANCHISE_WORKFLOW: &[PermitStatus] = &[
    PermitStatus::Pending,
    PermitStatus::UnderReview,
    PermitStatus::DocumentVerification,
    PermitStatus::FieldInspectionScheduled,
    PermitStatus::PaymentVerification,
    PermitStatus::ForManagerApproval,
    PermitStatus::PrintingProcessing,
    PermitStatus::ReadyForRelease,
    PermitStatus::Approved,
    PermitStatus::Rejected,
];

impl PermitStatus {
    pub const ALL: [Self; 10] = [
        Self::Pending,
        Self::UnderReview,
        Self::DocumentVerification,
        Self::FieldInspectionScheduled,
        Self::PaymentVerification,
        Self::ForManagerApproval,
        Self::PrintingProcessing,
        Self::ReadyForRelease,
        Self::Approved,
        Self::Rejected,
    ];

    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::DocumentVerification => "document_verification",
            Self::FieldInspectionScheduled => "field_inspection_scheduled",
            Self::PaymentVerification => "payment_verification",
            Self::ForManagerApproval => "for_manager_approval",
            Self::PrintingProcessing => "printing_processing",
            Self::ReadyForRelease => "ready_for_release",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub fn display_label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::UnderReview => "Under Review",
            Self::DocumentVerification => "Document Verification",
            Self::FieldInspectionScheduled => "Field Inspection Scheduled",
            Self::PaymentVerification => "Payment Verification",
            Self::ForManagerApproval => "For Manager Approval",
            Self::PrintingProcessing => "Printing & Processing",
            Self::ReadyForRelease => "Ready for Release",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    #[must_use]
    pub fn requires_reason(self) -> bool {
        self == Self::Rejected
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Parse a wire value. Case, surrounding whitespace, spaces and hyphens are
    /// normalized, so `"Under Review"` and `"under-review"` both map to `under_review`.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        let normalized = normalize_wire(value);
        Self::ALL.into_iter().find(|status| status.as_wire() == normalized)
    }

    #[must_use]
    pub fn from_display(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|status| status.display_label().eq_ignore_ascii_case(label))
    }

    /// Wire form first, then display label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::from_wire(value).or_else(|| Self::from_display(value))
    }
}

impl Display for PermitStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_label())
    }
}

/// Lower-snake form of a free-form status string.
#[must_use]
pub fn normalize_wire(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|ch| if ch == ' ' || ch == '-' { '_' } else { ch.to_ascii_lowercase() })
        .collect()
}

/// Statuses a domain may hold, in pipeline order with `rejected` last.
#[must_use]
pub fn workflow(domain: PermitDomain) -> &'static [PermitStatus] {
    match domain {
        PermitDomain::Franchise => FRANCHISE_WORKFLOW,
        PermitDomain::Business | PermitDomain::Building | PermitDomain::Barangay => {
            STANDARD_WORKFLOW
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Any status of the domain is reachable from any other.
    #[default]
    Permissive,
    /// Stay, advance one stage, reject a non-terminal application, or reopen
    /// a terminal one to `pending`/`under_review`.
    Sequential,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct StatusDescriptor {
    pub status: PermitStatus,
    pub wire_value: &'static str,
    pub display_label: &'static str,
    pub requires_reason: bool,
    pub allowed_from: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCatalog {
    policy: TransitionPolicy,
}

impl StatusCatalog {
    #[must_use]
    pub fn new(policy: TransitionPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    #[must_use]
    pub fn transitions(&self, domain: PermitDomain) -> Vec<StatusDescriptor> {
        let statuses = workflow(domain);
        statuses
            .iter()
            .map(|&status| StatusDescriptor {
                status,
                wire_value: status.as_wire(),
                display_label: status.display_label(),
                requires_reason: status.requires_reason(),
                allowed_from: statuses
                    .iter()
                    .filter(|&&from| self.allows(domain, from, status))
                    .map(|from| from.as_wire())
                    .collect(),
            })
            .collect()
    }

    /// Whether `to_wire` is reachable from `from_wire` in `domain`.
    ///
    /// An unrecognized current status (legacy rows, empty strings) is treated
    /// as `pending`.
    #[must_use]
    pub fn can_transition(&self, domain: PermitDomain, from_wire: &str, to_wire: &str) -> bool {
        let Some(to) = PermitStatus::parse(to_wire) else {
            return false;
        };
        let from = PermitStatus::parse(from_wire).unwrap_or(PermitStatus::Pending);
        self.allows(domain, from, to)
    }

    /// Validate a requested status and its reason.
    ///
    /// # Errors
    /// Returns [`ValidationError::UnknownStatus`] for unparseable values,
    /// [`ValidationError::StatusNotInDomain`] for statuses outside the domain's
    /// workflow, and [`ValidationError::MissingReason`] when a rejection has a
    /// blank reason.
    pub fn validate(
        &self,
        domain: PermitDomain,
        to_wire: &str,
        reason: &str,
    ) -> Result<PermitStatus, ValidationError> {
        let to = PermitStatus::parse(to_wire)
            .ok_or_else(|| ValidationError::UnknownStatus(to_wire.to_string()))?;
        if !workflow(domain).contains(&to) {
            return Err(ValidationError::StatusNotInDomain { domain, status: to.as_wire() });
        }
        if to.requires_reason() && reason.trim().is_empty() {
            return Err(ValidationError::MissingReason { status: to.as_wire() });
        }
        Ok(to)
    }

    /// [`Self::validate`] plus the transition check against the current status.
    ///
    /// # Errors
    /// Everything [`Self::validate`] returns, plus
    /// [`ValidationError::IllegalTransition`] when the policy forbids the move.
    pub fn validate_transition(
        &self,
        domain: PermitDomain,
        from_wire: &str,
        to_wire: &str,
        reason: &str,
    ) -> Result<PermitStatus, ValidationError> {
        let to = self.validate(domain, to_wire, reason)?;
        if !self.can_transition(domain, from_wire, to_wire) {
            return Err(ValidationError::IllegalTransition {
                from: from_wire.to_string(),
                to: to.as_wire(),
            });
        }
        Ok(to)
    }

    fn allows(&self, domain: PermitDomain, from: PermitStatus, to: PermitStatus) -> bool {
        let statuses = workflow(domain);
        if !statuses.contains(&to) {
            return false;
        }
        match self.policy {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::Sequential => {
                if from == to {
                    return true;
                }
                if from.is_terminal() {
                    return matches!(to, PermitStatus::Pending | PermitStatus::UnderReview);
                }
                if to == PermitStatus::Rejected {
                    return true;
                }
                let stage = |status| statuses.iter().position(|&candidate| candidate == status);
                match (stage(from), stage(to)) {
                    (Some(from_stage), Some(to_stage)) => to_stage == from_stage + 1,
                    _ => false,
                }
            }
        }
    }
}

//! Deterministic completeness check shown as the "AI check" badge.
//!
//! Required fields are grouped into named clusters per domain. A cluster is
//! present when every requirement in it is satisfied, and a requirement is
//! satisfied when any of its alternative field keys holds a non-blank value.

use serde::{Deserialize, Serialize};

use crate::record::{ApplicationRecord, PermitDomain};

pub const IDENTITY_CLUSTER: &str = "identity";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Verified,
    Flagged,
    Pending,
    NotChecked,
}

impl VerificationState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Flagged => "flagged",
            Self::Pending => "pending",
            Self::NotChecked => "not_checked",
        }
    }
}

struct FieldCluster {
    name: &'static str,
    requirements: &'static [&'static [&'static str]],
}

const PERSON_IDENTITY: FieldCluster = FieldCluster {
    name: IDENTITY_CLUSTER,
    requirements: &[
        &["first_name", "full_name", "applicant_name"],
        &["last_name", "full_name", "applicant_name"],
    ],
};

const BUSINESS_CLUSTERS: &[FieldCluster] = &[
    FieldCluster {
        name: IDENTITY_CLUSTER,
        requirements: &[
            &["first_name", "owner_name", "full_name"],
            &["last_name", "owner_name", "full_name"],
        ],
    },
    FieldCluster {
        name: "site",
        requirements: &[&["business_address", "address"], &["barangay"]],
    },
    FieldCluster {
        name: "classification",
        requirements: &[
            &["business_name", "trade_name"],
            &["business_type", "nature_of_business", "line_of_business"],
        ],
    },
];

const BUILDING_CLUSTERS: &[FieldCluster] = &[
    PERSON_IDENTITY,
    FieldCluster {
        name: "site",
        requirements: &[&["lot_location", "project_location", "address"], &["barangay"]],
    },
    FieldCluster {
        name: "classification",
        requirements: &[
            &["permit_type", "permit_group"],
            &["scope_of_work", "occupancy_type", "building_use"],
        ],
    },
];

const FRANCHISE_CLUSTERS: &[FieldCluster] = &[
    PERSON_IDENTITY,
    FieldCluster {
        name: "location",
        requirements: &[&["home_address", "address"], &["barangay"]],
    },
    FieldCluster {
        name: "route",
        requirements: &[
            &["route", "route_name"],
            &["make_brand", "vehicle_make"],
            &["plate_number", "plate_no"],
        ],
    },
];

const BARANGAY_CLUSTERS: &[FieldCluster] = &[
    PERSON_IDENTITY,
    FieldCluster { name: "residency", requirements: &[&["address", "home_address"], &["barangay"]] },
    FieldCluster { name: "purpose", requirements: &[&["purpose", "clearance_type"]] },
];

/// Used when a record's domain cannot be determined.
const GENERIC_CLUSTERS: &[FieldCluster] = &[
    PERSON_IDENTITY,
    FieldCluster { name: "location", requirements: &[&["address", "home_address", "barangay"]] },
];

fn clusters(domain: Option<PermitDomain>) -> &'static [FieldCluster] {
    match domain {
        Some(PermitDomain::Business) => BUSINESS_CLUSTERS,
        Some(PermitDomain::Building) => BUILDING_CLUSTERS,
        Some(PermitDomain::Franchise) => FRANCHISE_CLUSTERS,
        Some(PermitDomain::Barangay) => BARANGAY_CLUSTERS,
        None => GENERIC_CLUSTERS,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CompletenessReport {
    pub state: VerificationState,
    pub missing_clusters: Vec<String>,
}

/// Classify a record and name the clusters that are missing.
#[must_use]
pub fn assess(record: Option<&ApplicationRecord>) -> CompletenessReport {
    let Some(record) = record else {
        return CompletenessReport {
            state: VerificationState::NotChecked,
            missing_clusters: Vec::new(),
        };
    };

    let missing_clusters = clusters(record.domain())
        .iter()
        .filter(|cluster| {
            !cluster
                .requirements
                .iter()
                .all(|alternatives| alternatives.iter().any(|key| record.has_value(key)))
        })
        .map(|cluster| cluster.name.to_string())
        .collect::<Vec<_>>();

    let state = if missing_clusters.iter().any(|name| name == IDENTITY_CLUSTER) {
        VerificationState::Flagged
    } else if missing_clusters.is_empty() {
        VerificationState::Verified
    } else {
        VerificationState::Pending
    };

    CompletenessReport { state, missing_clusters }
}

#[must_use]
pub fn classify(record: Option<&ApplicationRecord>) -> VerificationState {
    assess(record).state
}

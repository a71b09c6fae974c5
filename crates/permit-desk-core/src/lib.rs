pub mod aggregate;
pub mod attachments;
pub mod audit_log;
pub mod completeness;
pub mod detail;
pub mod error;
pub mod record;
pub mod status;
pub mod view_state;

pub use aggregate::{
    CategoryCount, CategoryCounts, CollectionAggregator, DateRange, FilterSpec, GroupCount,
    PageSpec, SortDirection, SortSpec, SummaryStats, TimeBucket, ViewConfig, ViewResult, ALL_KEY,
    UNKNOWN_KEY,
};
pub use attachments::{AttachmentDescriptor, AttachmentResolver};
pub use audit_log::{AuditEntry, AuditTrail, DecodeReport, DEFAULT_ACTOR, UNPARSED_TIMESTAMP};
pub use completeness::{CompletenessReport, VerificationState};
pub use detail::{prepare_status_change, ApplicationDetail, PreparedChange, StatusChange};
pub use error::ValidationError;
pub use record::{ApplicationRecord, PermitDomain};
pub use status::{PermitStatus, StatusCatalog, StatusDescriptor, TransitionPolicy};
pub use view_state::{reduce, ViewAction, ViewState};

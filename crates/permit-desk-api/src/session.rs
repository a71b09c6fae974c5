//! A single admin's working session against one permit domain.
//!
//! The session owns the last fetched snapshot. Every fetch replaces it
//! wholesale (last write wins); views and details are derived from it on read.

use permit_desk_core::audit_log::encode;
use permit_desk_core::{
    prepare_status_change, ApplicationDetail, ApplicationRecord, AttachmentResolver,
    CollectionAggregator, FilterSpec, PageSpec, PermitDomain, SortSpec, StatusCatalog,
    StatusChange, ViewResult, ViewState,
};
use time::Date;

use crate::client::{CollectionQuery, OverallStats, PermitApiClient, UpdateStatusRequest};
use crate::error::ApiError;

/// Yes/no authorization for status changes, decided outside this crate.
pub trait AccessGate {
    fn can_update_status(&self) -> bool;
}

impl AccessGate for bool {
    fn can_update_status(&self) -> bool {
        *self
    }
}

#[derive(Debug)]
pub struct DeskSession<G = bool> {
    client: PermitApiClient,
    domain: PermitDomain,
    catalog: StatusCatalog,
    aggregator: CollectionAggregator,
    resolver: AttachmentResolver,
    gate: G,
    actor: String,
    records: Vec<ApplicationRecord>,
    stats: Option<OverallStats>,
}

impl<G: AccessGate> DeskSession<G> {
    #[must_use]
    pub fn new(client: PermitApiClient, domain: PermitDomain, actor: impl Into<String>, gate: G) -> Self {
        let resolver = AttachmentResolver::new(client.base_url().clone());
        Self {
            client,
            domain,
            catalog: StatusCatalog::default(),
            aggregator: CollectionAggregator::for_domain(domain),
            resolver,
            gate,
            actor: actor.into(),
            records: Vec::new(),
            stats: None,
        }
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: StatusCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn domain(&self) -> PermitDomain {
        self.domain
    }

    #[must_use]
    pub fn records(&self) -> &[ApplicationRecord] {
        &self.records
    }

    /// Totals reported by the backend on the last collection fetch.
    #[must_use]
    pub fn server_stats(&self) -> Option<&OverallStats> {
        self.stats.as_ref()
    }

    /// Replace the snapshot with a fresh fetch. Returns the record count.
    ///
    /// # Errors
    /// Returns the client's [`ApiError`]; the previous snapshot is kept on failure.
    pub async fn refresh(&mut self, query: &CollectionQuery) -> Result<usize, ApiError> {
        let page = self.client.fetch_collection(self.domain, query).await?;
        self.records = page.records;
        self.stats = page.stats;
        tracing::debug!(domain = self.domain.as_str(), count = self.records.len(), "snapshot refreshed");
        Ok(self.records.len())
    }

    #[must_use]
    pub fn view(&self, filter: &FilterSpec, sort: &SortSpec, page: &PageSpec, as_of: Date) -> ViewResult {
        self.aggregator.view(&self.records, filter, sort, page, as_of)
    }

    #[must_use]
    pub fn view_state(&self, state: &ViewState, as_of: Date) -> ViewResult {
        self.view(&state.filter, &state.sort, &state.page_spec(), as_of)
    }

    /// Detail for a record already in the snapshot.
    #[must_use]
    pub fn detail(&self, application_id: &str) -> Option<ApplicationDetail> {
        self.find(application_id).map(|record| ApplicationDetail::build(record, &self.resolver))
    }

    /// Fetch one record, merge it into the snapshot and build its detail.
    ///
    /// # Errors
    /// Returns the client's [`ApiError`].
    pub async fn open(&mut self, application_id: &str) -> Result<ApplicationDetail, ApiError> {
        let mut record = self.client.fetch_single(application_id).await?;
        if record.domain.is_none() {
            record.domain = Some(self.domain);
        }
        let detail = ApplicationDetail::build(&record, &self.resolver);
        self.upsert(record);
        Ok(detail)
    }

    /// Validate, persist, and apply a status change to the snapshot.
    ///
    /// Nothing is sent when the gate refuses or validation fails. When the
    /// backend does not echo `remarks`, the comment is prepended locally.
    ///
    /// # Errors
    /// [`ApiError::Unauthorized`] from the gate, [`ApiError::Validation`] for
    /// rejected input, otherwise the client's error.
    pub async fn change_status(
        &mut self,
        application_id: &str,
        status: &str,
        note: &str,
    ) -> Result<ApplicationRecord, ApiError> {
        if !self.gate.can_update_status() {
            return Err(ApiError::Unauthorized);
        }

        let record = match self.find(application_id) {
            Some(record) => record.clone(),
            None => {
                let mut fetched = self.client.fetch_single(application_id).await?;
                if fetched.domain.is_none() {
                    fetched.domain = Some(self.domain);
                }
                fetched
            }
        };
        let change =
            StatusChange { status: status.to_string(), note: note.to_string(), actor: self.actor.clone() };
        let prepared = prepare_status_change(&self.catalog, &record, &change)?;

        let request = UpdateStatusRequest {
            application_id: prepared.application_id.clone(),
            status: prepared.status.as_wire().to_string(),
            remarks: prepared.comment.text.clone(),
            updated_by: self.actor.clone(),
        };
        let reply = self.client.update_status(&request).await?;

        let mut updated = record;
        updated.status = reply
            .status
            .filter(|status| !status.trim().is_empty())
            .unwrap_or_else(|| prepared.status.as_wire().to_string());
        updated.remarks = Some(match reply.remarks {
            Some(remarks) => remarks,
            None => encode(updated.remarks_blob(), &prepared.comment),
        });
        tracing::info!(application_id, status = %updated.status, actor = %self.actor, "status changed");
        self.upsert(updated.clone());
        Ok(updated)
    }

    fn find(&self, application_id: &str) -> Option<&ApplicationRecord> {
        self.records.iter().find(|record| record.application_id == application_id)
    }

    fn upsert(&mut self, record: ApplicationRecord) {
        match self.records.iter_mut().find(|existing| existing.application_id == record.application_id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::aggregate::{DateRange, FilterSpec, PageSpec, SortSpec, ALL_KEY, DEFAULT_PAGE_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ViewState {
    pub filter: FilterSpec,
    pub sort: SortSpec,
    pub page: usize,
    pub page_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl ViewState {
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            filter: FilterSpec::default(),
            sort: SortSpec::default(),
            page: 1,
            page_size: page_size.max(1),
            selection: None,
        }
    }

    #[must_use]
    pub fn page_spec(&self) -> PageSpec {
        PageSpec { page: self.page, page_size: self.page_size }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ViewAction {
    Search { term: String },
    SelectCategory { key: String },
    SetDateRange { range: Option<DateRange> },
    SetStatus { status: Option<String> },
    SortBy { key: String },
    GoToPage { page: usize },
    NextPage { total_pages: usize },
    PreviousPage,
    Select { application_id: String },
    ClearSelection,
    Reset,
}

#[must_use]
pub fn reduce(state: &ViewState, action: ViewAction) -> ViewState {
    let mut next = state.clone();
    match action {
        ViewAction::Search { term } => {
            next.filter.search_term = term;
            next.page = 1;
        }
        ViewAction::SelectCategory { key } => {
            next.filter.category_key = if key.trim().is_empty() { ALL_KEY.to_string() } else { key };
            next.page = 1;
        }
        ViewAction::SetDateRange { range } => {
            next.filter.date_range = range;
            next.page = 1;
        }
        ViewAction::SetStatus { status } => {
            next.filter.status_key = status;
            next.page = 1;
        }
        ViewAction::SortBy { key } => {
            next.sort = state.sort.toggled(&key);
        }
        ViewAction::GoToPage { page } => {
            next.page = page.max(1);
        }
        ViewAction::NextPage { total_pages } => {
            if state.page < total_pages {
                next.page = state.page + 1;
            }
        }
        ViewAction::PreviousPage => {
            next.page = state.page.saturating_sub(1).max(1);
        }
        ViewAction::Select { application_id } => {
            next.selection = Some(application_id);
        }
        ViewAction::ClearSelection => {
            next.selection = None;
        }
        ViewAction::Reset => {
            next = ViewState::with_page_size(state.page_size);
        }
    }
    next
}

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, Duration, Month};

use crate::error::ValidationError;
use crate::record::{ApplicationRecord, PermitDomain};
use crate::status::{normalize_wire, PermitStatus};

pub const ALL_KEY: &str = "all";
pub const UNKNOWN_KEY: &str = "unknown";
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const WEEKLY_BUCKETS: usize = 8;
pub const MONTHLY_BUCKETS: usize = 12;

time::serde::format_description!(date_format, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct DateRange {
    #[serde(with = "date_format")]
    pub start: Date,
    #[serde(with = "date_format")]
    pub end: Date,
}

impl DateRange {
    /// # Errors
    /// Returns [`ValidationError::InvalidDateRange`] when `start` is after `end`.
    pub fn new(start: Date, end: Date) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Inclusive on both ends.
    #[must_use]
    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }
}

fn all_key() -> String {
    ALL_KEY.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct FilterSpec {
    #[serde(default)]
    pub search_term: String,
    /// Fields searched by `search_term`; empty means the view's configured fields.
    #[serde(default)]
    pub domain_fields: Vec<String>,
    #[serde(default = "all_key")]
    pub category_key: String,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub status_key: Option<String>,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            domain_fields: Vec::new(),
            category_key: all_key(),
            date_range: None,
            status_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortDirection {
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SortSpec {
    pub key: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self { key: "created_at".to_string(), direction: SortDirection::Descending }
    }
}

impl SortSpec {
    #[must_use]
    pub fn ascending(key: impl Into<String>) -> Self {
        Self { key: key.into(), direction: SortDirection::Ascending }
    }

    /// Selecting the active key flips direction; any other key starts ascending.
    #[must_use]
    pub fn toggled(&self, key: &str) -> Self {
        if self.key == key {
            Self { key: self.key.clone(), direction: self.direction.flipped() }
        } else {
            Self::ascending(key)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct PageSpec {
    /// 1-based; 0 is treated as 1.
    pub page: usize,
    pub page_size: usize,
}

impl Default for PageSpec {
    fn default() -> Self {
        Self { page: 1, page_size: DEFAULT_PAGE_SIZE }
    }
}

/// Per-view configuration: which fields search, categorize, date and group records.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ViewConfig {
    pub search_fields: Vec<String>,
    pub category_field: String,
    pub categories: Vec<String>,
    pub date_field: String,
    pub group_field: String,
    pub top_n: usize,
    pub page_size: usize,
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

impl ViewConfig {
    #[must_use]
    pub fn for_domain(domain: PermitDomain) -> Self {
        let (search_fields, category_field, categories, group_field) = match domain {
            PermitDomain::Business => (
                owned(&[
                    "business_name",
                    "first_name",
                    "last_name",
                    "barangay",
                    "business_type",
                    "application_id",
                    "email",
                ]),
                "business_type",
                owned(&["sole proprietorship", "partnership", "corporation", "cooperative"]),
                "barangay",
            ),
            PermitDomain::Building => (
                owned(&[
                    "first_name",
                    "last_name",
                    "lot_location",
                    "barangay",
                    "permit_type",
                    "application_id",
                    "email",
                ]),
                "permit_type",
                owned(&["new construction", "renovation", "addition", "demolition"]),
                "barangay",
            ),
            PermitDomain::Franchise => (
                owned(&[
                    "first_name",
                    "last_name",
                    "route",
                    "barangay",
                    "plate_number",
                    "vehicle_type",
                    "application_id",
                    "email",
                ]),
                "vehicle_type",
                owned(&["tricycle", "e-trike", "pedicab"]),
                "route",
            ),
            PermitDomain::Barangay => (
                owned(&[
                    "first_name",
                    "last_name",
                    "barangay",
                    "purpose",
                    "clearance_type",
                    "application_id",
                    "email",
                ]),
                "clearance_type",
                owned(&["residency", "indigency", "good moral", "business"]),
                "barangay",
            ),
        };

        Self {
            search_fields,
            category_field: category_field.to_string(),
            categories,
            date_field: "created_at".to_string(),
            group_field: group_field.to_string(),
            top_n: 5,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CategoryCount {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct CategoryCounts {
    /// Equals the collection length.
    pub all: usize,
    pub by_key: Vec<CategoryCount>,
    /// Records matching no configured category.
    pub unknown: usize,
}

impl CategoryCounts {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<usize> {
        if key.eq_ignore_ascii_case(ALL_KEY) {
            return Some(self.all);
        }
        if key.eq_ignore_ascii_case(UNKNOWN_KEY) {
            return Some(self.unknown);
        }
        self.by_key.iter().find(|entry| entry.key.eq_ignore_ascii_case(key)).map(|entry| entry.count)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct GroupCount {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TimeBucket {
    pub label: String,
    #[serde(with = "date_format")]
    pub start: Date,
    #[serde(with = "date_format")]
    pub end: Date,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SummaryStats {
    pub total: usize,
    /// Keyed by normalized wire value; blank statuses count as `unknown`.
    pub by_status: BTreeMap<String, usize>,
    pub approved: usize,
    pub rejected: usize,
    pub pending: usize,
    pub under_review: usize,
    pub approval_rate: f64,
    pub rejection_rate: f64,
    pub top_groups: Vec<GroupCount>,
    pub weekly: Vec<TimeBucket>,
    pub monthly: Vec<TimeBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewResult {
    pub items: Vec<ApplicationRecord>,
    pub total_count: usize,
    pub total_pages: usize,
    pub page: usize,
    pub page_size: usize,
    pub per_category_counts: CategoryCounts,
    pub summary: SummaryStats,
}

#[derive(Debug, Clone)]
pub struct CollectionAggregator {
    config: ViewConfig,
}

impl CollectionAggregator {
    #[must_use]
    pub fn new(config: ViewConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn for_domain(domain: PermitDomain) -> Self {
        Self::new(ViewConfig::for_domain(domain))
    }

    #[must_use]
    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Filter, sort, paginate and summarize in one pass over the snapshot.
    ///
    /// Summary statistics cover the whole filtered set, not just the page.
    /// Time buckets end at `as_of`.
    #[must_use]
    pub fn view(
        &self,
        collection: &[ApplicationRecord],
        filter: &FilterSpec,
        sort: &SortSpec,
        page: &PageSpec,
        as_of: Date,
    ) -> ViewResult {
        let mut filtered = self.filter(collection, filter);
        sort_records(&mut filtered, sort);

        let page_size = page.page_size.max(1);
        let current_page = page.page.max(1);
        let items = paginate(&filtered, current_page, page_size).iter().map(|record| (*record).clone()).collect();

        ViewResult {
            items,
            total_count: filtered.len(),
            total_pages: total_pages(filtered.len(), page_size),
            page: current_page,
            page_size,
            per_category_counts: self.category_counts(collection),
            summary: self.summarize(&filtered, as_of),
        }
    }

    /// Records passing every active predicate, in collection order.
    #[must_use]
    pub fn filter<'a>(
        &self,
        collection: &'a [ApplicationRecord],
        filter: &FilterSpec,
    ) -> Vec<&'a ApplicationRecord> {
        let term = filter.search_term.trim().to_lowercase();
        let search_fields =
            if filter.domain_fields.is_empty() { &self.config.search_fields } else { &filter.domain_fields };
        let status_key = filter
            .status_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && !key.eq_ignore_ascii_case(ALL_KEY))
            .map(status_bucket);

        collection
            .iter()
            .filter(|record| term.is_empty() || matches_search(record, search_fields, &term))
            .filter(|record| self.matches_category(record, &filter.category_key))
            .filter(|record| {
                filter.date_range.is_none_or(|range| {
                    record.date_of(&self.config.date_field).is_some_and(|date| range.contains(date))
                })
            })
            .filter(|record| {
                status_key.as_deref().is_none_or(|key| status_bucket(&record.status) == key)
            })
            .collect()
    }

    /// Case-insensitive substring match of `category_key` in the category field.
    /// The `all` key matches everything.
    #[must_use]
    pub fn matches_category(&self, record: &ApplicationRecord, category_key: &str) -> bool {
        let key = category_key.trim().to_lowercase();
        if key.is_empty() || key == ALL_KEY {
            return true;
        }
        if key == UNKNOWN_KEY {
            return !self.config.categories.iter().any(|category| self.matches_category(record, category));
        }
        record
            .field_text(&self.config.category_field)
            .is_some_and(|value| value.to_lowercase().contains(&key))
    }

    /// Tab counts over the whole collection, using the same predicate as filtering.
    #[must_use]
    pub fn category_counts(&self, collection: &[ApplicationRecord]) -> CategoryCounts {
        let by_key = self
            .config
            .categories
            .iter()
            .map(|category| CategoryCount {
                key: category.clone(),
                count: collection.iter().filter(|record| self.matches_category(record, category)).count(),
            })
            .collect();
        let unknown =
            collection.iter().filter(|record| self.matches_category(record, UNKNOWN_KEY)).count();
        CategoryCounts { all: collection.len(), by_key, unknown }
    }

    #[must_use]
    pub fn summarize(&self, records: &[&ApplicationRecord], as_of: Date) -> SummaryStats {
        let total = records.len();
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        for record in records {
            *by_status.entry(status_bucket(&record.status)).or_default() += 1;
        }
        let count_of = |status: PermitStatus| by_status.get(status.as_wire()).copied().unwrap_or(0);
        let approved = count_of(PermitStatus::Approved);
        let rejected = count_of(PermitStatus::Rejected);
        let pending = count_of(PermitStatus::Pending);
        let under_review = count_of(PermitStatus::UnderReview);

        let dates = records.iter().filter_map(|record| record.date_of(&self.config.date_field)).collect::<Vec<_>>();

        SummaryStats {
            total,
            approved,
            rejected,
            pending,
            under_review,
            approval_rate: rate(approved, total),
            rejection_rate: rate(rejected, total),
            top_groups: top_groups(records, &self.config.group_field, self.config.top_n),
            weekly: fill_buckets(weekly_buckets(as_of), &dates),
            monthly: fill_buckets(monthly_buckets(as_of), &dates),
            by_status,
        }
    }
}

/// Normalized wire form used for status grouping and filtering.
fn status_bucket(status: &str) -> String {
    match PermitStatus::parse(status) {
        Some(parsed) => parsed.as_wire().to_string(),
        None if status.trim().is_empty() => UNKNOWN_KEY.to_string(),
        None => normalize_wire(status),
    }
}

fn matches_search(record: &ApplicationRecord, fields: &[String], term: &str) -> bool {
    fields
        .iter()
        .filter_map(|field| record.field_text(field))
        .any(|value| value.to_lowercase().contains(term))
}

/// Stable single-key sort; records missing the key sort last in either direction.
pub fn sort_records(records: &mut [&ApplicationRecord], sort: &SortSpec) {
    records.sort_by(|lhs, rhs| {
        match (lhs.field_text(&sort.key), rhs.field_text(&sort.key)) {
            (Some(lhs), Some(rhs)) => {
                let ordering = compare_values(&lhs, &rhs);
                match sort.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

fn numeric_value(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|number| number.is_finite())
}

// Numbers rank before text; exact text breaks ties so equal keys never depend on input order.
fn compare_values(lhs: &str, rhs: &str) -> Ordering {
    let ordering = match (numeric_value(lhs), numeric_value(rhs)) {
        (Some(lhs), Some(rhs)) => lhs.total_cmp(&rhs),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => lhs.to_lowercase().cmp(&rhs.to_lowercase()),
    };
    ordering.then_with(|| lhs.cmp(rhs))
}

#[must_use]
pub fn total_pages(count: usize, page_size: usize) -> usize {
    count.div_ceil(page_size.max(1))
}

/// The contiguous slice for a 1-based page, clamped to the available items.
#[must_use]
pub fn paginate<T>(items: &[T], page: usize, page_size: usize) -> &[T] {
    let page_size = page_size.max(1);
    let start = page.max(1).saturating_sub(1).saturating_mul(page_size).min(items.len());
    let end = start.saturating_add(page_size).min(items.len());
    &items[start..end]
}

/// `part / total`, 0.0 for an empty collection.
#[must_use]
pub fn rate(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let part = u32::try_from(part).unwrap_or(u32::MAX);
    let total = u32::try_from(total).unwrap_or(u32::MAX);
    f64::from(part) / f64::from(total)
}

fn top_groups(records: &[&ApplicationRecord], field: &str, limit: usize) -> Vec<GroupCount> {
    let mut groups: BTreeMap<String, (String, usize)> = BTreeMap::new();
    for record in records {
        let Some(value) = record.field_text(field) else {
            continue;
        };
        let display = value.trim();
        if display.is_empty() {
            continue;
        }
        groups.entry(display.to_lowercase()).or_insert_with(|| (display.to_string(), 0)).1 += 1;
    }

    let mut ranked = groups
        .into_values()
        .map(|(key, count)| GroupCount { key, count })
        .collect::<Vec<_>>();
    ranked.sort_by(|lhs, rhs| rhs.count.cmp(&lhs.count).then_with(|| lhs.key.cmp(&rhs.key)));
    ranked.truncate(limit);
    ranked
}

/// Eight rolling seven-day windows, oldest first, the last one ending on `as_of`.
#[must_use]
pub fn weekly_buckets(as_of: Date) -> Vec<TimeBucket> {
    let label_format = format_description!("[month repr:short] [day padding:none]");
    (0..WEEKLY_BUCKETS)
        .rev()
        .filter_map(|weeks_back| {
            let weeks_back = i64::try_from(weeks_back).ok()?;
            let end = as_of.checked_sub(Duration::weeks(weeks_back))?;
            let start = end.checked_sub(Duration::days(6))?;
            Some(TimeBucket {
                label: start.format(label_format).unwrap_or_else(|_| start.to_string()),
                start,
                end,
                count: 0,
            })
        })
        .collect()
}

/// The twelve calendar months up to and including the month of `as_of`, oldest first.
#[must_use]
pub fn monthly_buckets(as_of: Date) -> Vec<TimeBucket> {
    let label_format = format_description!("[month repr:short] [year]");
    let mut months: Vec<(i32, Month)> = Vec::with_capacity(MONTHLY_BUCKETS);
    let (mut year, mut month) = (as_of.year(), as_of.month());
    for _ in 0..MONTHLY_BUCKETS {
        months.push((year, month));
        month = month.previous();
        if month == Month::December {
            year -= 1;
        }
    }

    months
        .into_iter()
        .rev()
        .filter_map(|(year, month)| {
            let start = Date::from_calendar_date(year, month, 1).ok()?;
            let next_year = if month == Month::December { year + 1 } else { year };
            let end = Date::from_calendar_date(next_year, month.next(), 1).ok()?.previous_day()?;
            Some(TimeBucket {
                label: start.format(label_format).unwrap_or_else(|_| start.to_string()),
                start,
                end,
                count: 0,
            })
        })
        .collect()
}

fn fill_buckets(mut buckets: Vec<TimeBucket>, dates: &[Date]) -> Vec<TimeBucket> {
    for bucket in &mut buckets {
        bucket.count = dates.iter().filter(|&&date| bucket.start <= date && date <= bucket.end).count();
    }
    buckets
}

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PermitDomain {
    Business,
    Building,
    Franchise,
    Barangay,
}

impl PermitDomain {
    pub const ALL: [Self; 4] = [Self::Business, Self::Building, Self::Franchise, Self::Barangay];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Building => "building",
            Self::Franchise => "franchise",
            Self::Barangay => "barangay",
        }
    }

    /// Accepts the canonical name in any case; `transport` is an alias of `franchise`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "business" => Some(Self::Business),
            "building" => Some(Self::Building),
            "franchise" | "transport" => Some(Self::Franchise),
            "barangay" => Some(Self::Barangay),
            _ => None,
        }
    }

    #[must_use]
    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::Business => "BP",
            Self::Building => "BLD",
            Self::Franchise => "FR",
            Self::Barangay => "BRGY",
        }
    }

    /// Infer the domain from a prefixed identifier such as `BP-0001`.
    #[must_use]
    pub fn from_application_id(application_id: &str) -> Option<Self> {
        let (prefix, _) = application_id.trim().split_once('-')?;
        Self::ALL.into_iter().find(|domain| prefix.eq_ignore_ascii_case(domain.id_prefix()))
    }
}

impl Display for PermitDomain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationRecord {
    #[serde(alias = "id", deserialize_with = "string_or_number")]
    pub application_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<PermitDomain>,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub status: String,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl ApplicationRecord {
    #[must_use]
    pub fn new(application_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            domain: None,
            status: status.into(),
            remarks: None,
            created_at: None,
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_domain(mut self, domain: PermitDomain) -> Self {
        self.domain = Some(domain);
        self
    }

    #[must_use]
    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Explicit domain if the backend (or client) set one, otherwise inferred from the id prefix.
    #[must_use]
    pub fn domain(&self) -> Option<PermitDomain> {
        self.domain.or_else(|| PermitDomain::from_application_id(&self.application_id))
    }

    /// The raw audit blob, empty when the backend sent none.
    #[must_use]
    pub fn remarks_blob(&self) -> &str {
        self.remarks.as_deref().unwrap_or("")
    }

    /// Text form of a field. Numbers and booleans are rendered as strings;
    /// nulls, arrays and objects have no text form.
    #[must_use]
    pub fn field_text(&self, key: &str) -> Option<String> {
        match key {
            "application_id" => Some(self.application_id.clone()),
            "status" => Some(self.status.clone()),
            "remarks" => self.remarks.clone(),
            "created_at" => self.created_at.clone(),
            "domain" => self.domain().map(|domain| domain.as_str().to_string()),
            _ => match self.fields.get(key)? {
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                Value::Bool(flag) => Some(flag.to_string()),
                Value::Null | Value::Array(_) | Value::Object(_) => None,
            },
        }
    }

    /// True when the field exists and is not blank.
    #[must_use]
    pub fn has_value(&self, key: &str) -> bool {
        self.field_text(key).is_some_and(|text| !text.trim().is_empty())
    }

    #[must_use]
    pub fn date_of(&self, key: &str) -> Option<Date> {
        self.field_text(key).as_deref().and_then(parse_date)
    }
}

/// Parse the date part of a backend timestamp.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and bare
/// `YYYY-MM-DD`. Anything else yields `None`.
#[must_use]
pub fn parse_date(text: &str) -> Option<Date> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(parsed.date());
    }
    let date_part = trimmed.split([' ', 'T']).next()?;
    Date::parse(date_part, format_description!("[year]-[month]-[day]")).ok()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number, found {other}"))),
    }
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        Value::Number(number) => Ok(Some(number.to_string())),
        other => Err(serde::de::Error::custom(format!("expected text, found {other}"))),
    }
}

fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    optional_text(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    #[test]
    fn deserializes_numeric_ids_and_null_remarks() {
        let record: ApplicationRecord = match serde_json::from_value(serde_json::json!({
            "id": 17,
            "status": "under_review",
            "remarks": null,
            "created_at": "2024-03-05 08:15:00",
            "first_name": "Ana",
            "plate_number": "ABC 123",
            "fare": 15
        })) {
            Ok(record) => record,
            Err(err) => panic!("record should deserialize: {err}"),
        };

        assert_eq!(record.application_id, "17");
        assert_eq!(record.remarks_blob(), "");
        assert_eq!(record.field_text("fare").as_deref(), Some("15"));
        assert_eq!(record.field_text("first_name").as_deref(), Some("Ana"));
        assert_eq!(record.date_of("created_at"), Date::from_calendar_date(2024, Month::March, 5).ok());
    }

    #[test]
    fn null_status_becomes_empty() {
        let record: ApplicationRecord = match serde_json::from_value(serde_json::json!({
            "application_id": "BP-0001",
            "status": null
        })) {
            Ok(record) => record,
            Err(err) => panic!("record should deserialize: {err}"),
        };
        assert_eq!(record.status, "");
    }

    #[test]
    fn domain_is_inferred_from_prefix_when_absent() {
        assert_eq!(
            ApplicationRecord::new("FR-0042", "pending").domain(),
            Some(PermitDomain::Franchise)
        );
        assert_eq!(ApplicationRecord::new("bld-7", "pending").domain(), Some(PermitDomain::Building));
        assert_eq!(ApplicationRecord::new("42", "pending").domain(), None);
        assert_eq!(
            ApplicationRecord::new("42", "pending").with_domain(PermitDomain::Barangay).domain(),
            Some(PermitDomain::Barangay)
        );
    }

    #[test]
    fn blank_fields_do_not_count_as_present() {
        let record = ApplicationRecord::new("BP-1", "pending")
            .with_field("business_name", "   ")
            .with_field("owner", serde_json::Value::Null)
            .with_field("barangay", "Uno");
        assert!(!record.has_value("business_name"));
        assert!(!record.has_value("owner"));
        assert!(!record.has_value("missing"));
        assert!(record.has_value("barangay"));
    }

    #[test]
    fn parse_date_accepts_backend_formats() {
        let expected = Date::from_calendar_date(2024, Month::January, 9).ok();
        assert_eq!(parse_date("2024-01-09"), expected);
        assert_eq!(parse_date("2024-01-09 23:59:59"), expected);
        assert_eq!(parse_date("2024-01-09T10:00:00"), expected);
        assert_eq!(parse_date("2024-01-09T10:00:00Z"), expected);
        assert_eq!(parse_date("09/01/2024"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn domain_parse_accepts_transport_alias() {
        assert_eq!(PermitDomain::parse("Transport"), Some(PermitDomain::Franchise));
        assert_eq!(PermitDomain::parse(" barangay "), Some(PermitDomain::Barangay));
        assert_eq!(PermitDomain::parse("zoning"), None);
    }
}

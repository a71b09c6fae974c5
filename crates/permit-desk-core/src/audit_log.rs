//! Append-only audit trail persisted as a single free-text blob.
//!
//! Each entry is written as a block:
//!
//! ```text
//! --- Jan 2, 2024, 9:00:00 AM (Admin) ---
//! Approved pending fee
//!
//! ```
//!
//! New blocks are prepended, so a blob reads newest-first. In memory the
//! trail is always a `Vec<AuditEntry>`; the blob format only exists at the
//! storage boundary.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;

/// Timestamp given to text that does not carry a block header.
pub const UNPARSED_TIMESTAMP: &str = "Just now";

/// Actor shown for entries that carry none.
pub const DEFAULT_ACTOR: &str = "Admin";

const HEADER_PATTERN: &str = r"^---[ \t]+(.+?)(?:[ \t]+\(([^()\r\n]*)\))?[ \t]+---[ \t]*\r?$";

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AuditEntry {
    pub timestamp: String,
    pub actor: Option<String>,
    pub text: String,
}

impl AuditEntry {
    #[must_use]
    pub fn new(
        timestamp: impl Into<String>,
        actor: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self { timestamp: timestamp.into(), actor: Some(actor.into()), text: text.into() }
    }

    /// Entry stamped with the current UTC time.
    #[must_use]
    pub fn now(actor: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(format_timestamp(OffsetDateTime::now_utc()), actor, text)
    }

    #[must_use]
    pub fn display_actor(&self) -> &str {
        self.actor.as_deref().filter(|actor| !actor.trim().is_empty()).unwrap_or(DEFAULT_ACTOR)
    }
}

/// Render a timestamp the way the dashboard displays it, e.g. `Jan 2, 2024, 9:00:00 AM`.
#[must_use]
pub fn format_timestamp(at: OffsetDateTime) -> String {
    let format = format_description!(
        "[month repr:short] [day padding:none], [year], [hour repr:12 padding:none]:[minute]:[second] [period]"
    );
    at.format(format).unwrap_or_else(|_| at.to_string())
}

/// Prepend `entry` to `existing_blob`.
#[must_use]
pub fn encode(existing_blob: &str, entry: &AuditEntry) -> String {
    let mut blob = format_block(entry);
    blob.push_str(existing_blob);
    blob
}

/// Decode a blob into entries, newest first.
#[must_use]
pub fn decode(blob: &str) -> Vec<AuditEntry> {
    decode_with_report(blob).entries
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DecodeReport {
    pub entries: Vec<AuditEntry>,
    /// Pieces that did not start with a block header and were kept as a
    /// single fallback entry each.
    pub malformed_blocks: usize,
}

#[must_use]
pub fn decode_with_report(blob: &str) -> DecodeReport {
    let mut report = DecodeReport::default();
    if blob.trim().is_empty() {
        return report;
    }

    let mut boundaries = vec![0];
    let mut offset = 0;
    for line in blob.split_inclusive('\n') {
        if offset > 0 && is_header_line(line.trim_end_matches('\n')) {
            boundaries.push(offset);
        }
        offset += line.len();
    }
    boundaries.push(blob.len());

    for window in boundaries.windows(2) {
        let piece = &blob[window[0]..window[1]];
        if piece.trim().is_empty() {
            continue;
        }
        match parse_block(piece) {
            Some(entry) => report.entries.push(entry),
            None => {
                report.malformed_blocks += 1;
                report.entries.push(AuditEntry {
                    timestamp: UNPARSED_TIMESTAMP.to_string(),
                    actor: None,
                    text: piece.trim().to_string(),
                });
            }
        }
    }

    if report.malformed_blocks > 0 {
        tracing::warn!(
            malformed_blocks = report.malformed_blocks,
            entries = report.entries.len(),
            "audit blob contained text without block headers"
        );
    }
    report
}

/// In-memory audit trail, newest entry first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    #[must_use]
    pub fn from_blob(blob: &str) -> Self {
        Self { entries: decode(blob) }
    }

    #[must_use]
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    #[must_use]
    pub fn latest(&self) -> Option<&AuditEntry> {
        self.entries.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record(&mut self, entry: AuditEntry) {
        self.entries.insert(0, entry);
    }

    /// Serialize back to the blob format. Fallback entries are written with
    /// proper headers.
    #[must_use]
    pub fn to_blob(&self) -> String {
        self.entries.iter().rev().fold(String::new(), |blob, entry| encode(&blob, entry))
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<AuditEntry> {
        self.entries
    }
}

fn header_regex() -> Option<&'static Regex> {
    static HEADER: OnceLock<Option<Regex>> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(HEADER_PATTERN).ok()).as_ref()
}

fn is_header_line(line: &str) -> bool {
    header_regex().is_some_and(|regex| regex.is_match(line))
}

fn parse_block(piece: &str) -> Option<AuditEntry> {
    let (header, rest) = piece.split_once('\n').unwrap_or((piece, ""));
    let captures = header_regex()?.captures(header)?;
    let timestamp = captures.get(1)?.as_str().to_string();
    let actor = captures.get(2).map(|actor| actor.as_str().to_string());
    let text = rest
        .strip_suffix("\n\n")
        .or_else(|| rest.strip_suffix("\r\n\r\n"))
        .unwrap_or_else(|| rest.trim_end_matches(['\r', '\n']));
    Some(AuditEntry { timestamp, actor, text: text.to_string() })
}

fn format_block(entry: &AuditEntry) -> String {
    let timestamp = single_line(&entry.timestamp);
    let timestamp = if timestamp.is_empty() { UNPARSED_TIMESTAMP.to_string() } else { timestamp };
    let actor: String = single_line(entry.display_actor()).replace(['(', ')'], "");
    let actor = if actor.trim().is_empty() { DEFAULT_ACTOR } else { actor.trim() };
    format!("--- {timestamp} ({actor}) ---\n{}\n\n", entry.text)
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn blank_blobs_decode_to_nothing() {
        assert!(decode("").is_empty());
        assert!(decode("   ").is_empty());
        assert!(decode("\n\n\t").is_empty());
    }

    #[test]
    fn encoding_prepends_to_existing_blob() {
        let existing = "--- Jan 1, 2024, 10:00 AM (Admin) ---\nInitial review\n\n";
        let entry = AuditEntry::new("Jan 2, 2024, 9:00 AM", "Admin", "Approved pending fee");
        let blob = encode(existing, &entry);

        assert_eq!(
            blob,
            "--- Jan 2, 2024, 9:00 AM (Admin) ---\nApproved pending fee\n\n\
             --- Jan 1, 2024, 10:00 AM (Admin) ---\nInitial review\n\n"
        );

        let entries = decode(&blob);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "Approved pending fee");
        assert_eq!(entries[0].timestamp, "Jan 2, 2024, 9:00 AM");
        assert_eq!(entries[0].actor.as_deref(), Some("Admin"));
        assert_eq!(entries[1].text, "Initial review");
        assert_eq!(entries[1].timestamp, "Jan 1, 2024, 10:00 AM");
    }

    #[test]
    fn legacy_text_becomes_single_fallback_entry() {
        let report = decode_with_report("Documents incomplete, please resubmit.");
        assert_eq!(report.malformed_blocks, 1);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].timestamp, UNPARSED_TIMESTAMP);
        assert_eq!(report.entries[0].actor, None);
        assert_eq!(report.entries[0].display_actor(), DEFAULT_ACTOR);
        assert_eq!(report.entries[0].text, "Documents incomplete, please resubmit.");
    }

    #[test]
    fn legacy_text_below_new_entries_is_kept() {
        let entry = AuditEntry::new("Mar 3, 2024, 1:00:00 PM", "Clerk", "Forwarded to inspector");
        let blob = encode("old free-form note\nsecond line", &entry);
        let report = decode_with_report(&blob);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.malformed_blocks, 1);
        assert_eq!(report.entries[0].text, "Forwarded to inspector");
        assert_eq!(report.entries[1].text, "old free-form note\nsecond line");
    }

    #[test]
    fn header_without_actor_still_parses() {
        let entries = decode("--- Feb 1, 2024 ---\nSite visit done\n\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp, "Feb 1, 2024");
        assert_eq!(entries[0].actor, None);
        assert_eq!(entries[0].text, "Site visit done");
    }

    #[test]
    fn windows_line_endings_are_tolerated() {
        let entries = decode("--- Feb 1, 2024 (Admin) ---\r\nChecked\r\n\r\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp, "Feb 1, 2024");
        assert_eq!(entries[0].text, "Checked");
    }

    #[test]
    fn dashes_inside_text_do_not_split_blocks() {
        let entry = AuditEntry::new("Jan 5, 2024", "Admin", "fee --- waived\n--- not a header");
        let entries = decode(&encode("", &entry));
        assert_eq!(entries, vec![entry]);
    }

    #[test]
    fn actor_parentheses_are_stripped_on_encode() {
        let entry = AuditEntry::new("Jan 5, 2024", "Ana (Treasury)", "Paid");
        let entries = decode(&encode("", &entry));
        assert_eq!(entries[0].actor.as_deref(), Some("Ana Treasury"));
    }

    #[test]
    fn trail_records_newest_first_and_serializes_back() {
        let mut trail = AuditTrail::from_blob("");
        trail.record(AuditEntry::new("t1", "Admin", "first"));
        trail.record(AuditEntry::new("t2", "Admin", "second"));
        assert_eq!(trail.latest().map(|entry| entry.text.as_str()), Some("second"));

        let blob = trail.to_blob();
        assert!(blob.starts_with("--- t2 (Admin) ---\nsecond\n\n"));
        assert_eq!(AuditTrail::from_blob(&blob), trail);
    }

    #[test]
    fn formats_dashboard_timestamps() {
        assert_eq!(format_timestamp(datetime!(2024-01-02 09:00:05 UTC)), "Jan 2, 2024, 9:00:05 AM");
        assert_eq!(format_timestamp(datetime!(2024-11-20 15:30:00 UTC)), "Nov 20, 2024, 3:30:00 PM");
    }

    fn entry_strategy() -> impl Strategy<Value = AuditEntry> {
        (
            "[A-Za-z0-9][A-Za-z0-9 ,:]{0,18}[A-Za-z0-9]",
            "[A-Za-z]{1,12}",
            "[A-Za-z0-9 .,\n]{0,60}",
        )
            .prop_map(|(timestamp, actor, text)| AuditEntry {
                timestamp,
                actor: Some(actor),
                text,
            })
    }

    proptest! {
        #[test]
        fn decode_inverts_repeated_encode(entries in prop::collection::vec(entry_strategy(), 0..12)) {
            let blob = entries.iter().fold(String::new(), |blob, entry| encode(&blob, entry));
            let decoded = decode(&blob);
            let expected = entries.iter().rev().cloned().collect::<Vec<_>>();
            prop_assert_eq!(decoded, expected);
        }

        #[test]
        fn encode_is_pure_prepend(
            existing in "[A-Za-z0-9 .,\n]{0,80}",
            entry in entry_strategy(),
        ) {
            let blob = encode(&existing, &entry);
            prop_assert!(blob.ends_with(&existing));
            prop_assert_eq!(&blob[..blob.len() - existing.len()], format_block(&entry));
        }
    }
}

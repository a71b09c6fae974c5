use serde::Serialize;
use url::Url;

use crate::record::{ApplicationRecord, PermitDomain};

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
pub const DEFAULT_TYPE_NAME: &str = "File";

const BUSINESS_SLOTS: &[&str] = &[
    "dti_registration",
    "sec_registration",
    "barangay_clearance",
    "lease_contract",
    "sanitary_permit",
    "fire_safety_certificate",
    "community_tax_certificate",
    "official_receipt",
    "owner_signature",
];

const BUILDING_SLOTS: &[&str] = &[
    "lot_title",
    "tax_declaration",
    "architectural_plans",
    "structural_plans",
    "electrical_plans",
    "plumbing_plans",
    "bill_of_materials",
    "barangay_clearance",
    "official_receipt",
    "owner_signature",
];

const FRANCHISE_SLOTS: &[&str] = &[
    "proof_of_residency",
    "barangay_clearance",
    "lto_or_cr",
    "insurance_certificate",
    "drivers_license",
    "id_picture",
    "official_receipt",
    "nbi_clearance",
    "police_clearance",
    "medical_certificate",
    "toda_endorsement",
    "franchise_fee_receipt",
    "sticker_fee_receipt",
    "inspection_fee_receipt",
    "applicant_signature",
];

const BARANGAY_SLOTS: &[&str] = &[
    "valid_id",
    "proof_of_residency",
    "id_picture",
    "community_tax_certificate",
    "official_receipt",
    "applicant_signature",
];

/// Words rendered in upper case by [`humanize`].
const ACRONYMS: &[&str] = &["cr", "dti", "id", "lto", "nbi", "or", "sec", "toda"];

/// Words kept lower case by [`humanize`] unless they lead the label.
const MINOR_WORDS: &[&str] = &["a", "and", "for", "of", "the", "to"];

const LABEL_OVERRIDES: &[(&str, &str)] =
    &[("lto_or_cr", "LTO OR/CR"), ("drivers_license", "Driver's License")];

/// Extension → (MIME type, display name).
const EXTENSION_TABLE: &[(&str, &str, &str)] = &[
    ("pdf", "application/pdf", "PDF Document"),
    ("jpg", "image/jpeg", "Image"),
    ("jpeg", "image/jpeg", "Image"),
    ("png", "image/png", "Image"),
    ("gif", "image/gif", "Image"),
    ("bmp", "image/bmp", "Image"),
    ("webp", "image/webp", "Image"),
    ("doc", "application/msword", "Word Document"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "Word Document",
    ),
    ("txt", "text/plain", "Text File"),
    ("csv", "text/csv", "CSV File"),
    ("xls", "application/vnd.ms-excel", "Excel Spreadsheet"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", "Excel Spreadsheet"),
    ("zip", "application/zip", "ZIP Archive"),
    ("rar", "application/vnd.rar", "RAR Archive"),
];

#[must_use]
pub fn upload_slots(domain: PermitDomain) -> &'static [&'static str] {
    match domain {
        PermitDomain::Business => BUSINESS_SLOTS,
        PermitDomain::Building => BUILDING_SLOTS,
        PermitDomain::Franchise => FRANCHISE_SLOTS,
        PermitDomain::Barangay => BARANGAY_SLOTS,
    }
}

/// Every known slot across all domains, without duplicates, in first-seen order.
#[must_use]
pub fn all_upload_slots() -> Vec<&'static str> {
    let mut slots: Vec<&'static str> = Vec::new();
    for domain in PermitDomain::ALL {
        for &slot in upload_slots(domain) {
            if !slots.contains(&slot) {
                slots.push(slot);
            }
        }
    }
    slots
}

/// Turn a slot key such as `nbi_clearance` into `NBI Clearance`.
#[must_use]
pub fn humanize(slot_key: &str) -> String {
    if let Some((_, label)) = LABEL_OVERRIDES.iter().find(|(key, _)| *key == slot_key) {
        return (*label).to_string();
    }

    slot_key
        .split(['_', '-'])
        .filter(|word| !word.is_empty())
        .enumerate()
        .map(|(index, word)| {
            let lower = word.to_ascii_lowercase();
            if ACRONYMS.contains(&lower.as_str()) {
                lower.to_ascii_uppercase()
            } else if index > 0 && MINOR_WORDS.contains(&lower.as_str()) {
                lower
            } else {
                let mut chars = lower.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars).collect::<String>()
                })
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-cased extension of a filename or URL, ignoring any query or fragment.
#[must_use]
pub fn extension(filename: &str) -> Option<String> {
    let path = filename.split(['?', '#']).next().unwrap_or(filename);
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (stem, extension) = name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

fn lookup(filename: &str) -> Option<&'static (&'static str, &'static str, &'static str)> {
    let extension = extension(filename)?;
    EXTENSION_TABLE.iter().find(|(known, _, _)| *known == extension)
}

/// MIME type for a filename; [`DEFAULT_MIME_TYPE`] when the extension is unknown.
#[must_use]
pub fn mime_from_extension(filename: &str) -> &'static str {
    lookup(filename).map_or(DEFAULT_MIME_TYPE, |entry| entry.1)
}

#[must_use]
pub fn is_image(filename: &str) -> bool {
    mime_from_extension(filename).starts_with("image/")
}

/// Display name for a filename's type; [`DEFAULT_TYPE_NAME`] when unknown.
#[must_use]
pub fn file_type_name(filename: &str) -> &'static str {
    lookup(filename).map_or(DEFAULT_TYPE_NAME, |entry| entry.2)
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct AttachmentDescriptor {
    pub slot_key: String,
    pub label: String,
    pub filename: String,
    pub inferred_type: &'static str,
    pub type_name: &'static str,
    pub is_image: bool,
    pub resolved_url: String,
}

#[derive(Debug, Clone)]
pub struct AttachmentResolver {
    base_url: Url,
}

impl AttachmentResolver {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Descriptors for every upload slot on `record` that holds a non-blank value.
    ///
    /// Slots are taken from the record's domain; when the domain cannot be
    /// determined every known slot is considered.
    #[must_use]
    pub fn resolve(
        &self,
        record: &ApplicationRecord,
        application_id: &str,
    ) -> Vec<AttachmentDescriptor> {
        let slots = record.domain().map_or_else(all_upload_slots, |domain| upload_slots(domain).to_vec());

        slots
            .into_iter()
            .filter_map(|slot_key| {
                let filename = record.field_text(slot_key)?;
                let filename = filename.trim();
                if filename.is_empty() {
                    return None;
                }
                let inferred_type = mime_from_extension(filename);
                if inferred_type == DEFAULT_MIME_TYPE {
                    tracing::debug!(slot_key, filename, "unrecognized attachment type");
                }
                Some(AttachmentDescriptor {
                    slot_key: slot_key.to_string(),
                    label: humanize(slot_key),
                    filename: filename.to_string(),
                    inferred_type,
                    type_name: file_type_name(filename),
                    is_image: is_image(filename),
                    resolved_url: self.resolve_url(application_id, filename),
                })
            })
            .collect()
    }

    /// `<base>/uploads/<application_id>/<filename>`, or the value itself when
    /// it is already an absolute http(s) URL.
    #[must_use]
    pub fn resolve_url(&self, application_id: &str, filename: &str) -> String {
        if let Ok(absolute) = Url::parse(filename) {
            if matches!(absolute.scheme(), "http" | "https") {
                return absolute.into();
            }
        }

        let mut url = self.base_url.clone();
        let pushed = url
            .path_segments_mut()
            .map(|mut segments| {
                segments.pop_if_empty().extend(["uploads", application_id, filename]);
            })
            .is_ok();
        if pushed {
            url.into()
        } else {
            format!(
                "{}/uploads/{application_id}/{filename}",
                self.base_url.as_str().trim_end_matches('/')
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> AttachmentResolver {
        match Url::parse("https://permits.example.gov/api/") {
            Ok(url) => AttachmentResolver::new(url),
            Err(err) => panic!("fixture url should parse: {err}"),
        }
    }

    #[test]
    fn humanizes_slot_keys() {
        assert_eq!(humanize("proof_of_residency"), "Proof of Residency");
        assert_eq!(humanize("nbi_clearance"), "NBI Clearance");
        assert_eq!(humanize("toda_endorsement"), "TODA Endorsement");
        assert_eq!(humanize("lto_or_cr"), "LTO OR/CR");
        assert_eq!(humanize("drivers_license"), "Driver's License");
        assert_eq!(humanize("id_picture"), "ID Picture");
        assert_eq!(humanize("of_record"), "Of Record");
    }

    #[test]
    fn extension_table_drives_type_inference() {
        assert_eq!(mime_from_extension("scan.PDF"), "application/pdf");
        assert_eq!(mime_from_extension("photo.jpeg"), "image/jpeg");
        assert_eq!(mime_from_extension("photo.jpg?v=2"), "image/jpeg");
        assert_eq!(
            mime_from_extension("ledger.xlsx"),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(mime_from_extension("archive.tar.gz"), DEFAULT_MIME_TYPE);
        assert_eq!(mime_from_extension("README"), DEFAULT_MIME_TYPE);
        assert_eq!(mime_from_extension(".hidden"), DEFAULT_MIME_TYPE);

        assert!(is_image("id.webp"));
        assert!(is_image("id.BMP"));
        assert!(!is_image("id.pdf"));

        assert_eq!(file_type_name("form.docx"), "Word Document");
        assert_eq!(file_type_name("bundle.rar"), "RAR Archive");
        assert_eq!(file_type_name("data.bin"), DEFAULT_TYPE_NAME);
    }

    #[test]
    fn resolves_only_non_empty_slots() {
        let record = ApplicationRecord::new("FR-0007", "pending")
            .with_field("drivers_license", "license.jpg")
            .with_field("insurance_certificate", "")
            .with_field("nbi_clearance", "   ")
            .with_field("medical_certificate", "medical.pdf")
            .with_field("toda_endorsement", serde_json::Value::Null)
            .with_field("unrelated_field", "notes.txt");

        let attachments = resolver().resolve(&record, "FR-0007");
        assert_eq!(attachments.len(), 2);

        let license = &attachments[0];
        assert_eq!(license.slot_key, "drivers_license");
        assert_eq!(license.label, "Driver's License");
        assert_eq!(license.inferred_type, "image/jpeg");
        assert!(license.is_image);
        assert_eq!(
            license.resolved_url,
            "https://permits.example.gov/api/uploads/FR-0007/license.jpg"
        );

        assert_eq!(attachments[1].slot_key, "medical_certificate");
        assert_eq!(attachments[1].type_name, "PDF Document");
    }

    #[test]
    fn unique_filenames_give_unique_urls() {
        let record = ApplicationRecord::new("BRGY-0003", "pending")
            .with_field("valid_id", "id front.png")
            .with_field("proof_of_residency", "bill.pdf")
            .with_field("official_receipt", "or-123.pdf");
        let attachments = resolver().resolve(&record, "BRGY-0003");
        let mut urls = attachments.iter().map(|a| a.resolved_url.clone()).collect::<Vec<_>>();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 3);
        assert!(urls.iter().any(|url| url.ends_with("/uploads/BRGY-0003/id%20front.png")));
    }

    #[test]
    fn absolute_urls_are_used_as_is() {
        let record = ApplicationRecord::new("BP-0002", "pending")
            .with_field("sanitary_permit", "https://cdn.example.com/files/sanitary.pdf");
        let attachments = resolver().resolve(&record, "BP-0002");
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].resolved_url, "https://cdn.example.com/files/sanitary.pdf");
    }

    #[test]
    fn unknown_domain_scans_every_slot() {
        let record = ApplicationRecord::new("42", "pending")
            .with_field("lot_title", "title.pdf")
            .with_field("toda_endorsement", "toda.pdf");
        assert_eq!(resolver().resolve(&record, "42").len(), 2);
    }

    #[test]
    fn base_without_trailing_slash_still_nests_uploads() {
        let resolver = match Url::parse("http://localhost:8080/permits") {
            Ok(url) => AttachmentResolver::new(url),
            Err(err) => panic!("fixture url should parse: {err}"),
        };
        assert_eq!(
            resolver.resolve_url("BLD-1", "plan.pdf"),
            "http://localhost:8080/permits/uploads/BLD-1/plan.pdf"
        );
    }
}

//! Object keys for intake documents.
//!
//! Layout:
//!
//! ```text
//! patients/{clerk_id}/visits/{visit_ts}/{type}/{stem}-{millis}-{ingest_id}{ext}
//! ```
//!
//! e.g. `patients/user_2x/visits/2025-10-27T14-00-00-000Z/imaging/scan-1761573600000-<uuid>.png`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::document::DocumentType;

const FALLBACK_STEM: &str = "document";
const FALLBACK_SEGMENT: &str = "unknown";

/// Everything a key is derived from.
#[derive(Debug, Clone, Copy)]
pub struct KeyParts<'a> {
    pub clerk_id: &'a str,
    pub visit_timestamp: DateTime<Utc>,
    pub doc_type: DocumentType,
    pub original_filename: &'a str,
    pub uploaded_at: DateTime<Utc>,
    pub ingest_id: Uuid,
}

/// Derive the storage key for one document.
pub fn document_key(parts: &KeyParts<'_>) -> String {
    let (stem, ext) = split_extension(base_name(parts.original_filename));

    let stem = match sanitize(stem) {
        s if s.is_empty() => FALLBACK_STEM.to_string(),
        s => s,
    };
    let ext = sanitize(ext);

    format!(
        "patients/{}/visits/{}/{}/{}-{}-{}{}",
        segment(parts.clerk_id),
        visit_segment(parts.visit_timestamp),
        parts.doc_type,
        stem,
        parts.uploaded_at.timestamp_millis(),
        parts.ingest_id.simple(),
        ext,
    )
}

/// ISO-8601 UTC with `:` and `.` replaced by `-`, e.g. `2025-10-27T14-00-00-000Z`.
pub fn visit_segment(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

/// Last path component of a client-supplied filename, with either separator.
fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
}

/// Split `name` into stem and extension (dot included). A leading dot does not
/// start an extension, so `.env` has no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A sanitized key segment that cannot be empty or a relative path component.
fn segment(raw: &str) -> String {
    let cleaned = sanitize(raw.trim());
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        FALLBACK_SEGMENT.to_string()
    } else {
        cleaned
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Kind of medical document attached to a visit.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentType {
    Prescription,
    LabReport,
    Imaging,
    #[default]
    ClinicalNotes,
}

/// A document uploaded to object storage and attached to a visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestRecord {
    pub ingest_id: Uuid,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub s3_key: String,
    pub s3_bucket: String,
    pub s3_region: String,
    pub upload_timestamp: DateTime<Utc>,
    pub original_filename: String,
    pub file_size: i64,
    pub content_type: String,
}

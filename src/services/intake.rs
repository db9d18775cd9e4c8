use std::collections::HashMap;

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use garde::Validate;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::document::{DocumentType, IngestRecord};
use crate::models::user::User;
use crate::models::visit::{Visit, VisitForm, VisitStatus, VisitType};
use crate::services::storage::{BlobStore, StorageError};
use crate::services::storage_key::{self, KeyParts};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// One file read from the `medicalDocs` multipart field.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Raw intake submission as received, before validation.
#[derive(Debug, Default)]
pub struct IntakeSubmission {
    pub chief_complaint: Option<String>,
    pub visit_type: Option<String>,
    pub document_type_map: Option<String>,
    pub files: Vec<UploadedFile>,
}

/// A document with its resolved type and key, not yet uploaded.
#[derive(Debug, Clone)]
pub struct PlannedDocument {
    pub ingest_id: Uuid,
    pub doc_type: DocumentType,
    pub key: String,
    pub original_filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// A fully validated visit, ready for upload and persistence.
#[derive(Debug, Clone)]
pub struct VisitPlan {
    pub visit_id: Uuid,
    pub user_id: Uuid,
    pub pseudonym_id: String,
    pub visit_timestamp: DateTime<Utc>,
    pub visit_type: VisitType,
    pub chief_complaint: String,
    pub documents: Vec<PlannedDocument>,
}

impl VisitPlan {
    /// Assemble the visit aggregate from the stored documents.
    pub fn into_visit(self, ingests: Vec<IngestRecord>) -> Visit {
        Visit {
            id: self.visit_id,
            user_id: self.user_id,
            pseudonym_id: self.pseudonym_id,
            visit_timestamp: self.visit_timestamp,
            visit_type: self.visit_type,
            chief_complaint: self.chief_complaint,
            ingests,
            status: VisitStatus::Requested,
            created_at: self.visit_timestamp,
            updated_at: self.visit_timestamp,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Chief complaint is required.")]
    MissingChiefComplaint,

    #[error("Invalid visit form: {0}")]
    InvalidForm(String),

    #[error("Invalid visit type: {0}")]
    InvalidVisitType(String),

    #[error("Invalid documentTypeMap")]
    InvalidDocumentTypeMap,

    #[error("Invalid document type for {0}")]
    InvalidDocumentType(String),

    #[error("Failed to store {filename}: {source}")]
    Storage {
        filename: String,
        #[source]
        source: StorageError,
    },
}

/// Parse the `documentTypeMap` field: a JSON object of original filename to type.
pub fn parse_document_type_map(
    raw: Option<&str>,
) -> Result<HashMap<String, DocumentType>, IntakeError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(HashMap::new()),
        Some(raw) => raw,
    };

    let entries: HashMap<String, String> =
        serde_json::from_str(raw).map_err(|_| IntakeError::InvalidDocumentTypeMap)?;

    entries
        .into_iter()
        .map(|(filename, doc_type)| match doc_type.parse::<DocumentType>() {
            Ok(t) => Ok((filename, t)),
            Err(_) => Err(IntakeError::InvalidDocumentType(filename)),
        })
        .collect()
}

/// Type for a file: its entry in the map, otherwise clinical notes.
pub fn classify(map: &HashMap<String, DocumentType>, original_filename: &str) -> DocumentType {
    map.get(original_filename).copied().unwrap_or_default()
}

/// Short visit label, e.g. `P-3F2A-5123`: the tail of the user id and of the epoch millis.
pub fn pseudonym_for(user_id: Uuid, at: DateTime<Utc>) -> String {
    let id = user_id.simple().to_string().to_uppercase();
    let millis = at.timestamp_millis().to_string();
    format!("P-{}-{}", tail(&id, 4), tail(&millis, 4))
}

fn tail(s: &str, n: usize) -> &str {
    &s[s.len().saturating_sub(n)..]
}

/// Validate a submission and lay out the visit: ids, pseudonym, and one key per file.
///
/// Nothing is uploaded here, so a rejected submission leaves no objects behind.
pub fn plan_visit(
    user: &User,
    submission: IntakeSubmission,
    now: DateTime<Utc>,
) -> Result<VisitPlan, IntakeError> {
    let chief_complaint = submission
        .chief_complaint
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(IntakeError::MissingChiefComplaint)?
        .to_string();

    let visit_type = match submission.visit_type.as_deref().map(str::trim) {
        None | Some("") => VisitType::default(),
        Some(raw) => raw
            .parse::<VisitType>()
            .map_err(|_| IntakeError::InvalidVisitType(raw.to_string()))?,
    };

    let form = VisitForm {
        chief_complaint,
        visit_type,
    };
    form.validate()
        .map_err(|report| IntakeError::InvalidForm(report.to_string()))?;

    let type_map = parse_document_type_map(submission.document_type_map.as_deref())?;

    let documents = submission
        .files
        .into_iter()
        .map(|file| {
            let ingest_id = Uuid::new_v4();
            let doc_type = classify(&type_map, &file.original_filename);
            let key = storage_key::document_key(&KeyParts {
                clerk_id: &user.clerk_id,
                visit_timestamp: now,
                doc_type,
                original_filename: &file.original_filename,
                uploaded_at: now,
                ingest_id,
            });
            PlannedDocument {
                ingest_id,
                doc_type,
                key,
                original_filename: file.original_filename,
                content_type: file
                    .content_type
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                data: file.data,
            }
        })
        .collect();

    Ok(VisitPlan {
        visit_id: Uuid::new_v4(),
        user_id: user.id,
        pseudonym_id: pseudonym_for(user.id, now),
        visit_timestamp: now,
        visit_type: form.visit_type,
        chief_complaint: form.chief_complaint,
        documents,
    })
}

/// Upload every planned document. On the first failure the documents already
/// stored are deleted again and the error is returned.
pub async fn store_documents(
    store: &dyn BlobStore,
    plan: &VisitPlan,
) -> Result<Vec<IngestRecord>, IntakeError> {
    let mut stored = Vec::with_capacity(plan.documents.len());

    for doc in &plan.documents {
        if let Err(source) = store.put(&doc.key, &doc.data, &doc.content_type).await {
            metrics::counter!("document_upload_failures_total").increment(1);
            warn!(
                visit_id = %plan.visit_id,
                key = %doc.key,
                error = %source,
                "Document upload failed, rolling back visit uploads"
            );
            discard_documents(store, &stored).await;
            return Err(IntakeError::Storage {
                filename: doc.original_filename.clone(),
                source,
            });
        }

        metrics::counter!("documents_uploaded_total", "type" => doc.doc_type.to_string())
            .increment(1);

        stored.push(IngestRecord {
            ingest_id: doc.ingest_id,
            doc_type: doc.doc_type,
            s3_key: doc.key.clone(),
            s3_bucket: store.bucket().to_string(),
            s3_region: store.region().to_string(),
            upload_timestamp: Utc::now(),
            original_filename: doc.original_filename.clone(),
            file_size: doc.data.len() as i64,
            content_type: doc.content_type.clone(),
        });
    }

    info!(
        visit_id = %plan.visit_id,
        documents = stored.len(),
        "Visit documents stored"
    );

    Ok(stored)
}

/// Best-effort removal of stored documents; failures are logged, not returned.
pub async fn discard_documents(store: &dyn BlobStore, ingests: &[IngestRecord]) {
    for ingest in ingests {
        if let Err(e) = store.delete(&ingest.s3_key).await {
            warn!(key = %ingest.s3_key, error = %e, "Failed to delete orphaned document");
        }
    }
}

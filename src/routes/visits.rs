use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::config::UploadLimits;
use crate::db::visit_queries;
use crate::models::user::{Role, User};
use crate::models::visit::{UpdateVisitStatusRequest, Visit, VisitResponse, VisitStatus};
use crate::routes::auth::CurrentUser;
use crate::routes::error::ApiError;
use crate::routes::extract::{ApiJson, ApiMultipart, ApiPath};
use crate::services::intake::{self, IntakeSubmission, UploadedFile};
use crate::services::storage::BlobStore;

/// Multipart field carrying the uploaded documents.
pub const MEDICAL_DOCS_FIELD: &str = "medicalDocs";

fn upload_error(reason: impl std::fmt::Display) -> ApiError {
    ApiError::bad_request(format!("File upload error: {}", reason))
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), format!("File upload error: {}", err.body_text()))
}

/// Read one file field, failing as soon as it grows past `max_bytes`.
async fn read_file(mut field: Field<'_>, max_bytes: usize) -> Result<Bytes, ApiError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if data.len() + chunk.len() > max_bytes {
            return Err(upload_error("File too large"));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(data))
}

/// Collect the intake form: `medicalDocs` files plus the text fields.
pub async fn read_submission(
    mut multipart: Multipart,
    limits: UploadLimits,
) -> Result<IntakeSubmission, ApiError> {
    let mut submission = IntakeSubmission::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            if name != MEDICAL_DOCS_FIELD {
                return Err(upload_error("Unexpected field"));
            }
            if submission.files.len() >= limits.max_files {
                return Err(upload_error("Too many files"));
            }
            let content_type = field.content_type().map(str::to_string);
            let data = read_file(field, limits.max_file_bytes).await?;
            submission.files.push(UploadedFile {
                original_filename: file_name,
                content_type,
                data,
            });
            continue;
        }

        let slot = match name.as_str() {
            "chief_complaint" => &mut submission.chief_complaint,
            "visit_type" => &mut submission.visit_type,
            "documentTypeMap" => &mut submission.document_type_map,
            _ => continue,
        };
        *slot = Some(field.text().await.map_err(multipart_error)?);
    }

    Ok(submission)
}

/// POST /api/visits — create a visit from an intake form with documents.
pub async fn create_visit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiMultipart(multipart): ApiMultipart,
) -> Result<(StatusCode, Json<VisitResponse>), ApiError> {
    if !user.is_verified {
        return Err(ApiError::forbidden("User not verified"));
    }

    let submission = read_submission(multipart, state.upload_limits).await?;
    let plan = intake::plan_visit(&user, submission, Utc::now())?;
    let ingests = intake::store_documents(state.storage.as_ref(), &plan).await?;
    let visit = plan.into_visit(ingests);

    let inserted = visit_queries::insert_visit(&state.db, &visit).await;
    keep_or_discard(state.storage.as_ref(), &visit, inserted).await?;

    metrics::counter!("visits_created_total").increment(1);
    tracing::info!(
        visit_id = %visit.id,
        user_id = %user.id,
        pseudonym_id = %visit.pseudonym_id,
        documents = visit.ingests.len(),
        "Visit requested"
    );

    Ok((
        StatusCode::CREATED,
        Json(VisitResponse {
            message: "Visit requested successfully".to_string(),
            visit,
        }),
    ))
}

/// Settle a visit whose documents are already stored: if the insert failed,
/// delete them again.
async fn keep_or_discard(
    store: &dyn BlobStore,
    visit: &Visit,
    inserted: Result<(), sqlx::Error>,
) -> Result<(), ApiError> {
    if let Err(e) = inserted {
        intake::discard_documents(store, &visit.ingests).await;
        return Err(ApiError::internal("Server error creating visit", e));
    }
    Ok(())
}

/// GET /api/visits — the caller's visits, most recent first.
pub async fn list_visits(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Visit>>, ApiError> {
    let visits = visit_queries::list_visits_for_user(&state.db, user.id)
        .await
        .map_err(|e| ApiError::internal("Server error fetching visits", e))?;
    Ok(Json(visits))
}

fn can_view(user: &User, visit: &Visit) -> bool {
    visit.user_id == user.id || user.role.is_staff()
}

async fn visible_visit(state: &AppState, user: &User, visit_id: Uuid) -> Result<Visit, ApiError> {
    visit_queries::get_visit(&state.db, visit_id)
        .await
        .map_err(|e| ApiError::internal("Server error fetching visit", e))?
        .filter(|visit| can_view(user, visit))
        .ok_or_else(|| ApiError::not_found("Visit not found"))
}

/// GET /api/visits/{id}
pub async fn get_visit(
    State(state): State<AppState>,
    ApiPath(visit_id): ApiPath<Uuid>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Visit>, ApiError> {
    visible_visit(&state, &user, visit_id).await.map(Json)
}

/// Patients may only cancel; staff may apply any legal transition.
pub fn authorize_status_change(
    role: Role,
    current: VisitStatus,
    target: VisitStatus,
) -> Result<(), ApiError> {
    if !role.is_staff() && target != VisitStatus::Cancelled {
        return Err(ApiError::forbidden(format!("Not allowed to set status {}", target)));
    }
    if !current.can_transition_to(target) {
        return Err(ApiError::conflict(format!(
            "Cannot move visit from {} to {}",
            current, target
        )));
    }
    Ok(())
}

/// PATCH /api/visits/{id}/status
pub async fn update_visit_status(
    State(state): State<AppState>,
    ApiPath(visit_id): ApiPath<Uuid>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<UpdateVisitStatusRequest>,
) -> Result<Json<VisitResponse>, ApiError> {
    let target: VisitStatus = req
        .status
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid status: {}", req.status)))?;

    let visit = visible_visit(&state, &user, visit_id).await?;
    authorize_status_change(user.role, visit.status, target)?;

    let moved = visit_queries::transition_visit_status(&state.db, visit.id, visit.status, target)
        .await
        .map_err(|e| ApiError::internal("Server error updating visit", e))?;
    if !moved {
        return Err(ApiError::conflict("Visit status was changed by another request"));
    }

    tracing::info!(
        visit_id = %visit.id,
        from = %visit.status,
        to = %target,
        actor = %user.id,
        "Visit status updated"
    );

    let visit = visible_visit(&state, &user, visit_id).await?;
    Ok(Json(VisitResponse {
        message: "Visit status updated".to_string(),
        visit,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{verified_user, RecordingStore};
    use axum::body::Body;
    use axum::extract::{DefaultBodyLimit, FromRequest, Request};
    use axum::http::header;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    const BOUNDARY: &str = "visit-form-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn form(parts: &[Part<'_>]) -> Request {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(field, filename, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                             Content-Type: application/pdf\r\n\r\n",
                            field, filename
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    const LIMITS: UploadLimits = UploadLimits {
        max_files: 2,
        max_file_bytes: 16,
    };

    async fn submit(parts: &[Part<'_>]) -> Result<IntakeSubmission, ApiError> {
        let multipart = Multipart::from_request(form(parts), &()).await.unwrap();
        read_submission(multipart, LIMITS).await
    }

    #[tokio::test]
    async fn submission_collects_docs_and_known_text_fields() {
        let submission = submit(&[
            Part::Text("chief_complaint", "Knee pain"),
            Part::Text("visit_type", "follow_up"),
            Part::Text("documentTypeMap", r#"{"cbc.pdf":"lab_report"}"#),
            Part::Text("referrer", "ignored"),
            Part::File(MEDICAL_DOCS_FIELD, "cbc.pdf", b"%PDF-1.7"),
            Part::File(MEDICAL_DOCS_FIELD, "notes.pdf", b"16 bytes exactly"),
        ])
        .await
        .unwrap();

        assert_eq!(submission.chief_complaint.as_deref(), Some("Knee pain"));
        assert_eq!(submission.visit_type.as_deref(), Some("follow_up"));
        assert!(submission.document_type_map.is_some());
        let names: Vec<_> = submission.files.iter().map(|f| f.original_filename.as_str()).collect();
        assert_eq!(names, ["cbc.pdf", "notes.pdf"]);
        assert_eq!(submission.files[1].data.len(), 16);
        assert_eq!(submission.files[0].content_type.as_deref(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn submission_without_files_is_allowed() {
        let submission = submit(&[Part::Text("chief_complaint", "Rash")]).await.unwrap();
        assert!(submission.files.is_empty());
    }

    #[tokio::test]
    async fn submission_enforces_upload_rules() {
        let cases: [(&[Part<'_>], &str); 3] = [
            (
                &[Part::File("attachment", "a.pdf", b"x")],
                "File upload error: Unexpected field",
            ),
            (
                &[
                    Part::File(MEDICAL_DOCS_FIELD, "a.pdf", b"x"),
                    Part::File(MEDICAL_DOCS_FIELD, "b.pdf", b"x"),
                    Part::File(MEDICAL_DOCS_FIELD, "c.pdf", b"x"),
                ],
                "File upload error: Too many files",
            ),
            (
                &[Part::File(MEDICAL_DOCS_FIELD, "big.pdf", &[0u8; 17])],
                "File upload error: File too large",
            ),
        ];

        for (parts, expected) in cases {
            let err = submit(parts).await.unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            assert_eq!(err.message(), expected);
        }
    }

    #[tokio::test]
    async fn request_over_body_limit_is_json_error() {
        let app = Router::new()
            .route(
                "/",
                post(|ApiMultipart(multipart): ApiMultipart| async move {
                    read_submission(multipart, LIMITS).await.map(|s| s.files.len().to_string())
                }),
            )
            .layer(DefaultBodyLimit::max(LIMITS.body_limit()));

        let big = vec![b'x'; LIMITS.body_limit() + 1];
        let response = app
            .oneshot(form(&[Part::Text("chief_complaint", "Rash"), Part::File(MEDICAL_DOCS_FIELD, "a.pdf", &big)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["message"].as_str().unwrap().starts_with("File upload error: "));
    }

    #[tokio::test]
    async fn missing_boundary_is_json_upload_error() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "multipart/form-data")
            .body(Body::empty())
            .unwrap();

        let err = match ApiMultipart::from_request(request, &()).await {
            Ok(_) => panic!("boundary is required"),
            Err(err) => err,
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message().starts_with("File upload error: "));
    }

    async fn stored_visit(store: &RecordingStore) -> Visit {
        let submission = IntakeSubmission {
            chief_complaint: Some("Knee pain".into()),
            files: vec![
                UploadedFile {
                    original_filename: "cbc.pdf".into(),
                    content_type: None,
                    data: Bytes::from_static(b"%PDF"),
                },
                UploadedFile {
                    original_filename: "knee.png".into(),
                    content_type: None,
                    data: Bytes::from_static(b"PNG"),
                },
            ],
            ..Default::default()
        };
        let plan = intake::plan_visit(&verified_user(), submission, Utc::now()).unwrap();
        let ingests = intake::store_documents(store, &plan).await.unwrap();
        plan.into_visit(ingests)
    }

    #[tokio::test]
    async fn failed_insert_discards_stored_documents() {
        let store = RecordingStore::default();
        let visit = stored_visit(&store).await;
        assert_eq!(store.keys().len(), 2);

        let err = keep_or_discard(&store, &visit, Err(sqlx::Error::PoolTimedOut))
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Server error creating visit");
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn successful_insert_keeps_documents() {
        let store = RecordingStore::default();
        let visit = stored_visit(&store).await;

        keep_or_discard(&store, &visit, Ok(())).await.unwrap();

        assert_eq!(store.keys().len(), 2);
    }

    #[test]
    fn patients_may_only_cancel() {
        use VisitStatus::*;
        assert!(authorize_status_change(Role::User, Requested, Cancelled).is_ok());
        assert!(authorize_status_change(Role::User, InProgress, Cancelled).is_ok());

        let err = authorize_status_change(Role::User, Requested, InProgress).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "Not allowed to set status in_progress");
    }

    #[test]
    fn staff_follow_lifecycle() {
        use VisitStatus::*;
        assert!(authorize_status_change(Role::Doctor, Requested, InProgress).is_ok());
        assert!(authorize_status_change(Role::Admin, InProgress, Completed).is_ok());

        let err = authorize_status_change(Role::Doctor, Completed, Cancelled).unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.message(), "Cannot move visit from completed to cancelled");

        let err = authorize_status_change(Role::User, Cancelled, Cancelled).unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}

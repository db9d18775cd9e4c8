use std::collections::HashMap;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::decode_enum;
use crate::models::document::IngestRecord;
use crate::models::visit::{Visit, VisitStatus};

const VISIT_COLUMNS: &str = "id, user_id, pseudonym_id, visit_timestamp, visit_type, \
                             chief_complaint, status, created_at, updated_at";

const INGEST_COLUMNS: &str = "ingest_id, visit_id, doc_type, s3_key, s3_bucket, s3_region, \
                              upload_timestamp, original_filename, file_size, content_type";

fn visit_from_row(row: &PgRow) -> Result<Visit, sqlx::Error> {
    let visit_type: String = row.try_get("visit_type")?;
    let status: String = row.try_get("status")?;

    Ok(Visit {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        pseudonym_id: row.try_get("pseudonym_id")?,
        visit_timestamp: row.try_get("visit_timestamp")?,
        visit_type: decode_enum(&visit_type)?,
        chief_complaint: row.try_get("chief_complaint")?,
        ingests: Vec::new(),
        status: decode_enum(&status)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ingest_from_row(row: &PgRow) -> Result<IngestRecord, sqlx::Error> {
    let doc_type: String = row.try_get("doc_type")?;

    Ok(IngestRecord {
        ingest_id: row.try_get("ingest_id")?,
        doc_type: decode_enum(&doc_type)?,
        s3_key: row.try_get("s3_key")?,
        s3_bucket: row.try_get("s3_bucket")?,
        s3_region: row.try_get("s3_region")?,
        upload_timestamp: row.try_get("upload_timestamp")?,
        original_filename: row.try_get("original_filename")?,
        file_size: row.try_get("file_size")?,
        content_type: row.try_get("content_type")?,
    })
}

/// Insert a visit and all of its ingests in a single transaction.
pub async fn insert_visit(pool: &PgPool, visit: &Visit) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO visits (id, user_id, pseudonym_id, visit_timestamp, visit_type,
                            chief_complaint, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(visit.id)
    .bind(visit.user_id)
    .bind(&visit.pseudonym_id)
    .bind(visit.visit_timestamp)
    .bind(visit.visit_type.as_ref())
    .bind(&visit.chief_complaint)
    .bind(visit.status.as_ref())
    .bind(visit.created_at)
    .bind(visit.updated_at)
    .execute(&mut *tx)
    .await?;

    for (position, ingest) in visit.ingests.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO visit_ingests (ingest_id, visit_id, position, doc_type, s3_key, s3_bucket,
                                       s3_region, upload_timestamp, original_filename,
                                       file_size, content_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(ingest.ingest_id)
        .bind(visit.id)
        .bind(position as i32)
        .bind(ingest.doc_type.as_ref())
        .bind(&ingest.s3_key)
        .bind(&ingest.s3_bucket)
        .bind(&ingest.s3_region)
        .bind(ingest.upload_timestamp)
        .bind(&ingest.original_filename)
        .bind(ingest.file_size)
        .bind(&ingest.content_type)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

/// Attach ingests, in upload order, to the given visits.
async fn load_ingests(pool: &PgPool, visits: &mut [Visit]) -> Result<(), sqlx::Error> {
    if visits.is_empty() {
        return Ok(());
    }

    let ids: Vec<Uuid> = visits.iter().map(|v| v.id).collect();
    let rows = sqlx::query(&format!(
        "SELECT {INGEST_COLUMNS} FROM visit_ingests WHERE visit_id = ANY($1) ORDER BY visit_id, position"
    ))
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_visit: HashMap<Uuid, Vec<IngestRecord>> = HashMap::new();
    for row in &rows {
        let visit_id: Uuid = row.try_get("visit_id")?;
        by_visit.entry(visit_id).or_default().push(ingest_from_row(row)?);
    }

    for visit in visits.iter_mut() {
        visit.ingests = by_visit.remove(&visit.id).unwrap_or_default();
    }
    Ok(())
}

/// All visits of a user, most recent first
pub async fn list_visits_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Visit>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {VISIT_COLUMNS} FROM visits WHERE user_id = $1 ORDER BY visit_timestamp DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut visits = rows.iter().map(visit_from_row).collect::<Result<Vec<_>, _>>()?;
    load_ingests(pool, &mut visits).await?;
    Ok(visits)
}

/// Get a visit by ID
pub async fn get_visit(pool: &PgPool, visit_id: Uuid) -> Result<Option<Visit>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {VISIT_COLUMNS} FROM visits WHERE id = $1"))
        .bind(visit_id)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut visits = vec![visit_from_row(&row)?];
    load_ingests(pool, &mut visits).await?;
    Ok(visits.pop())
}

/// Move a visit from `from` to `to` only if it is still in `from`.
///
/// Returns `false` when the visit's status changed concurrently.
pub async fn transition_visit_status(
    pool: &PgPool,
    visit_id: Uuid,
    from: VisitStatus,
    to: VisitStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE visits
        SET status = $1, updated_at = NOW()
        WHERE id = $2 AND status = $3
        "#,
    )
    .bind(to.as_ref())
    .bind(visit_id)
    .bind(from.as_ref())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

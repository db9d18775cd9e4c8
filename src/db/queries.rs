use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::db::decode_enum;
use crate::models::user::{NewUser, User, VerificationDetails};

const USER_COLUMNS: &str = "id, clerk_id, email, name, role, is_verified, age, budget, \
                            availability_days, visa_status, created_at, updated_at";

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let role: String = row.try_get("role")?;
    let visa_status: Option<String> = row.try_get("visa_status")?;

    Ok(User {
        id: row.try_get("id")?,
        clerk_id: row.try_get("clerk_id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        role: decode_enum(&role)?,
        is_verified: row.try_get("is_verified")?,
        age: row.try_get("age")?,
        budget: row.try_get("budget")?,
        availability_days: row.try_get("availability_days")?,
        visa_status: visa_status.as_deref().map(decode_enum).transpose()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Look up a user by Clerk ID
pub async fn find_user_by_clerk_id(
    pool: &PgPool,
    clerk_id: &str,
) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE clerk_id = $1"
    ))
    .bind(clerk_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

/// Outcome of inserting a user.
#[derive(Debug)]
pub enum InsertUserOutcome {
    Created(User),
    /// Another row already holds this email.
    EmailTaken,
    /// Another row already holds this Clerk ID.
    ClerkIdTaken,
}

/// Insert a new, unverified user
pub async fn insert_user(pool: &PgPool, new_user: &NewUser) -> Result<InsertUserOutcome, sqlx::Error> {
    let result = sqlx::query(&format!(
        r#"
        INSERT INTO users (clerk_id, email, name, role)
        VALUES ($1, $2, $3, $4)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&new_user.clerk_id)
    .bind(&new_user.email)
    .bind(&new_user.name)
    .bind(new_user.role.as_ref())
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(InsertUserOutcome::Created(user_from_row(&row)?)),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            if db_err.constraint() == Some("users_email_key") {
                Ok(InsertUserOutcome::EmailTaken)
            } else {
                Ok(InsertUserOutcome::ClerkIdTaken)
            }
        }
        Err(e) => Err(e),
    }
}

/// Store verification details and mark the user verified in one statement
pub async fn mark_verified(
    pool: &PgPool,
    clerk_id: &str,
    details: &VerificationDetails,
) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE users
        SET name = $1,
            age = $2,
            budget = $3,
            availability_days = $4,
            visa_status = $5,
            is_verified = TRUE,
            updated_at = NOW()
        WHERE clerk_id = $6
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&details.name)
    .bind(details.age)
    .bind(&details.budget)
    .bind(details.availability_days)
    .bind(details.visa_status.as_ref())
    .bind(clerk_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

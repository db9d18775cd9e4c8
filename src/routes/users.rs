use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::db::queries::{self, InsertUserOutcome};
use crate::models::user::{
    AddUserRequest, FormValue, NewUser, Role, User, UserResponse, UserStatusResponse,
    VerificationDetails, VerifyUserRequest,
};
use crate::routes::auth::{CurrentUser, MaybeUser};
use crate::routes::error::ApiError;
use crate::routes::extract::ApiJson;

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Normalize and validate an `addUser` payload.
pub fn new_user_from_request(req: AddUserRequest) -> Result<NewUser, ApiError> {
    let (Some(clerk_id), Some(email), Some(name)) =
        (present(req.clerk_id), present(req.email), present(req.name))
    else {
        return Err(ApiError::bad_request(
            "Missing required fields: clerkId, email, name",
        ));
    };

    let role = match present(req.role) {
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|_| ApiError::bad_request(format!("Invalid role: {}", raw)))?,
        None => Role::default(),
    };

    let new_user = NewUser {
        clerk_id,
        email: email.to_lowercase(),
        name,
        role,
    };
    new_user
        .validate()
        .map_err(|report| ApiError::bad_request(format!("Invalid user: {}", report)))?;
    Ok(new_user)
}

/// Turn a verification payload into validated details.
pub fn verification_from_request(req: VerifyUserRequest) -> Result<VerificationDetails, ApiError> {
    fn required(value: Option<FormValue>) -> Option<FormValue> {
        value.filter(|v| !v.is_blank())
    }

    let (Some(name), Some(age), Some(budget), Some(availability_days), Some(visa_status)) = (
        required(req.name),
        required(req.age),
        required(req.budget),
        required(req.availability_days),
        required(req.visa_status),
    ) else {
        return Err(ApiError::bad_request("Missing verification fields"));
    };

    let age = age
        .parse_int()
        .ok_or_else(|| ApiError::bad_request("Age must be a number"))?;
    let availability_days = availability_days
        .parse_int()
        .ok_or_else(|| ApiError::bad_request("Availability days must be a number"))?;
    let visa_status = visa_status
        .as_text()
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid visa status"))?;

    let details = VerificationDetails {
        name: name.as_text(),
        age,
        budget: budget.as_text(),
        availability_days,
        visa_status,
    };
    details
        .validate()
        .map_err(|report| ApiError::bad_request(format!("Invalid verification fields: {}", report)))?;
    Ok(details)
}

/// POST /api/addUser — register a user by Clerk ID (idempotent).
pub async fn add_user(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AddUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let new_user = new_user_from_request(req)?;
    tracing::info!(clerk_id = %new_user.clerk_id, role = %new_user.role, "addUser called");

    let existing = queries::find_user_by_clerk_id(&state.db, &new_user.clerk_id)
        .await
        .map_err(|e| ApiError::internal("Server error", e))?;
    if let Some(user) = existing {
        return Ok(already_exists(user));
    }

    match queries::insert_user(&state.db, &new_user)
        .await
        .map_err(|e| ApiError::internal("Server error", e))?
    {
        InsertUserOutcome::Created(user) => {
            metrics::counter!("users_created_total").increment(1);
            tracing::info!(user_id = %user.id, "User created");
            Ok((
                StatusCode::CREATED,
                Json(UserResponse {
                    message: "User created".to_string(),
                    user,
                }),
            ))
        }
        InsertUserOutcome::EmailTaken => Err(ApiError::conflict("Email already exists")),
        InsertUserOutcome::ClerkIdTaken => {
            // Lost a race with a concurrent addUser for the same Clerk ID.
            let user = queries::find_user_by_clerk_id(&state.db, &new_user.clerk_id)
                .await
                .map_err(|e| ApiError::internal("Server error", e))?
                .ok_or_else(|| ApiError::internal("Server error", "user vanished after conflict"))?;
            Ok(already_exists(user))
        }
    }
}

fn already_exists(user: User) -> (StatusCode, Json<UserResponse>) {
    (
        StatusCode::OK,
        Json(UserResponse {
            message: "User already exists".to_string(),
            user,
        }),
    )
}

/// POST /api/user/verify — record verification details for the caller.
pub async fn verify_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<VerifyUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let details = verification_from_request(req)?;

    let user = queries::mark_verified(&state.db, &user.clerk_id, &details)
        .await
        .map_err(|e| ApiError::internal("Server error during verification", e))?
        .ok_or_else(|| ApiError::not_found("User not found in DB"))?;

    metrics::counter!("users_verified_total").increment(1);
    tracing::info!(user_id = %user.id, "User verified");

    Ok(Json(UserResponse {
        message: "User verified successfully".to_string(),
        user,
    }))
}

/// GET /api/user/status — verification state of the caller, if known.
pub async fn user_status(MaybeUser(user): MaybeUser) -> Json<UserStatusResponse> {
    Json(UserStatusResponse::for_user(user.as_ref()))
}

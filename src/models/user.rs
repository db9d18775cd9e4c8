use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Doctor,
    Admin,
}

impl Role {
    /// Clinical staff can see and progress any patient's visits.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Doctor | Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VisaStatus {
    IndianCitizen,
    NotIndianCitizen,
    Other,
}

/// A registered user, keyed externally by their Clerk ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub clerk_id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_verified: bool,
    pub age: Option<i32>,
    pub budget: Option<String>,
    pub availability_days: Option<i32>,
    pub visa_status: Option<VisaStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields captured when a user completes verification.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct VerificationDetails {
    #[garde(length(min = 1, max = 200))]
    pub name: String,

    #[garde(range(min = 1, max = 150))]
    pub age: i32,

    #[garde(length(min = 1, max = 100))]
    pub budget: String,

    #[garde(range(min = 1, max = 366))]
    pub availability_days: i32,

    #[garde(skip)]
    pub visa_status: VisaStatus,
}

/// A loosely typed form value: frontends send numbers either as JSON numbers or strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl FormValue {
    /// Blank values count as missing: empty strings, zero, and `false`.
    pub fn is_blank(&self) -> bool {
        match self {
            FormValue::Bool(b) => !b,
            FormValue::Number(n) => n.as_f64() == Some(0.0),
            FormValue::Text(s) => s.trim().is_empty(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            FormValue::Bool(b) => b.to_string(),
            FormValue::Number(n) => n.to_string(),
            FormValue::Text(s) => s.trim().to_string(),
        }
    }

    /// Parse the leading integer of the value ("25 years" is 25, "7.5" is 7).
    pub fn parse_int(&self) -> Option<i32> {
        let text = self.as_text();
        let text = text.trim_start();
        let (sign, digits) = match text.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, text.strip_prefix('+').unwrap_or(text)),
        };
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());
        if end == 0 {
            return None;
        }
        digits[..end].parse::<i32>().ok().map(|v| sign * v)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserRequest {
    pub clerk_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
}

/// Normalized, validated input for creating a user.
#[derive(Debug, Clone, Validate)]
pub struct NewUser {
    #[garde(length(min = 1, max = 255))]
    pub clerk_id: String,

    #[garde(length(min = 3, max = 320), contains("@"))]
    pub email: String,

    #[garde(length(min = 1, max = 200))]
    pub name: String,

    #[garde(skip)]
    pub role: Role,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyUserRequest {
    pub name: Option<FormValue>,
    pub age: Option<FormValue>,
    pub budget: Option<FormValue>,
    pub availability_days: Option<FormValue>,
    pub visa_status: Option<FormValue>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub message: String,
    pub user: User,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusResponse {
    pub is_verified: bool,
    pub clerk_id: Option<String>,
    pub user_id: Option<Uuid>,
}

impl UserStatusResponse {
    pub fn for_user(user: Option<&User>) -> Self {
        match user {
            Some(u) => Self {
                is_verified: u.is_verified,
                clerk_id: Some(u.clerk_id.clone()),
                user_id: Some(u.id),
            },
            None => Self {
                is_verified: false,
                clerk_id: None,
                user_id: None,
            },
        }
    }
}

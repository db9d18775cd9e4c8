//! Fixtures shared by unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::user::{Role, User};
use crate::services::storage::{BlobStore, StorageError};

/// In-memory store that can be told to fail on the nth put.
#[derive(Default)]
pub struct RecordingStore {
    pub objects: Mutex<Vec<String>>,
    pub fail_on_put: Option<usize>,
    pub(crate) puts: Mutex<usize>,
}

impl RecordingStore {
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for RecordingStore {
    fn bucket(&self) -> &str {
        "test-bucket"
    }

    fn region(&self) -> &str {
        "test-region"
    }

    async fn put(&self, key: &str, _data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let mut puts = self.puts.lock().unwrap();
        *puts += 1;
        if self.fail_on_put == Some(*puts) {
            return Err(StorageError::Status(503));
        }
        self.objects.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().retain(|k| k != key);
        Ok(())
    }
}

/// A verified patient with a fixed id.
pub fn verified_user() -> User {
    let now = Utc::now();
    User {
        id: Uuid::parse_str("6f1c2d3e-4a5b-6c7d-8e9f-0a1b2c3d3f2a").unwrap(),
        clerk_id: "user_2abc".into(),
        email: "asha@example.com".into(),
        name: "Asha".into(),
        role: Role::User,
        is_verified: true,
        age: Some(34),
        budget: Some("5000".into()),
        availability_days: Some(3),
        visa_status: None,
        created_at: now,
        updated_at: now,
    }
}
